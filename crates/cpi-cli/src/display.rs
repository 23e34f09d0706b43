//! Display utilities for CLI output formatting
//!
//! Provides coloured output for status, settings, diagnostics and notifications

use colored::{ColoredString, Colorize};

use cpi::{InterceptorSettings, InterceptorStatus, LogEntry, LogLevel, NotificationLevel, NotificationSink};

/// Notification sink that prints to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalNotifier;

impl NotificationSink for TerminalNotifier {
    fn notify(&self, level: NotificationLevel, message: &str) {
        let marker = match level {
            NotificationLevel::Success => "✓".bright_green(),
            NotificationLevel::Info => "○".bright_blue(),
            NotificationLevel::Error => "✗".bright_red(),
        };
        eprintln!("{marker} {message}");
    }
}

fn status_marker(status: InterceptorStatus) -> ColoredString {
    match status {
        InterceptorStatus::Disabled => "❌".normal(),
        InterceptorStatus::MissingCredential | InterceptorStatus::NotInstalled => "⚠".yellow(),
        InterceptorStatus::Active => "✅".normal(),
    }
}

/// Display the interceptor status line
pub fn display_status(status: InterceptorStatus) {
    let text = status.to_string();
    let text = match status {
        InterceptorStatus::Disabled => text.bright_red(),
        InterceptorStatus::MissingCredential | InterceptorStatus::NotInstalled => {
            text.bright_yellow()
        }
        InterceptorStatus::Active => text.bright_green(),
    };
    println!("{} {text}", status_marker(status));
}

fn on_off(value: bool) -> ColoredString {
    if value {
        "on".bright_green()
    } else {
        "off".bright_black()
    }
}

/// Display the current settings
pub fn display_settings(settings: &InterceptorSettings) {
    let rows = [
        ("enabled", on_off(settings.enabled)),
        ("use_identity_headers", on_off(settings.use_identity_headers)),
        (
            "remove_trailing_assistant_messages",
            on_off(settings.remove_trailing_assistant_messages),
        ),
        (
            "include_ambient_credentials",
            on_off(settings.include_ambient_credentials),
        ),
        ("diagnostics_enabled", on_off(settings.diagnostics_enabled)),
        ("chat_version", settings.effective_chat_version().normal()),
        ("editor_version", settings.effective_editor_version().normal()),
    ];
    for (key, value) in rows {
        println!("  {:<36} {value}", key.bright_cyan());
    }
}

/// Display diagnostics records, oldest first
pub fn display_diagnostics(entries: &[LogEntry]) {
    if entries.is_empty() {
        return;
    }
    eprintln!("{}", "── diagnostics ──".bright_black());
    for entry in entries {
        let line = entry.to_string();
        let line = match entry.level {
            LogLevel::Error => line.bright_red(),
            LogLevel::Warn => line.bright_yellow(),
            LogLevel::Request | LogLevel::Response => line.bright_blue(),
            LogLevel::Info => line.normal(),
        };
        eprintln!("{line}");
    }
}
