//! Capped, append-only diagnostics log.
//!
//! Every record is mirrored to the `log` facade. When diagnostics are
//! enabled the record is also kept in a ring of at most [`MAX_ENTRIES`]
//! entries (oldest evicted first) that a UI can render. Recording never
//! affects control flow.

use std::collections::VecDeque;
use std::fmt;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde::Serialize;

use cpi_common::OutboundRequest;

/// Maximum number of retained entries.
pub const MAX_ENTRIES: usize = 200;

/// Characters of a credential kept visible by [`redact`].
pub const REDACT_VISIBLE_CHARS: usize = 20;

/// Characters of a body kept in request/response records.
const BODY_PREVIEW_CHARS: usize = 1000;

/// Kind of a diagnostics record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Decisions and progress.
    Info,
    /// Degraded but handled conditions.
    Warn,
    /// Failures.
    Error,
    /// An outgoing rewritten request.
    Request,
    /// A response to a rewritten request.
    Response,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Request => write!(f, "REQUEST"),
            Self::Response => write!(f, "RESPONSE"),
        }
    }
}

/// One diagnostics record.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// When the record was made.
    pub timestamp: DateTime<Utc>,
    /// Record kind.
    pub level: LogLevel,
    /// Record text, credentials already redacted.
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.level,
            self.message
        )
    }
}

/// Shortens a credential to its first [`REDACT_VISIBLE_CHARS`] characters.
///
/// ```
/// use cpi_client::diagnostics::redact;
///
/// assert_eq!(redact("Bearer tid=0123456789abcdef;exp=1"), "Bearer tid=012345678...");
/// ```
#[must_use]
pub fn redact(value: &str) -> String {
    let visible: String = value.chars().take(REDACT_VISIBLE_CHARS).collect();
    format!("{visible}...")
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(BODY_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}... ({} chars)", text.chars().count())
    } else {
        head
    }
}

fn render_headers(headers: &HeaderMap) -> String {
    let mut rendered = String::new();
    for (name, value) in headers {
        let text = value.to_str().unwrap_or("<binary>");
        let shown = if *name == AUTHORIZATION {
            redact(text)
        } else {
            text.to_string()
        };
        if !rendered.is_empty() {
            rendered.push_str(", ");
        }
        let _ = write!(rendered, "{name}: {shown}");
    }
    rendered
}

/// Diagnostics sink shared by the interception components.
#[derive(Debug)]
pub struct Diagnostics {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    enabled: AtomicBool,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    /// Creates an enabled sink holding up to [`MAX_ENTRIES`] entries.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_ENTRIES)
    }

    /// Creates an enabled sink holding up to `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            enabled: AtomicBool::new(true),
        }
    }

    /// Turns retention on or off. Mirroring to `log` is unaffected.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether records are being retained.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Appends a record.
    pub fn record(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();

        match level {
            LogLevel::Info => log::info!("{message}"),
            LogLevel::Warn => log::warn!("{message}"),
            LogLevel::Error => log::error!("{message}"),
            LogLevel::Request | LogLevel::Response => log::debug!("{level} {message}"),
        }

        if !self.is_enabled() || self.capacity == 0 {
            return;
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(LogEntry {
            timestamp: Utc::now(),
            level,
            message,
        });
    }

    /// Appends an `INFO` record.
    pub fn info(&self, message: impl Into<String>) {
        self.record(LogLevel::Info, message);
    }

    /// Appends a `WARN` record.
    pub fn warn(&self, message: impl Into<String>) {
        self.record(LogLevel::Warn, message);
    }

    /// Appends an `ERROR` record.
    pub fn error(&self, message: impl Into<String>) {
        self.record(LogLevel::Error, message);
    }

    /// Appends a `REQUEST` record for a rewritten call.
    pub fn request(&self, request: &OutboundRequest) {
        let body = request.body.as_deref().map(preview).unwrap_or_default();
        self.record(
            LogLevel::Request,
            format!(
                "{} {} headers={{{}}} body={body}",
                request.method,
                request.url,
                render_headers(&request.headers)
            ),
        );
    }

    /// Appends a `RESPONSE` record.
    pub fn response(&self, status: StatusCode, elapsed: Duration, body: Option<&str>) {
        let mut message = format!("{} in {}ms", status.as_u16(), elapsed.as_millis());
        if let Some(body) = body {
            let _ = write!(message, " body={}", preview(body));
        }
        self.record(LogLevel::Response, message);
    }

    /// Copy of the retained entries, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Retained entries as display text, one per line.
    pub fn render(&self) -> String {
        self.snapshot()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every retained entry.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
