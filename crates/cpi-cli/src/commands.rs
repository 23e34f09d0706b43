//! Command implementations for the CLI.

use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use colored::Colorize;
use futures::StreamExt;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;

use cpi::{CopilotInterceptor, OutboundRequest, redact};

use crate::display::{display_diagnostics, display_settings, display_status};

/// Prints the interceptor status.
pub fn status(interceptor: &CopilotInterceptor) {
    display_status(interceptor.status());
}

/// Exchanges the stored credential for a session token and prints it redacted.
pub async fn token(interceptor: &CopilotInterceptor, verbose: bool) -> Result<()> {
    let credential = interceptor
        .credential()
        .context("No credential stored; set it in the credential environment variable")?;

    let issued = interceptor.session().tokens().get_token(&credential).await;
    let cached = interceptor.session().tokens().cached_token();

    match (issued, cached) {
        (Some(token), Some(cached)) => {
            let expires = DateTime::from_timestamp_millis(cached.expires_at_ms())
                .map_or_else(|| "unknown".to_string(), |t| t.with_timezone(&Local).to_string());
            println!(
                "{} {}",
                "✓".bright_green(),
                redact(token.expose_secret()).bright_white()
            );
            println!("  {} {expires}", "expires".bright_cyan());
        }
        _ => {
            if verbose {
                display_diagnostics(&interceptor.diagnostics().snapshot());
            }
            bail!("Session token exchange failed");
        }
    }

    if verbose {
        display_diagnostics(&interceptor.diagnostics().snapshot());
    }
    Ok(())
}

fn read_body(source: Option<&Path>) -> Result<String> {
    match source {
        None => Ok("{}".to_string()),
        Some(path) if path == Path::new("-") => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("Failed to read body from stdin")?;
            Ok(body)
        }
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read body from {}", path.display())),
    }
}

/// Posts a body through the pipeline and streams the response to stdout.
pub async fn send(
    interceptor: &CopilotInterceptor,
    url: String,
    body: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let request = OutboundRequest::builder()
        .url(url)
        .method(Method::POST)
        .headers(headers)
        .body(read_body(body)?)
        .build();

    let response = interceptor.send(request).await?;
    let status = response.status;
    let marker = if response.is_success() {
        status.to_string().bright_green()
    } else {
        status.to_string().bright_red()
    };
    eprintln!("{marker}");

    let mut stream = response.into_stream();
    let mut stdout = std::io::stdout();
    while let Some(chunk) = stream.next().await {
        stdout.write_all(&chunk?)?;
        stdout.flush()?;
    }
    println!();

    if verbose {
        display_diagnostics(&interceptor.diagnostics().snapshot());
    }
    Ok(())
}

/// Prints the current settings.
pub fn config_show(interceptor: &CopilotInterceptor) {
    display_settings(&interceptor.settings());
    display_status(interceptor.status());
}

fn parse_switch(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => bail!("'{value}' is not a valid value for {key}; use on or off"),
    }
}

/// Applies one settings change.
pub fn config_set(interceptor: &CopilotInterceptor, key: &str, value: &str) -> Result<()> {
    match key {
        "enabled" => interceptor.set_enabled(parse_switch(key, value)?)?,
        "use_identity_headers" => interceptor.set_use_identity_headers(parse_switch(key, value)?)?,
        "remove_trailing_assistant_messages" => {
            interceptor.set_remove_trailing_assistant_messages(parse_switch(key, value)?)?;
        }
        "include_ambient_credentials" => {
            interceptor.set_include_ambient_credentials(parse_switch(key, value)?)?;
        }
        "diagnostics_enabled" => interceptor.set_diagnostics_enabled(parse_switch(key, value)?)?,
        "chat_version" => interceptor.set_chat_version(value)?,
        "editor_version" => interceptor.set_editor_version(value)?,
        _ => bail!("Unknown setting '{key}'"),
    }
    println!("{} {key} updated", "✓".bright_green());
    Ok(())
}
