//! cpi - drive the Copilot interceptor from the terminal
//!
//! Inspects and edits interceptor settings, exchanges the stored credential
//! for a session token, and sends chat bodies through the same request
//! pipeline a host would use.
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use cpi::{CopilotInterceptor, EnvCredentialStore, HttpTransport, TomlSettingsStore};

mod commands;
mod display;

use display::TerminalNotifier;

#[derive(Parser, Debug)]
#[command(name = "cpi")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Environment variable holding the GitHub credential
    #[arg(long, global = true, default_value = EnvCredentialStore::DEFAULT_VARIABLE)]
    credential_env: String,

    /// Host origin that relative proxy paths resolve against
    #[arg(long, global = true, default_value = "http://127.0.0.1:8000")]
    origin: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show interceptor status
    Status,

    /// Exchange the credential for a session token
    Token {
        /// Print diagnostics afterwards
        #[arg(long)]
        verbose: bool,
    },

    /// Send a chat body through the interception pipeline
    Send {
        /// Host route to post to
        #[arg(long, default_value = "/api/backends/chat-completions/generate")]
        url: String,

        /// JSON body file, or - for stdin
        #[arg(long)]
        body: Option<PathBuf>,

        /// Print diagnostics afterwards
        #[arg(long)]
        verbose: bool,
    },

    /// Settings management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Show current settings
    Show,
    /// Set a setting
    Set {
        /// Setting name
        key: String,
        /// New value
        value: String,
    },
}

fn default_settings_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine config directory")?;
    Ok(base.join("cpi").join("settings.toml"))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let settings_path = match args.settings {
        Some(path) => path,
        None => default_settings_path()?,
    };
    log::debug!("Using settings at {}", settings_path.display());

    let transport = HttpTransport::new()?
        .with_origin(&args.origin)
        .with_context(|| format!("Invalid --origin '{}'", args.origin))?;

    let interceptor = CopilotInterceptor::builder(Arc::new(transport))
        .settings_store(Arc::new(TomlSettingsStore::new(settings_path)))
        .credential_store(Arc::new(EnvCredentialStore::new(args.credential_env)))
        .notifier(Arc::new(TerminalNotifier))
        .build();
    interceptor.start();

    match args.command {
        Command::Status => commands::status(&interceptor),
        Command::Token { verbose } => commands::token(&interceptor, verbose).await?,
        Command::Send { url, body, verbose } => {
            commands::send(&interceptor, url, body.as_deref(), verbose).await?;
        }
        Command::Config { command } => match command {
            ConfigCommand::Show => commands::config_show(&interceptor),
            ConfigCommand::Set { key, value } => commands::config_set(&interceptor, &key, &value)?,
        },
    }

    Ok(())
}
