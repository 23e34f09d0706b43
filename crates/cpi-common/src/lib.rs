//! # cpi-common
//!
//! Shared types for the Copilot interceptor.
//!
//! This crate holds everything the interception core exchanges with its host:
//! - Settings and their persistence ([`SettingsStore`])
//! - The long-lived credential lookup ([`CredentialStore`])
//! - Outbound request and transport response values
//! - User-visible notifications ([`NotificationSink`])
//!
//! ## Example
//!
//! ```
//! use cpi_common::{InterceptorSettings, MemorySettingsStore, SettingsStore};
//!
//! let store = MemorySettingsStore::default();
//! let mut settings = store.load();
//! settings.remove_trailing_assistant_messages = true;
//! store.save(&settings).unwrap();
//!
//! assert!(store.load().remove_trailing_assistant_messages);
//! assert_eq!(store.load().chat_version, "0.26.4");
//! ```

/// Chat-completion message helpers.
pub mod chat;
/// Long-lived credential lookup.
pub mod credentials;
/// User-visible notifications.
pub mod events;
/// Transport request and response values.
pub mod http;
/// Interceptor settings and persistence.
pub mod settings;

pub use chat::MessageRole;
pub use credentials::{CredentialStore, EnvCredentialStore, StaticCredentialStore};
pub use events::{
    LogNotificationSink, NotificationLevel, NotificationSink, RecordingNotificationSink,
};
pub use http::{ByteStream, CredentialsMode, OutboundRequest, ResponseBody, TransportResponse};
pub use settings::{
    DEFAULT_CHAT_VERSION, DEFAULT_EDITOR_VERSION, InterceptorSettings, MemorySettingsStore,
    SettingsError, SettingsStore, TomlSettingsStore,
};
