//! User-visible notifications.
//!
//! Notifications are fire-and-forget: the interceptor emits them and never
//! waits on or reacts to the sink. The host decides how to show them (toast,
//! status line, terminal).

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    /// Neutral information.
    Info,
    /// An action completed.
    Success,
    /// Something failed; the request fell back to the original path.
    Error,
}

/// Receiver of user-visible notifications.
pub trait NotificationSink: Send + Sync {
    /// Shows `message` to the user.
    fn notify(&self, level: NotificationLevel, message: &str);
}

/// Sink that forwards notifications to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn notify(&self, level: NotificationLevel, message: &str) {
        match level {
            NotificationLevel::Info | NotificationLevel::Success => log::info!("{message}"),
            NotificationLevel::Error => log::error!("{message}"),
        }
    }
}

/// Sink that keeps every notification, for hosts that poll and for tests.
#[derive(Debug, Default)]
pub struct RecordingNotificationSink {
    entries: Mutex<Vec<(NotificationLevel, String)>>,
}

impl RecordingNotificationSink {
    /// Notifications received so far, oldest first.
    pub fn entries(&self) -> Vec<(NotificationLevel, String)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl NotificationSink for RecordingNotificationSink {
    fn notify(&self, level: NotificationLevel, message: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, message.to_string()));
    }
}
