//! Chat-completion message helpers.
//!
//! The interceptor never owns a conversation; it edits the `messages` array
//! of a request body in place. These helpers read roles and content out of
//! that untyped JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a chat-completion message.
///
/// ```
/// use cpi_common::chat::MessageRole;
///
/// let role: MessageRole = serde_json::from_str("\"assistant\"").unwrap();
/// assert_eq!(role, MessageRole::Assistant);
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum MessageRole {
    /// System-level instructions.
    System,
    /// Developer instructions (newer OpenAI-style APIs).
    Developer,
    /// End-user input.
    User,
    /// Model-authored output, including prefill.
    Assistant,
    /// Tool results.
    Tool,
}

impl MessageRole {
    /// Reads the `role` field of a JSON message.
    ///
    /// Returns `None` when the field is missing or not a known role.
    #[must_use]
    pub fn of(message: &Value) -> Option<Self> {
        message
            .get("role")
            .and_then(|role| Self::deserialize(role).ok())
    }
}

/// Returns at most `max_chars` characters of a message's content.
///
/// String content is used as-is; structured content (content parts) is
/// rendered as compact JSON first.
#[must_use]
pub fn content_preview(message: &Value, max_chars: usize) -> String {
    let content = match message.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    content.chars().take(max_chars).collect()
}
