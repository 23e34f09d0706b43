//! Error types for the interception core.

use thiserror::Error;

/// Errors that can occur while rewriting or forwarding a request.
///
/// None of these reach the host through the interception gate: the gate logs
/// them, notifies the user and falls back to the original request. They do
/// surface from [`Transport`](crate::Transport) implementations used directly.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Network or HTTP request failure.
    ///
    /// Indicates issues like DNS resolution, connection failures, or socket errors.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Middleware layer error.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),

    /// JSON serialization or deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Transport configuration issue, such as a relative URL with no origin.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The outgoing request cannot be rewritten.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A header name or value is not valid HTTP.
    #[error("Invalid header {name}: {reason}")]
    InvalidHeader {
        /// Header being set.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Unexpected or malformed response.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// No long-lived credential is available.
    #[error("No stored Copilot credential; sign in before sending requests")]
    MissingCredential,
}

impl ClientError {
    /// Check if this error came from the network rather than from rewriting.
    pub const fn is_network_error(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::MiddlewareError(_))
    }

    /// Check if this error is a missing credential.
    pub const fn is_missing_credential(&self) -> bool {
        matches!(self, Self::MissingCredential)
    }
}
