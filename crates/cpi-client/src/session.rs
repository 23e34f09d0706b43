//! Session token exchange and caching.
//!
//! The provider does not accept the long-lived credential for chat
//! completions when the client declares a first-party identity. Instead the
//! credential is exchanged for a short-lived session token at the internal
//! token endpoint, and that token is reused until shortly before it expires.
//!
//! Failures never propagate: [`SessionTokenManager::get_token`] returns
//! `None` and the caller falls back to the long-lived credential.
//!
//! Overlapping calls with a stale cache may each issue a token. The last one
//! stored wins; every issued token is valid, so this is not a correctness
//! problem and no single-flight guard is used.

use std::sync::{Arc, Mutex, PoisonError};

use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use cpi_common::{CredentialsMode, OutboundRequest};

use crate::diagnostics::Diagnostics;
use crate::error::ClientError;
use crate::transport::Transport;

/// Internal token issuance endpoint.
pub const TOKEN_URL: &str = "https://api.github.com/copilot_internal/v2/token";

/// A cached token is not reused within this many milliseconds of expiry.
pub const EXPIRY_SKEW_MS: i64 = 60_000;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A short-lived session token.
#[derive(Clone)]
pub struct SessionToken {
    value: SecretString,
    expires_at_ms: i64,
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &"[REDACTED]")
            .field("expires_at_ms", &self.expires_at_ms)
            .finish()
    }
}

impl SessionToken {
    /// Creates a token expiring at `expires_at_ms` (epoch milliseconds).
    #[must_use]
    pub const fn new(value: SecretString, expires_at_ms: i64) -> Self {
        Self {
            value,
            expires_at_ms,
        }
    }

    /// The bearer value.
    #[must_use]
    pub const fn value(&self) -> &SecretString {
        &self.value
    }

    /// Expiry in epoch milliseconds.
    #[must_use]
    pub const fn expires_at_ms(&self) -> i64 {
        self.expires_at_ms
    }

    /// Whether the token may still be used at `now_ms`.
    #[must_use]
    pub const fn is_usable_at(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at_ms - EXPIRY_SKEW_MS
    }
}

/// Body returned by the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    /// Epoch seconds.
    #[serde(default)]
    expires_at: Option<i64>,
}

/// Exchanges the long-lived credential for session tokens and caches them.
pub struct SessionTokenManager {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    diagnostics: Arc<Diagnostics>,
    token_url: String,
    cached: Mutex<Option<SessionToken>>,
}

impl std::fmt::Debug for SessionTokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokenManager")
            .field("token_url", &self.token_url)
            .field("cached", &self.cached_token())
            .finish_non_exhaustive()
    }
}

impl SessionTokenManager {
    /// Creates a manager issuing tokens through `transport`.
    ///
    /// `transport` must be the un-intercepted transport.
    pub fn new(
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            transport,
            clock,
            diagnostics,
            token_url: TOKEN_URL.to_string(),
            cached: Mutex::new(None),
        }
    }

    /// Overrides the token endpoint.
    #[must_use]
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// The cached token, if any, regardless of freshness.
    pub fn cached_token(&self) -> Option<SessionToken> {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forgets the cached token.
    pub fn reset(&self) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Returns a usable session token, issuing a new one if needed.
    ///
    /// Returns `None` when issuance fails for any reason; the failure is
    /// logged and the caller should use `credential` directly.
    pub async fn get_token(&self, credential: &SecretString) -> Option<SecretString> {
        if credential.expose_secret().is_empty() {
            return None;
        }

        let now = self.clock.now_millis();
        if let Some(token) = self.cached_token()
            && token.is_usable_at(now)
        {
            return Some(token.value);
        }

        match self.issue(credential).await {
            Ok(token) => {
                self.diagnostics.info(format!(
                    "Session token issued, expires at {}",
                    chrono::DateTime::from_timestamp_millis(token.expires_at_ms)
                        .map_or_else(|| token.expires_at_ms.to_string(), |t| t.to_rfc3339())
                ));
                let value = token.value.clone();
                *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
                Some(value)
            }
            Err(e) => {
                self.diagnostics
                    .error(format!("Session token issuance failed: {e}"));
                None
            }
        }
    }

    async fn issue(&self, credential: &SecretString) -> Result<SessionToken, ClientError> {
        let mut authorization =
            HeaderValue::from_str(&format!("Bearer {}", credential.expose_secret())).map_err(
                |e| ClientError::InvalidHeader {
                    name: AUTHORIZATION.to_string(),
                    reason: e.to_string(),
                },
            )?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, authorization);

        let request = OutboundRequest::builder()
            .url(self.token_url.clone())
            .method(Method::GET)
            .headers(headers)
            .credentials(CredentialsMode::Omit)
            .build();

        let response = self.transport.send(request).await?;
        let status = response.status;
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("unreadable token response: {e}")))?;

        if !status.is_success() {
            return Err(ClientError::InvalidResponse(format!(
                "token endpoint returned {}",
                status.as_u16()
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)?;
        match (parsed.token, parsed.expires_at) {
            (Some(token), Some(expires_at)) if !token.is_empty() && expires_at > 0 => {
                let expires_at_ms = expires_at.checked_mul(1000).ok_or_else(|| {
                    ClientError::InvalidResponse(format!(
                        "token expiry {expires_at} is out of range"
                    ))
                })?;
                Ok(SessionToken::new(
                    SecretString::new(token.into()),
                    expires_at_ms,
                ))
            }
            _ => Err(ClientError::InvalidResponse(
                "token response is missing token or expires_at".to_string(),
            )),
        }
    }
}
