//! Rewriting of an intercepted chat-completion request.
//!
//! The host sends its chat-completion body to its own backend with a custom
//! endpoint field. The transformer turns that into a direct provider call:
//! provider headers and authentication, a body without host-internal fields,
//! and a target URL wrapped in the host's same-origin proxy route.

use std::sync::Arc;
use std::time::Instant;

use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};

use cpi_common::chat::content_preview;
use cpi_common::{
    CredentialsMode, InterceptorSettings, MessageRole, OutboundRequest, TransportResponse,
};

use crate::context::SessionContext;
use crate::diagnostics::Diagnostics;
use crate::error::ClientError;
use crate::identity::{COPILOT_INTEGRATION_ID, INTEGRATION_ID};
use crate::transport::Transport;

/// Provider API base.
pub const PROVIDER_BASE_URL: &str = "https://api.githubcopilot.com";

/// Chat completions path under the provider base.
pub const COMPLETIONS_PATH: &str = "chat/completions";

/// Host route that forwards to an encoded absolute URL.
pub const PROXY_PREFIX: &str = "/proxy/";

/// Body fields meaningful only to the host backend.
pub const INTERNAL_FIELDS: [&str; 4] = [
    "custom_url",
    "api_key_custom",
    "reverse_proxy",
    "proxy_password",
];

const PREFILL_PREVIEW_CHARS: usize = 50;

/// Wraps an absolute URL in the host's proxy route.
///
/// ```
/// use cpi_client::transform::proxy_path;
///
/// assert_eq!(
///     proxy_path("https://api.githubcopilot.com/chat/completions"),
///     "/proxy/https%3A%2F%2Fapi.githubcopilot.com%2Fchat%2Fcompletions"
/// );
/// ```
#[must_use]
pub fn proxy_path(target: &str) -> String {
    format!("{PROXY_PREFIX}{}", urlencoding::encode(target))
}

/// Removes host-internal fields and absent (`null`) fields from `body`.
pub fn sanitize(body: &mut Map<String, Value>) {
    for field in INTERNAL_FIELDS {
        body.remove(field);
    }
    body.retain(|_, value| !value.is_null());
}

fn bearer(token: &SecretString) -> Result<HeaderValue, ClientError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret())).map_err(
        |e| ClientError::InvalidHeader {
            name: AUTHORIZATION.to_string(),
            reason: e.to_string(),
        },
    )?;
    value.set_sensitive(true);
    Ok(value)
}

/// Rewrites intercepted chat-completion requests for the provider.
#[derive(Debug)]
pub struct RequestTransformer {
    session: Arc<SessionContext>,
    diagnostics: Arc<Diagnostics>,
    provider_base: String,
}

impl RequestTransformer {
    /// Creates a transformer drawing tokens and identity from `session`.
    pub fn new(session: Arc<SessionContext>, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            session,
            diagnostics,
            provider_base: PROVIDER_BASE_URL.to_string(),
        }
    }

    /// Overrides the provider base URL.
    #[must_use]
    pub fn with_provider_base(mut self, provider_base: impl Into<String>) -> Self {
        self.provider_base = provider_base.into();
        self
    }

    /// Absolute provider completions URL.
    #[must_use]
    pub fn target_url(&self) -> String {
        format!(
            "{}/{COMPLETIONS_PATH}",
            self.provider_base.trim_end_matches('/')
        )
    }

    /// Builds the provider headers.
    ///
    /// With identity headers on, the credential is exchanged for a session
    /// token (falling back to the credential itself) and the full identity
    /// set is added. Otherwise the credential is the bearer and only the
    /// integration id is declared.
    ///
    /// # Errors
    ///
    /// Returns an error if a header value is not valid HTTP.
    pub async fn build_headers(
        &self,
        credential: &SecretString,
        settings: &InterceptorSettings,
    ) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        if settings.use_identity_headers {
            let session_token = self.session.tokens().get_token(credential).await;
            if session_token.is_none() {
                self.diagnostics
                    .warn("No session token; authenticating with the stored credential");
            }
            headers.insert(
                AUTHORIZATION,
                bearer(session_token.as_ref().unwrap_or(credential))?,
            );
            headers.extend(self.session.identity().build(settings)?);
        } else {
            headers.insert(AUTHORIZATION, bearer(credential)?);
            headers.insert(
                COPILOT_INTEGRATION_ID,
                HeaderValue::from_static(INTEGRATION_ID),
            );
        }

        Ok(headers)
    }

    /// Drops trailing assistant messages while more than one message remains.
    ///
    /// Returns the number of messages removed.
    pub fn strip_trailing_assistant(&self, body: &mut Map<String, Value>) -> usize {
        let Some(Value::Array(messages)) = body.get_mut("messages") else {
            return 0;
        };

        let mut removed = 0;
        while messages.len() > 1
            && messages
                .last()
                .and_then(MessageRole::of)
                .is_some_and(|role| role == MessageRole::Assistant)
        {
            if let Some(message) = messages.pop() {
                self.diagnostics.info(format!(
                    "Removed trailing assistant message: \"{}\"",
                    content_preview(&message, PREFILL_PREVIEW_CHARS)
                ));
                removed += 1;
            }
        }
        removed
    }

    /// Builds the rewritten request without sending it.
    ///
    /// # Errors
    ///
    /// Returns an error if the headers cannot be built or the body cannot be
    /// serialized.
    pub async fn prepare(
        &self,
        mut body: Map<String, Value>,
        credential: &SecretString,
        settings: &InterceptorSettings,
    ) -> Result<OutboundRequest, ClientError> {
        let headers = self.build_headers(credential, settings).await?;

        sanitize(&mut body);
        if settings.remove_trailing_assistant_messages {
            self.strip_trailing_assistant(&mut body);
        }

        let target = self.target_url();
        self.diagnostics.info(format!(
            "Forwarding to {target} (model: {})",
            body.get("model").and_then(Value::as_str).unwrap_or("unknown")
        ));

        Ok(OutboundRequest::builder()
            .url(proxy_path(&target))
            .method(Method::POST)
            .headers(headers)
            .body(serde_json::to_string(&body)?)
            .credentials(CredentialsMode::from_include(
                settings.include_ambient_credentials,
            ))
            .build())
    }

    /// Rewrites `body` and sends it through `transport`.
    ///
    /// A non-success status is logged together with the response body and
    /// the response is returned unchanged, so the host can show its own
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error if rewriting fails or the transport yields no
    /// response.
    pub async fn transform(
        &self,
        body: Map<String, Value>,
        credential: &SecretString,
        settings: &InterceptorSettings,
        transport: &dyn Transport,
    ) -> Result<TransportResponse, ClientError> {
        let request = self.prepare(body, credential, settings).await?;
        self.diagnostics.request(&request);

        let started = Instant::now();
        let mut response = transport.send(request).await?;
        let elapsed = started.elapsed();
        let status = response.status;

        if response.is_success() {
            self.diagnostics.response(status, elapsed, None);
            return Ok(response);
        }

        match response.buffer().await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                self.diagnostics.response(status, elapsed, Some(&text));
                self.diagnostics
                    .error(format!("Provider returned {}", status.as_u16()));
            }
            Err(e) => self.diagnostics.error(format!(
                "Provider returned {}; body unreadable: {e}",
                status.as_u16()
            )),
        }

        Ok(response)
    }
}
