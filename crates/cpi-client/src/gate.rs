//! Interception gate for Copilot-bound chat-completion calls.
//!
//! The gate claims the host's chat-generation calls and decides, per call,
//! whether to rewrite it. Every branch forwards something: either the
//! original call untouched or the rewritten one. A rewrite that fails is
//! logged, reported to the user and replaced by the original call.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use cpi_common::{
    CredentialStore, NotificationLevel, NotificationSink, OutboundRequest, SettingsStore,
    TransportResponse,
};

use crate::diagnostics::Diagnostics;
use crate::error::ClientError;
use crate::pipeline::Interceptor;
use crate::transform::RequestTransformer;
use crate::transport::Transport;

/// Pipeline name of the gate.
pub const GATE_NAME: &str = "copilot";

/// Host chat-generation routes the gate inspects.
pub const TARGET_PATHS: [&str; 2] = [
    "/api/backends/chat-completions/generate",
    "/api/backends/custom/generate",
];

/// Body field holding the host's custom endpoint.
pub const CUSTOM_URL_FIELD: &str = "custom_url";

/// Domain identifying provider-bound calls.
pub const PROVIDER_DOMAIN: &str = "githubcopilot.com";

/// Whether `url` is one of the host's chat-generation routes.
#[must_use]
pub fn is_target_url(url: &str) -> bool {
    TARGET_PATHS.iter().any(|path| url.contains(path))
}

/// Parses the request body as a JSON object. A missing body is `{}`.
fn parse_body(request: &OutboundRequest) -> Option<Map<String, Value>> {
    let text = request.body.as_deref().unwrap_or("{}");
    serde_json::from_str(text).ok()
}

/// Whether the body's custom endpoint points at the provider.
fn targets_provider(body: &Map<String, Value>) -> bool {
    body.get(CUSTOM_URL_FIELD)
        .and_then(Value::as_str)
        .is_some_and(|url| url.contains(PROVIDER_DOMAIN))
}

/// Decides per call whether to rewrite, and falls back on failure.
pub struct CopilotGate {
    settings: Arc<dyn SettingsStore>,
    credentials: Arc<dyn CredentialStore>,
    transformer: RequestTransformer,
    diagnostics: Arc<Diagnostics>,
    notifier: Arc<dyn NotificationSink>,
}

impl std::fmt::Debug for CopilotGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopilotGate")
            .field("transformer", &self.transformer)
            .finish_non_exhaustive()
    }
}

impl CopilotGate {
    /// Creates a gate.
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        credentials: Arc<dyn CredentialStore>,
        transformer: RequestTransformer,
        diagnostics: Arc<Diagnostics>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            settings,
            credentials,
            transformer,
            diagnostics,
            notifier,
        }
    }

    /// The transformer used for rewrites.
    pub const fn transformer(&self) -> &RequestTransformer {
        &self.transformer
    }
}

#[async_trait]
impl Interceptor for CopilotGate {
    fn name(&self) -> &str {
        GATE_NAME
    }

    fn matches(&self, request: &OutboundRequest) -> bool {
        is_target_url(&request.url)
    }

    async fn handle(
        &self,
        request: OutboundRequest,
        next: &dyn Transport,
    ) -> Result<TransportResponse, ClientError> {
        let settings = self.settings.load();
        self.diagnostics.set_enabled(settings.diagnostics_enabled);

        if !settings.enabled || !is_target_url(&request.url) {
            return next.send(request).await;
        }

        let Some(body) = parse_body(&request) else {
            log::debug!("Body of {} is not a JSON object; passing through", request.url);
            return next.send(request).await;
        };

        if !targets_provider(&body) {
            return next.send(request).await;
        }

        let Some(credential) = self.credentials.credential() else {
            self.diagnostics
                .warn("No stored credential; forwarding the original request");
            return next.send(request).await;
        };

        self.diagnostics
            .info(format!("Intercepting Copilot request to {}", request.url));

        match self
            .transformer
            .transform(body, &credential, &settings, next)
            .await
        {
            Ok(response) => Ok(response),
            Err(e) => {
                self.diagnostics.error(format!(
                    "Interception failed, forwarding the original request: {e}"
                ));
                self.notifier
                    .notify(NotificationLevel::Error, &format!("[CPI] {e}"));
                next.send(request).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::context::SessionContext;
    use crate::pipeline::Pipeline;
    use crate::session::tests::ManualClock;
    use crate::testing::RecordingTransport;
    use cpi_common::{
        InterceptorSettings, MemorySettingsStore, RecordingNotificationSink, StaticCredentialStore,
    };
    use reqwest::Method;
    use reqwest::header::{HeaderMap, HeaderValue};
    use secrecy::ExposeSecret;
    use serde_json::json;

    const CHAT_URL: &str = "http://127.0.0.1:8000/api/backends/chat-completions/generate";
    const TOKEN_URL: &str = "https://token.test/copilot_internal/v2/token";
    const PROXIED: &str = "/proxy/https%3A%2F%2Fapi.githubcopilot.com%2Fchat%2Fcompletions";

    struct Harness {
        pipeline: Pipeline,
        base: Arc<RecordingTransport>,
        notifier: Arc<RecordingNotificationSink>,
        diagnostics: Arc<Diagnostics>,
    }

    fn harness(
        base: Arc<RecordingTransport>,
        settings: InterceptorSettings,
        credential: StaticCredentialStore,
    ) -> Harness {
        let diagnostics = Arc::new(Diagnostics::new());
        let notifier = Arc::new(RecordingNotificationSink::default());
        let session = SessionContext::new(
            base.clone(),
            Arc::new(ManualClock::at(1_700_000_000_000)),
            Arc::clone(&diagnostics),
        )
        .with_token_url(TOKEN_URL);
        let transformer = RequestTransformer::new(Arc::new(session), Arc::clone(&diagnostics));
        let gate = CopilotGate::new(
            Arc::new(MemorySettingsStore::new(settings)),
            Arc::new(credential),
            transformer,
            Arc::clone(&diagnostics),
            notifier.clone(),
        );

        let pipeline = Pipeline::new(base.clone());
        pipeline.install(Arc::new(gate));

        Harness {
            pipeline,
            base,
            notifier,
            diagnostics,
        }
    }

    fn copilot_request(url: &str, body: &str) -> OutboundRequest {
        let mut headers = HeaderMap::new();
        headers.insert("x-csrf-token", HeaderValue::from_static("csrf-123"));
        OutboundRequest::builder()
            .url(url)
            .method(Method::POST)
            .headers(headers)
            .body(body)
            .build()
    }

    fn copilot_body() -> String {
        json!({
            "model": "gpt-4o",
            "custom_url": "https://api.githubcopilot.com",
            "messages": [{"role": "user", "content": "hello"}],
        })
        .to_string()
    }

    fn assert_untouched(sent: &OutboundRequest, original: &OutboundRequest) {
        assert_eq!(sent.url, original.url);
        assert_eq!(sent.method, original.method);
        assert_eq!(sent.headers, original.headers);
        assert_eq!(sent.body, original.body);
        assert_eq!(sent.credentials, original.credentials);
    }

    #[test]
    fn test_target_url_classification() {
        assert!(is_target_url(CHAT_URL));
        assert!(is_target_url("/api/backends/custom/generate"));
        assert!(!is_target_url("/api/backends/text-completions/generate"));
        assert!(!is_target_url("https://api.githubcopilot.com/chat/completions"));
    }

    #[tokio::test]
    async fn test_non_target_url_passes_through_unmodified() {
        let h = harness(
            RecordingTransport::ok("host"),
            InterceptorSettings::default(),
            StaticCredentialStore::new("gho_cred"),
        );
        let original = copilot_request("/api/characters/all", &copilot_body());

        h.pipeline.send(original.clone()).await.unwrap();

        let sent = h.base.recorded();
        assert_eq!(sent.len(), 1);
        assert_untouched(&sent[0], &original);
    }

    #[tokio::test]
    async fn test_disabled_passes_through() {
        let h = harness(
            RecordingTransport::ok("host"),
            InterceptorSettings {
                enabled: false,
                ..InterceptorSettings::default()
            },
            StaticCredentialStore::new("gho_cred"),
        );
        let original = copilot_request(CHAT_URL, &copilot_body());

        h.pipeline.send(original.clone()).await.unwrap();

        let sent = h.base.recorded();
        assert_eq!(sent.len(), 1);
        assert_untouched(&sent[0], &original);
    }

    #[tokio::test]
    async fn test_invalid_json_passes_through() {
        let h = harness(
            RecordingTransport::ok("host"),
            InterceptorSettings::default(),
            StaticCredentialStore::new("gho_cred"),
        );
        let original = copilot_request(CHAT_URL, "{not json");

        h.pipeline.send(original.clone()).await.unwrap();

        let sent = h.base.recorded();
        assert_eq!(sent.len(), 1);
        assert_untouched(&sent[0], &original);
        assert!(h.notifier.entries().is_empty());
    }

    #[tokio::test]
    async fn test_other_provider_passes_through() {
        let h = harness(
            RecordingTransport::ok("host"),
            InterceptorSettings::default(),
            StaticCredentialStore::new("gho_cred"),
        );
        let body = json!({"model": "gpt-4o", "custom_url": "https://api.openai.com/v1"});
        let original = copilot_request(CHAT_URL, &body.to_string());

        h.pipeline.send(original.clone()).await.unwrap();

        assert_untouched(&h.base.recorded()[0], &original);
    }

    #[tokio::test]
    async fn test_missing_credential_warns_and_passes_through() {
        let h = harness(
            RecordingTransport::ok("host"),
            InterceptorSettings::default(),
            StaticCredentialStore::empty(),
        );
        let original = copilot_request(CHAT_URL, &copilot_body());

        h.pipeline.send(original.clone()).await.unwrap();

        let sent = h.base.recorded();
        assert_eq!(sent.len(), 1);
        assert_untouched(&sent[0], &original);
        assert!(
            h.diagnostics
                .snapshot()
                .iter()
                .any(|e| e.level == crate::diagnostics::LogLevel::Warn)
        );
    }

    #[tokio::test]
    async fn test_end_to_end_rewrite() {
        let h = harness(
            RecordingTransport::ok(r#"{"token":"tid=e2e","expires_at":4000000000}"#),
            InterceptorSettings::default(),
            StaticCredentialStore::new("gho_cred"),
        );
        let original = copilot_request(CHAT_URL, &copilot_body());

        let response = h.pipeline.send(original).await.unwrap();
        assert!(response.is_success());

        let sent = h.base.recorded();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].url, TOKEN_URL);

        let forwarded = &sent[1];
        assert_eq!(forwarded.url, PROXIED);
        assert_eq!(forwarded.method, Method::POST);
        assert_eq!(forwarded.headers["authorization"], "Bearer tid=e2e");
        assert_eq!(forwarded.headers["copilot-integration-id"], "vscode-chat");
        assert!(!forwarded.headers.contains_key("x-csrf-token"));

        let body: Value = serde_json::from_str(forwarded.body.as_deref().unwrap()).unwrap();
        assert!(body.get("custom_url").is_none());
        assert_eq!(body["model"], "gpt-4o");
    }

    #[tokio::test]
    async fn test_custom_route_is_intercepted() {
        let h = harness(
            RecordingTransport::ok("{}"),
            InterceptorSettings {
                use_identity_headers: false,
                ..InterceptorSettings::default()
            },
            StaticCredentialStore::new("gho_cred"),
        );

        h.pipeline
            .send(copilot_request(
                "/api/backends/custom/generate",
                &copilot_body(),
            ))
            .await
            .unwrap();

        let sent = h.base.recorded();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, PROXIED);
        assert_eq!(sent[0].headers["authorization"], "Bearer gho_cred");
    }

    #[tokio::test]
    async fn test_forward_failure_falls_back_to_original() {
        let h = harness(
            RecordingTransport::failing_for(PROXIED),
            InterceptorSettings {
                use_identity_headers: false,
                ..InterceptorSettings::default()
            },
            StaticCredentialStore::new("gho_cred"),
        );
        let original = copilot_request(CHAT_URL, &copilot_body());

        let response = h.pipeline.send(original.clone()).await.unwrap();
        assert_eq!(response.text().await.unwrap(), "original");

        let sent = h.base.recorded();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].url, PROXIED);
        assert_untouched(&sent[1], &original);

        let notifications = h.notifier.entries();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].0, NotificationLevel::Error);
        assert!(notifications[0].1.starts_with("[CPI]"));
    }

    #[tokio::test]
    async fn test_uninstalled_gate_passes_everything() {
        let h = harness(
            RecordingTransport::ok("host"),
            InterceptorSettings::default(),
            StaticCredentialStore::new("gho_cred"),
        );
        assert!(h.pipeline.uninstall(GATE_NAME));
        let original = copilot_request(CHAT_URL, &copilot_body());

        h.pipeline.send(original.clone()).await.unwrap();

        assert_untouched(&h.base.recorded()[0], &original);
    }

    #[tokio::test]
    async fn test_reset_mid_flight_keeps_fetched_token() {
        let base = RecordingTransport::ok(r#"{"token":"tid=flight","expires_at":4000000000}"#);
        let diagnostics = Arc::new(Diagnostics::new());
        let session = Arc::new(
            SessionContext::new(
                base.clone(),
                Arc::new(ManualClock::at(1_700_000_000_000)),
                Arc::clone(&diagnostics),
            )
            .with_token_url(TOKEN_URL),
        );
        let transformer = RequestTransformer::new(Arc::clone(&session), diagnostics);

        let request = transformer
            .prepare(
                Map::new(),
                &secrecy::SecretString::new("gho_cred".into()),
                &InterceptorSettings::default(),
            )
            .await
            .unwrap();
        session.reset();

        assert_eq!(request.headers["authorization"], "Bearer tid=flight");
        assert!(session.tokens().cached_token().is_none());
        assert!(
            session
                .tokens()
                .get_token(&secrecy::SecretString::new("gho_cred".into()))
                .await
                .is_some_and(|t| t.expose_secret() == "tid=flight")
        );
    }
}
