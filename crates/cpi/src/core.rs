use std::sync::Arc;

use log::{debug, info};
use secrecy::SecretString;

use cpi_client::{CopilotGate, Diagnostics, GATE_NAME, Pipeline, SessionContext, Transport};
use cpi_common::{
    CredentialStore, DEFAULT_CHAT_VERSION, DEFAULT_EDITOR_VERSION, InterceptorSettings,
    NotificationLevel, NotificationSink, OutboundRequest, SettingsStore, TransportResponse,
};

use crate::builder::InterceptorBuilder;
use crate::error::CoreError;
use crate::status::InterceptorStatus;

/// The interceptor as the host sees it.
///
/// Owns the request pipeline and the Copilot gate, and applies user
/// settings changes: persisting them, installing or removing the gate, and
/// resetting the session when the declared identity changes.
pub struct CopilotInterceptor {
    pub(crate) settings: Arc<dyn SettingsStore>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) notifier: Arc<dyn NotificationSink>,
    pub(crate) diagnostics: Arc<Diagnostics>,
    pub(crate) session: Arc<SessionContext>,
    pub(crate) gate: Arc<CopilotGate>,
    pub(crate) pipeline: Pipeline,
}

impl std::fmt::Debug for CopilotInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopilotInterceptor")
            .field("pipeline", &self.pipeline)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl CopilotInterceptor {
    /// Starts building an interceptor over the host's un-intercepted transport.
    pub fn builder(transport: Arc<dyn Transport>) -> InterceptorBuilder {
        InterceptorBuilder::new(transport)
    }

    /// Installs the gate if the persisted settings enable it.
    pub fn start(&self) -> InterceptorStatus {
        if self.settings.load().enabled {
            self.install();
        }
        let status = self.status();
        info!("Copilot interceptor loaded: {status}");
        status
    }

    fn install(&self) -> bool {
        let gate: Arc<CopilotGate> = Arc::clone(&self.gate);
        self.pipeline.install(gate)
    }

    fn uninstall(&self) -> bool {
        self.pipeline.uninstall(GATE_NAME)
    }

    /// Current persisted settings.
    pub fn settings(&self) -> InterceptorSettings {
        self.settings.load()
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut InterceptorSettings),
    ) -> Result<InterceptorSettings, CoreError> {
        let mut settings = self.settings.load();
        apply(&mut settings);
        self.settings.save(&settings)?;
        debug!("Settings saved: {settings:?}");
        Ok(settings)
    }

    /// Flips the master switch.
    ///
    /// The gate is installed or removed immediately and the user is told.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be persisted.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), CoreError> {
        self.update(|s| s.enabled = enabled)?;
        if enabled {
            self.install();
            self.notifier
                .notify(NotificationLevel::Success, "[CPI] Interceptor enabled");
        } else {
            self.uninstall();
            self.notifier
                .notify(NotificationLevel::Info, "[CPI] Interceptor disabled");
        }
        Ok(())
    }

    /// Turns session token exchange and identity headers on or off.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be persisted.
    pub fn set_use_identity_headers(&self, on: bool) -> Result<(), CoreError> {
        self.update(|s| s.use_identity_headers = on).map(drop)
    }

    /// Turns prefill removal on or off.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be persisted.
    pub fn set_remove_trailing_assistant_messages(&self, on: bool) -> Result<(), CoreError> {
        self.update(|s| s.remove_trailing_assistant_messages = on)
            .map(drop)
    }

    /// Turns sending ambient host credentials on or off.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be persisted.
    pub fn set_include_ambient_credentials(&self, on: bool) -> Result<(), CoreError> {
        self.update(|s| s.include_ambient_credentials = on).map(drop)
    }

    /// Turns diagnostics retention on or off. Existing records are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be persisted.
    pub fn set_diagnostics_enabled(&self, on: bool) -> Result<(), CoreError> {
        self.update(|s| s.diagnostics_enabled = on)?;
        self.diagnostics.set_enabled(on);
        Ok(())
    }

    /// Sets the declared chat extension version and starts a new session.
    ///
    /// A blank value restores the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be persisted.
    pub fn set_chat_version(&self, version: &str) -> Result<(), CoreError> {
        let version = InterceptorSettings::normalize_version(version, DEFAULT_CHAT_VERSION);
        self.update(|s| s.chat_version = version)?;
        self.session.reset();
        Ok(())
    }

    /// Sets the declared editor version and starts a new session.
    ///
    /// A blank value restores the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be persisted.
    pub fn set_editor_version(&self, version: &str) -> Result<(), CoreError> {
        let version = InterceptorSettings::normalize_version(version, DEFAULT_EDITOR_VERSION);
        self.update(|s| s.editor_version = version)?;
        self.session.reset();
        Ok(())
    }

    /// Drops the session token and device identity.
    pub fn reset_session(&self) {
        self.session.reset();
        self.diagnostics.info("Session reset");
        self.notifier
            .notify(NotificationLevel::Info, "[CPI] Session reset");
    }

    /// Whether the gate is currently in the pipeline.
    pub fn is_active(&self) -> bool {
        self.pipeline.is_installed(GATE_NAME)
    }

    /// Overall state, as shown to the user.
    pub fn status(&self) -> InterceptorStatus {
        if !self.settings.load().enabled {
            InterceptorStatus::Disabled
        } else if self.credentials.credential().is_none() {
            InterceptorStatus::MissingCredential
        } else if self.is_active() {
            InterceptorStatus::Active
        } else {
            InterceptorStatus::NotInstalled
        }
    }

    /// Sends a host request through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the host transport fails.
    pub async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, CoreError> {
        Ok(self.pipeline.send(request).await?)
    }

    /// The diagnostics log shared by every component.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Session token and device identity state.
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// The stored long-lived credential, if any.
    pub fn credential(&self) -> Option<SecretString> {
        self.credentials.credential()
    }

    /// The host's request pipeline.
    pub const fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use cpi_client::HttpTransport;
    use cpi_common::{MemorySettingsStore, RecordingNotificationSink, StaticCredentialStore};
    use reqwest::Method;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        interceptor: CopilotInterceptor,
        settings: Arc<MemorySettingsStore>,
        notifier: Arc<RecordingNotificationSink>,
    }

    fn fixture(settings: InterceptorSettings, credential: StaticCredentialStore) -> Fixture {
        let settings = Arc::new(MemorySettingsStore::new(settings));
        let notifier = Arc::new(RecordingNotificationSink::default());
        let interceptor = CopilotInterceptor::builder(Arc::new(HttpTransport::new().unwrap()))
            .settings_store(settings.clone())
            .credential_store(Arc::new(credential))
            .notifier(notifier.clone())
            .build();
        Fixture {
            interceptor,
            settings,
            notifier,
        }
    }

    fn enabled_with_credential() -> Fixture {
        fixture(
            InterceptorSettings::default(),
            StaticCredentialStore::new("gho_cred"),
        )
    }

    #[test]
    fn test_status_order() {
        let disabled = fixture(
            InterceptorSettings {
                enabled: false,
                ..InterceptorSettings::default()
            },
            StaticCredentialStore::empty(),
        );
        disabled.interceptor.start();
        assert_eq!(disabled.interceptor.status(), InterceptorStatus::Disabled);

        let missing = fixture(InterceptorSettings::default(), StaticCredentialStore::empty());
        missing.interceptor.start();
        assert_eq!(
            missing.interceptor.status(),
            InterceptorStatus::MissingCredential
        );

        let ready = enabled_with_credential();
        assert_eq!(ready.interceptor.status(), InterceptorStatus::NotInstalled);
        assert_eq!(ready.interceptor.start(), InterceptorStatus::Active);
        assert!(ready.interceptor.status().is_active());
    }

    #[test]
    fn test_start_respects_persisted_switch() {
        let f = fixture(
            InterceptorSettings {
                enabled: false,
                ..InterceptorSettings::default()
            },
            StaticCredentialStore::new("gho_cred"),
        );
        f.interceptor.start();
        assert!(!f.interceptor.pipeline().is_installed(GATE_NAME));
    }

    #[test]
    fn test_set_enabled_installs_once_and_notifies() {
        let f = enabled_with_credential();
        f.interceptor.start();

        f.interceptor.set_enabled(true).unwrap();
        assert_eq!(f.interceptor.pipeline().stage_names(), vec![GATE_NAME]);

        f.interceptor.set_enabled(false).unwrap();
        assert!(!f.interceptor.is_active());
        assert!(!f.settings.load().enabled);
        assert_eq!(f.interceptor.status(), InterceptorStatus::Disabled);

        let levels: Vec<_> = f.notifier.entries().into_iter().map(|(l, _)| l).collect();
        assert_eq!(
            levels,
            vec![NotificationLevel::Success, NotificationLevel::Info]
        );
    }

    #[test]
    fn test_toggles_persist() {
        let f = enabled_with_credential();
        f.interceptor.set_use_identity_headers(false).unwrap();
        f.interceptor
            .set_remove_trailing_assistant_messages(true)
            .unwrap();
        f.interceptor.set_include_ambient_credentials(true).unwrap();
        f.interceptor.set_diagnostics_enabled(false).unwrap();

        let saved = f.settings.load();
        assert!(!saved.use_identity_headers);
        assert!(saved.remove_trailing_assistant_messages);
        assert!(saved.include_ambient_credentials);
        assert!(!saved.diagnostics_enabled);
        assert!(!f.interceptor.diagnostics().is_enabled());
    }

    #[test]
    fn test_version_change_resets_identity() {
        let f = enabled_with_credential();
        let before = f.interceptor.session().identity().device_identity();

        f.interceptor.set_chat_version("  0.27.0 ").unwrap();
        assert_eq!(f.settings.load().chat_version, "0.27.0");
        let after_chat = f.interceptor.session().identity().device_identity();
        assert_ne!(before, after_chat);

        f.interceptor.set_editor_version("").unwrap();
        assert_eq!(f.settings.load().editor_version, DEFAULT_EDITOR_VERSION);
        assert_ne!(
            after_chat,
            f.interceptor.session().identity().device_identity()
        );
    }

    #[test]
    fn test_reset_session_notifies() {
        let f = enabled_with_credential();
        f.interceptor.reset_session();

        let entries = f.notifier.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, NotificationLevel::Info);
    }

    #[tokio::test]
    async fn test_send_rewrites_through_host_proxy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/copilot_internal/v2/token"))
            .and(header("authorization", "Bearer gho_cred"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "tid=facade",
                "expires_at": 4_000_000_000_i64,
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex("^/proxy/https"))
            .and(header("authorization", "Bearer tid=facade"))
            .and(header("copilot-integration-id", "vscode-chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("data: [DONE]\n\n"))
            .expect(2)
            .mount(&server)
            .await;

        let transport = HttpTransport::new()
            .unwrap()
            .with_origin(&server.uri())
            .unwrap();
        let interceptor = CopilotInterceptor::builder(Arc::new(transport))
            .credential_store(Arc::new(StaticCredentialStore::new("gho_cred")))
            .token_url(format!("{}/copilot_internal/v2/token", server.uri()))
            .build();
        interceptor.start();

        let body = json!({
            "model": "gpt-4o",
            "custom_url": "https://api.githubcopilot.com",
            "messages": [{"role": "user", "content": "hi"}],
        })
        .to_string();

        for _ in 0..2 {
            let response = interceptor
                .send(
                    OutboundRequest::builder()
                        .url("/api/backends/chat-completions/generate")
                        .method(Method::POST)
                        .body(body.clone())
                        .build(),
                )
                .await
                .unwrap();
            assert_eq!(response.text().await.unwrap(), "data: [DONE]\n\n");
        }

        assert!(!interceptor.diagnostics().is_empty());
    }
}
