use std::sync::Arc;

use cpi_client::{
    Clock, CopilotGate, Diagnostics, MAX_ENTRIES, Pipeline, RequestTransformer, SessionContext,
    SystemClock, Transport,
};
use cpi_common::{
    CredentialStore, EnvCredentialStore, LogNotificationSink, MemorySettingsStore,
    NotificationSink, SettingsStore,
};

use crate::core::CopilotInterceptor;

/// Builder for a [`CopilotInterceptor`] over a host transport
///
/// # Example
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use cpi::{CopilotInterceptor, HttpTransport, TomlSettingsStore};
/// # fn example() -> anyhow::Result<()> {
/// let transport = HttpTransport::new()?.with_origin("http://127.0.0.1:8000")?;
///
/// let interceptor = CopilotInterceptor::builder(Arc::new(transport))
///     .settings_store(Arc::new(TomlSettingsStore::new("cpi.toml")))
///     .diagnostics_capacity(50)
///     .build();
/// interceptor.start();
/// # Ok(())
/// # }
/// ```
pub struct InterceptorBuilder {
    transport: Arc<dyn Transport>,
    settings: Arc<dyn SettingsStore>,
    credentials: Arc<dyn CredentialStore>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    token_url: Option<String>,
    provider_base: Option<String>,
    diagnostics_capacity: usize,
}

impl InterceptorBuilder {
    /// Create a builder over the host's un-intercepted transport
    ///
    /// Settings live in memory, the credential is read from the
    /// environment and notifications go to the log until overridden.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            settings: Arc::new(MemorySettingsStore::default()),
            credentials: Arc::new(EnvCredentialStore::default()),
            notifier: Arc::new(LogNotificationSink),
            clock: Arc::new(SystemClock),
            token_url: None,
            provider_base: None,
            diagnostics_capacity: MAX_ENTRIES,
        }
    }

    /// Set where settings are loaded from and persisted to
    #[must_use]
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings = store;
        self
    }

    /// Set where the long-lived credential is read from
    #[must_use]
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = store;
        self
    }

    /// Set the receiver of user-visible notifications
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Set the clock used for token expiry and session ids
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override the session token endpoint
    #[must_use]
    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    /// Override the provider API base
    #[must_use]
    pub fn provider_base(mut self, url: impl Into<String>) -> Self {
        self.provider_base = Some(url.into());
        self
    }

    /// Set how many diagnostics records are retained
    #[must_use]
    pub const fn diagnostics_capacity(mut self, capacity: usize) -> Self {
        self.diagnostics_capacity = capacity;
        self
    }

    /// Build the interceptor
    ///
    /// The gate is created but not installed; call
    /// [`CopilotInterceptor::start`] to honour the persisted switch.
    pub fn build(self) -> CopilotInterceptor {
        let diagnostics = Arc::new(Diagnostics::with_capacity(self.diagnostics_capacity));
        diagnostics.set_enabled(self.settings.load().diagnostics_enabled);

        let mut session = SessionContext::new(
            Arc::clone(&self.transport),
            self.clock,
            Arc::clone(&diagnostics),
        );
        if let Some(url) = self.token_url {
            session = session.with_token_url(url);
        }
        let session = Arc::new(session);

        let mut transformer = RequestTransformer::new(Arc::clone(&session), Arc::clone(&diagnostics));
        if let Some(base) = self.provider_base {
            transformer = transformer.with_provider_base(base);
        }

        let gate = Arc::new(CopilotGate::new(
            Arc::clone(&self.settings),
            Arc::clone(&self.credentials),
            transformer,
            Arc::clone(&diagnostics),
            Arc::clone(&self.notifier),
        ));

        CopilotInterceptor {
            settings: self.settings,
            credentials: self.credentials,
            notifier: self.notifier,
            diagnostics,
            session,
            gate,
            pipeline: Pipeline::new(self.transport),
        }
    }
}
