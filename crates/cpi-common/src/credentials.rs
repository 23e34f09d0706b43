//! Read-only access to the long-lived provider credential.
//!
//! The credential is managed outside the interceptor. Absence is a normal
//! state: the interceptor passes requests through when no credential exists.

use secrecy::{ExposeSecret, SecretString};

/// Lookup of the long-lived credential.
pub trait CredentialStore: Send + Sync {
    /// Returns the credential, or `None` when none is stored.
    ///
    /// Implementations must treat an empty value as absent.
    fn credential(&self) -> Option<SecretString>;
}

fn non_empty(secret: SecretString) -> Option<SecretString> {
    if secret.expose_secret().trim().is_empty() {
        None
    } else {
        Some(secret)
    }
}

/// A credential fixed at construction time.
pub struct StaticCredentialStore {
    credential: Option<SecretString>,
}

impl StaticCredentialStore {
    /// Creates a store holding `credential`.
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            credential: non_empty(SecretString::new(credential.into().into())),
        }
    }

    /// Creates a store that never has a credential.
    #[must_use]
    pub const fn empty() -> Self {
        Self { credential: None }
    }
}

// Custom Debug implementation to avoid exposing the credential
impl std::fmt::Debug for StaticCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentialStore")
            .field(
                "credential",
                &self.credential.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl CredentialStore for StaticCredentialStore {
    fn credential(&self) -> Option<SecretString> {
        self.credential.clone()
    }
}

/// A credential read from an environment variable on every lookup.
#[derive(Debug, Clone)]
pub struct EnvCredentialStore {
    variable: String,
}

impl EnvCredentialStore {
    /// Default variable consulted by the command-line host.
    pub const DEFAULT_VARIABLE: &'static str = "CPI_GITHUB_TOKEN";

    /// Creates a store reading `variable`.
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }

    /// Name of the variable consulted.
    #[must_use]
    pub fn variable(&self) -> &str {
        &self.variable
    }
}

impl Default for EnvCredentialStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_VARIABLE)
    }
}

impl CredentialStore for EnvCredentialStore {
    fn credential(&self) -> Option<SecretString> {
        std::env::var(&self.variable)
            .ok()
            .and_then(|value| non_empty(SecretString::new(value.into())))
    }
}
