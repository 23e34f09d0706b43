//! Interceptor status as shown to the user.

use std::fmt;

/// Overall state of the interceptor.
///
/// Conditions are evaluated in declaration order; the first that holds wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptorStatus {
    /// The master switch is off.
    Disabled,
    /// Enabled, but no credential is stored.
    MissingCredential,
    /// Enabled and rewriting Copilot-bound requests.
    Active,
    /// Enabled with a credential, but the gate is not in the pipeline.
    NotInstalled,
}

impl InterceptorStatus {
    /// Whether requests are currently being rewritten.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for InterceptorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Disabled => "Disabled",
            Self::MissingCredential => "No credential stored; obtain a GitHub token first",
            Self::Active => "Active; rewriting Copilot requests",
            Self::NotInstalled => "Enabled, but the interceptor is not installed",
        };
        f.write_str(text)
    }
}
