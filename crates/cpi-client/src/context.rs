//! Per-process session state.

use std::sync::Arc;

use crate::diagnostics::Diagnostics;
use crate::identity::IdentityHeaderBuilder;
use crate::session::{Clock, SessionTokenManager};
use crate::transport::Transport;

/// Owns the cached session token and the device identity.
///
/// Both belong to the same reset epoch: the provider ties session tokens to
/// the declared client identity, so they are always cleared together.
/// A reset does not affect requests that already hold a token.
#[derive(Debug)]
pub struct SessionContext {
    tokens: SessionTokenManager,
    identity: IdentityHeaderBuilder,
}

impl SessionContext {
    /// Creates an empty context issuing tokens through `transport`.
    pub fn new(
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            tokens: SessionTokenManager::new(transport, Arc::clone(&clock), diagnostics),
            identity: IdentityHeaderBuilder::new(clock),
        }
    }

    /// Overrides the token endpoint.
    #[must_use]
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.tokens = self.tokens.with_token_url(token_url);
        self
    }

    /// Session token manager.
    pub const fn tokens(&self) -> &SessionTokenManager {
        &self.tokens
    }

    /// Identity header builder.
    pub const fn identity(&self) -> &IdentityHeaderBuilder {
        &self.identity
    }

    /// Clears the session token and the device identity.
    pub fn reset(&self) {
        self.tokens.reset();
        self.identity.reset();
    }
}
