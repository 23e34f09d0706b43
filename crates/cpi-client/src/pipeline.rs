//! Ordered interception pipeline over a base transport.
//!
//! The host sends every outbound call through a [`Pipeline`]. Each installed
//! [`Interceptor`] pairs a predicate with a handler; the first stage whose
//! predicate matches handles the call and receives the base transport as
//! `next`. Calls no stage claims go straight to the base transport.
//! Installing or uninstalling a stage only changes pipeline membership; the
//! base transport itself is never replaced.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use cpi_common::{OutboundRequest, TransportResponse};

use crate::error::ClientError;
use crate::transport::Transport;

/// A pipeline stage.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Unique stage name; installation is idempotent per name.
    fn name(&self) -> &str;

    /// Whether this stage wants to handle `request`.
    fn matches(&self, request: &OutboundRequest) -> bool;

    /// Handles a matched request.
    ///
    /// `next` is the un-intercepted transport. Implementations that decide
    /// not to rewrite must forward the request to it unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error only if `next` does.
    async fn handle(
        &self,
        request: OutboundRequest,
        next: &dyn Transport,
    ) -> Result<TransportResponse, ClientError>;
}

/// The host's outbound request path.
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    stages: RwLock<Vec<Arc<dyn Interceptor>>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates an empty pipeline over `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            stages: RwLock::new(Vec::new()),
        }
    }

    /// The un-intercepted transport.
    pub fn base_transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Appends `stage` unless a stage with the same name is installed.
    ///
    /// Returns `true` if the stage was added.
    pub fn install(&self, stage: Arc<dyn Interceptor>) -> bool {
        let mut stages = self.stages.write().unwrap_or_else(PoisonError::into_inner);
        if stages.iter().any(|s| s.name() == stage.name()) {
            return false;
        }
        log::debug!("Installing interceptor '{}'", stage.name());
        stages.push(stage);
        true
    }

    /// Removes the stage called `name`.
    ///
    /// Returns `true` if a stage was removed.
    pub fn uninstall(&self, name: &str) -> bool {
        let mut stages = self.stages.write().unwrap_or_else(PoisonError::into_inner);
        let before = stages.len();
        stages.retain(|s| s.name() != name);
        let removed = stages.len() != before;
        if removed {
            log::debug!("Uninstalled interceptor '{name}'");
        }
        removed
    }

    /// Whether a stage called `name` is installed.
    pub fn is_installed(&self, name: &str) -> bool {
        self.stages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|s| s.name() == name)
    }

    /// Installed stage names, in order.
    pub fn stage_names(&self) -> Vec<String> {
        self.stages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    fn stage_for(&self, request: &OutboundRequest) -> Option<Arc<dyn Interceptor>> {
        self.stages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|s| s.matches(request))
            .cloned()
    }
}

#[async_trait]
impl Transport for Pipeline {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, ClientError> {
        match self.stage_for(&request) {
            Some(stage) => stage.handle(request, self.transport.as_ref()).await,
            None => self.transport.send(request).await,
        }
    }
}
