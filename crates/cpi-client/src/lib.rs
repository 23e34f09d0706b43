//! # cpi-client
//!
//! Request interception for routing a chat host's completion calls to GitHub
//! Copilot.
//!
//! The host's outbound calls go through a [`Pipeline`]. With a
//! [`CopilotGate`] installed, chat-generation calls whose custom endpoint
//! points at Copilot are rewritten into direct provider calls:
//! - a short-lived session token is exchanged for the stored credential
//! - client-identity headers are attached
//! - host-internal body fields are dropped
//! - the target is wrapped in the host's same-origin proxy route
//!
//! Every other call, and every call whose rewrite fails, reaches the host's
//! transport unchanged.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cpi_client::{
//!     CopilotGate, Diagnostics, HttpTransport, Pipeline, RequestTransformer, SessionContext,
//!     SystemClock, Transport,
//! };
//! use cpi_common::{
//!     EnvCredentialStore, LogNotificationSink, MemorySettingsStore, OutboundRequest,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let transport = Arc::new(HttpTransport::new()?.with_origin("http://127.0.0.1:8000")?);
//! let diagnostics = Arc::new(Diagnostics::new());
//! let session = Arc::new(SessionContext::new(
//!     transport.clone(),
//!     Arc::new(SystemClock),
//!     Arc::clone(&diagnostics),
//! ));
//!
//! let gate = CopilotGate::new(
//!     Arc::new(MemorySettingsStore::default()),
//!     Arc::new(EnvCredentialStore::default()),
//!     RequestTransformer::new(session, Arc::clone(&diagnostics)),
//!     Arc::clone(&diagnostics),
//!     Arc::new(LogNotificationSink),
//! );
//!
//! let pipeline = Pipeline::new(transport);
//! pipeline.install(Arc::new(gate));
//!
//! let request = OutboundRequest::builder()
//!     .url("/api/backends/chat-completions/generate")
//!     .method(reqwest::Method::POST)
//!     .body(r#"{"custom_url":"https://api.githubcopilot.com","messages":[]}"#)
//!     .build();
//! let response = pipeline.send(request).await?;
//! println!("{}", response.status);
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod diagnostics;
pub mod error;
pub mod gate;
pub mod identity;
pub mod pipeline;
pub mod session;
pub mod transform;
pub mod transport;

#[cfg(test)]
mod testing;

pub use context::SessionContext;
pub use diagnostics::{Diagnostics, LogEntry, LogLevel, MAX_ENTRIES, redact};
pub use error::ClientError;
pub use gate::{CopilotGate, GATE_NAME, is_target_url};
pub use identity::{DeviceIdentity, IdentityHeaderBuilder};
pub use pipeline::{Interceptor, Pipeline};
pub use session::{Clock, SessionToken, SessionTokenManager, SystemClock, TOKEN_URL};
pub use transform::{PROVIDER_BASE_URL, RequestTransformer, proxy_path};
pub use transport::{HttpTransport, Transport};
