//! # cpi
//!
//! Copilot interceptor for chat hosts.
//!
//! A chat host that talks to GitHub Copilot through its generic custom
//! endpoint gets rejected: Copilot expects a session token and the headers
//! of its first-party editor client. `cpi` sits in the host's outbound
//! request path and rewrites those calls into direct provider calls, leaving
//! everything else untouched.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cpi::{CopilotInterceptor, HttpTransport, OutboundRequest, StaticCredentialStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let transport = HttpTransport::new()?.with_origin("http://127.0.0.1:8000")?;
//! let interceptor = CopilotInterceptor::builder(Arc::new(transport))
//!     .credential_store(Arc::new(StaticCredentialStore::new("gho_...")))
//!     .build();
//!
//! println!("{}", interceptor.start());
//!
//! let request = OutboundRequest::builder()
//!     .url("/api/backends/chat-completions/generate")
//!     .method(reqwest::Method::POST)
//!     .body(r#"{"custom_url":"https://api.githubcopilot.com","messages":[]}"#)
//!     .build();
//! let response = interceptor.send(request).await?;
//! println!("{}", response.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Session tokens**: credential exchange with expiry-aware caching
//! - **Client identity**: stable per-session device ids and per-request correlation ids
//! - **Body cleanup**: host-internal fields and optional prefill removed
//! - **Safe fallback**: any rewrite failure forwards the original request
//! - **Diagnostics**: bounded in-memory log with credential redaction

pub mod builder;
pub mod core;
pub mod error;
pub mod status;

pub use cpi_client::*;
pub use cpi_common::*;

pub use crate::builder::InterceptorBuilder;
pub use crate::core::CopilotInterceptor;
pub use crate::error::CoreError;
pub use crate::status::InterceptorStatus;
