//! The outbound request primitive.
//!
//! [`Transport`] is the generic "send a request, get status + headers + body"
//! operation the host exposes. [`HttpTransport`] implements it over `reqwest`
//! with a middleware stack, resolving host-relative paths (such as the local
//! `/proxy/...` route) against the host origin.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest_middleware::ClientWithMiddleware;
use url::Url;

use cpi_common::{CredentialsMode, OutboundRequest, TransportResponse};

use crate::error::ClientError;

/// Sends outbound requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the response.
    ///
    /// Non-success statuses are responses, not errors.
    ///
    /// # Errors
    ///
    /// Returns an error only when no response could be obtained.
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, ClientError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, ClientError> {
        (**self).send(request).await
    }
}

/// `reqwest`-backed transport.
///
/// Ambient headers stand in for the host's ambient credentials (session
/// cookies and similar). They are attached only to requests whose
/// [`CredentialsMode`] is `Include`.
#[derive(Clone)]
pub struct HttpTransport {
    client: ClientWithMiddleware,
    origin: Option<Url>,
    ambient_headers: HeaderMap,
}

// Custom Debug implementation to avoid exposing ambient credentials
impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("origin", &self.origin.as_ref().map(Url::as_str))
            .field(
                "ambient_headers",
                &self.ambient_headers.keys().collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Creates a transport with a default `reqwest` client and no middleware.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self, ClientError> {
        let reqwest_client = reqwest::Client::builder().build()?;
        Ok(Self::from_client(
            reqwest_middleware::ClientBuilder::new(reqwest_client).build(),
        ))
    }

    /// Wraps an existing middleware client.
    #[must_use]
    pub fn from_client(client: ClientWithMiddleware) -> Self {
        Self {
            client,
            origin: None,
            ambient_headers: HeaderMap::new(),
        }
    }

    /// Sets the host origin used to resolve relative request URLs.
    ///
    /// # Errors
    ///
    /// Returns an error if `origin` is not an absolute URL.
    pub fn with_origin(mut self, origin: &str) -> Result<Self, ClientError> {
        let parsed = Url::parse(origin).map_err(|e| {
            ClientError::ConfigurationError(format!("Invalid origin '{origin}': {e}"))
        })?;
        self.origin = Some(parsed);
        Ok(self)
    }

    /// Adds a header sent only with `CredentialsMode::Include` requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or value is not valid HTTP.
    pub fn with_ambient_header(mut self, name: &str, value: &str) -> Result<Self, ClientError> {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| ClientError::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        let mut header_value =
            HeaderValue::from_str(value).map_err(|e| ClientError::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        header_value.set_sensitive(true);
        self.ambient_headers.append(header_name, header_value);
        Ok(self)
    }

    /// Host origin, if configured.
    #[must_use]
    pub const fn origin(&self) -> Option<&Url> {
        self.origin.as_ref()
    }

    fn resolve(&self, url: &str) -> Result<Url, ClientError> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let origin = self.origin.as_ref().ok_or_else(|| {
                    ClientError::ConfigurationError(format!(
                        "Relative URL '{url}' requires a host origin"
                    ))
                })?;
                origin.join(url).map_err(|e| {
                    ClientError::ConfigurationError(format!("Invalid URL '{url}': {e}"))
                })
            }
            Err(e) => Err(ClientError::ConfigurationError(format!(
                "Invalid URL '{url}': {e}"
            ))),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, ClientError> {
        let url = self.resolve(&request.url)?;

        let mut request_builder = self
            .client
            .request(request.method, url)
            .headers(request.headers);

        if request.credentials == CredentialsMode::Include {
            for (name, value) in &self.ambient_headers {
                request_builder = request_builder.header(name, value);
            }
        }

        if let Some(body) = request.body {
            request_builder = request_builder.body(body);
        }

        let response = request_builder.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = Box::pin(response.bytes_stream().map_err(io::Error::other));

        Ok(TransportResponse::streaming(status, headers, body))
    }
}
