//! Transport-level request and response values.
//!
//! [`OutboundRequest`] is what the host hands to its outbound primitive.
//! [`TransportResponse`] is what comes back. A response body is either a
//! read-once byte stream or buffered bytes; [`TransportResponse::buffer`]
//! turns the former into the latter so the body can be inspected without
//! taking it away from the caller.

use std::fmt;
use std::io;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use typed_builder::TypedBuilder;

/// Whether ambient host credentials (cookies, session headers) accompany a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsMode {
    /// Never attach ambient credentials.
    Omit,
    /// Attach whatever ambient credentials the transport holds.
    #[default]
    Include,
}

impl CredentialsMode {
    /// Maps the `include_ambient_credentials` toggle to a mode.
    #[must_use]
    pub const fn from_include(include: bool) -> Self {
        if include { Self::Include } else { Self::Omit }
    }
}

/// An outbound HTTP call as issued by the host application.
///
/// # Examples
///
/// ```
/// use cpi_common::http::OutboundRequest;
/// use reqwest::Method;
///
/// let request = OutboundRequest::builder()
///     .url("/api/backends/chat-completions/generate")
///     .method(Method::POST)
///     .body(r#"{"model":"gpt-4o"}"#)
///     .build();
///
/// assert_eq!(request.body.as_deref(), Some(r#"{"model":"gpt-4o"}"#));
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct OutboundRequest {
    /// Absolute URL, or a path relative to the host origin.
    #[builder(setter(into))]
    pub url: String,

    /// HTTP method.
    #[builder(default = Method::GET)]
    pub method: Method,

    /// Request headers.
    #[builder(default)]
    pub headers: HeaderMap,

    /// Request body text.
    #[builder(default, setter(strip_option, into))]
    pub body: Option<String>,

    /// Ambient credentials mode.
    #[builder(default)]
    pub credentials: CredentialsMode,
}

/// Read-once stream of response body chunks.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Body of a [`TransportResponse`].
pub enum ResponseBody {
    /// Unread network stream. Can be consumed exactly once.
    Stream(ByteStream),
    /// Fully read body.
    Buffered(Bytes),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Buffered(bytes) => write!(f, "Buffered({} bytes)", bytes.len()),
        }
    }
}

/// Response returned by a transport, intercepted or not.
#[derive(Debug)]
pub struct TransportResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: ResponseBody,
}

impl TransportResponse {
    /// Creates a response with a buffered body.
    pub fn buffered(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: ResponseBody::Buffered(body.into()),
        }
    }

    /// Creates a response around an unread stream.
    #[must_use]
    pub fn streaming(status: StatusCode, headers: HeaderMap, body: ByteStream) -> Self {
        Self {
            status,
            headers,
            body: ResponseBody::Stream(body),
        }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Whether the body is still an unread stream.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        matches!(self.body, ResponseBody::Stream(_))
    }

    /// Reads the body into memory and returns it.
    ///
    /// A streamed body is drained and replaced by the buffered bytes, so the
    /// response can still be handed on and read again.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the stream fails. The body is left
    /// buffered with whatever was read before the failure.
    pub async fn buffer(&mut self) -> io::Result<&Bytes> {
        let mut failure = None;
        let bytes = match &mut self.body {
            ResponseBody::Buffered(bytes) => bytes.clone(),
            ResponseBody::Stream(stream) => {
                let mut collected = Vec::new();
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(chunk) => collected.extend_from_slice(&chunk),
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
                Bytes::from(collected)
            }
        };

        self.body = ResponseBody::Buffered(bytes);
        if let Some(e) = failure {
            return Err(e);
        }
        let ResponseBody::Buffered(bytes) = &self.body else {
            return Err(io::Error::other("response body is not buffered"));
        };
        Ok(bytes)
    }

    /// Consumes the response and returns the body as text.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the stream fails.
    pub async fn text(mut self) -> io::Result<String> {
        let bytes = self.buffer().await?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Consumes the response and returns the body as a stream.
    #[must_use]
    pub fn into_stream(self) -> ByteStream {
        match self.body {
            ResponseBody::Stream(stream) => stream,
            ResponseBody::Buffered(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
        }
    }

    /// Consumes the response and returns every body chunk.
    ///
    /// # Errors
    ///
    /// Returns the first stream error.
    pub async fn chunks(self) -> io::Result<Vec<Bytes>> {
        self.into_stream().try_collect().await
    }
}
