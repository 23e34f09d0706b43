//! Test doubles shared by the unit tests.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;

use cpi_common::{OutboundRequest, TransportResponse};

use crate::error::ClientError;
use crate::transport::Transport;

/// Records every request and answers with a canned response.
///
/// A URL listed in `fail_urls` makes `send` return an error instead.
#[derive(Debug)]
pub struct RecordingTransport {
    pub requests: Mutex<Vec<OutboundRequest>>,
    status: StatusCode,
    body: &'static str,
    fail_urls: Vec<String>,
}

impl RecordingTransport {
    pub fn ok(body: &'static str) -> Arc<Self> {
        Self::with_status(StatusCode::OK, body)
    }

    pub fn with_status(status: StatusCode, body: &'static str) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            status,
            body,
            fail_urls: Vec::new(),
        })
    }

    pub fn failing_for(url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            status: StatusCode::OK,
            body: "original",
            fail_urls: vec![url.into()],
        })
    }

    pub fn recorded(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, ClientError> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);

        if self.fail_urls.iter().any(|u| url.starts_with(u.as_str())) {
            return Err(ClientError::InvalidResponse(format!(
                "connection refused: {url}"
            )));
        }

        // Streamed, so tests exercise the read-once path.
        let body = stream::iter(vec![Ok(Bytes::from_static(self.body.as_bytes()))]);
        Ok(TransportResponse::streaming(
            self.status,
            HeaderMap::new(),
            Box::pin(body),
        ))
    }
}
