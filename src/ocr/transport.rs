//! HTTP transport seam for the OCR client.
//!
//! The client only needs "GET this URL" and "POST this JSON", each returning
//! a status and a body. Keeping that behind [`OcrTransport`] lets tests script
//! exact server behaviour (refused connections, 404 routes, slow pages)
//! without a socket.

use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait OcrTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError>;

    async fn post_json(&self, url: &str, body: &Value) -> Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport.
///
/// No client-level timeout is set; callers wrap each request in their own
/// deadline.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Connect(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn finish(response: reqwest::Response) -> Result<TransportResponse, TransportError> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;
        Ok(TransportResponse { status, body })
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else {
        TransportError::Connect(e.to_string())
    }
}

#[async_trait]
impl OcrTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(classify)?;
        Self::finish(response).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<TransportResponse, TransportError> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(classify)?;
        Self::finish(response).await
    }
}
