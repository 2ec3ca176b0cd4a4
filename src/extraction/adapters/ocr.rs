//! OCR text: inline `ocrText`, or whatever an [`OcrBackend`] reads.

use super::TextSource;
use crate::document::{DiagnosticStage, Diagnostics, Document, ExtractionMode, ExtractionResult};
use crate::config::OcrConfig;
use crate::error::{OcrError, TransportError};
use crate::ocr::{estimate_confidence, HttpTransport, OcrInput, OcrOutput, OcrTransport};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Something that reads the text of a PDF or image.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    async fn extract(&self, input: &OcrInput) -> Result<OcrOutput, OcrError>;
}

#[async_trait]
impl<T: OcrBackend + ?Sized> OcrBackend for Arc<T> {
    async fn extract(&self, input: &OcrInput) -> Result<OcrOutput, OcrError> {
        (**self).extract(input).await
    }
}

/// [`TextSource`] over any [`OcrBackend`].
#[derive(Debug, Clone)]
pub struct OcrAdapter<B> {
    backend: B,
}

impl<B: OcrBackend> OcrAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<B: OcrBackend> TextSource for OcrAdapter<B> {
    fn name(&self) -> &'static str {
        "ocr"
    }

    async fn extract(&self, doc: &Document) -> ExtractionResult {
        if let Some(text) = doc.ocr_text.as_deref().filter(|t| !t.trim().is_empty()) {
            debug!(file_name = %doc.file_name, "Using inline OCR text ({} chars)", text.trim().len());
            return ExtractionResult::new(text, ExtractionMode::OcrInline);
        }
        if !doc.has_binary_source() {
            debug!(file_name = %doc.file_name, "No OCR source");
            return ExtractionResult::new(String::new(), ExtractionMode::OcrEmpty);
        }

        match self.backend.extract(&OcrInput::from_document(doc)).await {
            Ok(output) => {
                debug!(
                    file_name = %doc.file_name,
                    confidence = output.confidence,
                    "OCR backend returned {} chars",
                    output.text.trim().len()
                );
                ExtractionResult::new(output.text, ExtractionMode::OcrWorker)
                    .with_confidence(output.confidence)
                    .with_diagnostics(output.diagnostics)
            }
            Err(e) => {
                let unreachable = e.is_backend_unreachable();
                warn!(file_name = %doc.file_name, unreachable, "OCR extraction failed: {}", e);
                let stage = if unreachable {
                    DiagnosticStage::OcrBackendUnreachable
                } else {
                    DiagnosticStage::OcrProcessing
                };
                let mut diagnostics = Diagnostics::for_engine("ocr");
                diagnostics.push(stage, e.to_string());
                ExtractionResult::empty(ExtractionMode::OcrError, e.to_string()).with_diagnostics(diagnostics)
            }
        }
    }
}

/// Default address of a standalone OCR worker.
pub const DEFAULT_WORKER_URL: &str = "http://127.0.0.1:8081";

#[derive(Debug, Deserialize)]
struct WorkerResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    diagnostics: Option<Diagnostics>,
}

/// [`OcrBackend`] that delegates to an OCR worker over HTTP.
///
/// The worker accepts the camelCase [`OcrInput`] at `POST {url}/ocr/extract`
/// and answers `{text, confidence, diagnostics}`.
pub struct RemoteOcrWorker {
    worker_url: String,
    transport: Arc<dyn OcrTransport>,
    request_timeout: Duration,
}

impl std::fmt::Debug for RemoteOcrWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteOcrWorker")
            .field("worker_url", &self.worker_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl RemoteOcrWorker {
    pub fn new(worker_url: impl Into<String>) -> Result<Self, OcrError> {
        let transport = HttpTransport::new().map_err(|e| OcrError::Unreachable(e.to_string()))?;
        Ok(Self::with_transport(worker_url, Arc::new(transport)))
    }

    pub fn with_transport(worker_url: impl Into<String>, transport: Arc<dyn OcrTransport>) -> Self {
        let worker_url = worker_url.into();
        let trimmed = worker_url.trim().trim_end_matches('/');
        Self {
            worker_url: if trimmed.is_empty() {
                DEFAULT_WORKER_URL.to_string()
            } else {
                trimmed.to_string()
            },
            transport,
            request_timeout: OcrConfig::default().request_timeout(),
        }
    }

    /// Deadline for one worker call. A call that runs past it is unreachable.
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/ocr/extract", self.worker_url)
    }
}

#[async_trait]
impl OcrBackend for RemoteOcrWorker {
    async fn extract(&self, input: &OcrInput) -> Result<OcrOutput, OcrError> {
        let endpoint = self.endpoint();
        let body = serde_json::to_value(input).map_err(|e| OcrError::InvalidInput(e.to_string()))?;
        let response = timeout(self.request_timeout, self.transport.post_json(&endpoint, &body))
            .await
            .map_err(|_| {
                OcrError::Unreachable(format!(
                    "{endpoint}: no response within {}ms",
                    self.request_timeout.as_millis()
                ))
            })?
            .map_err(|e| match e {
                TransportError::Connect(m) | TransportError::Timeout(m) => {
                    OcrError::Unreachable(format!("{endpoint}: {m}"))
                }
                TransportError::Body(m) => OcrError::MalformedResponse(m),
            })?;

        if !response.is_success() {
            return Err(OcrError::MalformedResponse(format!(
                "OCR worker request failed with status {}",
                response.status
            )));
        }

        let payload: WorkerResponse =
            serde_json::from_str(&response.body).map_err(|e| OcrError::MalformedResponse(e.to_string()))?;
        let text = payload.text.unwrap_or_default();
        Ok(OcrOutput {
            confidence: payload.confidence.unwrap_or_else(|| estimate_confidence(&text)),
            diagnostics: payload
                .diagnostics
                .unwrap_or_else(|| Diagnostics::for_engine("ocr_worker")),
            text,
        })
    }
}
