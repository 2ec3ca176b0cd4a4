//! Error types for the claimscan library.
//!
//! Errors are split by how far they are allowed to travel:
//!
//! * [`PipelineError`] is **fatal** for a whole batch: malformed input, an
//!   extraction backend that is unreachable with no fallback text, or a bad
//!   configuration. It is the only error type returned by
//!   [`crate::pipeline::ClaimPipeline::convert`].
//!
//! * [`OcrRequestError`] and [`TransportError`] describe a single call to the
//!   OCR inference server. They drive the retry loop in [`crate::ocr`] and
//!   never escape the OCR client; exhausted retries are folded into
//!   diagnostics instead.
//!
//! * [`OcrError`], [`MappingError`] and [`EnrichmentError`] are **local**:
//!   they are caught at the stage that raised them and reflected in the
//!   per-document result.

use crate::document::ExtractionMetadata;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fatal errors returned by the pipeline orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The batch request was malformed; no document was processed.
    #[error("Invalid claim request: {}", .violations.join("; "))]
    InvalidInput { violations: Vec<String> },

    /// A document's extraction was fatal and aborted the batch.
    #[error("Extraction failed for '{file_name}': {reason}")]
    ExtractionFailed {
        file_name: String,
        reason: String,
        metadata: Box<ExtractionMetadata>,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Stable machine-readable code, suitable for an API boundary.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput { .. } => "INVALID_INPUT",
            PipelineError::ExtractionFailed { .. } => "DOCUMENT_EXTRACTION_FAILED",
            PipelineError::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}

/// Failure of one HTTP exchange at the transport layer (before any status code).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// DNS, refused connection, reset socket.
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport timed out: {0}")]
    Timeout(String),

    /// Connected, but the body could not be read.
    #[error("failed to read response body: {0}")]
    Body(String),
}

/// The two request shapes understood by Ollama-compatible servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    #[default]
    Chat,
    Generate,
}

impl RequestMode {
    pub fn other(self) -> Self {
        match self {
            RequestMode::Chat => RequestMode::Generate,
            RequestMode::Generate => RequestMode::Chat,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestMode::Chat => "chat",
            RequestMode::Generate => "generate",
        }
    }
}

impl fmt::Display for RequestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed OCR request, classified for the retry loop.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OcrRequestError {
    /// The server could not be contacted.
    #[error("OCR backend unreachable at {endpoint}: {message}")]
    Unreachable { endpoint: String, message: String },

    /// The per-attempt deadline elapsed.
    #[error("OCR request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The server answered with a non-success status.
    #[error("OCR request failed (status {status}, mode {mode}, endpoint {endpoint}): {details}")]
    Status {
        status: u16,
        mode: RequestMode,
        endpoint: String,
        details: String,
    },

    /// The server answered but the exchange could not be completed.
    #[error("OCR response from {endpoint} unusable: {message}")]
    Malformed { endpoint: String, message: String },
}

impl OcrRequestError {
    /// Connection failures, timeouts, 429 and the 5xx gateway family.
    pub fn is_retryable(&self) -> bool {
        match self {
            OcrRequestError::Unreachable { .. } | OcrRequestError::Timeout { .. } => true,
            OcrRequestError::Status { status, .. } => {
                matches!(status, 429 | 500 | 502 | 503 | 504)
            }
            OcrRequestError::Malformed { .. } => false,
        }
    }

    /// Whether the server rejected the request because the model is not installed.
    pub fn is_model_missing(&self) -> bool {
        match self {
            OcrRequestError::Status { details, .. } => mentions_missing_model(details),
            other => mentions_missing_model(&other.to_string()),
        }
    }

    /// A 404 that is not about the model, i.e. the route itself is absent.
    pub fn is_missing_route(&self) -> bool {
        matches!(self, OcrRequestError::Status { status: 404, .. }) && !self.is_model_missing()
    }
}

fn mentions_missing_model(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("model") && (lower.contains("not found") || lower.contains("pull"))
}

/// Errors raised by an [`crate::extraction::OcrBackend`].
#[derive(Debug, Error)]
pub enum OcrError {
    /// Every route to the backend failed with a transport-class error.
    #[error("OCR backend unreachable: {0}")]
    Unreachable(String),

    #[error("OCR request failed: {0}")]
    Request(#[from] OcrRequestError),

    #[error("Rasterisation failed: {0}")]
    Rasterisation(String),

    #[error("Invalid OCR input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed OCR worker response: {0}")]
    MalformedResponse(String),
}

impl OcrError {
    pub fn is_backend_unreachable(&self) -> bool {
        match self {
            OcrError::Unreachable(_) => true,
            OcrError::Request(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Raised by a [`crate::collaborators::BundleMapper`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("claimId is required to build a claim bundle")]
    MissingClaimId,

    #[error("hiType '{0}' cannot be mapped to a claim bundle")]
    InvalidHiType(String),
}

/// Raised by an [`crate::collaborators::Enricher`]; always absorbed by the pipeline.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("LLM provider '{provider}' is not configured: {detail}")]
    ProviderNotConfigured { provider: String, detail: String },

    #[error("LLM call failed after {attempts} attempts: {detail}")]
    CallFailed { attempts: u32, detail: String },

    #[error("LLM call timed out after {secs}s")]
    Timeout { secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16, details: &str) -> OcrRequestError {
        OcrRequestError::Status {
            status: code,
            mode: RequestMode::Chat,
            endpoint: "http://127.0.0.1:11434/api/chat".into(),
            details: details.into(),
        }
    }

    #[test]
    fn invalid_input_lists_every_violation() {
        let e = PipelineError::InvalidInput {
            violations: vec![
                "claimId must be a non-empty string".into(),
                "documents[1] must have a valid fileName".into(),
            ],
        };
        let msg = e.to_string();
        assert!(msg.contains("claimId"), "got: {msg}");
        assert!(msg.contains("documents[1]"), "got: {msg}");
        assert_eq!(e.code(), "INVALID_INPUT");
    }

    #[test]
    fn extraction_failed_display() {
        let e = PipelineError::ExtractionFailed {
            file_name: "scan.pdf".into(),
            reason: "scan_requires_ocr_backend_unreachable".into(),
            metadata: Box::default(),
        };
        assert!(e.to_string().contains("scan.pdf"));
        assert!(e.to_string().contains("scan_requires_ocr_backend_unreachable"));
        assert_eq!(e.code(), "DOCUMENT_EXTRACTION_FAILED");
    }

    #[test]
    fn status_error_display() {
        let e = status(503, "overloaded");
        let msg = e.to_string();
        assert!(msg.contains("status 503"), "got: {msg}");
        assert!(msg.contains("mode chat"), "got: {msg}");
        assert!(msg.contains("/api/chat"), "got: {msg}");
    }

    #[test]
    fn retryable_classification() {
        assert!(status(429, "").is_retryable());
        assert!(status(502, "").is_retryable());
        assert!(!status(400, "bad image").is_retryable());
        assert!(!status(404, "").is_retryable());
        assert!(OcrRequestError::Timeout { timeout_ms: 10 }.is_retryable());
        assert!(OcrRequestError::Unreachable {
            endpoint: "x".into(),
            message: "fetch failed".into()
        }
        .is_retryable());
    }

    #[test]
    fn model_missing_detection() {
        assert!(status(404, "model 'medgemma' not found, try pulling it first").is_model_missing());
        assert!(status(500, "Model requires pull").is_model_missing());
        assert!(!status(404, "page not found").is_model_missing());
        assert!(status(404, "page not found").is_missing_route());
        assert!(!status(404, "model x not found").is_missing_route());
    }

    #[test]
    fn request_mode_other() {
        assert_eq!(RequestMode::Chat.other(), RequestMode::Generate);
        assert_eq!(RequestMode::Generate.other(), RequestMode::Chat);
        assert_eq!(RequestMode::default().to_string(), "chat");
    }
}
