//! OCR backend client for Ollama-compatible vision servers.
//!
//! ## Flow
//!
//! ```text
//! input ──▶ PDF? ──yes──▶ rasterize ≤ max_pages ──▶ one batch request (all pages)
//!   │                                                  │ empty / failed
//!   │                                                  ▼
//!   │                                    per-page requests, page_concurrency wide
//!   │                                                  │
//!   └──no──▶ single image request                      ▼
//!                                              text joined in page order
//! ```
//!
//! Every request goes through the same attempt loop: resolve the model,
//! try the cached request mode and fall back to the other one on a missing
//! route, switch models when the server says the model is not installed,
//! and back off linearly on transport errors and 429/5xx.
//!
//! The client never returns an error for a document. Every failure becomes a
//! diagnostic entry next to (possibly empty) text, and the extraction engine
//! decides what an empty result means.

pub mod render;
pub mod request;
pub mod session;
pub mod transport;

pub use render::{PageRasterizer, PdfiumRasterizer};
pub use session::Session;
pub use transport::{HttpTransport, OcrTransport, TransportResponse};

use crate::config::OcrConfig;
use crate::document::{DiagnosticStage, Diagnostics, Document};
use crate::error::{OcrError, OcrRequestError, RequestMode, TransportError};
use crate::extraction::OcrBackend;
use crate::pdf;
use crate::pool;
use crate::prompts::build_ocr_prompt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Name reported in [`Diagnostics::engine`].
pub const ENGINE_NAME: &str = "ollama";

/// Prefix of the scoped work directory.
pub const WORK_DIR_PREFIX: &str = "claim-ocr-";

/// What the OCR backend is asked to read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_pdf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}

impl OcrInput {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            file_name: Some(doc.file_name.clone()).filter(|n| !n.is_empty()),
            file_path: doc.file_path().map(str::to_string),
            base64_pdf: doc.base64_pdf().map(str::to_string),
            image_base64: doc.image_base64().map(str::to_string),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.file_path.is_none() && self.base64_pdf.is_none() && self.image_base64.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrOutput {
    pub text: String,
    pub confidence: f32,
    pub diagnostics: Diagnostics,
}

impl OcrOutput {
    fn from_text(text: String, diagnostics: Diagnostics) -> Self {
        Self {
            confidence: estimate_confidence(&text),
            text,
            diagnostics,
        }
    }

    fn empty(diagnostics: Diagnostics) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            diagnostics,
        }
    }
}

/// Coarse confidence from the amount of text read.
pub fn estimate_confidence(text: &str) -> f32 {
    match text.trim().chars().count() {
        0 => 0.0,
        n if n > 600 => 0.9,
        n if n > 200 => 0.8,
        n if n > 50 => 0.65,
        _ => 0.45,
    }
}

/// Result of [`OcrClient::check_health`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub ok: bool,
    pub base_url: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_model: Option<String>,
    #[serde(default)]
    pub model_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Where the bytes of an input ended up.
enum PreparedInput {
    Pdf(PathBuf),
    Image(String),
    Nothing,
}

pub struct OcrClient {
    config: OcrConfig,
    base_url: String,
    transport: Arc<dyn OcrTransport>,
    rasterizer: Arc<dyn PageRasterizer>,
    session: Session,
}

impl std::fmt::Debug for OcrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrClient")
            .field("base_url", &self.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

impl OcrClient {
    /// Client with the reqwest transport and the pdfium rasterizer.
    pub fn new(config: OcrConfig) -> Result<Self, OcrError> {
        let transport = HttpTransport::new().map_err(|e| OcrError::Unreachable(e.to_string()))?;
        Ok(Self::with_parts(
            config,
            Arc::new(transport),
            Arc::new(PdfiumRasterizer::from_env()),
        ))
    }

    pub fn with_parts(
        config: OcrConfig,
        transport: Arc<dyn OcrTransport>,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Self {
        Self {
            base_url: request::normalize_base_url(&config.base_url),
            config,
            transport,
            rasterizer,
            session: Session::default(),
        }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ── Model resolution ─────────────────────────────────────────────────

    /// Installed model names, from cache unless `force_refresh`.
    pub async fn fetch_tags(&self, force_refresh: bool) -> Result<Vec<String>, OcrRequestError> {
        if !force_refresh {
            if let Some(tags) = self.session.cached_tags() {
                return Ok(tags);
            }
        }

        let endpoint = request::build_url(&self.base_url, "/api/tags");
        let response = timeout(self.config.request_timeout(), self.transport.get(&endpoint))
            .await
            .map_err(|_| OcrRequestError::Timeout {
                timeout_ms: self.config.request_timeout_ms,
            })?
            .map_err(|e| unreachable_error(&endpoint, e))?;
        if !response.is_success() {
            return Err(OcrRequestError::Malformed {
                endpoint,
                message: format!("tags request returned status {}", response.status),
            });
        }
        let models = request::model_names(&response.body).map_err(|e| OcrRequestError::Malformed {
            endpoint,
            message: e.to_string(),
        })?;
        self.session.remember_tags(models.clone());
        Ok(models)
    }

    /// The model to send requests to.
    ///
    /// A failed tag fetch falls back to the configured model.
    pub async fn resolve_model(&self, force_refresh: bool) -> String {
        if !force_refresh {
            if let Some(model) = self.session.cached_model() {
                return model;
            }
        }

        let selected = match self.fetch_tags(force_refresh).await {
            Ok(models) => request::select_model(&models, &self.config.model, &self.config.candidate_models),
            Err(e) => {
                debug!("Model list unavailable, using configured model: {}", e);
                self.config.model.clone()
            }
        };
        self.session.remember_model(selected.clone());
        selected
    }

    pub async fn check_health(&self) -> HealthReport {
        info!("OCR health check against {}", self.base_url);
        match self.fetch_tags(true).await {
            Ok(models) => {
                let selected =
                    request::select_model(&models, &self.config.model, &self.config.candidate_models);
                let configured_exists = request::has_model(&models, &self.config.model);
                self.session.remember_model(selected.clone());
                HealthReport {
                    ok: configured_exists || !models.is_empty(),
                    base_url: self.base_url.clone(),
                    model: self.config.model.clone(),
                    model_fallback: !configured_exists && selected != self.config.model,
                    effective_model: Some(selected),
                    error: if models.is_empty() {
                        Some("model_not_available".to_string())
                    } else {
                        None
                    },
                }
            }
            Err(e) => {
                warn!("OCR health check failed: {}", e);
                HealthReport {
                    ok: false,
                    base_url: self.base_url.clone(),
                    model: self.config.model.clone(),
                    effective_model: None,
                    model_fallback: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    // ── Requests ─────────────────────────────────────────────────────────

    async fn request_once(
        &self,
        mode: RequestMode,
        model: &str,
        prompt: &str,
        images: &[String],
    ) -> Result<String, OcrRequestError> {
        let endpoint = request::build_url(&self.base_url, request::route_for(mode));
        debug!(mode = %mode, model, images = images.len(), "OCR request to {}", endpoint);

        let payload = request::payload_for(mode, model, prompt, images);
        let response = self
            .transport
            .post_json(&endpoint, &payload)
            .await
            .map_err(|e| unreachable_error(&endpoint, e))?;

        if !response.is_success() {
            return Err(OcrRequestError::Status {
                status: response.status,
                mode,
                details: request::error_details(&response.body),
                endpoint,
            });
        }
        self.session.remember_mode(mode);
        Ok(request::response_text(&response.body))
    }

    /// One attempt: the cached mode first, the other mode on a missing route.
    async fn request_negotiated(
        &self,
        model: &str,
        prompt: &str,
        images: &[String],
    ) -> Result<String, OcrRequestError> {
        let first = self.session.mode();
        match self.request_once(first, model, prompt, images).await {
            Err(e) if e.is_missing_route() => {
                debug!("{} route missing, trying {}", first, first.other());
                self.request_once(first.other(), model, prompt, images).await
            }
            other => other,
        }
    }

    /// OCR `images` in one request, with retries and model switching.
    pub async fn ocr_images(&self, images: &[String]) -> Result<String, OcrRequestError> {
        if images.is_empty() {
            return Ok(String::new());
        }
        let prompt = build_ocr_prompt(images.len());
        let attempts = self.config.attempts();
        let mut model = self.resolve_model(false).await;
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(attempt, attempts, model = %model, "OCR attempt");

            let result = match timeout(
                self.config.request_timeout(),
                self.request_negotiated(&model, &prompt, images),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(OcrRequestError::Timeout {
                    timeout_ms: self.config.request_timeout_ms,
                }),
            };

            let error = match result {
                Ok(text) => return Ok(text),
                Err(e) => e,
            };

            if error.is_model_missing() {
                let fallback = self.resolve_model(true).await;
                if fallback != model && attempt < attempts {
                    warn!("Model '{}' missing on server, switching to '{}'", model, fallback);
                    model = fallback;
                    continue;
                }
            }

            if error.is_retryable() && attempt < attempts {
                let backoff = self.config.backoff_for(attempt);
                warn!(
                    "OCR attempt {}/{} failed, retrying in {}ms: {}",
                    attempt,
                    attempts,
                    backoff.as_millis(),
                    error
                );
                sleep(backoff).await;
                continue;
            }

            return Err(error);
        }
    }

    // ── Documents ────────────────────────────────────────────────────────

    async fn prepare(&self, input: &OcrInput, work_dir: &Path) -> Result<PreparedInput, OcrError> {
        if let Some(path) = input.file_path.as_deref() {
            let bytes = tokio::fs::read(path).await?;
            if pdf::is_pdf(&bytes) {
                return Ok(PreparedInput::Pdf(PathBuf::from(path)));
            }
            debug!("'{}' is not a PDF, sending it as an image", path);
            return Ok(PreparedInput::Image(pdf::encode_base64(&bytes)));
        }
        if let Some(data) = input.base64_pdf.as_deref() {
            let bytes = pdf::decode_base64(data).map_err(|e| OcrError::InvalidInput(format!("base64Pdf: {e}")))?;
            let path = work_dir.join("input.pdf");
            tokio::fs::write(&path, bytes).await?;
            return Ok(PreparedInput::Pdf(path));
        }
        if let Some(data) = input.image_base64.as_deref() {
            let bytes =
                pdf::decode_base64(data).map_err(|e| OcrError::InvalidInput(format!("imageBase64: {e}")))?;
            return Ok(PreparedInput::Image(pdf::encode_base64(&bytes)));
        }
        Ok(PreparedInput::Nothing)
    }

    /// Read a document. Never fails; problems are reported in the diagnostics.
    pub async fn extract(&self, input: &OcrInput) -> OcrOutput {
        info!(
            file_name = input.file_name.as_deref().unwrap_or(""),
            max_pages = self.config.max_pages,
            page_concurrency = self.config.page_concurrency,
            "OCR extraction started"
        );
        let mut diagnostics = Diagnostics {
            engine: ENGINE_NAME.to_string(),
            base_url: Some(self.base_url.clone()),
            model: Some(self.config.model.clone()),
            ..Default::default()
        };

        // Dropped (and removed) on every return path below.
        let work_dir = match tempfile::Builder::new().prefix(WORK_DIR_PREFIX).tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                diagnostics.push(DiagnosticStage::Extract, format!("cannot create work dir: {e}"));
                return OcrOutput::empty(diagnostics);
            }
        };

        diagnostics.effective_model = Some(self.resolve_model(false).await);

        let output = match self.prepare(input, work_dir.path()).await {
            Ok(PreparedInput::Pdf(path)) => self.extract_pdf(&path, work_dir.path(), diagnostics).await,
            Ok(PreparedInput::Image(image)) => self.extract_image(image, diagnostics).await,
            Ok(PreparedInput::Nothing) => {
                diagnostics.push(
                    DiagnosticStage::InputValidation,
                    "No usable filePath/base64Pdf/imageBase64 input provided",
                );
                OcrOutput::empty(diagnostics)
            }
            Err(e) => {
                warn!("OCR input preparation failed: {}", e);
                diagnostics.push(DiagnosticStage::Extract, e.to_string());
                OcrOutput::empty(diagnostics)
            }
        };

        if let Err(e) = work_dir.close() {
            warn!("Cannot remove OCR work dir: {}", e);
        }
        output
    }

    async fn extract_image(&self, image: String, mut diagnostics: Diagnostics) -> OcrOutput {
        let result = self.ocr_images(std::slice::from_ref(&image)).await;
        diagnostics.effective_model = self.session.cached_model().or(diagnostics.effective_model);
        match result {
            Ok(text) => {
                info!("Image OCR completed: {} chars", text.trim().len());
                OcrOutput::from_text(text, diagnostics)
            }
            Err(e) => {
                warn!("Image OCR failed: {}", e);
                let unreachable = e.is_retryable();
                diagnostics.push(DiagnosticStage::Extract, e.to_string());
                if unreachable {
                    diagnostics.push(
                        DiagnosticStage::OcrBackendUnreachable,
                        format!("Unable to reach OCR backend at {}", self.base_url),
                    );
                }
                OcrOutput::empty(diagnostics)
            }
        }
    }

    async fn extract_pdf(&self, pdf_path: &Path, work_dir: &Path, mut diagnostics: Diagnostics) -> OcrOutput {
        let pages = match self
            .rasterizer
            .rasterize(pdf_path, work_dir, self.config.max_pages, self.config.dpi)
            .await
        {
            Ok(pages) => pages,
            Err(e) => {
                warn!("Rasterisation failed: {}", e);
                diagnostics.push(DiagnosticStage::Extract, e.to_string());
                return OcrOutput::empty(diagnostics);
            }
        };
        if pages.is_empty() {
            diagnostics.push(DiagnosticStage::PdfToImage, "No PNG pages generated from PDF");
            return OcrOutput::empty(diagnostics);
        }
        info!("PDF rasterised into {} pages", pages.len());

        let encoded = pool::map_bounded(pages.clone(), self.config.page_concurrency, |_, path| async move {
            tokio::fs::read(path).await.map(|bytes| pdf::encode_base64(&bytes))
        })
        .await;
        let images = match encoded.into_iter().collect::<Result<Vec<String>, std::io::Error>>() {
            Ok(images) => images,
            Err(e) => {
                diagnostics.push(DiagnosticStage::Extract, format!("cannot read page image: {e}"));
                return OcrOutput::empty(diagnostics);
            }
        };

        match self.ocr_images(&images).await {
            Ok(text) if !text.trim().is_empty() => {
                info!("Batch OCR completed: {} pages, {} chars", images.len(), text.trim().len());
                diagnostics.effective_model = self.session.cached_model().or(diagnostics.effective_model);
                return OcrOutput::from_text(text, diagnostics);
            }
            Ok(_) => debug!("Batch OCR returned no text, falling back to per-page OCR"),
            Err(e) => {
                warn!("Batch OCR failed, falling back to per-page OCR: {}", e);
                diagnostics.push(DiagnosticStage::PdfBatchOcr, e.to_string());
            }
        }

        let results = pool::map_bounded(images, self.config.page_concurrency, |index, image| async move {
            let result = self.ocr_images(std::slice::from_ref(&image)).await;
            debug!("Page {} OCR finished", index + 1);
            result
        })
        .await;

        let mut unreachable_pages = 0;
        let mut texts = Vec::with_capacity(results.len());
        for (result, path) in results.into_iter().zip(&pages) {
            match result {
                Ok(text) if !text.trim().is_empty() => texts.push(text),
                Ok(_) => {}
                Err(e) => {
                    warn!("Page OCR failed for {}: {}", path.display(), e);
                    if e.is_retryable() {
                        unreachable_pages += 1;
                    }
                    diagnostics.push_page(e.to_string(), path.display().to_string());
                }
            }
        }

        let text = texts.join("\n");
        if text.trim().is_empty() {
            diagnostics.push(DiagnosticStage::PdfOcr, "No OCR text extracted from generated pages");
        }
        if unreachable_pages == pages.len() {
            diagnostics.push(
                DiagnosticStage::OcrBackendUnreachable,
                format!("Unable to reach OCR backend at {}", self.base_url),
            );
        }
        diagnostics.effective_model = self.session.cached_model().or(diagnostics.effective_model);
        info!(
            "Page OCR completed: {}/{} pages with text, {} chars",
            texts.len(),
            pages.len(),
            text.trim().len()
        );
        OcrOutput::from_text(text, diagnostics)
    }
}

fn unreachable_error(endpoint: &str, e: TransportError) -> OcrRequestError {
    match e {
        TransportError::Connect(message) | TransportError::Timeout(message) => OcrRequestError::Unreachable {
            endpoint: endpoint.to_string(),
            message,
        },
        TransportError::Body(message) => OcrRequestError::Malformed {
            endpoint: endpoint.to_string(),
            message,
        },
    }
}

#[async_trait]
impl OcrBackend for OcrClient {
    async fn extract(&self, input: &OcrInput) -> Result<OcrOutput, OcrError> {
        Ok(OcrClient::extract(self, input).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_buckets() {
        assert_eq!(estimate_confidence("   "), 0.0);
        assert_eq!(estimate_confidence("short"), 0.45);
        assert_eq!(estimate_confidence(&"x".repeat(51)), 0.65);
        assert_eq!(estimate_confidence(&"x".repeat(201)), 0.8);
        assert_eq!(estimate_confidence(&"x".repeat(601)), 0.9);
        assert_eq!(estimate_confidence(&"x".repeat(600)), 0.8);
    }

    #[test]
    fn input_from_document_skips_blanks() {
        let doc = Document::new("a.pdf").with_file_path("  ").with_image_base64("aGk=");
        let input = OcrInput::from_document(&doc);
        assert_eq!(input.file_path, None);
        assert_eq!(input.image_base64.as_deref(), Some("aGk="));
        assert!(!input.is_empty());
        assert!(OcrInput::default().is_empty());
    }
}
