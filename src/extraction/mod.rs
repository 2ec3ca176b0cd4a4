//! Extraction engine: compose a digital and an OCR [`TextSource`] into one
//! result per document.
//!
//! ## Strategies
//!
//! ```text
//! OcrFirst     OCR ──empty──▶ digital ──empty──▶ failed (unreachable) | empty
//! ScanOnly     OCR ───────────────────────────▶ failed (unreachable) | as-is
//! DigitalFirst digital ──empty──▶ OCR ──empty──▶ failed (unreachable) | empty
//! ```
//!
//! "Empty" always means empty after trimming. "Unreachable" means the OCR
//! result's diagnostics carry an `ocr_backend_unreachable` entry; only then
//! does an empty outcome become fatal for the batch.

pub mod adapters;

pub use adapters::{DigitalTextAdapter, OcrAdapter, OcrBackend, RemoteOcrWorker, TextSource};

use crate::document::{
    Attempt, Document, ExtractionMode, ExtractionResult, FallbackProvenance, FallbackReason,
};
use std::sync::Arc;
use tracing::{debug, error, info};

pub const REASON_OCR_UNREACHABLE_NO_FALLBACK: &str = "ocr_backend_unreachable_no_text_fallback";
pub const REASON_NO_TEXT_OCR_FIRST: &str = "no_text_from_ocr_or_digital";
pub const REASON_SCAN_UNREACHABLE: &str = "scan_requires_ocr_backend_unreachable";
pub const REASON_NO_TEXT_DIGITAL_FIRST: &str = "no_text_from_digital_or_ocr";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    OcrFirst,
    ScanOnly,
    DigitalFirst,
}

impl ExtractionStrategy {
    /// OCR-first when forced and the document has PDF or image bytes,
    /// scan-only when the caller says there is no text layer, digital-first
    /// otherwise.
    pub fn resolve(doc: &Document, ocr_for_all_pdfs: bool) -> Self {
        if ocr_for_all_pdfs && doc.has_binary_source() {
            ExtractionStrategy::OcrFirst
        } else if doc.has_text_layer == Some(false) {
            ExtractionStrategy::ScanOnly
        } else {
            ExtractionStrategy::DigitalFirst
        }
    }
}

#[derive(Clone)]
pub struct ExtractionEngine {
    digital: Arc<dyn TextSource>,
    ocr: Arc<dyn TextSource>,
    ocr_for_all_pdfs: bool,
}

impl std::fmt::Debug for ExtractionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionEngine")
            .field("digital", &self.digital.name())
            .field("ocr", &self.ocr.name())
            .field("ocr_for_all_pdfs", &self.ocr_for_all_pdfs)
            .finish()
    }
}

impl ExtractionEngine {
    pub fn new(digital: Arc<dyn TextSource>, ocr: Arc<dyn TextSource>) -> Self {
        Self {
            digital,
            ocr,
            ocr_for_all_pdfs: false,
        }
    }

    /// pdfium text layer for digital, `backend` for OCR.
    pub fn with_ocr_backend<B: OcrBackend + 'static>(backend: B) -> Self {
        Self::new(
            Arc::new(DigitalTextAdapter::from_env()),
            Arc::new(OcrAdapter::new(backend)),
        )
    }

    pub fn ocr_for_all_pdfs(mut self, enabled: bool) -> Self {
        self.ocr_for_all_pdfs = enabled;
        self
    }

    pub async fn extract(&self, doc: &Document) -> ExtractionResult {
        let strategy = ExtractionStrategy::resolve(doc, self.ocr_for_all_pdfs);
        info!(
            file_name = %doc.file_name,
            has_binary_source = doc.has_binary_source(),
            ocr_for_all_pdfs = self.ocr_for_all_pdfs,
            ?strategy,
            "Extraction started"
        );
        self.extract_with(doc, strategy).await
    }

    pub async fn extract_with(&self, doc: &Document, strategy: ExtractionStrategy) -> ExtractionResult {
        match strategy {
            ExtractionStrategy::OcrFirst => self.ocr_first(doc).await,
            ExtractionStrategy::ScanOnly => self.scan_only(doc).await,
            ExtractionStrategy::DigitalFirst => self.digital_first(doc).await,
        }
    }

    async fn ocr_first(&self, doc: &Document) -> ExtractionResult {
        let ocr = self.ocr.extract(doc).await;
        if ocr.has_text() {
            info!(file_name = %doc.file_name, mode = %ocr.mode, "OCR-first: OCR produced text");
            return ocr;
        }

        let mut digital = self.digital.extract(doc).await;
        if digital.has_text() {
            let reason = if ocr.backend_unreachable() {
                FallbackReason::OcrBackendUnreachable
            } else {
                FallbackReason::OcrEmptyText
            };
            info!(file_name = %doc.file_name, ?reason, "OCR-first: digital text stands in for OCR");
            digital.metadata.fallback = Some(FallbackProvenance {
                from: ocr.mode,
                reason,
                ocr_diagnostics: ocr.metadata.diagnostics.clone(),
            });
            return digital;
        }

        let attempts = vec![Attempt::of(&ocr), Attempt::of(&digital)];
        if ocr.backend_unreachable() {
            error!(file_name = %doc.file_name, "OCR-first: backend unreachable and no digital text");
            return failed(REASON_OCR_UNREACHABLE_NO_FALLBACK, attempts);
        }
        nothing(REASON_NO_TEXT_OCR_FIRST, attempts)
    }

    async fn scan_only(&self, doc: &Document) -> ExtractionResult {
        let ocr = self.ocr.extract(doc).await;
        if ocr.has_text() || !ocr.backend_unreachable() {
            debug!(file_name = %doc.file_name, mode = %ocr.mode, "Scan-only: returning OCR result");
            return ocr;
        }
        error!(file_name = %doc.file_name, "Scan-only: OCR backend unreachable");
        failed(REASON_SCAN_UNREACHABLE, vec![Attempt::of(&ocr)])
    }

    async fn digital_first(&self, doc: &Document) -> ExtractionResult {
        let digital = self.digital.extract(doc).await;
        if digital.has_text() {
            debug!(file_name = %doc.file_name, mode = %digital.mode, "Digital-first: digital text found");
            return digital;
        }

        debug!(file_name = %doc.file_name, "Digital-first: no digital text, trying OCR");
        let ocr = self.ocr.extract(doc).await;
        if ocr.has_text() {
            info!(file_name = %doc.file_name, mode = %ocr.mode, "Digital-first: OCR fallback produced text");
            return ocr;
        }

        let attempts = vec![Attempt::of(&digital), Attempt::of(&ocr)];
        if ocr.backend_unreachable() {
            error!(file_name = %doc.file_name, "Digital-first: OCR backend unreachable and no digital text");
            return failed(REASON_OCR_UNREACHABLE_NO_FALLBACK, attempts);
        }
        nothing(REASON_NO_TEXT_DIGITAL_FIRST, attempts)
    }
}

fn failed(reason: &str, attempts: Vec<Attempt>) -> ExtractionResult {
    let mut result = ExtractionResult::empty(ExtractionMode::ExtractionFailed, reason);
    result.metadata.fatal = true;
    result.metadata.attempts = attempts;
    result
}

fn nothing(reason: &str, attempts: Vec<Attempt>) -> ExtractionResult {
    let mut result = ExtractionResult::empty(ExtractionMode::ExtractionEmpty, reason);
    result.metadata.attempts = attempts;
    result
}
