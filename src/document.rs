//! Input documents and the normalised extraction result.
//!
//! A [`Document`] is what the caller hands in; an [`ExtractionResult`] is what
//! every text source (digital, OCR, or the engine composing them) hands back.
//! Both serialise with camelCase keys so they round-trip through the JSON
//! surface the CLI and any HTTP wrapper expose.

use serde::{Deserialize, Serialize};

/// One source document of a claim.
///
/// At most one primary content source is expected. When several are present
/// the precedence is `text`, then `file_path`, then `base64_pdf`, then
/// `image_base64`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_pdf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    /// Pre-computed OCR output, e.g. from an upstream scanner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_text: Option<String>,
    /// `false` means the caller knows this is a scan with no text layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_text_layer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl Document {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_base64_pdf(mut self, data: impl Into<String>) -> Self {
        self.base64_pdf = Some(data.into());
        self
    }

    pub fn with_image_base64(mut self, data: impl Into<String>) -> Self {
        self.image_base64 = Some(data.into());
        self
    }

    pub fn with_ocr_text(mut self, text: impl Into<String>) -> Self {
        self.ocr_text = Some(text.into());
        self
    }

    pub fn with_text_layer(mut self, has_text_layer: bool) -> Self {
        self.has_text_layer = Some(has_text_layer);
        self
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }

    /// Inline text, if the caller supplied any non-blank text.
    pub fn inline_text(&self) -> Option<&str> {
        non_blank(self.text.as_deref())
    }

    pub fn file_path(&self) -> Option<&str> {
        non_blank(self.file_path.as_deref())
    }

    pub fn base64_pdf(&self) -> Option<&str> {
        non_blank(self.base64_pdf.as_deref())
    }

    pub fn image_base64(&self) -> Option<&str> {
        non_blank(self.image_base64.as_deref())
    }

    /// True when the document carries bytes an OCR engine could look at.
    pub fn has_binary_source(&self) -> bool {
        self.file_path().is_some() || self.base64_pdf().is_some() || self.image_base64().is_some()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// How the text of an [`ExtractionResult`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Inline text supplied by the caller.
    Digital,
    /// Text read from the PDF's embedded text layer.
    #[serde(rename = "digital_pdfjs")]
    DigitalTextLayer,
    DigitalEmpty,
    DigitalError,
    OcrInline,
    OcrWorker,
    OcrEmpty,
    OcrError,
    ExtractionEmpty,
    ExtractionFailed,
}

impl ExtractionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionMode::Digital => "digital",
            ExtractionMode::DigitalTextLayer => "digital_pdfjs",
            ExtractionMode::DigitalEmpty => "digital_empty",
            ExtractionMode::DigitalError => "digital_error",
            ExtractionMode::OcrInline => "ocr_inline",
            ExtractionMode::OcrWorker => "ocr_worker",
            ExtractionMode::OcrEmpty => "ocr_empty",
            ExtractionMode::OcrError => "ocr_error",
            ExtractionMode::ExtractionEmpty => "extraction_empty",
            ExtractionMode::ExtractionFailed => "extraction_failed",
        }
    }
}

impl std::fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in the extraction chain a diagnostic was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticStage {
    PdfParsing,
    PdfToImage,
    PdfBatchOcr,
    PageOcr,
    PdfOcr,
    OcrBackendUnreachable,
    InputValidation,
    Extract,
    OcrProcessing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticEntry {
    pub stage: DiagnosticStage,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

/// Diagnostics attached by an adapter or by the OCR client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    #[serde(default)]
    pub engine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_model: Option<String>,
    #[serde(default)]
    pub errors: Vec<DiagnosticEntry>,
}

impl Diagnostics {
    pub fn for_engine(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, stage: DiagnosticStage, message: impl Into<String>) {
        self.errors.push(DiagnosticEntry {
            stage,
            message: message.into(),
            image_path: None,
        });
    }

    pub fn push_page(&mut self, message: impl Into<String>, image_path: impl Into<String>) {
        self.errors.push(DiagnosticEntry {
            stage: DiagnosticStage::PageOcr,
            message: message.into(),
            image_path: Some(image_path.into()),
        });
    }

    pub fn has_stage(&self, stage: DiagnosticStage) -> bool {
        self.errors.iter().any(|e| e.stage == stage)
    }

    pub fn backend_unreachable(&self) -> bool {
        self.has_stage(DiagnosticStage::OcrBackendUnreachable)
    }
}

/// A record of one adapter invocation, kept when a fallback chain fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub mode: ExtractionMode,
    pub text_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

impl Attempt {
    pub fn of(result: &ExtractionResult) -> Self {
        Self {
            mode: result.mode,
            text_length: result.trimmed_len(),
            diagnostics: result.metadata.diagnostics.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    OcrBackendUnreachable,
    OcrEmptyText,
}

/// Provenance appended by the engine when digital text stood in for OCR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackProvenance {
    pub from: ExtractionMode,
    pub reason: FallbackReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_diagnostics: Option<Diagnostics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fatal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<Attempt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackProvenance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Normalised output of every text source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub text: String,
    pub mode: ExtractionMode,
    #[serde(default)]
    pub metadata: ExtractionMetadata,
}

impl ExtractionResult {
    pub fn new(text: impl Into<String>, mode: ExtractionMode) -> Self {
        Self {
            text: text.into(),
            mode,
            metadata: ExtractionMetadata::default(),
        }
    }

    pub fn empty(mode: ExtractionMode, reason: impl Into<String>) -> Self {
        let mut result = Self::new(String::new(), mode);
        result.metadata.reason = Some(reason.into());
        result
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.metadata.diagnostics = Some(diagnostics);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.metadata.confidence = Some(confidence);
        self
    }

    /// Emptiness is judged on trimmed text, never on the mode tag.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    pub fn trimmed_len(&self) -> usize {
        self.text.trim().chars().count()
    }

    pub fn is_fatal(&self) -> bool {
        self.metadata.fatal
    }

    /// True when the OCR diagnostics carry the dedicated unreachable stage.
    pub fn backend_unreachable(&self) -> bool {
        self.metadata
            .diagnostics
            .as_ref()
            .is_some_and(Diagnostics::backend_unreachable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_deserialises_camel_case() {
        let doc: Document = serde_json::from_str(
            r#"{"fileName":"a.pdf","base64Pdf":"JVBERi0=","hasTextLayer":false}"#,
        )
        .unwrap();
        assert_eq!(doc.file_name, "a.pdf");
        assert_eq!(doc.base64_pdf(), Some("JVBERi0="));
        assert_eq!(doc.has_text_layer, Some(false));
        assert!(doc.has_binary_source());
        assert!(doc.inline_text().is_none());
    }

    #[test]
    fn missing_file_name_defaults_to_empty() {
        let doc: Document = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert!(doc.file_name.is_empty());
    }

    #[test]
    fn blank_sources_are_ignored() {
        let doc = Document::new("x").with_text("   ").with_file_path("");
        assert!(doc.inline_text().is_none());
        assert!(!doc.has_binary_source());
    }

    #[test]
    fn mode_wire_names() {
        assert_eq!(
            serde_json::to_string(&ExtractionMode::DigitalTextLayer).unwrap(),
            "\"digital_pdfjs\""
        );
        assert_eq!(
            serde_json::to_string(&ExtractionMode::ExtractionFailed).unwrap(),
            "\"extraction_failed\""
        );
        assert_eq!(ExtractionMode::OcrWorker.to_string(), "ocr_worker");
    }

    #[test]
    fn emptiness_uses_trimmed_text() {
        let result = ExtractionResult::new("  \n\t ", ExtractionMode::OcrWorker);
        assert!(!result.has_text());
        assert_eq!(result.trimmed_len(), 0);
    }

    #[test]
    fn fatal_flag_is_omitted_when_false() {
        let json = serde_json::to_value(ExtractionResult::new("x", ExtractionMode::Digital)).unwrap();
        assert!(json["metadata"].get("fatal").is_none());
    }

    #[test]
    fn unreachable_flag_read_from_diagnostics() {
        let mut diagnostics = Diagnostics::for_engine("ocr");
        diagnostics.push(DiagnosticStage::PageOcr, "boom");
        let result = ExtractionResult::new("", ExtractionMode::OcrWorker)
            .with_diagnostics(diagnostics.clone());
        assert!(!result.backend_unreachable());

        diagnostics.push(DiagnosticStage::OcrBackendUnreachable, "down");
        let result = result.with_diagnostics(diagnostics);
        assert!(result.backend_unreachable());
    }
}
