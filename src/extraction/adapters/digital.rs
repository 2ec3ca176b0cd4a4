//! Digital text: inline text, or the PDF's embedded text layer via pdfium.

use super::TextSource;
use crate::document::{DiagnosticStage, Diagnostics, Document, ExtractionMode, ExtractionResult};
use crate::pdf;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info, warn};

const ENGINE_NAME: &str = "pdfium";

#[derive(Debug, Clone, Default)]
pub struct DigitalTextAdapter {
    library_path: Option<PathBuf>,
}

impl DigitalTextAdapter {
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    pub fn from_env() -> Self {
        Self::new(pdf::library_path_from_env())
    }

    async fn pdf_bytes(doc: &Document) -> Result<Vec<u8>, String> {
        if let Some(path) = doc.file_path() {
            debug!(file_name = %doc.file_name, "Reading text layer from {}", path);
            return tokio::fs::read(path)
                .await
                .map_err(|e| format!("cannot read {path}: {e}"));
        }
        match doc.base64_pdf() {
            Some(data) => pdf::decode_base64(data).map_err(|e| format!("invalid base64Pdf: {e}")),
            None => Ok(Vec::new()),
        }
    }

    fn error(doc: &Document, message: String) -> ExtractionResult {
        warn!(file_name = %doc.file_name, "Text layer extraction failed: {}", message);
        let mut diagnostics = Diagnostics::for_engine(ENGINE_NAME);
        diagnostics.push(DiagnosticStage::PdfParsing, message.clone());
        ExtractionResult::empty(ExtractionMode::DigitalError, message).with_diagnostics(diagnostics)
    }
}

#[async_trait]
impl TextSource for DigitalTextAdapter {
    fn name(&self) -> &'static str {
        "digital"
    }

    async fn extract(&self, doc: &Document) -> ExtractionResult {
        if let Some(text) = doc.inline_text() {
            debug!(file_name = %doc.file_name, "Using inline text ({} chars)", text.trim().len());
            return ExtractionResult::new(text, ExtractionMode::Digital);
        }
        if doc.file_path().is_none() && doc.base64_pdf().is_none() {
            debug!(file_name = %doc.file_name, "No digital source");
            return ExtractionResult::new(String::new(), ExtractionMode::DigitalEmpty);
        }

        let bytes = match Self::pdf_bytes(doc).await {
            Ok(bytes) => bytes,
            Err(message) => return Self::error(doc, message),
        };
        if !pdf::is_pdf(&bytes) {
            return Self::error(doc, "input is not a PDF (missing %PDF header)".to_string());
        }

        let library = self.library_path.clone();
        let joined = tokio::task::spawn_blocking(move || text_layer(library, bytes)).await;
        match joined {
            Ok(Ok(text)) => {
                info!(file_name = %doc.file_name, "Text layer read: {} chars", text.len());
                ExtractionResult::new(text, ExtractionMode::DigitalTextLayer)
            }
            Ok(Err(message)) => Self::error(doc, message),
            Err(e) => Self::error(doc, format!("text layer task panicked: {e}")),
        }
    }
}

/// Non-empty page texts joined with newlines.
fn text_layer(library: Option<PathBuf>, bytes: Vec<u8>) -> Result<String, String> {
    let pdfium = pdf::bind_pdfium(library.as_deref()).map_err(|e| format!("cannot bind pdfium: {e:?}"))?;
    let document = pdfium
        .load_pdf_from_byte_slice(&bytes, None)
        .map_err(|e| format!("cannot parse PDF: {e:?}"))?;

    let mut pages = Vec::new();
    for page in document.pages().iter() {
        let text = page
            .text()
            .map_err(|e| format!("cannot read page text: {e:?}"))?
            .all();
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            pages.push(text);
        }
    }
    Ok(pages.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inline_text_is_returned_unchanged() {
        let doc = Document::new("note.txt").with_text("  Discharge Summary\nPatient: A  ");
        let result = DigitalTextAdapter::default().extract(&doc).await;
        assert_eq!(result.mode, ExtractionMode::Digital);
        assert_eq!(result.text, "  Discharge Summary\nPatient: A  ");
    }

    #[tokio::test]
    async fn image_only_document_has_no_digital_source() {
        let doc = Document::new("scan.png").with_image_base64("aGVsbG8=");
        let result = DigitalTextAdapter::default().extract(&doc).await;
        assert_eq!(result.mode, ExtractionMode::DigitalEmpty);
        assert!(!result.has_text());
    }

    #[tokio::test]
    async fn non_pdf_bytes_are_a_parsing_error() {
        let doc = Document::new("x.pdf").with_base64_pdf(pdf::encode_base64(b"plain text"));
        let result = DigitalTextAdapter::default().extract(&doc).await;
        assert_eq!(result.mode, ExtractionMode::DigitalError);
        let diagnostics = result.metadata.diagnostics.unwrap();
        assert!(diagnostics.has_stage(DiagnosticStage::PdfParsing));
    }

    #[tokio::test]
    async fn unreadable_file_is_a_parsing_error() {
        let doc = Document::new("gone.pdf").with_file_path("/definitely/not/here.pdf");
        let result = DigitalTextAdapter::default().extract(&doc).await;
        assert_eq!(result.mode, ExtractionMode::DigitalError);
        assert!(result.metadata.reason.unwrap().contains("cannot read"));
    }
}
