//! # claimscan
//!
//! Turn the documents of a hospital insurance claim (discharge summaries, lab
//! reports, scans of either) into structured claim bundles.
//!
//! ## Pipeline Overview
//!
//! ```text
//! documents
//!  │
//!  ├─ 1. Extract   inline text, PDF text layer (pdfium) or OCR (vision model)
//!  ├─ 2. Hash      sha256 identity of the source
//!  ├─ 3. Classify  discharge summary / diagnostic report
//!  ├─ 4. Fields    label extraction, template quality score
//!  ├─ 5. Enrich    optional LLM pass for documents that failed review
//!  ├─ 6. Map       one claim bundle per document
//!  └─ 7. Check     structural validation, compliance rules, audit trail
//! ```
//!
//! Scanned PDFs are rasterised and read by an Ollama-compatible vision model
//! ([`ocr::OcrClient`]). The [`extraction::ExtractionEngine`] decides whether
//! OCR or the PDF's own text layer is tried first, and when an unreachable
//! OCR backend must abort the claim instead of yielding an empty document.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use claimscan::{ClaimPipeline, ClaimRequest, Document, ExtractionEngine, OcrClient, OcrConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ocr = OcrClient::new(OcrConfig::default())?;
//!     let engine = Arc::new(ExtractionEngine::with_ocr_backend(ocr));
//!
//!     let request = ClaimRequest::new(
//!         "CLAIM-001",
//!         vec![Document::new("discharge.pdf").with_file_path("discharge.pdf")],
//!     )
//!     .extraction_engine(engine);
//!
//!     let output = ClaimPipeline::default().convert(request).await?;
//!     println!("{}", serde_json::to_string_pretty(&output)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `claimscan` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod collaborators;
pub mod config;
pub mod document;
pub mod error;
pub mod extraction;
pub mod hashing;
pub mod ocr;
pub mod outcome;
pub mod pdf;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod prompts;
pub mod template;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use collaborators::{Enricher, HiType, LlmEnricher};
pub use config::{
    LlmConfig, LlmConfigBuilder, OcrConfig, OcrConfigBuilder, PipelineConfig, PipelineConfigBuilder,
};
pub use document::{Document, ExtractionMode, ExtractionResult};
pub use error::{OcrError, PipelineError};
pub use extraction::{ExtractionEngine, ExtractionStrategy, OcrBackend, TextSource};
pub use ocr::{HealthReport, OcrClient, OcrInput, OcrOutput};
pub use pipeline::{
    convert_claim_documents, AuditAction, AuditEvent, ClaimConversionOutput, ClaimPipeline,
    ClaimPipelineBuilder, ClaimRequest,
};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use template::HospitalTemplate;
