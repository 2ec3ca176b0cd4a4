//! Text sources the extraction engine composes.

pub mod digital;
pub mod ocr;

pub use digital::DigitalTextAdapter;
pub use ocr::{OcrAdapter, OcrBackend, RemoteOcrWorker};

use crate::document::{Document, ExtractionResult};
use async_trait::async_trait;

/// Anything that can turn a [`Document`] into text.
///
/// Implementations never fail: problems are reported through the result's
/// mode and diagnostics so the engine can decide whether to fall back.
#[async_trait]
pub trait TextSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn extract(&self, doc: &Document) -> ExtractionResult;
}
