//! Progress-callback trait for per-document pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through a claim. The CLI uses it to drive a
//! terminal progress bar; a service could forward the events to a channel.
//!
//! Documents run concurrently, so `on_document_start` and
//! `on_document_complete` may be called from different tasks at once.
//! Implementations must guard shared mutable state themselves.

use crate::collaborators::HiType;
use std::sync::Arc;

/// Called by the pipeline as it processes each document of a claim.
///
/// All methods default to no-ops so callers only override what they need.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once, after input validation, before any document starts.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called when a worker picks up a document.
    ///
    /// # Arguments
    /// * `index`:     0-indexed position in the request
    /// * `file_name`: the document's file name
    fn on_document_start(&self, index: usize, file_name: &str) {
        let _ = (index, file_name);
    }

    /// Called when a document has been mapped, validated and checked.
    fn on_document_complete(&self, file_name: &str, hi_type: HiType, enriched: bool) {
        let _ = (file_name, hi_type, enriched);
    }

    /// Called once when every document is done.
    ///
    /// # Arguments
    /// * `total_documents`: documents in the claim
    /// * `passed`:          documents whose bundle validation passed
    fn on_batch_complete(&self, total_documents: usize, passed: usize) {
        let _ = (total_documents, passed);
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// The type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        started: AtomicUsize,
        completed: AtomicUsize,
        enriched: AtomicUsize,
        passed: AtomicUsize,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_document_start(&self, _index: usize, _file_name: &str) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _file_name: &str, _hi_type: HiType, enriched: bool) {
            self.completed.fetch_add(1, Ordering::SeqCst);
            if enriched {
                self.enriched.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_batch_complete(&self, _total: usize, passed: usize) {
            self.passed.store(passed, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_document_start(0, "a.pdf");
        cb.on_document_complete("a.pdf", HiType::DischargeSummary, false);
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = Arc::new(TrackingCallback::default());
        let cb: ProgressCallback = tracker.clone();

        cb.on_batch_start(2);
        cb.on_document_start(0, "a.pdf");
        cb.on_document_start(1, "b.pdf");
        cb.on_document_complete("a.pdf", HiType::DischargeSummary, true);
        cb.on_document_complete("b.pdf", HiType::Unknown, false);
        cb.on_batch_complete(2, 1);

        assert_eq!(tracker.started.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completed.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.enriched.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.passed.load(Ordering::SeqCst), 1);
    }
}
