//! Append-only audit trail of a claim conversion.
//!
//! Documents run concurrently, so events from different documents
//! interleave. Only the order of events for one document is meaningful.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ConvertStarted,
    ExtractionEmpty,
    LlmEnrichmentApplied,
    DocumentConverted,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::ConvertStarted => "convert_started",
            AuditAction::ExtractionEmpty => "extraction_empty",
            AuditAction::LlmEnrichmentApplied => "llm_enrichment_applied",
            AuditAction::DocumentConverted => "document_converted",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Event stamped now, with no actor.
    pub fn new(action: AuditAction, document: Option<String>) -> Self {
        Self {
            action,
            actor: None,
            document,
            timestamp: Utc::now(),
        }
    }

    /// Event attributed to the `system` actor.
    pub fn system(action: AuditAction, document: Option<String>) -> Self {
        Self {
            actor: Some("system".to_string()),
            ..Self::new(action, document)
        }
    }
}

/// Shared handle to the trail; clones append to the same log.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AuditEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, event: AuditEvent) {
        self.lock().push(event);
    }

    /// Copy of every event recorded so far.
    pub fn snapshot(&self) -> Vec<AuditEvent> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
