//! Result types of a claim conversion.

use super::audit::AuditEvent;
use crate::collaborators::{
    Bundle, BundleValidation, ClaimValidationReport, ComplianceReport, HiType, QualityReport,
};
use crate::document::ExtractionMetadata;
use crate::hashing::HashSource;
use serde::{Deserialize, Serialize};

/// Source mode when the caller supplied the text inline.
pub const SOURCE_MODE_PROVIDED: &str = "provided";
/// Source mode when there was no text and no extraction engine.
pub const SOURCE_MODE_MISSING: &str = "missing";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSummary {
    pub text_length: usize,
    /// `provided`, `missing`, or the extraction mode.
    pub source_mode: String,
}

/// Outcome for one document of the claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDocumentResult {
    pub file_name: String,
    /// `None` when the document could not be mapped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<Bundle>,
    pub hi_type: HiType,
    pub sha256: String,
    pub extraction: ExtractionSummary,
    pub quality: QualityReport,
    pub enriched: bool,
    pub validation: BundleValidation,
    pub compliance: ComplianceReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimMetadata {
    pub claim_id: String,
    pub hospital_id: String,
    pub template_id: String,
    pub documents_count: usize,
    pub successful_count: usize,
    pub failed_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub file_name: String,
    pub hi_type: HiType,
}

/// How a document's text and hash were obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    pub file_name: String,
    pub source_mode: String,
    pub text_length: usize,
    pub hash_source: HashSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExtractionMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimConversionOutput {
    /// Bundles of the mapped documents, in document order.
    pub bundles: Vec<Bundle>,
    pub metadata: ClaimMetadata,
    pub results: Vec<PipelineDocumentResult>,
    pub audit_log: Vec<AuditEvent>,
    pub validation_report: ClaimValidationReport,
    pub classifications: Vec<Classification>,
    pub extraction_reports: Vec<ExtractionReport>,
}

impl ClaimConversionOutput {
    /// True when every document's bundle passed validation.
    pub fn all_passed(&self) -> bool {
        self.metadata.failed_count == 0
    }
}
