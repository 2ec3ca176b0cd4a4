//! Downstream collaborators of the pipeline.
//!
//! The orchestrator only knows these traits. Each comes with a small default
//! implementation so the crate works end to end; deployments with better
//! field extraction, a real FHIR profile validator, or a different LLM swap
//! in their own types through [`crate::pipeline::ClaimPipelineBuilder`].
//!
//! | Trait | Default |
//! |-------|---------|
//! | [`Classifier`] | [`KeywordClassifier`] |
//! | [`StructuredExtractor`] | [`LabelExtractor`] |
//! | [`QualityScorer`] | [`TemplateQualityScorer`] |
//! | [`Enricher`] | [`LlmEnricher`] (opt-in) |
//! | [`BundleMapper`] | [`ClaimBundleMapper`] |
//! | [`BundleValidator`] | [`StructuralValidator`] |
//! | [`ComplianceEngine`] | [`RuleComplianceEngine`] |

pub mod classifier;
pub mod compliance;
pub mod extractor;
pub mod llm;
pub mod mapper;
pub mod quality;
pub mod validator;

pub use classifier::KeywordClassifier;
pub use compliance::RuleComplianceEngine;
pub use extractor::LabelExtractor;
pub use llm::LlmEnricher;
pub use mapper::ClaimBundleMapper;
pub use quality::TemplateQualityScorer;
pub use validator::StructuralValidator;

use crate::error::{EnrichmentError, MappingError};
use crate::pipeline::AuditEvent;
use crate::template::HospitalTemplate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ── Shared types ─────────────────────────────────────────────────────────

/// Health-information document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HiType {
    DischargeSummary,
    DiagnosticReport,
    #[default]
    Unknown,
}

impl HiType {
    pub fn as_str(self) -> &'static str {
        match self {
            HiType::DischargeSummary => "discharge_summary",
            HiType::DiagnosticReport => "diagnostic_report",
            HiType::Unknown => "unknown",
        }
    }

    pub fn is_known(self) -> bool {
        self != HiType::Unknown
    }

    /// Lenient parse of model or user supplied labels.
    ///
    /// Accepts the wire names as well as spaced forms such as
    /// `"Discharge Summary"`. Returns `None` for anything unrecognised.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalised = label.trim().to_lowercase().replace([' ', '-'], "_");
        match normalised.as_str() {
            "discharge_summary" => Some(HiType::DischargeSummary),
            "diagnostic_report" => Some(HiType::DiagnosticReport),
            "unknown" => Some(HiType::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for HiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_range: Option<String>,
}

/// Structured fields pulled out of a document's text.
///
/// Scalar fields are keyed by their template name (`patientName`,
/// `finalDiagnosis`, ...); lab results live in `observations`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub observations: Vec<Observation>,
}

impl ExtractedFields {
    /// The field's value if present and not blank.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityStatus {
    Pass,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub status: QualityStatus,
    pub missing_required_fields: Vec<String>,
    pub confidence_score: f64,
    pub low_confidence: bool,
}

impl QualityReport {
    pub fn passed(&self) -> bool {
        self.status == QualityStatus::Pass
    }
}

/// LLM enrichment input.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentRequest {
    pub text: String,
    pub hi_type: HiType,
    pub source_file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentDiagnostics {
    pub provider: String,
    pub model: String,
    pub status: String,
}

/// A successful enrichment response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    /// Raw type label proposed by the model, not yet trusted.
    pub hi_type: Option<String>,
    pub extracted: ExtractedFields,
    pub diagnostics: EnrichmentDiagnostics,
}

/// The source document as the mapper sees it.
#[derive(Debug, Clone, Copy)]
pub struct SourceDocument<'a> {
    pub file_name: &'a str,
    pub sha256: &'a str,
    pub content_type: Option<&'a str>,
}

#[derive(Debug, Clone, Copy)]
pub struct MappingInput<'a> {
    pub claim_id: &'a str,
    pub hi_type: HiType,
    pub extracted: &'a ExtractedFields,
    pub source: SourceDocument<'a>,
}

pub const NHCX_CLAIM_BUNDLE_PROFILE: &str =
    "https://nhcx.abdm.gov.in/fhir/StructureDefinition/NHCX-ClaimBundle";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub system: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMeta {
    #[serde(default)]
    pub profile: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleEntry {
    pub resource: serde_json::Value,
}

/// The claim record produced for one source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub resource_type: String,
    #[serde(rename = "type")]
    pub bundle_type: String,
    pub identifier: Identifier,
    #[serde(default)]
    pub meta: BundleMeta,
    #[serde(default)]
    pub entry: Vec<BundleEntry>,
}

impl Bundle {
    pub fn resources(&self) -> impl Iterator<Item = &serde_json::Value> {
        self.entry.iter().map(|e| &e.resource)
    }

    /// Every resource whose `resourceType` equals `kind`.
    pub fn resources_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a serde_json::Value> {
        self.resources()
            .filter(move |r| r.get("resourceType").and_then(|t| t.as_str()) == Some(kind))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
    pub path: String,
}

impl ValidationIssue {
    pub fn new(code: &str, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleValidation {
    pub status: ValidationStatus,
    pub errors: Vec<ValidationIssue>,
}

impl BundleValidation {
    pub fn from_issues(errors: Vec<ValidationIssue>) -> Self {
        let status = if errors.is_empty() {
            ValidationStatus::Pass
        } else {
            ValidationStatus::Fail
        };
        Self { status, errors }
    }

    pub fn passed(&self) -> bool {
        self.status == ValidationStatus::Pass
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleReport {
    pub bundle_index: usize,
    pub status: ValidationStatus,
    pub errors: Vec<ValidationIssue>,
}

/// Validation of every bundle in a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimValidationReport {
    pub status: ValidationStatus,
    pub bundle_reports: Vec<BundleReport>,
}

impl ClaimValidationReport {
    pub fn from_reports(bundle_reports: Vec<BundleReport>) -> Self {
        let status = if bundle_reports.iter().all(|r| r.status == ValidationStatus::Pass) {
            ValidationStatus::Pass
        } else {
            ValidationStatus::Fail
        };
        Self {
            status,
            bundle_reports,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceCheck {
    pub rule_id: String,
    pub title: String,
    pub status: ComplianceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub overall_status: ComplianceStatus,
    pub checks: Vec<ComplianceCheck>,
}

// ── Traits ───────────────────────────────────────────────────────────────

pub trait Classifier: Send + Sync {
    fn detect_hi_type(&self, text: &str) -> HiType;
}

pub trait StructuredExtractor: Send + Sync {
    fn extract(&self, hi_type: HiType, text: &str, template: &HospitalTemplate) -> ExtractedFields;
}

/// Scoring never fails; a document it cannot judge gets a `warning`.
pub trait QualityScorer: Send + Sync {
    fn evaluate(
        &self,
        hi_type: HiType,
        extracted: &ExtractedFields,
        template: &HospitalTemplate,
    ) -> QualityReport;
}

/// Optional second-pass extraction.
///
/// `Ok(None)` means "nothing useful came back". Errors are logged by the
/// pipeline and treated exactly like `Ok(None)`.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enhance(&self, request: &EnrichmentRequest)
        -> Result<Option<Enrichment>, EnrichmentError>;
}

pub trait BundleMapper: Send + Sync {
    fn map(&self, input: &MappingInput<'_>) -> Result<Bundle, MappingError>;
}

pub trait BundleValidator: Send + Sync {
    fn validate_bundle(&self, bundle: &Bundle) -> BundleValidation;

    fn validate_bundles(&self, bundles: &[Bundle]) -> ClaimValidationReport {
        let reports = bundles
            .iter()
            .enumerate()
            .map(|(bundle_index, bundle)| {
                let v = self.validate_bundle(bundle);
                BundleReport {
                    bundle_index,
                    status: v.status,
                    errors: v.errors,
                }
            })
            .collect();
        ClaimValidationReport::from_reports(reports)
    }
}

pub trait ComplianceEngine: Send + Sync {
    fn evaluate(&self, bundles: &[Bundle], audit_log: &[AuditEvent]) -> ComplianceReport;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hi_type_from_label() {
        assert_eq!(HiType::from_label("Diagnostic Report"), Some(HiType::DiagnosticReport));
        assert_eq!(HiType::from_label("discharge summary"), Some(HiType::DischargeSummary));
        assert_eq!(HiType::from_label("discharge_summary"), Some(HiType::DischargeSummary));
        assert_eq!(HiType::from_label("unknown"), Some(HiType::Unknown));
        assert_eq!(HiType::from_label("prescription"), None);
    }

    #[test]
    fn extracted_fields_flatten_on_the_wire() {
        let mut fields = ExtractedFields::default();
        fields.set("patientName", "Asha Rao");
        fields.set("patientLocalId", " ");
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["patientName"], "Asha Rao");
        assert!(json["observations"].as_array().unwrap().is_empty());
        assert!(!fields.has("patientLocalId"));
    }

    #[test]
    fn empty_claim_report_passes() {
        let report = ClaimValidationReport::from_reports(vec![]);
        assert_eq!(report.status, ValidationStatus::Pass);
    }
}
