//! Template-driven quality scoring.

use super::{ExtractedFields, HiType, QualityReport, QualityScorer, QualityStatus};
use crate::template::HospitalTemplate;

/// Pseudo-field reported missing when the document type itself is unknown.
pub const HI_TYPE_DETECTION: &str = "hiTypeDetection";

/// Scores a document by the share of its template's required fields present.
#[derive(Debug, Clone, Copy)]
pub struct TemplateQualityScorer {
    pub low_confidence_threshold: f64,
}

impl TemplateQualityScorer {
    pub fn new(low_confidence_threshold: f64) -> Self {
        Self {
            low_confidence_threshold,
        }
    }
}

impl Default for TemplateQualityScorer {
    fn default() -> Self {
        Self::new(0.7)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl QualityScorer for TemplateQualityScorer {
    fn evaluate(
        &self,
        hi_type: HiType,
        extracted: &ExtractedFields,
        template: &HospitalTemplate,
    ) -> QualityReport {
        let Some(doc_template) = template.for_hi_type(hi_type) else {
            return QualityReport {
                status: QualityStatus::Warning,
                missing_required_fields: vec![HI_TYPE_DETECTION.to_string()],
                confidence_score: 0.0,
                low_confidence: true,
            };
        };

        let required = &doc_template.required_fields;
        let has_observations = !extracted.observations.is_empty();
        let missing: Vec<String> = required
            .iter()
            .filter(|field| {
                // A populated observation list stands in for the single test/result pair.
                let covered_by_observations = hi_type == HiType::DiagnosticReport
                    && has_observations
                    && matches!(field.as_str(), "testName" | "resultValue");
                !covered_by_observations && !extracted.has(field)
            })
            .cloned()
            .collect();

        let confidence_score = if required.is_empty() {
            1.0
        } else {
            round2((required.len() - missing.len()) as f64 / required.len() as f64)
        };

        QualityReport {
            status: if missing.is_empty() {
                QualityStatus::Pass
            } else {
                QualityStatus::Warning
            },
            missing_required_fields: missing,
            confidence_score,
            low_confidence: confidence_score < self.low_confidence_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Observation;

    fn fields(pairs: &[(&str, &str)]) -> ExtractedFields {
        let mut e = ExtractedFields::default();
        for (k, v) in pairs {
            e.set(*k, *v);
        }
        e
    }

    #[test]
    fn unknown_type_is_a_warning() {
        let r = TemplateQualityScorer::default().evaluate(
            HiType::Unknown,
            &ExtractedFields::default(),
            &HospitalTemplate::default(),
        );
        assert_eq!(r.status, QualityStatus::Warning);
        assert_eq!(r.missing_required_fields, vec![HI_TYPE_DETECTION]);
        assert!(r.low_confidence);
    }

    #[test]
    fn partial_discharge_scores_two_thirds() {
        let r = TemplateQualityScorer::default().evaluate(
            HiType::DischargeSummary,
            &fields(&[("patientName", "A"), ("patientLocalId", "1")]),
            &HospitalTemplate::default(),
        );
        assert_eq!(r.status, QualityStatus::Warning);
        assert_eq!(r.missing_required_fields, vec!["finalDiagnosis"]);
        assert!((r.confidence_score - 0.67).abs() < 1e-9);
        assert!(r.low_confidence);
    }

    #[test]
    fn observations_cover_test_and_result() {
        let mut e = fields(&[("patientName", "A"), ("patientLocalId", "1")]);
        e.observations.push(Observation {
            name: "Hb".into(),
            value: "12".into(),
            unit: None,
            reference_range: None,
        });
        let r = TemplateQualityScorer::default().evaluate(
            HiType::DiagnosticReport,
            &e,
            &HospitalTemplate::default(),
        );
        assert!(r.passed());
        assert!((r.confidence_score - 1.0).abs() < 1e-9);
        assert!(!r.low_confidence);
    }
}
