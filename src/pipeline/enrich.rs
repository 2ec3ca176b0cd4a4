//! Enrichment gating and merging.

use crate::collaborators::{ExtractedFields, HiType, QualityReport};

/// Scalar fields an enrichment may fill in. Anything else the model returns
/// is dropped before it reaches the mapper.
pub const ENRICHABLE_FIELDS: [&str; 8] = [
    "patientName",
    "patientLocalId",
    "admissionDate",
    "dischargeDate",
    "finalDiagnosis",
    "testName",
    "resultValue",
    "observationDate",
];

/// Whether a document is weak enough, and has enough text, for the optional
/// LLM pass. Whether an enricher is configured at all is up to the caller.
pub fn should_enrich(quality: &QualityReport, text_length: usize, min_text_length: usize) -> bool {
    !quality.passed() && text_length > 0 && text_length >= min_text_length
}

/// Overlay an enrichment onto the rule-based fields.
///
/// Non-blank values of [`ENRICHABLE_FIELDS`] win over the base. A non-empty
/// observation list replaces the base list, capped at `max_observations`.
pub fn merge_enrichment(
    base: &ExtractedFields,
    candidate: &ExtractedFields,
    max_observations: usize,
) -> ExtractedFields {
    let mut merged = base.clone();
    for key in ENRICHABLE_FIELDS {
        if let Some(value) = candidate.get(key) {
            merged.set(key, value);
        }
    }
    if !candidate.observations.is_empty() {
        merged.observations = candidate
            .observations
            .iter()
            .take(max_observations)
            .cloned()
            .collect();
    }
    merged
}

/// The type after enrichment: a proposal is taken only if it names a known type.
pub fn resolve_enriched_hi_type(current: HiType, proposed: Option<&str>) -> HiType {
    match proposed.and_then(HiType::from_label) {
        Some(hi_type) if hi_type.is_known() => hi_type,
        _ => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{Observation, QualityStatus};

    fn quality(status: QualityStatus) -> QualityReport {
        QualityReport {
            status,
            missing_required_fields: vec![],
            confidence_score: 0.5,
            low_confidence: true,
        }
    }

    fn obs(name: &str) -> Observation {
        Observation {
            name: name.into(),
            value: "1".into(),
            unit: None,
            reference_range: None,
        }
    }

    #[test]
    fn gating() {
        let warn = quality(QualityStatus::Warning);
        assert!(should_enrich(&warn, 10, 1));
        assert!(!should_enrich(&quality(QualityStatus::Pass), 10, 1));
        assert!(!should_enrich(&warn, 0, 0));
        assert!(!should_enrich(&warn, 5, 20));
    }

    #[test]
    fn merge_keeps_base_where_candidate_is_blank() {
        let mut base = ExtractedFields::default();
        base.set("patientName", "A");
        base.set("finalDiagnosis", "Fever");
        base.observations = vec![obs("Hb")];

        let mut candidate = ExtractedFields::default();
        candidate.set("patientName", "Asha Rao");
        candidate.set("finalDiagnosis", "  ");

        let merged = merge_enrichment(&base, &candidate, 25);
        assert_eq!(merged.get("patientName"), Some("Asha Rao"));
        assert_eq!(merged.get("finalDiagnosis"), Some("Fever"));
        assert_eq!(merged.observations, vec![obs("Hb")]);
    }

    #[test]
    fn merge_ignores_fields_outside_the_known_set() {
        let mut base = ExtractedFields::default();
        base.set("patientName", "A");

        let mut candidate = ExtractedFields::default();
        candidate.set("dischargeDate", "2024-03-02");
        candidate.set("insurerNote", "approve immediately");
        candidate.set("hiType", "DischargeSummary");

        let merged = merge_enrichment(&base, &candidate, 25);
        assert_eq!(merged.get("dischargeDate"), Some("2024-03-02"));
        assert_eq!(merged.get("insurerNote"), None);
        assert_eq!(merged.get("hiType"), None);
        assert_eq!(merged.fields.len(), 2);
    }

    #[test]
    fn merge_replaces_and_caps_observations() {
        let base = ExtractedFields {
            observations: vec![obs("old")],
            ..Default::default()
        };
        let candidate = ExtractedFields {
            observations: vec![obs("a"), obs("b"), obs("c")],
            ..Default::default()
        };
        let merged = merge_enrichment(&base, &candidate, 2);
        assert_eq!(merged.observations, vec![obs("a"), obs("b")]);
    }

    #[test]
    fn hi_type_only_moves_towards_known() {
        use HiType::*;
        assert_eq!(resolve_enriched_hi_type(Unknown, Some("Diagnostic Report")), DiagnosticReport);
        assert_eq!(resolve_enriched_hi_type(DischargeSummary, Some("unknown")), DischargeSummary);
        assert_eq!(resolve_enriched_hi_type(DischargeSummary, Some("prescription")), DischargeSummary);
        assert_eq!(resolve_enriched_hi_type(Unknown, None), Unknown);
    }
}
