//! Claim bundle construction.
//!
//! One bundle per source document: a Patient, an Encounter, the clinical
//! resources for the document type, and a DocumentReference that pins the
//! source by hash.

use super::{
    Bundle, BundleEntry, BundleMapper, BundleMeta, ExtractedFields, HiType, Identifier,
    MappingInput, NHCX_CLAIM_BUNDLE_PROFILE,
};
use crate::error::MappingError;
use serde_json::{json, Value};
use tracing::debug;

const PATIENT_ID: &str = "patient-1";
const UNKNOWN_IDENTIFIER: &str = "UNKNOWN";

#[derive(Debug, Clone)]
pub struct ClaimBundleMapper {
    /// Namespace for claim and patient identifiers.
    pub identifier_system: String,
}

impl Default for ClaimBundleMapper {
    fn default() -> Self {
        Self {
            identifier_system: "https://example-hsp.local".to_string(),
        }
    }
}

fn patient_reference() -> Value {
    json!({ "reference": format!("Patient/{PATIENT_ID}") })
}

impl ClaimBundleMapper {
    fn patient(&self, extracted: &ExtractedFields) -> Value {
        let mut patient = json!({
            "resourceType": "Patient",
            "id": PATIENT_ID,
            "identifier": [{
                "system": format!("{}/patient-id", self.identifier_system),
                "value": extracted.get("patientLocalId").unwrap_or(UNKNOWN_IDENTIFIER),
            }],
        });
        if let Some(name) = extracted.get("patientName") {
            patient["name"] = json!([{ "text": name }]);
        }
        patient
    }

    fn encounter(extracted: &ExtractedFields) -> Value {
        let mut encounter = json!({
            "resourceType": "Encounter",
            "id": "encounter-1",
            "status": "finished",
            "subject": patient_reference(),
        });
        let start = extracted.get("admissionDate");
        let end = extracted.get("dischargeDate");
        if start.is_some() || end.is_some() {
            let mut period = serde_json::Map::new();
            if let Some(s) = start {
                period.insert("start".into(), json!(s));
            }
            if let Some(e) = end {
                period.insert("end".into(), json!(e));
            }
            encounter["period"] = Value::Object(period);
        }
        encounter
    }

    fn discharge_resources(extracted: &ExtractedFields) -> Vec<Value> {
        let mut resources = Vec::new();
        let mut sections = Vec::new();

        if let Some(diagnosis) = extracted.get("finalDiagnosis") {
            resources.push(json!({
                "resourceType": "Condition",
                "id": "condition-1",
                "subject": patient_reference(),
                "code": { "text": diagnosis },
            }));
            sections.push(json!({
                "title": "Final Diagnosis",
                "entry": [{ "reference": "Condition/condition-1" }],
            }));
        }

        resources.push(json!({
            "resourceType": "Composition",
            "id": "composition-1",
            "status": "final",
            "title": "Discharge Summary",
            "subject": patient_reference(),
            "encounter": { "reference": "Encounter/encounter-1" },
            "section": sections,
        }));
        resources
    }

    fn diagnostic_resources(extracted: &ExtractedFields) -> Vec<Value> {
        let mut resources: Vec<Value> = extracted
            .observations
            .iter()
            .enumerate()
            .map(|(i, obs)| {
                let mut observation = json!({
                    "resourceType": "Observation",
                    "id": format!("observation-{}", i + 1),
                    "status": "final",
                    "subject": patient_reference(),
                    "code": { "text": obs.name },
                });
                match (obs.value.parse::<f64>(), obs.unit.as_deref()) {
                    (Ok(number), Some(unit)) => {
                        observation["valueQuantity"] = json!({ "value": number, "unit": unit });
                    }
                    _ => {
                        let text = match obs.unit.as_deref() {
                            Some(unit) => format!("{} {}", obs.value, unit),
                            None => obs.value.clone(),
                        };
                        observation["valueString"] = json!(text);
                    }
                }
                if let Some(range) = &obs.reference_range {
                    observation["referenceRange"] = json!([{ "text": range }]);
                }
                if let Some(date) = extracted.get("observationDate") {
                    observation["effectiveDateTime"] = json!(date);
                }
                observation
            })
            .collect();

        let results: Vec<Value> = (1..=resources.len())
            .map(|i| json!({ "reference": format!("Observation/observation-{i}") }))
            .collect();

        resources.push(json!({
            "resourceType": "DiagnosticReport",
            "id": "diagnostic-report-1",
            "status": "final",
            "subject": patient_reference(),
            "code": { "text": extracted.get("testName").unwrap_or("Diagnostic report") },
            "result": results,
        }));
        resources
    }

    fn document_reference(input: &MappingInput<'_>) -> Value {
        let sha256 = if input.source.sha256.trim().is_empty() {
            "missing-sha256"
        } else {
            input.source.sha256
        };
        json!({
            "resourceType": "DocumentReference",
            "id": "document-reference-1",
            "status": "current",
            "identifier": [{ "system": "urn:sha256", "value": sha256 }],
            "type": { "text": input.hi_type.as_str() },
            "subject": patient_reference(),
            "content": [{
                "attachment": {
                    "title": input.source.file_name,
                    "contentType": input.source.content_type.unwrap_or("application/pdf"),
                }
            }],
        })
    }
}

impl BundleMapper for ClaimBundleMapper {
    fn map(&self, input: &MappingInput<'_>) -> Result<Bundle, MappingError> {
        if input.claim_id.trim().is_empty() {
            return Err(MappingError::MissingClaimId);
        }

        let clinical = match input.hi_type {
            HiType::DischargeSummary => Self::discharge_resources(input.extracted),
            HiType::DiagnosticReport => Self::diagnostic_resources(input.extracted),
            HiType::Unknown => {
                return Err(MappingError::InvalidHiType(input.hi_type.to_string()));
            }
        };

        let mut resources = vec![self.patient(input.extracted), Self::encounter(input.extracted)];
        resources.extend(clinical);
        resources.push(Self::document_reference(input));

        debug!(
            "Mapped {} resources for '{}' ({})",
            resources.len(),
            input.source.file_name,
            input.hi_type
        );

        Ok(Bundle {
            resource_type: "Bundle".to_string(),
            bundle_type: "collection".to_string(),
            identifier: Identifier {
                system: format!("{}/claim", self.identifier_system),
                value: input.claim_id.to_string(),
            },
            meta: BundleMeta {
                profile: vec![NHCX_CLAIM_BUNDLE_PROFILE.to_string()],
            },
            entry: resources
                .into_iter()
                .map(|resource| BundleEntry { resource })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{Observation, SourceDocument};

    fn input<'a>(claim_id: &'a str, hi_type: HiType, extracted: &'a ExtractedFields) -> MappingInput<'a> {
        MappingInput {
            claim_id,
            hi_type,
            extracted,
            source: SourceDocument {
                file_name: "doc.pdf",
                sha256: "abc123",
                content_type: None,
            },
        }
    }

    #[test]
    fn rejects_missing_claim_id_and_unknown_type() {
        let e = ExtractedFields::default();
        let mapper = ClaimBundleMapper::default();
        assert_eq!(
            mapper.map(&input(" ", HiType::DischargeSummary, &e)).unwrap_err(),
            MappingError::MissingClaimId
        );
        assert!(matches!(
            mapper.map(&input("C1", HiType::Unknown, &e)).unwrap_err(),
            MappingError::InvalidHiType(_)
        ));
    }

    #[test]
    fn discharge_bundle_shape() {
        let mut e = ExtractedFields::default();
        e.set("patientName", "Ravi");
        e.set("patientLocalId", "UH-1");
        e.set("finalDiagnosis", "Appendicitis");
        let bundle = ClaimBundleMapper::default()
            .map(&input("CLM-9", HiType::DischargeSummary, &e))
            .unwrap();

        assert_eq!(bundle.resource_type, "Bundle");
        assert_eq!(bundle.identifier.value, "CLM-9");
        assert_eq!(bundle.meta.profile, vec![NHCX_CLAIM_BUNDLE_PROFILE]);
        let condition = bundle.resources_of("Condition").next().unwrap();
        assert_eq!(condition["code"]["text"], "Appendicitis");
        let doc_ref = bundle.resources_of("DocumentReference").next().unwrap();
        assert_eq!(doc_ref["identifier"][0]["value"], "abc123");
    }

    #[test]
    fn diagnostic_bundle_links_observations() {
        let mut e = ExtractedFields::default();
        e.observations.push(Observation {
            name: "Hb".into(),
            value: "11.2".into(),
            unit: Some("g/dL".into()),
            reference_range: None,
        });
        let bundle = ClaimBundleMapper::default()
            .map(&input("CLM-9", HiType::DiagnosticReport, &e))
            .unwrap();
        let report = bundle.resources_of("DiagnosticReport").next().unwrap();
        assert_eq!(report["result"][0]["reference"], "Observation/observation-1");
        let obs = bundle.resources_of("Observation").next().unwrap();
        assert_eq!(obs["valueQuantity"]["value"], 11.2);
    }
}
