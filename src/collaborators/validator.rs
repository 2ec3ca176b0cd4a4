//! Structural validation of claim bundles.
//!
//! Checks what downstream claim submission relies on: the bundle profile,
//! unique resource ids, an identified and named patient, a hash-pinned
//! DocumentReference, and well-linked clinical resources. It is not a FHIR
//! profile validator.

use super::{Bundle, BundleValidation, BundleValidator, ValidationIssue, NHCX_CLAIM_BUNDLE_PROFILE};
use serde_json::Value;
use std::collections::HashSet;

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn subject_of(resource: &Value) -> Option<&str> {
    str_at(resource, "/subject/reference")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralValidator;

impl StructuralValidator {
    fn check_ids(bundle: &Bundle, errors: &mut Vec<ValidationIssue>) {
        let mut seen = HashSet::new();
        for id in bundle.resources().filter_map(|r| str_at(r, "/id")) {
            if !seen.insert(id) {
                errors.push(ValidationIssue::new(
                    "DUPLICATE_RESOURCE_ID",
                    format!("Duplicate resource id '{id}' found in bundle"),
                    "entry.resource.id",
                ));
            }
        }
    }

    fn check_patient_and_source(
        bundle: &Bundle,
        patient_ref: Option<&str>,
        errors: &mut Vec<ValidationIssue>,
    ) {
        match bundle.resources_of("Patient").next() {
            None => errors.push(ValidationIssue::new(
                "PATIENT_MISSING",
                "Patient resource is required",
                "entry[Patient]",
            )),
            Some(patient) => {
                let identified = str_at(patient, "/identifier/0/value")
                    .is_some_and(|v| v != "UNKNOWN");
                if !identified {
                    errors.push(ValidationIssue::new(
                        "PATIENT_IDENTIFIER_MISSING",
                        "Patient identifier value is required",
                        "Patient.identifier[0].value",
                    ));
                }
                if str_at(patient, "/name/0/text").is_none() {
                    errors.push(ValidationIssue::new(
                        "PATIENT_NAME_MISSING",
                        "Patient name is required",
                        "Patient.name[0].text",
                    ));
                }
            }
        }

        let doc_refs: Vec<&Value> = bundle.resources_of("DocumentReference").collect();
        if doc_refs.is_empty() {
            errors.push(ValidationIssue::new(
                "DOCUMENT_REFERENCE_MISSING",
                "DocumentReference resource is required",
                "entry[DocumentReference]",
            ));
            return;
        }
        for (i, doc_ref) in doc_refs.iter().enumerate() {
            if str_at(doc_ref, "/identifier/0/value").is_none() {
                errors.push(ValidationIssue::new(
                    "DOCUMENT_REFERENCE_SOURCE_MISSING",
                    "DocumentReference source hash is required",
                    format!("DocumentReference[{i}].identifier[0].value"),
                ));
            }
            if patient_ref.is_some() && subject_of(doc_ref) != patient_ref {
                errors.push(ValidationIssue::new(
                    "DOCUMENT_REFERENCE_SUBJECT_INVALID",
                    "DocumentReference subject must reference the Patient resource",
                    format!("DocumentReference[{i}].subject.reference"),
                ));
            }
        }
    }

    fn check_diagnostic(bundle: &Bundle, patient_ref: Option<&str>, errors: &mut Vec<ValidationIssue>) {
        let reports: Vec<&Value> = bundle.resources_of("DiagnosticReport").collect();
        if reports.is_empty() {
            return;
        }
        let observations: Vec<&Value> = bundle.resources_of("Observation").collect();
        if observations.is_empty() {
            errors.push(ValidationIssue::new(
                "DIAGNOSTIC_OBSERVATION_MISSING",
                "DiagnosticReport requires at least one Observation",
                "entry[Observation]",
            ));
        }
        let observation_ids: HashSet<&str> =
            observations.iter().filter_map(|o| str_at(o, "/id")).collect();

        for (i, report) in reports.iter().enumerate() {
            if patient_ref.is_some() && subject_of(report) != patient_ref {
                errors.push(ValidationIssue::new(
                    "DIAGNOSTIC_REPORT_SUBJECT_INVALID",
                    "DiagnosticReport subject must reference the Patient resource",
                    format!("DiagnosticReport[{i}].subject.reference"),
                ));
            }
            let results = report.get("result").and_then(Value::as_array);
            let results = results.map(Vec::as_slice).unwrap_or_default();
            if results.is_empty() {
                errors.push(ValidationIssue::new(
                    "DIAGNOSTIC_REPORT_RESULT_MISSING",
                    "DiagnosticReport.result must contain Observation references",
                    format!("DiagnosticReport[{i}].result"),
                ));
            }
            for (r, result) in results.iter().enumerate() {
                let target = str_at(result, "/reference")
                    .and_then(|reference| reference.strip_prefix("Observation/"));
                if !target.is_some_and(|id| observation_ids.contains(id)) {
                    errors.push(ValidationIssue::new(
                        "DIAGNOSTIC_REPORT_RESULT_REFERENCE_INVALID",
                        "DiagnosticReport.result references must point to existing Observation resources",
                        format!("DiagnosticReport[{i}].result[{r}].reference"),
                    ));
                }
            }
        }

        for (i, observation) in observations.iter().enumerate() {
            if patient_ref.is_some() && subject_of(observation) != patient_ref {
                errors.push(ValidationIssue::new(
                    "OBSERVATION_SUBJECT_INVALID",
                    "Observation subject must reference the Patient resource",
                    format!("Observation[{i}].subject.reference"),
                ));
            }
            let has_value = observation.get("valueString").is_some_and(Value::is_string)
                || observation
                    .pointer("/valueQuantity/value")
                    .is_some_and(Value::is_number);
            if !has_value {
                errors.push(ValidationIssue::new(
                    "OBSERVATION_VALUE_MISSING",
                    "Observation must contain valueString or valueQuantity.value",
                    format!("Observation[{i}]"),
                ));
            }
        }
    }

    fn check_discharge(bundle: &Bundle, patient_ref: Option<&str>, errors: &mut Vec<ValidationIssue>) {
        if bundle.resources_of("DiagnosticReport").next().is_some() {
            return;
        }
        let conditions: Vec<&Value> = bundle.resources_of("Condition").collect();
        if conditions.is_empty() && bundle.resources_of("Composition").next().is_none() {
            errors.push(ValidationIssue::new(
                "DISCHARGE_CLINICAL_RESOURCE_MISSING",
                "Discharge bundle must include Condition or Composition resource",
                "entry[Condition|Composition]",
            ));
        }
        for (i, condition) in conditions.iter().enumerate() {
            if patient_ref.is_some() && subject_of(condition) != patient_ref {
                errors.push(ValidationIssue::new(
                    "CONDITION_SUBJECT_INVALID",
                    "Condition subject must reference the Patient resource",
                    format!("Condition[{i}].subject.reference"),
                ));
            }
            if str_at(condition, "/code/text").is_none() {
                errors.push(ValidationIssue::new(
                    "CONDITION_CODE_MISSING",
                    "Condition.code.text is required",
                    format!("Condition[{i}].code.text"),
                ));
            }
        }
    }
}

impl BundleValidator for StructuralValidator {
    fn validate_bundle(&self, bundle: &Bundle) -> BundleValidation {
        let mut errors = Vec::new();

        if bundle.resource_type != "Bundle" {
            errors.push(ValidationIssue::new(
                "BUNDLE_RESOURCE_TYPE_INVALID",
                "resourceType must be Bundle",
                "resourceType",
            ));
        }
        if !bundle.meta.profile.iter().any(|p| p == NHCX_CLAIM_BUNDLE_PROFILE) {
            errors.push(ValidationIssue::new(
                "BUNDLE_PROFILE_MISSING",
                "NHCX claim bundle profile is missing",
                "meta.profile",
            ));
        }

        let patient_ref = bundle
            .resources_of("Patient")
            .next()
            .and_then(|p| str_at(p, "/id"))
            .map(|id| format!("Patient/{id}"));
        let patient_ref = patient_ref.as_deref();

        Self::check_ids(bundle, &mut errors);
        Self::check_patient_and_source(bundle, patient_ref, &mut errors);
        Self::check_diagnostic(bundle, patient_ref, &mut errors);
        Self::check_discharge(bundle, patient_ref, &mut errors);

        let clinical = ["DiagnosticReport", "Observation", "Condition", "Composition"]
            .iter()
            .any(|kind| bundle.resources_of(kind).next().is_some());
        if !clinical {
            errors.push(ValidationIssue::new(
                "CLINICAL_RESOURCE_MISSING",
                "At least one clinical resource (DiagnosticReport/Observation/Condition/Composition) is required",
                "entry",
            ));
        }

        BundleValidation::from_issues(errors)
    }
}
