//! Hospital templates: which labels introduce which field, and which fields a
//! document type must carry to pass quality review.

use crate::collaborators::HiType;
use serde::{Deserialize, Serialize};

/// Labels that may introduce one extracted field, e.g. `"UHID"` for
/// `patientLocalId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLabels {
    pub key: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTemplate {
    pub fields: Vec<FieldLabels>,
    pub required_fields: Vec<String>,
}

impl DocumentTemplate {
    fn from_parts(fields: &[(&str, &[&str])], required: &[&str]) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|(key, labels)| FieldLabels {
                    key: key.to_string(),
                    labels: labels.iter().map(|l| l.to_string()).collect(),
                })
                .collect(),
            required_fields: required.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalTemplate {
    pub id: String,
    pub discharge_summary: DocumentTemplate,
    pub diagnostic_report: DocumentTemplate,
}

impl HospitalTemplate {
    /// `None` for [`HiType::Unknown`]: there is nothing to extract or require.
    pub fn for_hi_type(&self, hi_type: HiType) -> Option<&DocumentTemplate> {
        match hi_type {
            HiType::DischargeSummary => Some(&self.discharge_summary),
            HiType::DiagnosticReport => Some(&self.diagnostic_report),
            HiType::Unknown => None,
        }
    }
}

impl Default for HospitalTemplate {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            discharge_summary: DocumentTemplate::from_parts(
                &[
                    (
                        "patientName",
                        &["Patient Name", "Patient's Name", "Pt Name", "PatientName"],
                    ),
                    (
                        "patientLocalId",
                        &["UHID No", "UHID", "Local ID", "IP No", "Hospital No", "Reg No"],
                    ),
                    ("admissionDate", &["Date of Admission", "Admission Date", "DOA"]),
                    ("dischargeDate", &["Date of Discharge", "Discharge Date", "DOD"]),
                    (
                        "finalDiagnosis",
                        &["Final Diagnosis", "Diagnosis at Discharge", "Provisional Diagnosis"],
                    ),
                ],
                &["patientName", "patientLocalId", "finalDiagnosis"],
            ),
            diagnostic_report: DocumentTemplate::from_parts(
                &[
                    (
                        "patientName",
                        &["Patient Name", "PatientName", "Patient's Name", "Pt Name"],
                    ),
                    (
                        "patientLocalId",
                        &[
                            "UHID No",
                            "UHID",
                            "Local ID",
                            "Patient ID",
                            "PatientID",
                            "Reg No",
                            "Lab No",
                        ],
                    ),
                    (
                        "testName",
                        &["Investigation Name", "Test Name", "Investigation", "Test"],
                    ),
                    ("resultValue", &["Test Result", "Observed Value", "Result", "Value"]),
                    (
                        "observationDate",
                        &[
                            "Observation Date",
                            "Report Date",
                            "Sample Date",
                            "Collected On",
                            "Reported On",
                        ],
                    ),
                ],
                &["patientName", "patientLocalId", "testName", "resultValue"],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_requirements() {
        let t = HospitalTemplate::default();
        assert_eq!(t.id, "default");
        assert_eq!(
            t.discharge_summary.required_fields,
            vec!["patientName", "patientLocalId", "finalDiagnosis"]
        );
        assert_eq!(t.diagnostic_report.required_fields.len(), 4);
        assert!(t.for_hi_type(HiType::Unknown).is_none());
    }
}
