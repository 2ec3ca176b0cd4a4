//! Label-driven structured extraction.
//!
//! Looks for `Label: value` pairs using the labels of the hospital template.
//! Good enough for typed discharge cards and single-test lab slips; anything
//! richer is the job of the enrichment pass or a deployment-specific
//! [`StructuredExtractor`].

use super::{ExtractedFields, HiType, Observation, StructuredExtractor};
use crate::template::HospitalTemplate;
use once_cell::sync::Lazy;
use regex::Regex;

const REFERENCE_LABELS: [&str; 4] = [
    "Biological Reference Interval",
    "Reference Range",
    "Ref Range",
    "Normal Range",
];

static NUMERIC_RESULT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<value>[<>]?\s*-?\d+(?:[.,]\d+)?)\s*(?P<unit>[^\s\d].*)?$")
        .unwrap_or_else(|e| panic!("numeric result regex: {e}"))
});

fn label_pattern(label: &str) -> Option<Regex> {
    // A label starts a line or follows a separator; the value runs until a
    // wide gap, a tab or a pipe, which is how columns appear in OCR text.
    let pattern = format!(
        r"(?im)(?:^|[\s|,;]){}\s*[:=\-]\s*(?P<value>[^\t|\r\n]+?)\s*(?:\s{{2,}}|\t|\||$)",
        regex::escape(label)
    );
    Regex::new(&pattern).ok()
}

fn find_labelled(text: &str, labels: &[String]) -> Option<String> {
    let mut by_length: Vec<&String> = labels.iter().collect();
    by_length.sort_by_key(|l| std::cmp::Reverse(l.len()));

    by_length.into_iter().find_map(|label| {
        let re = label_pattern(label)?;
        re.captures(text)
            .and_then(|c| c.name("value"))
            .map(|m| m.as_str().trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

fn observation_from(name: &str, result: &str, reference_range: Option<String>) -> Observation {
    let (value, unit) = match NUMERIC_RESULT.captures(result.trim()) {
        Some(caps) => (
            caps["value"].replace(' ', ""),
            caps.name("unit").map(|u| u.as_str().trim().to_string()),
        ),
        None => (result.trim().to_string(), None),
    };
    Observation {
        name: name.to_string(),
        value,
        unit: unit.filter(|u| !u.is_empty()),
        reference_range,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LabelExtractor;

impl StructuredExtractor for LabelExtractor {
    fn extract(&self, hi_type: HiType, text: &str, template: &HospitalTemplate) -> ExtractedFields {
        let mut extracted = ExtractedFields::default();
        let Some(doc_template) = template.for_hi_type(hi_type) else {
            return extracted;
        };

        for field in &doc_template.fields {
            if let Some(value) = find_labelled(text, &field.labels) {
                extracted.set(field.key.clone(), value);
            }
        }

        if hi_type == HiType::DiagnosticReport {
            if let (Some(test), Some(result)) = (extracted.get("testName"), extracted.get("resultValue")) {
                let reference: Vec<String> = REFERENCE_LABELS.iter().map(|l| l.to_string()).collect();
                let observation = observation_from(test, result, find_labelled(text, &reference));
                extracted.observations.push(observation);
            }
        }

        extracted
    }
}
