//! Keyword classifier for clinical documents.
//!
//! Titles decide first ("Discharge Summary", "Lab Report", ...). Without a
//! decisive title, weighted hint phrases are scored per type, with a boost for
//! text that looks like a lab result table (units next to result headers).
//! Ties between two positive scores prefer discharge summaries.

use super::{Classifier, HiType};
use once_cell::sync::Lazy;
use regex::Regex;

struct Hint {
    pattern: Regex,
    weight: u32,
}

fn re(pattern: &str) -> Regex {
    // Patterns are literals in this file; a bad one is a programming error.
    Regex::new(&format!("(?i){pattern}")).unwrap_or_else(|e| panic!("invalid classifier regex {pattern}: {e}"))
}

fn hints(specs: &[(&str, u32)]) -> Vec<Hint> {
    specs
        .iter()
        .map(|(pattern, weight)| Hint {
            pattern: re(pattern),
            weight: *weight,
        })
        .collect()
}

static DISCHARGE_TITLES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        re(r"\bdischarge\s*(summary|card|note|advice)\b"),
        re(r"\bclinical\s*summary\b"),
    ]
});

static DIAGNOSTIC_TITLES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        re(r"\bdiagnostic\s*report\b"),
        re(r"\b(?:laboratory|lab)\s*report\b"),
        re(r"\binvestigation\s*report\b"),
        re(r"\bpathology\s*report\b"),
        re(r"\becho\s*cardio(?:graphy|gram)\s*report\b"),
    ]
});

static DISCHARGE_HINTS: Lazy<Vec<Hint>> = Lazy::new(|| {
    hints(&[
        (r"\bdischarge\s*(summary|card|note|advice)\b", 3),
        (r"\bdate\s*of\s*discharge\b", 2),
        (r"\bdate\s*of\s*admission\b", 2),
        (r"\badmission\s*date\b", 2),
        (r"\bfinal\s*diagnosis\b", 2),
        (r"\bdiagnosis\s*at\s*discharge\b", 2),
        (r"\bcondition\s*at\s*discharge\b", 2),
        (r"\bhospital\s*course\b", 2),
        (r"\bchief\s*complaints?\b", 1),
        (r"\bmedications?\s*on\s*discharge\b", 2),
    ])
});

static DIAGNOSTIC_HINTS: Lazy<Vec<Hint>> = Lazy::new(|| {
    hints(&[
        (r"\bdiagnostic\s*report\b", 3),
        (r"\b(?:laboratory|lab)\s*report\b", 3),
        (r"\binvestigation\s*report\b", 2),
        (r"\btest\s*name\b", 2),
        (r"\breference\s*(?:range|interval)\b", 2),
        (r"\bobservation\s*date\b", 1),
        (r"\binvestigation\s*result\b", 2),
        (r"\bparameter\s+result\s+unit\b", 3),
        (r"\b(?:biochemistry|hematology|haematology|microbiology)\b", 2),
        (r"\b(?:renal|liver|thyroid)\s*function\s*test\b", 2),
        (r"\b(?:cbc|complete\s*blood\s*count)\b", 2),
        (r"\bspecimen\b", 1),
        (r"\becho\s*cardio(?:graphy|gram)\b", 3),
        (r"\bcolour\s*doppler\b", 2),
        (r"\blvef\b", 2),
        (r"\bdiastolic\s*dysfunction\b", 1),
    ])
});

static LAB_UNITS: Lazy<Regex> =
    Lazy::new(|| re(r"(?:mg/dl|g/dl|iu/l|mmol/l|ng/ml|cells/cumm|pg/ml|\d\s*%)"));
static LAB_HEADERS: Lazy<Regex> =
    Lazy::new(|| re(r"\breference\s*(?:range|interval)|\binvestigation|\bresult\b"));

const LAB_SHAPE_BOOST: u32 = 2;

fn score(text: &str, hints: &[Hint]) -> u32 {
    hints
        .iter()
        .filter(|h| h.pattern.is_match(text))
        .map(|h| h.weight)
        .sum()
}

/// Title- and hint-based [`Classifier`].
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl Classifier for KeywordClassifier {
    fn detect_hi_type(&self, text: &str) -> HiType {
        let discharge_title = DISCHARGE_TITLES.iter().any(|r| r.is_match(text));
        let diagnostic_title = DIAGNOSTIC_TITLES.iter().any(|r| r.is_match(text));

        match (discharge_title, diagnostic_title) {
            (true, _) => return HiType::DischargeSummary,
            (false, true) => return HiType::DiagnosticReport,
            (false, false) => {}
        }

        let discharge = score(text, &DISCHARGE_HINTS);
        let lab_shape = LAB_UNITS.is_match(text) && LAB_HEADERS.is_match(text);
        let diagnostic = score(text, &DIAGNOSTIC_HINTS) + if lab_shape { LAB_SHAPE_BOOST } else { 0 };

        if discharge > diagnostic {
            HiType::DischargeSummary
        } else if diagnostic > discharge {
            HiType::DiagnosticReport
        } else if discharge > 0 {
            HiType::DischargeSummary
        } else {
            HiType::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(text: &str) -> HiType {
        KeywordClassifier.detect_hi_type(text)
    }

    #[test]
    fn titles_decide() {
        assert_eq!(detect("DISCHARGE SUMMARY\nPatient Name: A"), HiType::DischargeSummary);
        assert_eq!(detect("Laboratory Report\nHb 12 g/dl"), HiType::DiagnosticReport);
    }

    #[test]
    fn both_titles_prefer_discharge() {
        assert_eq!(
            detect("Discharge Summary with attached Lab Report"),
            HiType::DischargeSummary
        );
    }

    #[test]
    fn hints_without_title() {
        assert_eq!(
            detect("Date of Admission: 1 Jan\nFinal Diagnosis: Dengue"),
            HiType::DischargeSummary
        );
        assert_eq!(
            detect("Test Name: Haemoglobin\nResult: 11 g/dl\nReference Range: 12-16"),
            HiType::DiagnosticReport
        );
    }

    #[test]
    fn nothing_recognisable_is_unknown() {
        assert_eq!(detect("Invoice total 4,500 INR"), HiType::Unknown);
        assert_eq!(detect(""), HiType::Unknown);
    }
}
