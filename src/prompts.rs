//! Prompts for the OCR backend and the enrichment model.
//!
//! Keeping every prompt in one place means a wording change never touches
//! retry or parsing logic, and tests can inspect the prompts directly.

use crate::collaborators::HiType;

/// Separator the OCR prompt asks for between pages of a multi-image request.
pub const PAGE_BREAK: &str = "---PAGE BREAK---";

/// Longest slice of document text sent to the enrichment model.
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 8000;

const OCR_PROMPT_BODY: &str = r#"## CONTEXT
The text will be used to build health-claim records for insurance submission.

## DOCUMENT TYPES
- Discharge summaries
- Diagnostic reports and lab reports

## EXTRACT EVERYTHING
- Patient identifiers: UHID, patient ID, registration number, lab ID
- Dates exactly as written: admission, discharge, sample collection, report, date of birth
- Diagnoses, complaints, procedures, medications with dosages, doctor names
- Every test name, result value, unit, reference range and interpretation
- Hospital or lab name, address and contact details
- Insurance details if present: payer, policy number, member ID, claim ID

## OUTPUT RULES
1. Return the exact text as seen. Do not summarise.
2. Preserve medical terminology, abbreviations and acronyms.
3. Keep the original layout where possible, one field per line.
4. Include headers, footers, stamps and watermark text.
5. Do not interpret or analyse. Leave out what you cannot read rather than guessing.

Now extract all text from the document:"#;

/// Prompt for the OCR backend.
///
/// With more than one image the model is asked to keep page order and to
/// separate pages with [`PAGE_BREAK`].
pub fn build_ocr_prompt(image_count: usize) -> String {
    let page_instruction = if image_count > 1 {
        format!(
            "Extract all visible text from all images in order. Insert '{PAGE_BREAK}' between pages."
        )
    } else {
        "Extract all visible text from the image.".to_string()
    };
    format!(
        "You are a specialised medical document OCR engine for healthcare claim processing.\n\n\
         ## TASK\n{page_instruction}\n\n{OCR_PROMPT_BODY}"
    )
}

/// System prompt for the enrichment model.
pub const ENRICHMENT_SYSTEM_PROMPT: &str = "You are an expert medical document parser for \
healthcare claim submission. You answer with a single JSON object and nothing else.";

const ENRICHMENT_RULES: &str = r#"## RULES
1. Extract only what is explicitly stated. Never guess or fabricate.
2. Use null for missing fields, never empty strings or placeholders.
3. Dates use ISO format (YYYY-MM-DD).
4. Extract every lab observation of a diagnostic report.
5. Keep values exactly as shown in the document.

## FIELDS
Common: patientName, patientLocalId, patientGender, patientDob, patientAddress,
hospitalName, hospitalAddress, attendingPhysician, physicianRegNo, payerName,
policyNumber, memberId.
Diagnostic reports: testName, resultValue, observationDate, interpretation,
observations: [{"name": "...", "value": "...", "unit": "...", "referenceRange": "..."}].
Discharge summaries: admissionDate, dischargeDate, chiefComplaint, finalDiagnosis,
procedureDone, medications, followUp.

## OUTPUT
Return ONLY valid JSON, no markdown and no commentary:
{"hiType": "diagnostic_report" | "discharge_summary", "extracted": { ...fields... }}"#;

fn hi_type_display(hi_type: HiType) -> &'static str {
    match hi_type {
        HiType::DiagnosticReport => "Diagnostic Report (Lab Report)",
        HiType::DischargeSummary => "Discharge Summary",
        HiType::Unknown => "Unknown - determine from document content",
    }
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// User prompt for the enrichment model.
///
/// Carriage returns are dropped and the document is cut to `max_chars`.
pub fn build_enrichment_prompt(text: &str, hi_type: HiType, max_chars: usize) -> String {
    let cleaned = text.replace('\r', "");
    let document = truncate_chars(cleaned.trim(), max_chars);
    format!(
        "## DOCUMENT TYPE\n{}\n\n{ENRICHMENT_RULES}\n\n## INPUT DOCUMENT\n{document}\n\n\
         Now extract all data from the document:",
        hi_type_display(hi_type)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_page_prompt_has_no_separator_instruction() {
        let prompt = build_ocr_prompt(1);
        assert!(prompt.contains("Extract all visible text from the image."));
        assert!(!prompt.contains(PAGE_BREAK));
    }

    #[test]
    fn batch_prompt_asks_for_page_breaks() {
        let prompt = build_ocr_prompt(3);
        assert!(prompt.contains("from all images in order"));
        assert!(prompt.contains("'---PAGE BREAK---'"));
    }

    #[test]
    fn enrichment_prompt_names_type_and_truncates() {
        let text = "a".repeat(50);
        let prompt = build_enrichment_prompt(&text, HiType::DiagnosticReport, 10);
        assert!(prompt.contains("Diagnostic Report (Lab Report)"));
        assert!(prompt.contains(&"a".repeat(10)));
        assert!(!prompt.contains(&"a".repeat(11)));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
