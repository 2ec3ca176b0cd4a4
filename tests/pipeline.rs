//! Claim conversion end to end with the default collaborators.

use async_trait::async_trait;
use claimscan::collaborators::{
    ComplianceStatus, Enrichment, EnrichmentDiagnostics, EnrichmentRequest, ExtractedFields,
    QualityStatus, ValidationStatus,
};
use claimscan::document::{DiagnosticStage, Diagnostics};
use claimscan::error::EnrichmentError;
use claimscan::hashing::{sha256_hex, HashSource};
use claimscan::pipeline::BUNDLE_MAPPING_FAILED;
use claimscan::{
    AuditAction, ClaimPipeline, ClaimRequest, Document, Enricher, ExtractionEngine,
    ExtractionMode, ExtractionResult, HiType, PipelineConfig, PipelineError,
    PipelineProgressCallback, TextSource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const DISCHARGE: &str = "DISCHARGE SUMMARY\n\
    Patient Name: Ravi Kumar\n\
    UHID: H-1001\n\
    Date of Admission: 01/02/2024\n\
    Date of Discharge: 05/02/2024\n\
    Final Diagnosis: Dengue fever\n";

const LAB: &str = "LABORATORY REPORT\n\
    Patient Name: Ravi Kumar\n\
    Patient ID: H-1001\n\
    Test Name: Haemoglobin\n\
    Result: 13.5 g/dL\n\
    Reference Range: 12-16\n\
    Report Date: 03/02/2024\n";

/// Discharge card without a final diagnosis.
const INCOMPLETE_DISCHARGE: &str = "DISCHARGE SUMMARY\n\
    Patient Name: Asha Rao\n\
    UHID: H-2002\n\
    Hospital Course: uneventful recovery\n";

// ── Fakes ────────────────────────────────────────────────────────────────────

struct Fixed(ExtractionResult);

#[async_trait]
impl TextSource for Fixed {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn extract(&self, _doc: &Document) -> ExtractionResult {
        self.0.clone()
    }
}

fn engine(digital: ExtractionResult, ocr: ExtractionResult) -> Arc<ExtractionEngine> {
    Arc::new(ExtractionEngine::new(Arc::new(Fixed(digital)), Arc::new(Fixed(ocr))))
}

fn unreachable_ocr() -> ExtractionResult {
    let mut diagnostics = Diagnostics::for_engine("ollama");
    diagnostics.push(DiagnosticStage::OcrBackendUnreachable, "Unable to reach OCR backend");
    ExtractionResult::new("", ExtractionMode::OcrWorker).with_diagnostics(diagnostics)
}

enum EnricherReply {
    Diagnosis(&'static str),
    Fails,
}

struct FakeEnricher {
    reply: EnricherReply,
    seen: Mutex<Vec<String>>,
}

impl FakeEnricher {
    fn new(reply: EnricherReply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Enricher for FakeEnricher {
    async fn enhance(&self, request: &EnrichmentRequest) -> Result<Option<Enrichment>, EnrichmentError> {
        self.seen.lock().unwrap().push(request.source_file_name.clone());
        match self.reply {
            EnricherReply::Diagnosis(diagnosis) => {
                let mut extracted = ExtractedFields::default();
                extracted.set("finalDiagnosis", diagnosis);
                Ok(Some(Enrichment {
                    hi_type: Some("discharge_summary".into()),
                    extracted,
                    diagnostics: EnrichmentDiagnostics {
                        provider: "fake".into(),
                        model: "fake-1".into(),
                        status: "ok".into(),
                    },
                }))
            }
            EnricherReply::Fails => Err(EnrichmentError::CallFailed {
                attempts: 2,
                detail: "connection reset".into(),
            }),
        }
    }
}

#[derive(Default)]
struct Recorder {
    batch_total: AtomicUsize,
    started: Mutex<Vec<usize>>,
    completed: Mutex<Vec<(String, HiType, bool)>>,
    passed: AtomicUsize,
}

impl PipelineProgressCallback for Recorder {
    fn on_batch_start(&self, total_documents: usize) {
        self.batch_total.store(total_documents, Ordering::SeqCst);
    }

    fn on_document_start(&self, index: usize, _file_name: &str) {
        self.started.lock().unwrap().push(index);
    }

    fn on_document_complete(&self, file_name: &str, hi_type: HiType, enriched: bool) {
        self.completed
            .lock()
            .unwrap()
            .push((file_name.to_string(), hi_type, enriched));
    }

    fn on_batch_complete(&self, _total_documents: usize, passed: usize) {
        self.passed.store(passed, Ordering::SeqCst);
    }
}

fn actions(output: &claimscan::ClaimConversionOutput) -> Vec<AuditAction> {
    output.audit_log.iter().map(|e| e.action).collect()
}

// ── Conversions ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn inline_documents_become_valid_bundles() {
    let request = ClaimRequest::new(
        "CLM-001",
        vec![
            Document::new("discharge.txt").with_text(DISCHARGE),
            Document::new("lab.txt").with_text(LAB),
            Document::new("discharge-copy.txt").with_text(DISCHARGE),
        ],
    );

    let output = ClaimPipeline::default().convert(request).await.unwrap();

    assert!(output.all_passed(), "{:?}", output.validation_report);
    assert_eq!(output.bundles.len(), 3);
    assert_eq!(output.metadata.claim_id, "CLM-001");
    assert_eq!(output.metadata.hospital_id, "default");
    assert_eq!(output.metadata.template_id, "default");
    assert_eq!(output.metadata.documents_count, 3);
    assert_eq!(output.metadata.successful_count, 3);
    assert_eq!(output.metadata.failed_count, 0);
    assert_eq!(output.validation_report.status, ValidationStatus::Pass);

    // Results follow request order regardless of completion order.
    let names: Vec<&str> = output.results.iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(names, ["discharge.txt", "lab.txt", "discharge-copy.txt"]);
    let types: Vec<HiType> = output.classifications.iter().map(|c| c.hi_type).collect();
    assert_eq!(
        types,
        [HiType::DischargeSummary, HiType::DiagnosticReport, HiType::DischargeSummary]
    );

    let lab = &output.results[1];
    assert_eq!(lab.quality.status, QualityStatus::Pass);
    assert_eq!(lab.extraction.source_mode, "provided");
    assert_eq!(lab.sha256, sha256_hex(LAB));
    assert_eq!(lab.compliance.overall_status, ComplianceStatus::Pass);
    assert!(!lab.enriched);

    for report in &output.extraction_reports {
        assert_eq!(report.source_mode, "provided");
        assert_eq!(report.hash_source, HashSource::Text);
        assert!(report.metadata.is_none());
    }

    let actions = actions(&output);
    assert_eq!(actions[0], AuditAction::ConvertStarted);
    assert_eq!(
        actions.iter().filter(|a| **a == AuditAction::DocumentConverted).count(),
        3
    );
}

#[tokio::test]
async fn unrecognised_document_is_reported_not_fatal() {
    let request = ClaimRequest::new(
        "CLM-002",
        vec![
            Document::new("discharge.txt").with_text(DISCHARGE),
            Document::new("letter.txt").with_text("Dear sir, please find the invoice attached."),
        ],
    )
    .hospital_id("HOSP-9");

    let output = ClaimPipeline::default().convert(request).await.unwrap();

    assert!(!output.all_passed());
    assert_eq!(output.metadata.hospital_id, "HOSP-9");
    assert_eq!(output.bundles.len(), 1);
    assert_eq!(output.metadata.failed_count, 1);

    let letter = &output.results[1];
    assert_eq!(letter.hi_type, HiType::Unknown);
    assert!(letter.bundle.is_none());
    assert_eq!(letter.validation.errors[0].code, BUNDLE_MAPPING_FAILED);
    assert_eq!(output.validation_report.bundle_reports[1].bundle_index, 1);
}

#[tokio::test]
async fn explicit_hash_is_kept() {
    let request = ClaimRequest::new(
        "CLM-003",
        vec![Document::new("discharge.txt").with_text(DISCHARGE).with_sha256("abc123")],
    );

    let output = ClaimPipeline::default().convert(request).await.unwrap();

    assert_eq!(output.results[0].sha256, "abc123");
    assert_eq!(output.extraction_reports[0].hash_source, HashSource::Provided);
}

#[tokio::test]
async fn engine_text_is_used_when_nothing_is_inline() {
    let request = ClaimRequest::new(
        "CLM-004",
        // Blank inline text does not count as provided.
        vec![Document::new("scan.pdf").with_file_path("/claims/scan.pdf").with_text("  ")],
    )
    .extraction_engine(engine(
        ExtractionResult::empty(ExtractionMode::DigitalEmpty, "no_text_layer"),
        ExtractionResult::new(LAB, ExtractionMode::OcrWorker).with_confidence(0.8),
    ));

    let output = ClaimPipeline::default().convert(request).await.unwrap();

    let result = &output.results[0];
    assert_eq!(result.extraction.source_mode, "ocr_worker");
    assert_eq!(result.hi_type, HiType::DiagnosticReport);
    let report = &output.extraction_reports[0];
    assert_eq!(report.metadata.as_ref().unwrap().confidence, Some(0.8));
    assert_eq!(report.hash_source, HashSource::Text);
}

#[tokio::test]
async fn empty_extraction_is_audited() {
    let request = ClaimRequest::new("CLM-005", vec![Document::new("blank.pdf").with_file_path("/claims/blank.pdf")])
        .extraction_engine(engine(
            ExtractionResult::empty(ExtractionMode::DigitalEmpty, "no_text_layer"),
            ExtractionResult::new("", ExtractionMode::OcrWorker),
        ));

    let output = ClaimPipeline::default().convert(request).await.unwrap();

    assert_eq!(output.results[0].extraction.text_length, 0);
    assert_eq!(output.results[0].extraction.source_mode, "extraction_empty");
    let empty = output
        .audit_log
        .iter()
        .find(|e| e.action == AuditAction::ExtractionEmpty)
        .expect("extraction_empty event");
    assert_eq!(empty.document.as_deref(), Some("blank.pdf"));
}

#[tokio::test]
async fn unreachable_ocr_aborts_the_claim() {
    let request = ClaimRequest::new(
        "CLM-006",
        vec![
            Document::new("discharge.txt").with_text(DISCHARGE),
            Document::new("scan.pdf").with_file_path("/claims/scan.pdf"),
        ],
    )
    .extraction_engine(engine(
        ExtractionResult::empty(ExtractionMode::DigitalEmpty, "no_text_layer"),
        unreachable_ocr(),
    ));

    let err = ClaimPipeline::default().convert(request).await.unwrap_err();

    assert_eq!(err.code(), "DOCUMENT_EXTRACTION_FAILED");
    match err {
        PipelineError::ExtractionFailed {
            file_name,
            reason,
            metadata,
        } => {
            assert_eq!(file_name, "scan.pdf");
            assert_eq!(reason, "ocr_backend_unreachable_no_text_fallback");
            assert!(metadata.fatal);
            assert_eq!(metadata.attempts.len(), 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn invalid_request_lists_every_violation() {
    let request = ClaimRequest::new(" ", vec![Document::new(""), Document::new("ok.txt")]);

    let err = ClaimPipeline::default().convert(request).await.unwrap_err();

    match err {
        PipelineError::InvalidInput { violations } => {
            assert_eq!(
                violations,
                [
                    "claimId must be a non-empty string",
                    "documents[0] must have a valid fileName",
                ]
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ── Enrichment ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn enrichment_completes_a_weak_document() {
    let enricher = FakeEnricher::new(EnricherReply::Diagnosis("Typhoid fever"));
    let request = ClaimRequest::new(
        "CLM-007",
        vec![
            Document::new("complete.txt").with_text(DISCHARGE),
            Document::new("incomplete.txt").with_text(INCOMPLETE_DISCHARGE),
        ],
    )
    .enricher(enricher.clone());

    let output = ClaimPipeline::default().convert(request).await.unwrap();

    // Documents that already pass review are not sent.
    assert_eq!(*enricher.seen.lock().unwrap(), ["incomplete.txt"]);

    let enriched = &output.results[1];
    assert!(enriched.enriched);
    assert_eq!(enriched.quality.status, QualityStatus::Pass);
    assert!(enriched.validation.passed());
    assert!(!output.results[0].enriched);

    let applied: Vec<_> = output
        .audit_log
        .iter()
        .filter(|e| e.action == AuditAction::LlmEnrichmentApplied)
        .collect();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].document.as_deref(), Some("incomplete.txt"));
}

#[tokio::test]
async fn enrichment_failure_is_absorbed() {
    let enricher = FakeEnricher::new(EnricherReply::Fails);
    let request = ClaimRequest::new(
        "CLM-008",
        vec![Document::new("incomplete.txt").with_text(INCOMPLETE_DISCHARGE)],
    )
    .enricher(enricher.clone());

    let output = ClaimPipeline::default().convert(request).await.unwrap();

    assert_eq!(enricher.seen.lock().unwrap().len(), 1);
    let result = &output.results[0];
    assert!(!result.enriched);
    assert_eq!(result.quality.status, QualityStatus::Warning);
    assert_eq!(result.quality.missing_required_fields, ["finalDiagnosis"]);
    // Still mapped; the bundle simply carries no Condition.
    assert!(result.bundle.is_some());
    assert!(!actions(&output).contains(&AuditAction::LlmEnrichmentApplied));
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_callback_sees_every_document() {
    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::builder()
        .document_concurrency(1)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let pipeline = ClaimPipeline::builder().config(config).build().unwrap();
    let request = ClaimRequest::new(
        "CLM-009",
        vec![
            Document::new("discharge.txt").with_text(DISCHARGE),
            Document::new("lab.txt").with_text(LAB),
        ],
    );

    pipeline.convert(request).await.unwrap();

    assert_eq!(recorder.batch_total.load(Ordering::SeqCst), 2);
    assert_eq!(*recorder.started.lock().unwrap(), [0, 1]);
    assert_eq!(
        *recorder.completed.lock().unwrap(),
        [
            ("discharge.txt".to_string(), HiType::DischargeSummary, false),
            ("lab.txt".to_string(), HiType::DiagnosticReport, false),
        ]
    );
    assert_eq!(recorder.passed.load(Ordering::SeqCst), 2);
}
