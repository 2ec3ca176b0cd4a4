//! Extraction engine strategies over scripted text sources.

use async_trait::async_trait;
use claimscan::document::{DiagnosticStage, Diagnostics, FallbackReason};
use claimscan::error::{OcrError, TransportError};
use claimscan::ocr::{OcrTransport, PageRasterizer, TransportResponse};
use claimscan::extraction::{
    OcrAdapter, REASON_NO_TEXT_DIGITAL_FIRST, REASON_NO_TEXT_OCR_FIRST,
    REASON_OCR_UNREACHABLE_NO_FALLBACK, REASON_SCAN_UNREACHABLE,
};
use claimscan::{
    Document, ExtractionEngine, ExtractionMode, ExtractionResult, OcrBackend, OcrClient, OcrConfig,
    OcrInput, OcrOutput, TextSource,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Returns the same result every time and records the order of calls.
struct Scripted {
    name: &'static str,
    result: ExtractionResult,
    calls: AtomicUsize,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl Scripted {
    fn new(name: &'static str, result: ExtractionResult, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            result,
            calls: AtomicUsize::new(0),
            log: log.clone(),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextSource for Scripted {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn extract(&self, _doc: &Document) -> ExtractionResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(self.name);
        self.result.clone()
    }
}

struct Fixture {
    digital: Arc<Scripted>,
    ocr: Arc<Scripted>,
    log: Arc<Mutex<Vec<&'static str>>>,
    engine: ExtractionEngine,
}

fn fixture(digital: ExtractionResult, ocr: ExtractionResult) -> Fixture {
    let log = Arc::new(Mutex::new(Vec::new()));
    let digital = Scripted::new("digital", digital, &log);
    let ocr = Scripted::new("ocr", ocr, &log);
    let engine = ExtractionEngine::new(digital.clone(), ocr.clone());
    Fixture {
        digital,
        ocr,
        log,
        engine,
    }
}

fn digital_text(text: &str) -> ExtractionResult {
    ExtractionResult::new(text, ExtractionMode::DigitalTextLayer)
}

fn digital_empty() -> ExtractionResult {
    ExtractionResult::empty(ExtractionMode::DigitalEmpty, "no_text_layer")
}

fn ocr_text(text: &str) -> ExtractionResult {
    ExtractionResult::new(text, ExtractionMode::OcrWorker).with_confidence(0.8)
}

fn ocr_empty() -> ExtractionResult {
    ExtractionResult::new("   ", ExtractionMode::OcrWorker).with_diagnostics(Diagnostics::for_engine("ollama"))
}

fn ocr_unreachable() -> ExtractionResult {
    let mut diagnostics = Diagnostics::for_engine("ollama");
    diagnostics.push(DiagnosticStage::OcrBackendUnreachable, "Unable to reach OCR backend");
    ExtractionResult::new("", ExtractionMode::OcrWorker).with_diagnostics(diagnostics)
}

fn pdf() -> Document {
    Document::new("scan.pdf").with_file_path("/claims/scan.pdf")
}

// ── Digital-first ────────────────────────────────────────────────────────────

#[tokio::test]
async fn digital_first_keeps_text_layer() {
    let f = fixture(digital_text("Discharge Summary"), ocr_text("unused"));

    let result = f.engine.extract(&pdf()).await;

    assert_eq!(result.text, "Discharge Summary");
    assert_eq!(result.mode, ExtractionMode::DigitalTextLayer);
    assert_eq!(f.ocr.calls(), 0);
}

#[tokio::test]
async fn digital_first_falls_back_to_ocr() {
    let f = fixture(digital_empty(), ocr_text("scanned text"));

    let result = f.engine.extract(&pdf()).await;

    assert_eq!(result.text, "scanned text");
    assert_eq!(result.mode, ExtractionMode::OcrWorker);
    assert_eq!(result.metadata.confidence, Some(0.8));
    assert_eq!(*f.log.lock().unwrap(), ["digital", "ocr"]);
}

#[tokio::test]
async fn digital_first_with_nothing_is_empty_not_fatal() {
    let f = fixture(digital_empty(), ocr_empty());

    let result = f.engine.extract(&pdf()).await;

    assert_eq!(result.mode, ExtractionMode::ExtractionEmpty);
    assert!(!result.is_fatal());
    assert_eq!(result.metadata.reason.as_deref(), Some(REASON_NO_TEXT_DIGITAL_FIRST));
    let modes: Vec<_> = result.metadata.attempts.iter().map(|a| a.mode).collect();
    assert_eq!(modes, [ExtractionMode::DigitalEmpty, ExtractionMode::OcrWorker]);
}

#[tokio::test]
async fn digital_first_with_unreachable_ocr_is_fatal() {
    let f = fixture(digital_empty(), ocr_unreachable());

    let result = f.engine.extract(&pdf()).await;

    assert_eq!(result.mode, ExtractionMode::ExtractionFailed);
    assert!(result.is_fatal());
    assert_eq!(result.metadata.reason.as_deref(), Some(REASON_OCR_UNREACHABLE_NO_FALLBACK));
    let ocr_attempt = &result.metadata.attempts[1];
    assert!(ocr_attempt.diagnostics.as_ref().unwrap().backend_unreachable());
}

// ── OCR-first ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ocr_first_prefers_ocr_text() {
    let f = fixture(digital_text("layer"), ocr_text("ocr"));
    let engine = f.engine.clone().ocr_for_all_pdfs(true);

    let result = engine.extract(&pdf()).await;

    assert_eq!(result.text, "ocr");
    assert_eq!(f.digital.calls(), 0);
}

#[tokio::test]
async fn ocr_first_records_why_digital_text_was_used() {
    let f = fixture(digital_text("layer text"), ocr_unreachable());
    let engine = f.engine.clone().ocr_for_all_pdfs(true);

    let result = engine.extract(&pdf()).await;

    assert_eq!(result.text, "layer text");
    assert!(!result.is_fatal());
    let fallback = result.metadata.fallback.expect("fallback provenance");
    assert_eq!(fallback.from, ExtractionMode::OcrWorker);
    assert_eq!(fallback.reason, FallbackReason::OcrBackendUnreachable);
    assert!(fallback.ocr_diagnostics.unwrap().backend_unreachable());
    assert_eq!(*f.log.lock().unwrap(), ["ocr", "digital"]);
}

#[tokio::test]
async fn ocr_first_empty_ocr_reason() {
    let f = fixture(digital_text("layer text"), ocr_empty());

    let result = f.engine.clone().ocr_for_all_pdfs(true).extract(&pdf()).await;

    assert_eq!(result.metadata.fallback.unwrap().reason, FallbackReason::OcrEmptyText);
}

#[tokio::test]
async fn ocr_first_unreachable_without_text_is_fatal() {
    let f = fixture(digital_empty(), ocr_unreachable());

    let result = f.engine.clone().ocr_for_all_pdfs(true).extract(&pdf()).await;

    assert!(result.is_fatal());
    assert_eq!(result.metadata.reason.as_deref(), Some(REASON_OCR_UNREACHABLE_NO_FALLBACK));
    let modes: Vec<_> = result.metadata.attempts.iter().map(|a| a.mode).collect();
    assert_eq!(modes, [ExtractionMode::OcrWorker, ExtractionMode::DigitalEmpty]);
}

#[tokio::test]
async fn ocr_first_with_nothing_is_empty() {
    let f = fixture(digital_empty(), ocr_empty());

    let result = f.engine.clone().ocr_for_all_pdfs(true).extract(&pdf()).await;

    assert_eq!(result.mode, ExtractionMode::ExtractionEmpty);
    assert_eq!(result.metadata.reason.as_deref(), Some(REASON_NO_TEXT_OCR_FIRST));
}

// ── Scan-only ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn scan_only_never_reads_the_text_layer() {
    let f = fixture(digital_text("layer"), ocr_empty());
    let scan = pdf().with_text_layer(false);

    let result = f.engine.extract(&scan).await;

    // Empty OCR output is returned as-is.
    assert_eq!(result.mode, ExtractionMode::OcrWorker);
    assert!(!result.has_text());
    assert!(!result.is_fatal());
    assert_eq!(f.digital.calls(), 0);
}

#[tokio::test]
async fn scan_only_unreachable_is_fatal() {
    let f = fixture(digital_text("layer"), ocr_unreachable());
    let scan = pdf().with_text_layer(false);

    let result = f.engine.extract(&scan).await;

    assert!(result.is_fatal());
    assert_eq!(result.metadata.reason.as_deref(), Some(REASON_SCAN_UNREACHABLE));
    assert_eq!(result.metadata.attempts.len(), 1);
    assert_eq!(f.digital.calls(), 0);
}

// ── OCR adapter in the engine ────────────────────────────────────────────────

enum Backend {
    Reads(&'static str),
    Down,
}

#[async_trait]
impl OcrBackend for Backend {
    async fn extract(&self, input: &OcrInput) -> Result<OcrOutput, OcrError> {
        assert!(!input.is_empty());
        match self {
            Backend::Reads(text) => Ok(OcrOutput {
                text: text.to_string(),
                confidence: 0.65,
                diagnostics: Diagnostics::for_engine("fake"),
            }),
            Backend::Down => Err(OcrError::Unreachable("connection refused".into())),
        }
    }
}

fn engine_over(backend: Backend) -> ExtractionEngine {
    let log = Arc::new(Mutex::new(Vec::new()));
    ExtractionEngine::new(Scripted::new("digital", digital_empty(), &log), Arc::new(OcrAdapter::new(backend)))
}

#[tokio::test]
async fn adapter_text_flows_through_engine() {
    let engine = engine_over(Backend::Reads("Final Diagnosis: Dengue"));

    let result = engine.extract(&pdf()).await;

    assert_eq!(result.mode, ExtractionMode::OcrWorker);
    assert_eq!(result.text, "Final Diagnosis: Dengue");
    assert_eq!(result.metadata.confidence, Some(0.65));
}

#[tokio::test]
async fn adapter_unreachable_backend_aborts() {
    let engine = engine_over(Backend::Down);

    let result = engine.extract(&pdf()).await;

    assert!(result.is_fatal());
    let ocr_attempt = &result.metadata.attempts[1];
    assert_eq!(ocr_attempt.mode, ExtractionMode::OcrError);
    assert!(ocr_attempt.diagnostics.as_ref().unwrap().backend_unreachable());
}

#[tokio::test]
async fn precomputed_ocr_text_skips_the_backend() {
    let engine = engine_over(Backend::Down);
    let doc = pdf().with_ocr_text("scanner output");

    let result = engine.extract(&doc).await;

    assert_eq!(result.mode, ExtractionMode::OcrInline);
    assert_eq!(result.text, "scanner output");
}

// ── OCR client in the engine ─────────────────────────────────────────────────

/// Ollama-style server: answers every chat with `reply`, or refuses connections.
struct Server {
    reply: Option<&'static str>,
    posts: AtomicUsize,
}

#[async_trait]
impl OcrTransport for Server {
    async fn get(&self, _url: &str) -> Result<TransportResponse, TransportError> {
        match self.reply {
            Some(_) => Ok(TransportResponse::new(200, json!({ "models": [{ "name": "medgemma:4b" }] }).to_string())),
            None => Err(TransportError::Connect("connection refused".into())),
        }
    }

    async fn post_json(&self, _url: &str, _body: &Value) -> Result<TransportResponse, TransportError> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        match self.reply {
            Some(text) => Ok(TransportResponse::new(
                200,
                json!({ "message": { "role": "assistant", "content": text } }).to_string(),
            )),
            None => Err(TransportError::Connect("connection refused".into())),
        }
    }
}

struct OnePage;

#[async_trait]
impl PageRasterizer for OnePage {
    async fn rasterize(
        &self,
        _pdf_path: &Path,
        out_dir: &Path,
        _max_pages: usize,
        _dpi: u32,
    ) -> Result<Vec<PathBuf>, OcrError> {
        let path = out_dir.join("page-1.png");
        std::fs::write(&path, "PAGE1")?;
        Ok(vec![path])
    }
}

fn client_engine(reply: Option<&'static str>) -> (Arc<Scripted>, Arc<Server>, ExtractionEngine) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let digital = Scripted::new("digital", digital_text("layer"), &log);
    let server = Arc::new(Server {
        reply,
        posts: AtomicUsize::new(0),
    });
    let config = OcrConfig::builder()
        .page_retries(1)
        .retry_backoff_ms(100)
        .build()
        .unwrap();
    let client = OcrClient::with_parts(config, server.clone(), Arc::new(OnePage));
    let engine = ExtractionEngine::new(digital.clone(), Arc::new(OcrAdapter::new(client)));
    (digital, server, engine)
}

fn scanned_pdf() -> Document {
    Document::new("scan.pdf")
        .with_base64_pdf("JVBERi0xLjQ=")
        .with_text_layer(false)
}

#[tokio::test(start_paused = true)]
async fn scan_with_unreachable_ocr_server_aborts() {
    let (digital, server, engine) = client_engine(None);

    let result = engine.extract(&scanned_pdf()).await;

    assert!(result.is_fatal());
    assert_eq!(result.metadata.reason.as_deref(), Some(REASON_SCAN_UNREACHABLE));
    assert_eq!(result.metadata.attempts.len(), 1);
    assert!(result.metadata.attempts[0].diagnostics.as_ref().unwrap().backend_unreachable());
    assert_eq!(digital.calls(), 0);
    // Batch request and the single page, each tried twice.
    assert_eq!(server.posts.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn scan_read_by_ocr_server() {
    let (digital, _server, engine) = client_engine(Some("Final Diagnosis: Typhoid"));

    let result = engine.extract(&scanned_pdf()).await;

    assert_eq!(result.mode, ExtractionMode::OcrWorker);
    assert_eq!(result.text, "Final Diagnosis: Typhoid");
    assert_eq!(digital.calls(), 0);
}
