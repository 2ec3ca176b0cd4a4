//! CLI binary for claimscan.
//!
//! A thin shim over the library crate: maps flags and environment variables
//! onto the config builders, turns files into documents, and prints the
//! claim output as JSON.

use anyhow::{bail, Context, Result};
use clap::Parser;
use claimscan::collaborators::HiType;
use claimscan::extraction::{DigitalTextAdapter, OcrAdapter, RemoteOcrWorker};
use claimscan::ocr::request::DEFAULT_BASE_URL;
use claimscan::ocr::{HttpTransport, PdfiumRasterizer};
use claimscan::{
    pdf, ClaimPipeline, ClaimRequest, Document, Enricher, ExtractionEngine, LlmConfig, LlmEnricher,
    OcrClient, OcrConfig, PipelineConfig, PipelineProgressCallback, ProgressCallback, TextSource,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar over the claim's documents. Documents finish out of order when
/// `--document-concurrency` is above one, so start times are kept per file.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:32.green/238}] {pos:>3}/{len} documents  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, file_name: &str) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(file_name)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_documents} documents…"))
        ));
    }

    fn on_document_start(&self, _index: usize, file_name: &str) {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(file_name.to_string(), Instant::now());
        self.bar.set_message(file_name.to_string());
    }

    fn on_document_complete(&self, file_name: &str, hi_type: HiType, enriched: bool) {
        let elapsed = self.elapsed_secs(file_name);
        let mark = if hi_type.is_known() { green("✓") } else { red("?") };
        self.bar.println(format!(
            "  {} {:<32} {:<18} {}{}",
            mark,
            file_name,
            hi_type.as_str(),
            dim(&format!("{elapsed:.1}s")),
            if enriched { dim("  (enriched)") } else { String::new() },
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, passed: usize) {
        self.bar.finish_and_clear();
        let failed = total_documents.saturating_sub(passed);
        if failed == 0 {
            eprintln!("{} {} documents passed validation", green("✔"), bold(&passed.to_string()));
        } else {
            eprintln!(
                "{} {}/{} documents passed validation  ({} failed)",
                if passed == 0 { red("✘") } else { cyan("⚠") },
                bold(&passed.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a claim (stdout)
  claimscan --claim-id CLM-001 discharge.pdf lab-report.pdf

  # Write the claim output to a file
  claimscan --claim-id CLM-001 scan.pdf -o claim.json

  # Force OCR for every PDF, even ones with a text layer
  claimscan --claim-id CLM-001 --ocr-for-all-pdfs scan.pdf

  # Enrich documents that fail quality review with an LLM
  claimscan --claim-id CLM-001 --llm --llm-model gemma3:4b report.pdf

  # Check the OCR backend
  claimscan --health

INPUT FILES:
  .pdf                 read from its text layer, OCR'd when there is none
  .png .jpg .jpeg      OCR'd as a single image
  .txt .md             used as inline text

ENVIRONMENT VARIABLES:
  OCR_BASE_URL            Ollama-compatible server (default http://127.0.0.1:11434)
  OCR_MODEL               Vision model (default medgemma:4b)
  OCR_WORKER_URL          Delegate OCR to a standalone worker instead
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  LLM_PROVIDER, LLM_MODEL Enrichment provider and model
"#;

/// Convert clinical documents into claim bundles.
#[derive(Parser, Debug)]
#[command(
    name = "claimscan",
    version,
    about = "Convert clinical PDFs and scans into structured claim bundles",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Documents of the claim (.pdf, .png, .jpg, .txt).
    #[arg(required_unless_present = "health")]
    files: Vec<PathBuf>,

    /// Claim identifier.
    #[arg(long, env = "CLAIM_ID", required_unless_present = "health")]
    claim_id: Option<String>,

    /// Hospital identifier reported in the output metadata.
    #[arg(long, env = "HOSPITAL_ID")]
    hospital_id: Option<String>,

    /// Write the JSON output to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Ollama-compatible OCR server.
    #[arg(long, env = "OCR_BASE_URL", default_value = DEFAULT_BASE_URL)]
    ocr_base_url: String,

    /// Preferred OCR vision model.
    #[arg(long, env = "OCR_MODEL", default_value = "medgemma:4b")]
    ocr_model: String,

    /// Pages of a PDF sent to OCR.
    #[arg(long, env = "OCR_MAX_PAGES", default_value_t = 5)]
    ocr_max_pages: usize,

    /// Rasterisation DPI (72–600).
    #[arg(long, env = "OCR_PDF_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Pages OCR'd at once when a batch request falls back to per-page.
    #[arg(long, env = "OCR_PAGE_CONCURRENCY", default_value_t = 2)]
    page_concurrency: usize,

    /// Per-request OCR deadline in milliseconds.
    #[arg(long, env = "OCR_REQUEST_TIMEOUT_MS", default_value_t = 180_000)]
    request_timeout_ms: u64,

    /// Extra attempts per OCR request.
    #[arg(long, env = "OCR_PAGE_RETRIES", default_value_t = 2)]
    page_retries: u32,

    /// Try OCR before the text layer for every PDF or image.
    #[arg(long, env = "OCR_FOR_ALL_PDFS")]
    ocr_for_all_pdfs: bool,

    /// Send documents to a standalone OCR worker instead of the OCR server.
    #[arg(long, env = "OCR_WORKER_URL")]
    ocr_worker_url: Option<String>,

    /// Path to libpdfium (file or directory). Searched in the usual places when unset.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Documents converted at once.
    #[arg(long, env = "DOCUMENT_CONCURRENCY", default_value_t = 2)]
    document_concurrency: usize,

    /// Enrich documents that fail quality review with an LLM.
    #[arg(long, env = "LLM_ENRICHMENT")]
    llm: bool,

    /// edgequake-llm provider for enrichment.
    #[arg(long, env = "LLM_PROVIDER", default_value = "ollama")]
    llm_provider: String,

    /// Enrichment model.
    #[arg(long, env = "LLM_MODEL", default_value = "gemma3:4b")]
    llm_model: String,

    /// Check the OCR backend and exit.
    #[arg(long)]
    health: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress everything but errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let ocr_config = build_ocr_config(&cli)?;

    // ── Health mode ──────────────────────────────────────────────────────
    if cli.health {
        let client = ocr_client(&cli, ocr_config)?;
        let report = client.check_health().await;
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise health report")?
        );
        if !report.ok {
            bail!("OCR backend at {} is not usable", report.base_url);
        }
        return Ok(());
    }

    let claim_id = cli.claim_id.clone().unwrap_or_default();

    // ── Load documents ───────────────────────────────────────────────────
    let mut documents = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        documents.push(load_document(path).await?);
    }

    // ── Build pipeline ───────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress;
    let mut config = PipelineConfig::builder().document_concurrency(cli.document_concurrency);
    if show_progress {
        config = config.progress_callback(CliProgressCallback::new() as ProgressCallback);
    }
    let pipeline = ClaimPipeline::builder()
        .config(config.build().context("Invalid pipeline configuration")?)
        .build()
        .context("Failed to build pipeline")?;

    let digital: Arc<dyn TextSource> = Arc::new(DigitalTextAdapter::new(cli.pdfium_lib_path.clone()));
    let ocr: Arc<dyn TextSource> = match cli.ocr_worker_url.as_deref() {
        Some(url) => Arc::new(OcrAdapter::new(
            RemoteOcrWorker::new(url)
                .context("Failed to create OCR worker client")?
                .request_timeout(Duration::from_millis(cli.request_timeout_ms)),
        )),
        None => Arc::new(OcrAdapter::new(ocr_client(&cli, ocr_config)?)),
    };
    let engine = ExtractionEngine::new(digital, ocr).ocr_for_all_pdfs(cli.ocr_for_all_pdfs);

    let mut request = ClaimRequest::new(claim_id, documents).extraction_engine(Arc::new(engine));
    if let Some(ref hospital_id) = cli.hospital_id {
        request = request.hospital_id(hospital_id.clone());
    }
    if cli.llm {
        let llm_config = LlmConfig::builder()
            .provider(cli.llm_provider.clone())
            .model(cli.llm_model.clone())
            .build()
            .context("Invalid LLM configuration")?;
        let enricher = LlmEnricher::from_config(llm_config).context("Failed to create LLM enricher")?;
        request = request.enricher(Arc::new(enricher) as Arc<dyn Enricher>);
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let output = pipeline
        .convert(request)
        .await
        .context("Claim conversion failed")?;
    let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;

    match cli.output {
        Some(ref path) => {
            tokio::fs::write(path, json.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !cli.quiet {
                eprintln!(
                    "{}  {}/{} documents passed  →  {}",
                    if output.all_passed() { green("✔") } else { cyan("⚠") },
                    output.metadata.successful_count,
                    output.metadata.documents_count,
                    bold(&path.display().to_string()),
                );
            }
        }
        None => println!("{json}"),
    }

    Ok(())
}

fn build_ocr_config(cli: &Cli) -> Result<OcrConfig> {
    OcrConfig::builder()
        .base_url(cli.ocr_base_url.clone())
        .model(cli.ocr_model.clone())
        .max_pages(cli.ocr_max_pages)
        .dpi(cli.dpi)
        .page_concurrency(cli.page_concurrency)
        .request_timeout_ms(cli.request_timeout_ms)
        .page_retries(cli.page_retries)
        .build()
        .context("Invalid OCR configuration")
}

fn ocr_client(cli: &Cli, config: OcrConfig) -> Result<OcrClient> {
    let transport = HttpTransport::new().context("Failed to create HTTP client")?;
    Ok(OcrClient::with_parts(
        config,
        Arc::new(transport),
        Arc::new(PdfiumRasterizer::new(cli.pdfium_lib_path.clone())),
    ))
}

/// Turn a file into a [`Document`] according to its extension.
async fn load_document(path: &Path) -> Result<Document> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let mut doc = Document::new(file_name);
    match extension.as_str() {
        "pdf" => {
            doc = doc.with_file_path(path.display().to_string());
            doc.content_type = Some("application/pdf".to_string());
        }
        "txt" | "md" => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            doc = doc.with_text(text);
            doc.content_type = Some("text/plain".to_string());
        }
        "png" | "jpg" | "jpeg" => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            doc = doc.with_image_base64(pdf::encode_base64(&bytes));
            doc.content_type = Some(if extension == "png" { "image/png" } else { "image/jpeg" }.to_string());
        }
        other => bail!("Unsupported file type '.{}' for {}", other, path.display()),
    }
    Ok(doc)
}
