//! Configuration types for claim conversion.
//!
//! Three independent knob sets, each with a `Default` and a validating
//! builder:
//!
//! * [`PipelineConfig`] drives the orchestrator (document fan-out, enrichment
//!   gating, quality thresholds, hospital template).
//! * [`OcrConfig`] drives the OCR backend client (server URL, model, page
//!   rasterisation, retries).
//! * [`LlmConfig`] drives the optional enrichment pass.
//!
//! The CLI maps flags and environment variables onto these builders; library
//! callers use them directly.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use crate::template::HospitalTemplate;
use std::fmt;
use std::time::Duration;

/// Orchestrator configuration.
///
/// # Example
/// ```rust
/// use claimscan::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .document_concurrency(4)
///     .low_confidence_threshold(0.8)
///     .build()
///     .unwrap();
/// assert_eq!(config.document_concurrency, 4);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Documents processed at once. Default: 2.
    ///
    /// Each document may issue OCR and LLM calls of its own, so this is the
    /// outer bound on simultaneous backend traffic.
    pub document_concurrency: usize,

    /// Observations kept from an enrichment response. Default: 25.
    pub max_observations_per_report: usize,

    /// Quality score below which a document is flagged low-confidence. Default: 0.7.
    pub low_confidence_threshold: f64,

    /// Minimum trimmed text length before enrichment is attempted. Default: 1.
    pub llm_enrichment_min_text_length: usize,

    /// Hospital used in output metadata when the request names none. Default: "default".
    pub default_hospital_id: String,

    /// Field labels and required fields per document type.
    pub template: HospitalTemplate,

    /// Receives per-document events. Default: None.
    pub progress: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            document_concurrency: 2,
            max_observations_per_report: 25,
            low_confidence_threshold: 0.7,
            llm_enrichment_min_text_length: 1,
            default_hospital_id: "default".to_string(),
            template: HospitalTemplate::default(),
            progress: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("document_concurrency", &self.document_concurrency)
            .field("max_observations_per_report", &self.max_observations_per_report)
            .field("low_confidence_threshold", &self.low_confidence_threshold)
            .field(
                "llm_enrichment_min_text_length",
                &self.llm_enrichment_min_text_length,
            )
            .field("default_hospital_id", &self.default_hospital_id)
            .field("template", &self.template.id)
            .field("progress", &self.progress.as_ref().map(|_| "<dyn PipelineProgressCallback>"))
            .finish()
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn document_concurrency(mut self, n: usize) -> Self {
        self.config.document_concurrency = n.max(1);
        self
    }

    pub fn max_observations_per_report(mut self, n: usize) -> Self {
        self.config.max_observations_per_report = n;
        self
    }

    pub fn low_confidence_threshold(mut self, threshold: f64) -> Self {
        self.config.low_confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn llm_enrichment_min_text_length(mut self, n: usize) -> Self {
        self.config.llm_enrichment_min_text_length = n;
        self
    }

    pub fn default_hospital_id(mut self, id: impl Into<String>) -> Self {
        self.config.default_hospital_id = id.into();
        self
    }

    pub fn template(mut self, template: HospitalTemplate) -> Self {
        self.config.template = template;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress = Some(cb);
        self
    }

    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.document_concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "document concurrency must be >= 1".into(),
            ));
        }
        if c.max_observations_per_report == 0 {
            return Err(PipelineError::InvalidConfig(
                "max observations per report must be >= 1".into(),
            ));
        }
        if c.default_hospital_id.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "default hospital id must not be blank".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Models known to read clinical scans well, tried in order when the
/// configured model is not installed on the server.
pub const DEFAULT_CANDIDATE_MODELS: [&str; 4] = ["medgemma:4b", "medgemma", "gemma3:4b", "gemma3"];

/// OCR backend client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrConfig {
    /// Base URL of the Ollama-compatible server. Default: `http://127.0.0.1:11434`.
    pub base_url: String,

    /// Preferred vision model. Default: `medgemma:4b`.
    pub model: String,

    /// Fallback model names, in priority order.
    pub candidate_models: Vec<String>,

    /// Pages rasterised from a PDF. Default: 5.
    pub max_pages: usize,

    /// Rasterisation DPI. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Pages OCR'd at once in the per-page fallback. Default: 2.
    pub page_concurrency: usize,

    /// Per-attempt deadline in milliseconds. Default: 180 000.
    pub request_timeout_ms: u64,

    /// Extra attempts per request after the first. Default: 2.
    pub page_retries: u32,

    /// Linear backoff step in milliseconds. Default: 600.
    pub retry_backoff_ms: u64,

    /// Backoff ceiling in milliseconds. Default: 2000.
    pub max_backoff_ms: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "medgemma:4b".to_string(),
            candidate_models: DEFAULT_CANDIDATE_MODELS.iter().map(|m| m.to_string()).collect(),
            max_pages: 5,
            dpi: 300,
            page_concurrency: 2,
            request_timeout_ms: 180_000,
            page_retries: 2,
            retry_backoff_ms: 600,
            max_backoff_ms: 2000,
        }
    }
}

impl OcrConfig {
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }

    /// Total attempts per request, never less than one.
    pub fn attempts(&self) -> u32 {
        self.page_retries.saturating_add(1).max(1)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// `min(step × attempt, cap)`, where `attempt` is 1-based.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let delay = self
            .retry_backoff_ms
            .saturating_mul(u64::from(attempt))
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn candidate_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.candidate_models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n.max(1);
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn page_concurrency(mut self, n: usize) -> Self {
        self.config.page_concurrency = n.max(1);
        self
    }

    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    pub fn page_retries(mut self, n: u32) -> Self {
        self.config.page_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.max_backoff_ms = ms;
        self
    }

    pub fn build(self) -> Result<OcrConfig, PipelineError> {
        let c = &self.config;
        if c.base_url.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("OCR base URL must not be blank".into()));
        }
        if c.model.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("OCR model must not be blank".into()));
        }
        if c.request_timeout_ms == 0 {
            return Err(PipelineError::InvalidConfig(
                "OCR request timeout must be > 0ms".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Enrichment pass configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    /// edgequake-llm provider name. Default: "ollama".
    pub provider: String,
    /// Default: "gemma3:4b".
    pub model: String,
    pub temperature: f32,
    /// Default: 1024.
    pub max_tokens: usize,
    /// Characters of document text sent to the model. Default: 8000.
    pub max_prompt_chars: usize,
    /// Default: 120.
    pub timeout_secs: u64,
    /// Default: 2.
    pub max_retries: u32,
    /// Default: 600.
    pub retry_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "gemma3:4b".to_string(),
            temperature: 0.0,
            max_tokens: 1024,
            max_prompt_chars: 8000,
            timeout_secs: 120,
            max_retries: 2,
            retry_backoff_ms: 600,
        }
    }
}

impl LlmConfig {
    pub fn builder() -> LlmConfigBuilder {
        LlmConfigBuilder {
            config: Self::default(),
        }
    }
}

#[derive(Debug)]
pub struct LlmConfigBuilder {
    config: LlmConfig,
}

impl LlmConfigBuilder {
    pub fn provider(mut self, name: impl Into<String>) -> Self {
        self.config.provider = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_prompt_chars(mut self, n: usize) -> Self {
        self.config.max_prompt_chars = n.max(1);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn build(self) -> Result<LlmConfig, PipelineError> {
        if self.config.provider.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("LLM provider must not be blank".into()));
        }
        if self.config.timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig("LLM timeout must be > 0s".into()));
        }
        Ok(self.config)
    }
}
