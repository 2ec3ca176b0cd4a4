//! LLM enrichment through an edgequake-llm provider.
//!
//! The enricher sends the document text (truncated) with a JSON-only prompt
//! and parses whatever comes back as leniently as it can: code fences are
//! stripped, and when the body is not valid JSON the outermost `{...}` span is
//! tried instead. An unusable answer is `Ok(None)`, never an error.
//!
//! ## Retry Strategy
//!
//! Local inference servers answer 503 while a model loads. Each attempt is
//! wrapped in the configured timeout and failed attempts back off linearly
//! (`retry_backoff_ms * attempt`).

use super::{Enricher, Enrichment, EnrichmentDiagnostics, EnrichmentRequest, ExtractedFields, Observation};
use crate::config::LlmConfig;
use crate::error::EnrichmentError;
use crate::prompts::{build_enrichment_prompt, ENRICHMENT_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

pub struct LlmEnricher {
    provider: Arc<dyn LLMProvider>,
    config: LlmConfig,
}

impl std::fmt::Debug for LlmEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmEnricher")
            .field("provider", &self.config.provider)
            .field("model", &self.config.model)
            .finish()
    }
}

impl LlmEnricher {
    pub fn new(provider: Arc<dyn LLMProvider>, config: LlmConfig) -> Self {
        Self { provider, config }
    }

    /// Instantiate the named provider through [`ProviderFactory`].
    pub fn from_config(config: LlmConfig) -> Result<Self, EnrichmentError> {
        let provider = ProviderFactory::create_llm_provider(&config.provider, &config.model)
            .map_err(|e| EnrichmentError::ProviderNotConfigured {
                provider: config.provider.clone(),
                detail: format!("{e}"),
            })?;
        Ok(Self::new(provider, config))
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            ..Default::default()
        }
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, EnrichmentError> {
        let options = self.options();
        let per_call = Duration::from_secs(self.config.timeout_secs);
        let mut last_err = String::new();
        let mut last_timed_out = false;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = self.config.retry_backoff_ms * u64::from(attempt);
                warn!(
                    "Enrichment retry {}/{} after {}ms",
                    attempt, self.config.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(per_call, self.provider.chat(messages, Some(&options))).await {
                Ok(Ok(response)) => {
                    debug!(
                        "Enrichment: {} input tokens, {} output tokens",
                        response.prompt_tokens, response.completion_tokens
                    );
                    return Ok(response.content);
                }
                Ok(Err(e)) => {
                    last_timed_out = false;
                    last_err = format!("{e}");
                    warn!("Enrichment attempt {} failed: {}", attempt + 1, last_err);
                }
                Err(_) => {
                    last_timed_out = true;
                    warn!("Enrichment attempt {} timed out", attempt + 1);
                }
            }
        }

        if last_timed_out {
            return Err(EnrichmentError::Timeout {
                secs: self.config.timeout_secs,
            });
        }
        Err(EnrichmentError::CallFailed {
            attempts: self.config.max_retries + 1,
            detail: last_err,
        })
    }
}

#[async_trait]
impl Enricher for LlmEnricher {
    async fn enhance(
        &self,
        request: &EnrichmentRequest,
    ) -> Result<Option<Enrichment>, EnrichmentError> {
        if request.text.trim().is_empty() {
            debug!("Enrichment skipped for '{}': empty text", request.source_file_name);
            return Ok(None);
        }

        info!(
            file_name = %request.source_file_name,
            hi_type = %request.hi_type,
            model = %self.config.model,
            "Starting LLM enrichment"
        );

        let prompt = build_enrichment_prompt(&request.text, request.hi_type, self.config.max_prompt_chars);
        let messages = vec![
            ChatMessage::system(ENRICHMENT_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        let raw = self.complete(&messages).await?;

        let Some(payload) = parse_json_payload(&raw) else {
            warn!(
                "Enrichment response for '{}' is not JSON ({} chars)",
                request.source_file_name,
                raw.len()
            );
            return Ok(None);
        };

        Ok(enrichment_from_payload(
            &payload,
            EnrichmentDiagnostics {
                provider: self.config.provider.clone(),
                model: self.config.model.clone(),
                status: "parsed".to_string(),
            },
        ))
    }
}

// ── Response parsing ─────────────────────────────────────────────────────

/// Strip a surrounding ```` ``` ```` or ```` ```json ```` fence.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").or_else(|| body.strip_prefix("JSON")).unwrap_or(body);
    body.trim()
}

/// Parse a model answer into a JSON object.
///
/// Falls back to the span between the first `{` and the last `}`.
pub fn parse_json_payload(raw: &str) -> Option<Value> {
    let stripped = strip_code_fence(raw);
    if stripped.is_empty() {
        return None;
    }
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(stripped) {
        return Some(value);
    }
    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&stripped[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Values that are clearly OCR noise: no alphanumerics, or a run of five
/// identical non-digit characters.
fn looks_garbage(value: &str) -> bool {
    if !value.chars().any(char::is_alphanumeric) {
        return true;
    }
    let chars: Vec<char> = value.chars().collect();
    chars.windows(5).any(|w| w.iter().all(|c| *c == w[0]) && !w[0].is_ascii_digit())
}

fn clean_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && !looks_garbage(s))
        .map(str::to_string)
}

fn observation_from(value: &Value) -> Option<Observation> {
    let name = clean_string(value.get("name"))?;
    let value_text = match value.get("value") {
        Some(Value::Number(n)) => Some(n.to_string()),
        other => clean_string(other),
    }?;
    let unit = clean_string(value.get("unit")).filter(|u| u.chars().count() < 20);
    Some(Observation {
        name,
        value: value_text,
        unit,
        reference_range: clean_string(value.get("referenceRange")),
    })
}

/// Turn a parsed payload into an [`Enrichment`].
///
/// Accepts both `{"hiType", "extracted": {...}}` and a flat object of fields.
/// Returns `None` when nothing usable was found.
pub fn enrichment_from_payload(payload: &Value, diagnostics: EnrichmentDiagnostics) -> Option<Enrichment> {
    let object = payload.as_object()?;
    let fields: &Map<String, Value> = object
        .get("extracted")
        .and_then(Value::as_object)
        .unwrap_or(object);

    let mut extracted = ExtractedFields::default();
    for (key, value) in fields {
        if key == "observations" || key == "hiType" {
            continue;
        }
        if let Some(text) = clean_string(Some(value)) {
            extracted.set(key.clone(), text);
        }
    }
    if let Some(items) = fields.get("observations").and_then(Value::as_array) {
        extracted.observations = items.iter().filter_map(observation_from).collect();
    }

    let hi_type = clean_string(object.get("hiType"));
    if extracted.fields.is_empty() && extracted.observations.is_empty() && hi_type.is_none() {
        return None;
    }

    Some(Enrichment {
        hi_type,
        extracted,
        diagnostics,
    })
}
