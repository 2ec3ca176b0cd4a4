//! Claim conversion orchestrator.
//!
//! ## Per-document flow
//!
//! ```text
//! resolve text ─▶ hash ─▶ classify ─▶ extract fields ─▶ score quality
//!                                                          │
//!                        ┌──── (quality not pass) ─────────┤
//!                        ▼                                 │
//!                     enrich ─▶ merge ─▶ re-score ─────────┤
//!                                                          ▼
//!                               map to bundle ─▶ validate ─▶ compliance
//! ```
//!
//! Documents run `document_concurrency` wide. A fatal extraction aborts the
//! whole claim: no new document starts, the ones in flight finish, then the
//! error is returned. Every other failure stays local to its document.

pub mod audit;
pub mod enrich;
pub mod output;

pub use audit::{AuditAction, AuditEvent, AuditLog};
pub use output::{
    ClaimConversionOutput, ClaimMetadata, Classification, ExtractionReport, ExtractionSummary,
    PipelineDocumentResult, SOURCE_MODE_MISSING, SOURCE_MODE_PROVIDED,
};

use crate::collaborators::{
    BundleMapper, BundleReport, BundleValidation, BundleValidator, ClaimBundleMapper,
    ClaimValidationReport, Classifier, ComplianceEngine, Enricher, EnrichmentRequest,
    KeywordClassifier, LabelExtractor, MappingInput, QualityScorer, RuleComplianceEngine,
    SourceDocument, StructuralValidator, StructuredExtractor, TemplateQualityScorer,
    ValidationIssue,
};
use crate::config::PipelineConfig;
use crate::document::{Document, ExtractionMetadata};
use crate::error::PipelineError;
use crate::extraction::ExtractionEngine;
use crate::hashing::{content_hash, ContentHash};
use crate::outcome::StageOutcome;
use crate::pool;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Validation code for a document that could not be turned into a bundle.
pub const BUNDLE_MAPPING_FAILED: &str = "BUNDLE_MAPPING_FAILED";

/// One claim to convert.
#[derive(Clone, Default)]
pub struct ClaimRequest {
    pub claim_id: String,
    pub documents: Vec<Document>,
    /// Falls back to [`PipelineConfig::default_hospital_id`].
    pub hospital_id: Option<String>,
    /// Without an engine, documents lacking inline text convert with empty text.
    pub extraction_engine: Option<Arc<ExtractionEngine>>,
    pub enricher: Option<Arc<dyn Enricher>>,
}

impl std::fmt::Debug for ClaimRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimRequest")
            .field("claim_id", &self.claim_id)
            .field("documents", &self.documents.len())
            .field("hospital_id", &self.hospital_id)
            .field("extraction_engine", &self.extraction_engine)
            .field("enricher", &self.enricher.as_ref().map(|_| "<dyn Enricher>"))
            .finish()
    }
}

impl ClaimRequest {
    pub fn new(claim_id: impl Into<String>, documents: Vec<Document>) -> Self {
        Self {
            claim_id: claim_id.into(),
            documents,
            ..Default::default()
        }
    }

    pub fn hospital_id(mut self, id: impl Into<String>) -> Self {
        self.hospital_id = Some(id.into());
        self
    }

    pub fn extraction_engine(mut self, engine: Arc<ExtractionEngine>) -> Self {
        self.extraction_engine = Some(engine);
        self
    }

    pub fn enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Every problem with the request, in field order.
    pub fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.claim_id.trim().is_empty() {
            violations.push("claimId must be a non-empty string".to_string());
        }
        if self.documents.is_empty() {
            violations.push("documents must be a non-empty array".to_string());
        }
        for (index, doc) in self.documents.iter().enumerate() {
            if doc.file_name.trim().is_empty() {
                violations.push(format!("documents[{index}] must have a valid fileName"));
            }
        }
        violations
    }
}

/// Converts claims with a fixed set of collaborators.
pub struct ClaimPipeline {
    config: PipelineConfig,
    classifier: Arc<dyn Classifier>,
    extractor: Arc<dyn StructuredExtractor>,
    scorer: Arc<dyn QualityScorer>,
    mapper: Arc<dyn BundleMapper>,
    validator: Arc<dyn BundleValidator>,
    compliance: Arc<dyn ComplianceEngine>,
}

impl std::fmt::Debug for ClaimPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for ClaimPipeline {
    fn default() -> Self {
        Self::with_config(PipelineConfig::default())
    }
}

/// Shared by every document of one claim.
struct ClaimContext<'a> {
    claim_id: &'a str,
    engine: Option<&'a ExtractionEngine>,
    enricher: Option<&'a dyn Enricher>,
    audit: AuditLog,
}

/// Everything one document contributes to the output.
struct DocumentOutcome {
    result: PipelineDocumentResult,
    classification: Classification,
    report: ExtractionReport,
}

struct ResolvedText {
    text: String,
    source_mode: String,
    metadata: Option<ExtractionMetadata>,
}

impl ClaimPipeline {
    pub fn builder() -> ClaimPipelineBuilder {
        ClaimPipelineBuilder::default()
    }

    /// Default collaborators with `config`.
    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            scorer: Arc::new(TemplateQualityScorer::new(config.low_confidence_threshold)),
            config,
            classifier: Arc::new(KeywordClassifier),
            extractor: Arc::new(LabelExtractor),
            mapper: Arc::new(ClaimBundleMapper::default()),
            validator: Arc::new(StructuralValidator),
            compliance: Arc::new(RuleComplianceEngine::default()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Convert every document of a claim.
    ///
    /// # Errors
    /// Only [`PipelineError::InvalidInput`] (nothing was processed) and
    /// [`PipelineError::ExtractionFailed`] (the claim was aborted).
    pub async fn convert(&self, request: ClaimRequest) -> Result<ClaimConversionOutput, PipelineError> {
        // ── Step 1: Validate input ───────────────────────────────────────
        let violations = request.violations();
        if !violations.is_empty() {
            warn!("Rejecting claim request: {}", violations.join("; "));
            return Err(PipelineError::InvalidInput { violations });
        }

        let hospital_id = request
            .hospital_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.config.default_hospital_id)
            .to_string();
        let total = request.documents.len();
        info!(
            claim_id = %request.claim_id,
            hospital_id = %hospital_id,
            template_id = %self.config.template.id,
            "Claim conversion started: {} documents",
            total
        );

        // ── Step 2: Open the audit trail ─────────────────────────────────
        let ctx = ClaimContext {
            claim_id: &request.claim_id,
            engine: request.extraction_engine.as_deref(),
            enricher: request.enricher.as_deref(),
            audit: AuditLog::new(),
        };
        ctx.audit.record(AuditEvent::system(AuditAction::ConvertStarted, None));
        if let Some(ref cb) = self.config.progress {
            cb.on_batch_start(total);
        }

        // ── Step 3: Convert documents ────────────────────────────────────
        let outcomes = pool::try_map_bounded(
            &request.documents,
            self.config.document_concurrency,
            |index, doc| self.process_document(&ctx, index, doc),
        )
        .await?;

        // ── Step 4: Assemble ─────────────────────────────────────────────
        let mut bundles = Vec::new();
        let mut results = Vec::with_capacity(outcomes.len());
        let mut classifications = Vec::with_capacity(outcomes.len());
        let mut extraction_reports = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            if let Some(bundle) = &outcome.result.bundle {
                bundles.push(bundle.clone());
            }
            results.push(outcome.result);
            classifications.push(outcome.classification);
            extraction_reports.push(outcome.report);
        }

        let validation_report = ClaimValidationReport::from_reports(
            results
                .iter()
                .enumerate()
                .map(|(bundle_index, r)| BundleReport {
                    bundle_index,
                    status: r.validation.status,
                    errors: r.validation.errors.clone(),
                })
                .collect(),
        );

        let successful_count = results.iter().filter(|r| r.validation.passed()).count();
        let failed_count = results.len() - successful_count;
        info!(
            claim_id = %request.claim_id,
            "Claim conversion completed: {} documents, {} passed, {} failed",
            results.len(),
            successful_count,
            failed_count
        );
        if let Some(ref cb) = self.config.progress {
            cb.on_batch_complete(total, successful_count);
        }

        Ok(ClaimConversionOutput {
            bundles,
            metadata: ClaimMetadata {
                claim_id: request.claim_id.clone(),
                hospital_id,
                template_id: self.config.template.id.clone(),
                documents_count: results.len(),
                successful_count,
                failed_count,
            },
            results,
            audit_log: ctx.audit.snapshot(),
            validation_report,
            classifications,
            extraction_reports,
        })
    }

    async fn resolve_text(&self, ctx: &ClaimContext<'_>, doc: &Document) -> Result<ResolvedText, PipelineError> {
        if let Some(text) = doc.inline_text() {
            debug!(file_name = %doc.file_name, "Using provided text");
            return Ok(ResolvedText {
                text: text.to_string(),
                source_mode: SOURCE_MODE_PROVIDED.to_string(),
                metadata: None,
            });
        }

        let Some(engine) = ctx.engine else {
            debug!(file_name = %doc.file_name, "No text and no extraction engine");
            return Ok(ResolvedText {
                text: String::new(),
                source_mode: SOURCE_MODE_MISSING.to_string(),
                metadata: Some(ExtractionMetadata {
                    reason: Some("extraction_engine_missing".to_string()),
                    ..Default::default()
                }),
            });
        };

        let result = engine.extract(doc).await;
        info!(
            file_name = %doc.file_name,
            mode = %result.mode,
            "Extracted {} chars",
            result.trimmed_len()
        );
        if result.is_fatal() {
            return Err(PipelineError::ExtractionFailed {
                file_name: doc.file_name.clone(),
                reason: result
                    .metadata
                    .reason
                    .clone()
                    .unwrap_or_else(|| result.mode.to_string()),
                metadata: Box::new(result.metadata),
            });
        }
        Ok(ResolvedText {
            text: result.text,
            source_mode: result.mode.to_string(),
            metadata: Some(result.metadata),
        })
    }

    async fn hash(&self, ctx: &ClaimContext<'_>, doc: &Document, text: &str) -> Result<ContentHash, PipelineError> {
        match content_hash(ctx.claim_id, doc, text).await {
            StageOutcome::Ok(hash) => Ok(hash),
            StageOutcome::Recoverable { value, reason } => {
                debug!(file_name = %doc.file_name, "Content hash degraded: {}", reason);
                Ok(value)
            }
            StageOutcome::Fatal { reason, metadata } => Err(PipelineError::ExtractionFailed {
                file_name: doc.file_name.clone(),
                reason,
                metadata: metadata.unwrap_or_default(),
            }),
        }
    }

    async fn process_document(
        &self,
        ctx: &ClaimContext<'_>,
        index: usize,
        doc: &Document,
    ) -> Result<DocumentOutcome, PipelineError> {
        debug!(file_name = %doc.file_name, index, "Document started");
        if let Some(ref cb) = self.config.progress {
            cb.on_document_start(index, &doc.file_name);
        }

        let resolved = self.resolve_text(ctx, doc).await?;
        let text_length = resolved.text.trim().chars().count();
        if text_length == 0 {
            warn!(file_name = %doc.file_name, mode = %resolved.source_mode, "No text extracted");
            ctx.audit.record(AuditEvent::new(
                AuditAction::ExtractionEmpty,
                Some(doc.file_name.clone()),
            ));
        }

        let hash = self.hash(ctx, doc, &resolved.text).await?;

        let template = &self.config.template;
        let mut hi_type = self.classifier.detect_hi_type(&resolved.text);
        let mut extracted = self.extractor.extract(hi_type, &resolved.text, template);
        let mut quality = self.scorer.evaluate(hi_type, &extracted, template);
        debug!(
            file_name = %doc.file_name,
            hi_type = %hi_type,
            score = quality.confidence_score,
            "Document classified and scored"
        );

        let mut enriched = false;
        if let Some(enricher) = ctx.enricher.filter(|_| {
            enrich::should_enrich(&quality, text_length, self.config.llm_enrichment_min_text_length)
        }) {
            let request = EnrichmentRequest {
                text: resolved.text.clone(),
                hi_type,
                source_file_name: doc.file_name.clone(),
            };
            match enricher.enhance(&request).await {
                Ok(Some(enrichment)) => {
                    extracted = enrich::merge_enrichment(
                        &extracted,
                        &enrichment.extracted,
                        self.config.max_observations_per_report,
                    );
                    hi_type = enrich::resolve_enriched_hi_type(hi_type, enrichment.hi_type.as_deref());
                    quality = self.scorer.evaluate(hi_type, &extracted, template);
                    enriched = true;
                    info!(
                        file_name = %doc.file_name,
                        model = %enrichment.diagnostics.model,
                        "Enrichment applied"
                    );
                    ctx.audit.record(AuditEvent::new(
                        AuditAction::LlmEnrichmentApplied,
                        Some(doc.file_name.clone()),
                    ));
                }
                Ok(None) => debug!(file_name = %doc.file_name, "Enrichment returned nothing usable"),
                Err(e) => warn!(file_name = %doc.file_name, "Enrichment failed: {}", e),
            }
        }

        let mapped = self.mapper.map(&MappingInput {
            claim_id: ctx.claim_id,
            hi_type,
            extracted: &extracted,
            source: SourceDocument {
                file_name: &doc.file_name,
                sha256: &hash.value,
                content_type: doc.content_type.as_deref(),
            },
        });
        let (bundle, validation) = match mapped {
            Ok(bundle) => {
                let validation = self.validator.validate_bundle(&bundle);
                (Some(bundle), validation)
            }
            Err(e) => {
                warn!(file_name = %doc.file_name, "Bundle mapping failed: {}", e);
                let issue = ValidationIssue::new(BUNDLE_MAPPING_FAILED, e.to_string(), "Bundle");
                (None, BundleValidation::from_issues(vec![issue]))
            }
        };

        let compliance = self
            .compliance
            .evaluate(bundle.as_slice(), &ctx.audit.snapshot());

        ctx.audit.record(AuditEvent::new(
            AuditAction::DocumentConverted,
            Some(doc.file_name.clone()),
        ));
        if let Some(ref cb) = self.config.progress {
            cb.on_document_complete(&doc.file_name, hi_type, enriched);
        }

        Ok(DocumentOutcome {
            classification: Classification {
                file_name: doc.file_name.clone(),
                hi_type,
            },
            report: ExtractionReport {
                file_name: doc.file_name.clone(),
                source_mode: resolved.source_mode.clone(),
                text_length,
                hash_source: hash.source,
                metadata: resolved.metadata,
            },
            result: PipelineDocumentResult {
                file_name: doc.file_name.clone(),
                bundle,
                hi_type,
                sha256: hash.value,
                extraction: ExtractionSummary {
                    text_length,
                    source_mode: resolved.source_mode,
                },
                quality,
                enriched,
                validation,
                compliance,
            },
        })
    }
}

/// Convert a claim with the default collaborators and configuration.
pub async fn convert_claim_documents(request: ClaimRequest) -> Result<ClaimConversionOutput, PipelineError> {
    ClaimPipeline::default().convert(request).await
}

/// Builder for [`ClaimPipeline`]. Unset collaborators get the defaults.
#[derive(Default)]
pub struct ClaimPipelineBuilder {
    config: Option<PipelineConfig>,
    classifier: Option<Arc<dyn Classifier>>,
    extractor: Option<Arc<dyn StructuredExtractor>>,
    scorer: Option<Arc<dyn QualityScorer>>,
    mapper: Option<Arc<dyn BundleMapper>>,
    validator: Option<Arc<dyn BundleValidator>>,
    compliance: Option<Arc<dyn ComplianceEngine>>,
}

impl ClaimPipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn StructuredExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn scorer(mut self, scorer: Arc<dyn QualityScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn mapper(mut self, mapper: Arc<dyn BundleMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn BundleValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn compliance(mut self, compliance: Arc<dyn ComplianceEngine>) -> Self {
        self.compliance = Some(compliance);
        self
    }

    pub fn build(self) -> Result<ClaimPipeline, PipelineError> {
        let config = self.config.unwrap_or_default();
        if config.document_concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "document concurrency must be >= 1".into(),
            ));
        }
        let defaults = ClaimPipeline::with_config(config);
        Ok(ClaimPipeline {
            classifier: self.classifier.unwrap_or(defaults.classifier),
            extractor: self.extractor.unwrap_or(defaults.extractor),
            scorer: self.scorer.unwrap_or(defaults.scorer),
            mapper: self.mapper.unwrap_or(defaults.mapper),
            validator: self.validator.unwrap_or(defaults.validator),
            compliance: self.compliance.unwrap_or(defaults.compliance),
            config: defaults.config,
        })
    }
}
