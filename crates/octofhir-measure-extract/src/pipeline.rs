//! The multi-pass extraction pipeline
//!
//! `start -> skeleton -> detail (per population) -> validation -> assembled`
//!
//! The skeleton pass is the only fatal stage. Detail passes degrade per
//! population and the validation pass only ever adds warnings. Detail passes
//! run through a bounded stream (`max_concurrency`, sequential by default);
//! results keep job order and the merge groups by population type, so the
//! outcome does not depend on completion order.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use octofhir_measure_diagnostics::{
    Diagnostic, ErrorCode, MeasureError, Severity, Span, UMS0200, UMS0201, UMS0202, UMS0203, UMS0204, UMS0205, UMS0206,
    UMS0207, UMS0209, UMS0210, UMS0300, UMS0301,
};
use octofhir_measure_ir::{
    PopulationDefinition, PopulationType, UniversalMeasureSpec, ValueSetReference, dedupe_value_sets,
    to_natural_language, validate,
};
use serde::{Deserialize, Serialize};

use crate::{
    ChunkConfig, DetailDecoder, DocumentChunk, DocumentExtractor, DocumentFile, MeasureSkeleton, OidValidator,
    Oracle, PopulationExtractionResult, PopulationSkeleton, RawPopulationDetail, RawSkeleton, RawValidation,
    ValidationReport, CatalogOidValidator, chunk_document, detail_request, merge_population_results,
    parse_response, skeleton_request, truncate_document, validation_request,
};

/// Pipeline settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractionConfig {
    /// Characters of document text sent with a single request
    pub max_document_chars: usize,
    /// Documents longer than this (in bytes) take the chunked path
    pub chunk_threshold: usize,
    pub chunking: ChunkConfig,
    pub run_validation_pass: bool,
    /// Detail passes allowed in flight at once
    pub max_concurrency: usize,
    pub skeleton_max_tokens: u32,
    pub detail_max_tokens: u32,
    pub validation_max_tokens: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_document_chars: 50_000,
            chunk_threshold: 20_000,
            chunking: ChunkConfig::default(),
            run_validation_pass: true,
            max_concurrency: 1,
            skeleton_max_tokens: 4_096,
            detail_max_tokens: 8_192,
            validation_max_tokens: 4_096,
        }
    }
}

impl ExtractionConfig {
    pub fn without_validation_pass(mut self) -> Self {
        self.run_validation_pass = false;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkConfig) -> Self {
        self.chunking = chunking;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStage {
    Start,
    Skeleton,
    Detail,
    Validation,
    Assembled,
}

impl ExtractionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStage::Start => "start",
            ExtractionStage::Skeleton => "skeleton",
            ExtractionStage::Detail => "detail",
            ExtractionStage::Validation => "validation",
            ExtractionStage::Assembled => "assembled",
        }
    }
}

impl fmt::Display for ExtractionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: ExtractionStage,
    pub duration: Duration,
}

/// Progress report passed to the caller's callback between steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionProgress {
    pub stage: ExtractionStage,
    pub completed: usize,
    pub total: usize,
    pub message: String,
}

pub type ProgressCallback = Arc<dyn Fn(&ExtractionProgress) + Send + Sync>;

/// Everything a run produced, whether or not it succeeded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiPassResult {
    /// False only when the skeleton pass failed
    pub success: bool,
    /// Last stage reached
    pub stage: ExtractionStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<UniversalMeasureSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skeleton: Option<MeasureSkeleton>,
    pub populations: Vec<PopulationExtractionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub timings: Vec<StageTiming>,
    /// Zero when the document was processed whole
    pub chunk_count: usize,
}

impl MultiPassResult {
    fn failed(error: Diagnostic, warnings: Vec<Diagnostic>, timings: Vec<StageTiming>) -> Self {
        Self {
            success: false,
            stage: ExtractionStage::Start,
            spec: None,
            skeleton: None,
            populations: Vec::new(),
            validation: None,
            errors: vec![error],
            warnings,
            timings,
            chunk_count: 0,
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.timings.iter().map(|t| t.duration).sum()
    }

    pub fn stage_duration(&self, stage: ExtractionStage) -> Option<Duration> {
        self.timings.iter().find(|t| t.stage == stage).map(|t| t.duration)
    }

    pub fn population(&self, population_type: PopulationType) -> Option<&PopulationExtractionResult> {
        self.populations.iter().find(|p| p.population_type == population_type)
    }

    pub fn has_error(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|d| d.code == code)
    }

    pub fn has_warning(&self, code: ErrorCode) -> bool {
        self.warnings.iter().any(|d| d.code == code)
    }
}

/// Runs the three passes against an oracle
#[derive(Clone)]
pub struct MultiPassExtractor {
    oracle: Arc<dyn Oracle>,
    oid_validator: Arc<dyn OidValidator>,
    config: ExtractionConfig,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for MultiPassExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiPassExtractor")
            .field("oracle", &self.oracle.name())
            .field("config", &self.config)
            .field("progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

/// One detail-pass call: a population against the whole document or one chunk
struct DetailJob<'a> {
    population: &'a PopulationSkeleton,
    chunk: Option<&'a DocumentChunk>,
    text: &'a str,
}

impl MultiPassExtractor {
    /// Extractor with the offline OID validator and default settings
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            oid_validator: Arc::new(CatalogOidValidator::new()),
            config: ExtractionConfig::default(),
            progress: None,
        }
    }

    pub fn with_oid_validator(mut self, validator: Arc<dyn OidValidator>) -> Self {
        self.oid_validator = validator;
        self
    }

    pub fn with_config(mut self, config: ExtractionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Build a measure specification from document text
    pub async fn extract(&self, document: &str) -> MultiPassResult {
        let mut warnings = Vec::new();
        let mut timings = Vec::new();
        let mut truncation_reported = false;

        let chunks = if document.len() > self.config.chunk_threshold {
            chunk_document(document, &self.config.chunking)
        } else {
            Vec::new()
        };
        if !chunks.is_empty() {
            log::debug!("document of {} bytes split into {} chunks", document.len(), chunks.len());
        }

        // Skeleton
        self.report(ExtractionStage::Start, 0, 1, "extracting measure outline");
        let started = Instant::now();
        let skeleton_source = chunks.first().map_or(document, |c| c.text.as_str());
        let (skeleton_text, truncated) = truncate_document(skeleton_source, self.config.max_document_chars);
        if truncated {
            warnings.push(self.truncation_warning(skeleton_source));
            truncation_reported = true;
        }
        let skeleton = match self.skeleton_pass(skeleton_text).await {
            Ok((skeleton, skeleton_warnings)) => {
                warnings.extend(skeleton_warnings);
                skeleton
            }
            Err(error) => {
                log::warn!("skeleton pass failed: {error}");
                timings.push(StageTiming {
                    stage: ExtractionStage::Skeleton,
                    duration: started.elapsed(),
                });
                return MultiPassResult::failed(error.to_diagnostic(), warnings, timings);
            }
        };
        timings.push(StageTiming {
            stage: ExtractionStage::Skeleton,
            duration: started.elapsed(),
        });
        log::info!(
            "skeleton pass found {} populations for '{}' in {:?}",
            skeleton.populations.len(),
            skeleton.metadata.measure_id,
            started.elapsed()
        );
        self.report(
            ExtractionStage::Skeleton,
            1,
            1,
            &format!("found {} populations", skeleton.populations.len()),
        );

        // Detail
        let started = Instant::now();
        let whole_text = truncate_document(document, self.config.max_document_chars).0;
        let mut jobs = Vec::new();
        for population in &skeleton.populations {
            if chunks.is_empty() {
                jobs.push(DetailJob {
                    population,
                    chunk: None,
                    text: whole_text,
                });
                continue;
            }
            let matching: Vec<&DocumentChunk> = chunks
                .iter()
                .filter(|c| c.has_marker(population.population_type))
                .collect();
            if matching.is_empty() {
                warnings.push(
                    Diagnostic::warning(
                        UMS0204,
                        format!("no chunk mentions {}; using the first chunk", population.name),
                    )
                    .for_node(population.population_type.abbreviation()),
                );
            }
            let targets: Vec<&DocumentChunk> = if matching.is_empty() {
                chunks.iter().take(1).collect()
            } else {
                matching
            };
            jobs.extend(targets.into_iter().map(|chunk| DetailJob {
                population,
                chunk: Some(chunk),
                text: truncate_document(&chunk.text, self.config.max_document_chars).0,
            }));
        }

        let total = jobs.len();
        let completed = AtomicUsize::new(0);
        let skeleton_ref = &skeleton;
        let completed_ref = &completed;
        let results: Vec<PopulationExtractionResult> = stream::iter(jobs)
            .map(|job| async move {
                let result = self.detail_pass(skeleton_ref, job).await;
                let done = completed_ref.fetch_add(1, Ordering::SeqCst) + 1;
                self.report(
                    ExtractionStage::Detail,
                    done,
                    total,
                    &format!("{} extracted", result.population_type.cql_name()),
                );
                result
            })
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let populations = merge_population_results(results);
        let mut errors = Vec::new();
        for population in &populations {
            if !population.success {
                log::warn!("{} detail pass failed", population.population_type.cql_name());
            }
            errors.extend(population.errors.iter().cloned());
            warnings.extend(population.warnings.iter().cloned());
        }
        timings.push(StageTiming {
            stage: ExtractionStage::Detail,
            duration: started.elapsed(),
        });
        log::info!(
            "detail passes finished: {} of {} populations extracted in {:?}",
            populations.iter().filter(|p| p.success).count(),
            populations.len(),
            started.elapsed()
        );

        // Validation
        let mut validation = None;
        if self.config.run_validation_pass {
            let started = Instant::now();
            let (text, truncated) = truncate_document(document, self.config.max_document_chars);
            if truncated && !truncation_reported {
                warnings.push(self.truncation_warning(document));
            }
            match self.validation_pass(text, &skeleton, &populations).await {
                Ok(report) => {
                    warnings.extend(validation_warnings(&report, document));
                    validation = Some(report);
                }
                Err(error) => {
                    log::warn!("validation pass failed: {error}");
                    warnings.push(Diagnostic::warning(UMS0202, format!("validation pass failed: {error}")));
                }
            }
            timings.push(StageTiming {
                stage: ExtractionStage::Validation,
                duration: started.elapsed(),
            });
            self.report(ExtractionStage::Validation, 1, 1, "cross-reference validation finished");
        }

        // Assembly
        let started = Instant::now();
        let value_sets: Vec<ValueSetReference> = populations
            .iter()
            .filter(|p| p.success)
            .flat_map(|p| p.value_sets.iter().cloned())
            .collect();
        let definitions: Vec<PopulationDefinition> = populations
            .iter()
            .filter(|p| p.success)
            .filter_map(|p| p.population.clone())
            .collect();
        let spec = UniversalMeasureSpec::assemble(skeleton.metadata.clone(), definitions, value_sets);
        timings.push(StageTiming {
            stage: ExtractionStage::Assembled,
            duration: started.elapsed(),
        });
        self.report(
            ExtractionStage::Assembled,
            spec.populations.len(),
            skeleton.populations.len(),
            "measure specification assembled",
        );
        for warning in &warnings {
            log::warn!("{warning}");
        }

        MultiPassResult {
            success: true,
            stage: ExtractionStage::Assembled,
            spec: Some(spec),
            skeleton: Some(skeleton),
            populations,
            validation,
            errors,
            warnings,
            timings,
            chunk_count: chunks.len(),
        }
    }

    /// Extract text from uploaded files, then run the pipeline on the combined text
    pub async fn extract_documents(&self, extractor: &dyn DocumentExtractor, files: &[DocumentFile]) -> MultiPassResult {
        let started = Instant::now();
        let extraction = match extractor.extract(files).await {
            Ok(extraction) => extraction,
            Err(e) => {
                let error = MeasureError::external(UMS0301, "document extractor", e.to_string());
                return MultiPassResult::failed(error.to_diagnostic(), Vec::new(), Vec::new());
            }
        };
        log::debug!(
            "extracted {} bytes of text from {} documents in {:?}",
            extraction.combined_text.len(),
            extraction.documents.len(),
            started.elapsed()
        );

        let document_warnings: Vec<Diagnostic> = extraction
            .errors
            .iter()
            .map(|e| Diagnostic::warning(UMS0301, e.clone()))
            .collect();
        if extraction.combined_text.trim().is_empty() {
            let error = Diagnostic::error(UMS0301, "no text could be extracted from the documents");
            return MultiPassResult::failed(error, document_warnings, Vec::new());
        }

        let mut result = self.extract(&extraction.combined_text).await;
        let mut warnings = document_warnings;
        warnings.append(&mut result.warnings);
        result.warnings = warnings;
        result
    }

    async fn skeleton_pass(&self, document: &str) -> Result<(MeasureSkeleton, Vec<Diagnostic>), MeasureError> {
        log::debug!("skeleton pass over {} characters", document.chars().count());
        let request = skeleton_request(document, self.config.skeleton_max_tokens);
        let response = self
            .oracle
            .complete(&request)
            .await
            .map_err(|e| MeasureError::external(UMS0300, self.oracle.name(), e.to_string()))?;
        let raw: RawSkeleton = parse_response(&response, UMS0200)?;
        Ok(raw.decode())
    }

    async fn detail_pass(&self, skeleton: &MeasureSkeleton, job: DetailJob<'_>) -> PopulationExtractionResult {
        let population_type = job.population.population_type;
        let population_id = population_type.abbreviation();
        log::debug!(
            "detail pass for {} ({})",
            job.population.name,
            job.chunk.map_or_else(|| "whole document".to_string(), |c| format!("chunk {}", c.index))
        );

        let result = self.detail_result(skeleton, &job, population_id).await;
        match job.chunk {
            Some(chunk) => result.with_chunk(chunk.index),
            None => result,
        }
    }

    async fn detail_result(
        &self,
        skeleton: &MeasureSkeleton,
        job: &DetailJob<'_>,
        population_id: &str,
    ) -> PopulationExtractionResult {
        let population_type = job.population.population_type;
        let request = detail_request(skeleton, job.population, job.text, self.config.detail_max_tokens);
        let response = match self.oracle.complete(&request).await {
            Ok(response) => response,
            Err(e) => {
                let error = MeasureError::external(UMS0300, self.oracle.name(), e.to_string());
                return PopulationExtractionResult::failed(population_type, error.to_diagnostic().for_node(population_id));
            }
        };
        let raw: RawPopulationDetail = match parse_response(&response, UMS0201) {
            Ok(raw) => raw,
            Err(error) => {
                return PopulationExtractionResult::failed(population_type, error.to_diagnostic().for_node(population_id));
            }
        };

        let (detail, mut warnings) = DetailDecoder::new(population_id).decode(raw);
        let narrative = if detail.narrative.is_empty() {
            job.population.description.clone()
        } else {
            detail.narrative
        };
        let mut population = PopulationDefinition::new(population_id, population_type)
            .with_narrative(narrative)
            .with_confidence(detail.confidence);
        let mut value_sets = detail.value_sets;
        if let Some(criteria) = detail.criteria {
            let report = validate(Some(&criteria));
            warnings.extend(report.diagnostics().into_iter().map(as_warning));
            value_sets.extend(criteria.value_sets());
            population = population.with_criteria(criteria);
        }
        let value_sets = dedupe_value_sets(value_sets);
        warnings.extend(self.check_oids(&value_sets, population_id).await);

        let mut result = PopulationExtractionResult::succeeded(population, value_sets);
        result.warnings = warnings;
        result
    }

    /// Run every OID through the validator; failures only ever warn
    async fn check_oids(&self, value_sets: &[ValueSetReference], population_id: &str) -> Vec<Diagnostic> {
        let mut warnings = Vec::new();
        for vs in value_sets {
            let Some(oid) = vs.oid() else {
                continue;
            };
            match self.oid_validator.validate(oid, Some(&vs.name)).await {
                Ok(validation) => {
                    if !validation.valid {
                        warnings.push(
                            Diagnostic::warning(
                                UMS0203,
                                format!("value set \"{}\" has invalid OID {oid}: {}", vs.name, validation.errors.join("; ")),
                            )
                            .for_node(population_id),
                        );
                    }
                    warnings.extend(
                        validation
                            .warnings
                            .into_iter()
                            .map(|w| Diagnostic::warning(UMS0203, w).for_node(population_id)),
                    );
                }
                Err(e) => warnings.push(
                    Diagnostic::warning(UMS0203, format!("could not validate OID {oid}: {e}")).for_node(population_id),
                ),
            }
        }
        warnings
    }

    async fn validation_pass(
        &self,
        document: &str,
        skeleton: &MeasureSkeleton,
        populations: &[PopulationExtractionResult],
    ) -> Result<ValidationReport, MeasureError> {
        log::debug!("validation pass over {} populations", populations.len());
        let summary = extraction_summary(skeleton, populations);
        let request = validation_request(document, &summary, self.config.validation_max_tokens);
        let response = self
            .oracle
            .complete(&request)
            .await
            .map_err(|e| MeasureError::external(UMS0300, self.oracle.name(), e.to_string()))?;
        let raw: RawValidation = parse_response(&response, UMS0202)?;
        Ok(raw.into())
    }

    fn report(&self, stage: ExtractionStage, completed: usize, total: usize, message: &str) {
        if let Some(callback) = &self.progress {
            callback(&ExtractionProgress {
                stage,
                completed,
                total,
                message: message.to_string(),
            });
        }
    }

    fn truncation_warning(&self, text: &str) -> Diagnostic {
        Diagnostic::warning(
            UMS0210,
            format!(
                "document has {} characters; only the first {} were sent",
                text.chars().count(),
                self.config.max_document_chars
            ),
        )
    }
}

/// Run the pipeline once with the given settings
pub async fn extract_with_multi_pass(
    oracle: Arc<dyn Oracle>,
    document: &str,
    config: ExtractionConfig,
) -> MultiPassResult {
    MultiPassExtractor::new(oracle).with_config(config).extract(document).await
}

/// Document-file variant of [`extract_with_multi_pass`]
pub async fn extract_from_documents(
    oracle: Arc<dyn Oracle>,
    extractor: &dyn DocumentExtractor,
    files: &[DocumentFile],
    config: ExtractionConfig,
) -> MultiPassResult {
    MultiPassExtractor::new(oracle)
        .with_config(config)
        .extract_documents(extractor, files)
        .await
}

/// JSON summary of what has been extracted, for the validation pass
fn extraction_summary(skeleton: &MeasureSkeleton, populations: &[PopulationExtractionResult]) -> String {
    let summary = serde_json::json!({
        "measureId": skeleton.metadata.measure_id,
        "title": skeleton.metadata.title,
        "populations": populations
            .iter()
            .filter_map(|p| p.population.as_ref())
            .map(|p| serde_json::json!({
                "type": p.population_type.as_str(),
                "narrative": p.narrative,
                "logic": p.criteria.as_ref().map(to_natural_language),
                "criteria": p.criteria.as_ref().map(|c| c
                    .elements()
                    .into_iter()
                    .map(|e| serde_json::json!({
                        "id": e.id,
                        "type": e.clinical_type.as_str(),
                        "description": e.description,
                    }))
                    .collect::<Vec<_>>()),
            }))
            .collect::<Vec<_>>(),
    });
    serde_json::to_string_pretty(&summary).unwrap_or_else(|_| summary.to_string())
}

fn validation_warnings(report: &ValidationReport, document: &str) -> Vec<Diagnostic> {
    let mut warnings = Vec::new();
    for name in &report.missing_populations {
        let diagnostic = Diagnostic::warning(UMS0205, format!("document defines '{name}' but it was not extracted"));
        warnings.push(match PopulationType::from_label(name) {
            Some(ty) => diagnostic.for_node(ty.abbreviation()),
            None => diagnostic,
        });
    }
    for missing in &report.missing_criteria {
        let mut diagnostic =
            Diagnostic::warning(UMS0206, format!("criterion may be missing: {}", missing.description));
        if let Some(ty) = missing.population_type {
            diagnostic = diagnostic.for_node(ty.abbreviation());
        }
        if let Some(source) = &missing.source_text {
            if let Some(start) = document.find(source.as_str()) {
                diagnostic = diagnostic.with_span(Span::new(start, start + source.len()), document);
            }
            diagnostic = diagnostic.with_help(format!("source text: \"{source}\""));
        }
        warnings.push(diagnostic);
    }
    for suspect in &report.suspected_hallucinations {
        let message = match &suspect.reason {
            Some(reason) => format!("criterion may be hallucinated: {} ({reason})", suspect.description),
            None => format!("criterion may be hallucinated: {}", suspect.description),
        };
        let diagnostic = Diagnostic::warning(UMS0207, message);
        warnings.push(match &suspect.criterion_id {
            Some(id) => diagnostic.for_node(id.clone()),
            None => diagnostic,
        });
    }
    warnings.extend(
        report
            .suggestions
            .iter()
            .map(|s| Diagnostic::info(UMS0209, s.clone())),
    );
    warnings
}

fn as_warning(mut diagnostic: Diagnostic) -> Diagnostic {
    if diagnostic.severity == Severity::Error {
        diagnostic.severity = Severity::Warning;
    }
    diagnostic
}
