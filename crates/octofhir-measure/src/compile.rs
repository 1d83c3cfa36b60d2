//! Running both backends and the scorer over one measure

use std::sync::Arc;

use indexmap::IndexMap;
use octofhir_measure_codegen::{CodeGenerator, CqlGenerator, GenerationResult, OverrideSet, SqlGenerator};
use octofhir_measure_complexity::{ComponentComplexity, score_spec};
use octofhir_measure_diagnostics::{Diagnostic, MeasureError};
use octofhir_measure_extract::{ExtractionConfig, MultiPassExtractor, MultiPassResult, Oracle};
use octofhir_measure_ir::UniversalMeasureSpec;
use serde::{Deserialize, Serialize};

/// Generated CQL and SQL for a measure, with per-population complexity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureArtifacts {
    pub cql: GenerationResult,
    pub sql: GenerationResult,
    /// Keyed by population id
    pub complexity: IndexMap<String, ComponentComplexity>,
}

impl MeasureArtifacts {
    pub fn success(&self) -> bool {
        self.cql.success && self.sql.success
    }

    /// Warnings from both backends, CQL first
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.cql.warnings.iter().chain(&self.sql.warnings)
    }
}

/// Generate both artifacts with default generator settings
pub fn generate_artifacts(
    spec: &UniversalMeasureSpec,
    overrides: &OverrideSet,
) -> Result<MeasureArtifacts, MeasureError> {
    generate_artifacts_with(&CqlGenerator::default(), &SqlGenerator::default(), spec, overrides)
}

pub fn generate_artifacts_with(
    cql: &CqlGenerator,
    sql: &SqlGenerator,
    spec: &UniversalMeasureSpec,
    overrides: &OverrideSet,
) -> Result<MeasureArtifacts, MeasureError> {
    let cql = cql.generate(spec, overrides)?;
    let sql = sql.generate(spec, overrides)?;
    Ok(MeasureArtifacts {
        cql,
        sql,
        complexity: score_spec(spec),
    })
}

/// An extraction run and, when it produced a measure, its artifacts
#[derive(Debug, Clone)]
pub struct CompiledMeasure {
    pub extraction: MultiPassResult,
    pub artifacts: Option<MeasureArtifacts>,
    /// Extraction errors followed by the generation failure, if any
    pub errors: Vec<Diagnostic>,
}

impl CompiledMeasure {
    pub fn spec(&self) -> Option<&UniversalMeasureSpec> {
        self.extraction.spec.as_ref()
    }

    pub fn success(&self) -> bool {
        self.extraction.success && self.artifacts.as_ref().is_some_and(MeasureArtifacts::success)
    }
}

/// Extract a measure from document text and generate CQL and SQL for it
///
/// Extraction and generation failures are collected on the result rather than
/// raised, so the caller always sees what the pipeline produced.
pub async fn compile_document(oracle: Arc<dyn Oracle>, document: &str, config: ExtractionConfig) -> CompiledMeasure {
    let extraction = MultiPassExtractor::new(oracle).with_config(config).extract(document).await;
    let mut errors = extraction.errors.clone();

    let artifacts = match extraction.spec.as_ref() {
        Some(spec) => match generate_artifacts(spec, &OverrideSet::new()) {
            Ok(artifacts) => Some(artifacts),
            Err(e) => {
                log::warn!("code generation failed for {}: {e}", spec.metadata.measure_id);
                errors.push(e.to_diagnostic());
                None
            }
        },
        None => None,
    };

    CompiledMeasure {
        extraction,
        artifacts,
        errors,
    }
}
