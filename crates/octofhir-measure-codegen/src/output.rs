//! Generation results and the shared entry-point checks

use octofhir_measure_complexity::{ComplexityLevel, score_population};
use octofhir_measure_diagnostics::{Diagnostic, ErrorCode, MeasureError, UMS0020, UMS0021, UMS0104};
use octofhir_measure_ir::{UniversalMeasureSpec, validate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::OverrideSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationTarget {
    Cql,
    Sql,
}

impl GenerationTarget {
    /// Line-comment marker of the target language
    pub fn comment_prefix(&self) -> &'static str {
        match self {
            GenerationTarget::Cql => "//",
            GenerationTarget::Sql => "--",
        }
    }
}

impl fmt::Display for GenerationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationTarget::Cql => f.write_str("CQL"),
            GenerationTarget::Sql => f.write_str("SQL"),
        }
    }
}

/// Generated text plus itemized diagnostics
///
/// `success` is false only when `errors` is non-empty; the code is still the
/// best-effort output in that case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub target: GenerationTarget,
    pub code: String,
    pub warnings: Vec<Diagnostic>,
    pub success: bool,
    pub errors: Vec<Diagnostic>,
}

impl GenerationResult {
    pub(crate) fn from_parts(target: GenerationTarget, code: String, diagnostics: Diagnostics) -> Self {
        Self {
            target,
            code,
            success: diagnostics.errors.is_empty(),
            warnings: diagnostics.warnings,
            errors: diagnostics.errors,
        }
    }

    pub fn has_warning(&self, code: ErrorCode) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }
}

/// A backend lowering a measure into one target language
pub trait CodeGenerator {
    fn target(&self) -> GenerationTarget;

    /// Generate the artifact for a whole measure
    ///
    /// Fails only when required identifiers are missing; everything else
    /// degrades to diagnostics on the result.
    fn generate(&self, spec: &UniversalMeasureSpec, overrides: &OverrideSet) -> Result<GenerationResult, MeasureError>;
}

/// Reject measures without an id or without populations
pub fn check_required(spec: &UniversalMeasureSpec) -> Result<(), MeasureError> {
    if spec.metadata.measure_id.trim().is_empty() {
        return Err(MeasureError::structural(UMS0020, "measure id is required for code generation"));
    }
    if spec.populations.is_empty() {
        return Err(MeasureError::structural_at(
            UMS0021,
            "measure has no populations to generate",
            spec.metadata.measure_id.clone(),
        ));
    }
    Ok(())
}

/// Warnings and errors accumulated while lowering
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    pub warnings: Vec<Diagnostic>,
    pub errors: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn warn(&mut self, diagnostic: Diagnostic) {
        log::warn!("{diagnostic}");
        self.warnings.push(diagnostic);
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_error() {
            self.errors.push(diagnostic);
        } else {
            self.warnings.push(diagnostic);
        }
    }

    /// Tree validation errors and optional complexity warnings for every population
    pub fn check_populations(&mut self, spec: &UniversalMeasureSpec, complexity_threshold: Option<ComplexityLevel>) {
        for population in &spec.populations {
            let Some(criteria) = population.effective_criteria() else {
                continue;
            };
            for issue in validate(Some(criteria)).errors {
                self.push(issue.to_diagnostic(true));
            }
            let Some(threshold) = complexity_threshold else {
                continue;
            };
            if let Some(complexity) = score_population(population) {
                if complexity.level >= threshold {
                    self.warn(
                        Diagnostic::warning(
                            UMS0104,
                            format!(
                                "{} logic scores {} ({} complexity)",
                                population.population_type, complexity.score, complexity.level
                            ),
                        )
                        .for_node(population.id.clone())
                        .with_help("Consider splitting the logic into named helper definitions"),
                    );
                }
            }
        }
    }
}
