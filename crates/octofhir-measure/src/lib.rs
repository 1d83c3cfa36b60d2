//! Clinical quality measure authoring for Rust
//!
//! This crate ties together:
//! - The criteria-tree IR and its tree engine ([`ir`])
//! - Complexity scoring ([`complexity`])
//! - CQL and SQL backends ([`codegen`])
//! - Oracle-assisted extraction from specification documents ([`extract`])
//!
//! # Example
//!
//! ```
//! use octofhir_measure::{MeasureMetadata, OverrideSet, PopulationDefinition, PopulationType, UniversalMeasureSpec};
//!
//! let spec = UniversalMeasureSpec::new(MeasureMetadata::new("CMS130v12", "Colorectal Cancer Screening"))
//!     .with_population(PopulationDefinition::new("ip", PopulationType::InitialPopulation))
//!     .with_population(PopulationDefinition::new("num", PopulationType::Numerator));
//!
//! let artifacts = octofhir_measure::generate_artifacts(&spec, &OverrideSet::new()).unwrap();
//! assert!(artifacts.cql.code.contains("library "));
//! assert!(artifacts.sql.code.contains("WITH "));
//! ```

// Re-export all public APIs from internal crates
pub use octofhir_measure_codegen as codegen;
pub use octofhir_measure_complexity as complexity;
pub use octofhir_measure_diagnostics as diagnostics;
pub use octofhir_measure_extract as extract;
pub use octofhir_measure_ir as ir;

// Convenience re-exports
pub use octofhir_measure_codegen::{
    CodeGenerator, CqlGenerator, CqlGeneratorOptions, GenerationResult, OverrideSet, SqlGenerator,
    SqlGeneratorOptions,
};
pub use octofhir_measure_complexity::{ComplexityLevel, ComponentComplexity};
pub use octofhir_measure_diagnostics::{Diagnostic, MeasureError, Severity};
pub use octofhir_measure_extract::{ExtractionConfig, MultiPassExtractor, MultiPassResult, Oracle};
pub use octofhir_measure_ir::{
    LogicalClause, MeasureMetadata, PopulationDefinition, PopulationType, UniversalMeasureSpec,
};

mod compile;

pub use compile::*;
