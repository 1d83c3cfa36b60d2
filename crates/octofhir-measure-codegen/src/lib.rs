//! CQL and SQL code generation for measure specifications
//!
//! Both backends share classification ([`classify`]), timing normalization
//! ([`normalize_timing`]) and the tree renderer from `octofhir-measure-ir`;
//! they differ only in how a leaf is lowered and how siblings are combined.
//!
//! Generation fails only when required identifiers are missing. Anything else
//! (an unresolved value set, an unbound column, an unlowerable timing phrase)
//! degrades to a warning and best-effort output.
//!
//! ```
//! use octofhir_measure_codegen::{CodeGenerator, CqlGenerator, OverrideSet};
//! use octofhir_measure_ir::{MeasureMetadata, PopulationDefinition, PopulationType, UniversalMeasureSpec};
//!
//! let spec = UniversalMeasureSpec::new(MeasureMetadata::new("CMS130v12", "Colorectal Cancer Screening"))
//!     .with_population(PopulationDefinition::new("num", PopulationType::Numerator));
//! let result = CqlGenerator::default().generate(&spec, &OverrideSet::new()).unwrap();
//! assert!(result.success);
//! assert!(result.code.contains("\"Colonoscopy Performed\""));
//! ```

mod adherence;
mod classify;
mod cql;
mod family;
mod options;
mod output;
mod overrides;
mod schema;
mod sql;
mod timing;

pub use adherence::{is_adherence_criterion, resolve_adherence};
pub use classify::*;
pub use cql::*;
pub use family::*;
pub use options::*;
pub use output::*;
pub use overrides::*;
pub use schema::*;
pub use sql::*;
pub use timing::*;
