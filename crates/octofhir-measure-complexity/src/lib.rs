//! Complexity scoring for measure criteria
//!
//! Scores are pure functions of the node they describe. They are recomputed
//! after every structural edit and are never stored on the IR itself.
//!
//! ```
//! use octofhir_measure_complexity::{ComplexityLevel, score_clause};
//! use octofhir_measure_ir::{ClinicalType, DataElement, LogicalClause};
//!
//! let tree = LogicalClause::and("root", vec![
//!     DataElement::new("a", ClinicalType::Diagnosis, "Diabetes").into(),
//!     DataElement::new("b", ClinicalType::Encounter, "Office visit").into(),
//! ]);
//! let complexity = score_clause(&tree);
//! assert_eq!(complexity.score, 5);
//! assert_eq!(complexity.level, ComplexityLevel::Medium);
//! ```

mod level;
mod scorer;

pub use level::*;
pub use scorer::*;
