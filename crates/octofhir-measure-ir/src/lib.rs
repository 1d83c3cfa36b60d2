//! Criteria-tree intermediate representation
//!
//! This crate defines the structured measure specification (UMS) produced by
//! extraction and consumed by the code generators: data elements, logical
//! clauses, populations and value sets, together with the tree engine that
//! validates, walks, renders, edits and diffs criteria trees.
//!
//! Trees are persistent: children are reference counted and every edit returns
//! a new clause, so snapshots held by a versioning layer stay valid.
//!
//! # Example
//!
//! ```
//! use octofhir_measure_ir::{ClinicalType, DataElement, LogicalClause, to_natural_language};
//!
//! let tree = LogicalClause::and("root", vec![
//!     DataElement::new("dx", ClinicalType::Diagnosis, "Diabetes").into(),
//!     DataElement::new("enc", ClinicalType::Encounter, "Office visit").into(),
//! ]);
//! assert_eq!(to_natural_language(&tree), "Diabetes AND Office visit");
//! ```

mod clause;
mod diff;
mod edit;
mod element;
mod flat;
mod measure;
mod render;
mod validate;
mod value_set;
mod walk;

pub use clause::*;
pub use diff::*;
pub use edit::*;
pub use element::*;
pub use flat::*;
pub use measure::*;
pub use render::*;
pub use validate::*;
pub use value_set::*;
pub use walk::*;
