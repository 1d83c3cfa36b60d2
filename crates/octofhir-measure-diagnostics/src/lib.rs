//! Measure authoring diagnostics and error handling
//!
//! This crate provides the failure taxonomy shared by the tree engine, the code
//! generators and the extraction pipeline:
//!
//! - [`MeasureError`] for fatal failures (structural input errors, skeleton parse
//!   failures, unreachable collaborators)
//! - [`Diagnostic`] for degraded results that are reported next to a best-effort output
//! - [`ErrorCode`] with the `UMS####` numbering used in both

mod error;
mod error_code;
mod span;

pub use error::*;
pub use error_code::*;
pub use span::*;

/// Result type for measure operations
pub type Result<T> = std::result::Result<T, MeasureError>;
