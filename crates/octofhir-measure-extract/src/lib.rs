//! Oracle-assisted extraction of measure specifications from documents
//!
//! This crate provides:
//! - Collaborator traits: [`Oracle`] (text completion), [`OidValidator`],
//!   [`DocumentExtractor`]
//! - Lenient decoding of oracle JSON into the criteria-tree IR
//! - Boundary-aware chunking of long documents and a deterministic merge of
//!   per-chunk results
//! - [`MultiPassExtractor`], the skeleton, detail and validation pipeline
//!
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use octofhir_measure_extract::{CompletionRequest, MultiPassExtractor, Oracle, OracleError};
//!
//! struct Offline;
//!
//! #[async_trait]
//! impl Oracle for Offline {
//!     async fn complete(&self, _request: &CompletionRequest) -> Result<String, OracleError> {
//!         Err(OracleError::Unavailable("offline".into()))
//!     }
//! }
//!
//! # async fn run() {
//! let result = MultiPassExtractor::new(Arc::new(Offline)).extract("Numerator: ...").await;
//! assert!(!result.success);
//! # }
//! ```

pub mod chunker;
pub mod document;
pub mod dto;
pub mod json;
pub mod merge;
pub mod oid;
pub mod oracle;
pub mod pipeline;
pub mod prompts;

pub use chunker::*;
pub use document::*;
pub use dto::*;
pub use json::*;
pub use merge::*;
pub use oid::*;
pub use oracle::*;
pub use pipeline::*;
pub use prompts::*;
