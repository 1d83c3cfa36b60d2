//! Measure error codes following a structured numbering system
//!
//! Error code ranges:
//! - UMS0001-UMS0099: Structural errors (criteria tree shape, required identifiers)
//! - UMS0100-UMS0199: Generation degradations (CQL/SQL lowering)
//! - UMS0200-UMS0299: Extraction errors (oracle passes, chunk merge)
//! - UMS0300-UMS0399: External collaborator failures
//! - UMS0400-UMS0499: System errors (configuration, serialization)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Error code identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(u16);

impl ErrorCode {
    /// Create a new error code
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Get the numeric code
    pub const fn code(&self) -> u16 {
        self.0
    }

    /// Get error information for this code
    pub fn info(&self) -> &'static ErrorInfo {
        ERROR_INFO.get(&self.0).unwrap_or(&UNKNOWN_ERROR)
    }

    pub const fn is_structural(&self) -> bool {
        self.0 >= 1 && self.0 < 100
    }

    pub const fn is_generation(&self) -> bool {
        self.0 >= 100 && self.0 < 200
    }

    pub const fn is_extraction(&self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    pub const fn is_external(&self) -> bool {
        self.0 >= 300 && self.0 < 400
    }

    pub const fn is_system(&self) -> bool {
        self.0 >= 400 && self.0 < 500
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UMS{:04}", self.0)
    }
}

/// Information about an error code
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Short description of the error
    pub description: &'static str,
    /// Detailed help text
    pub help: Option<&'static str>,
}

impl ErrorInfo {
    const fn new(description: &'static str) -> Self {
        Self {
            description,
            help: None,
        }
    }

    const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

static UNKNOWN_ERROR: ErrorInfo = ErrorInfo::new("Unknown error");

static ERROR_INFO: LazyLock<HashMap<u16, ErrorInfo>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    // Structural (0001-0099)
    map.insert(1, ErrorInfo::new("Criteria tree is empty"));
    map.insert(2, ErrorInfo::new("Logical group has no children"));
    map.insert(3, ErrorInfo::new("NOT group has more than one child")
        .with_help("Wrap the children in an AND or OR group and negate that group"));
    map.insert(4, ErrorInfo::new("Invalid operator"));
    map.insert(5, ErrorInfo::new("Node id used more than once")
        .with_help("Every criterion and group must carry a unique id within the tree"));
    map.insert(6, ErrorInfo::new("Logical group has a single child"));
    map.insert(7, ErrorInfo::new("Criteria tree is deeply nested"));
    map.insert(8, ErrorInfo::new("Logical group mixes operators"));
    map.insert(9, ErrorInfo::new("Child index out of range"));
    map.insert(10, ErrorInfo::new("Sibling connection between non-adjacent children"));
    map.insert(11, ErrorInfo::new("Tree path does not address a node"));
    map.insert(20, ErrorInfo::new("Measure id is missing"));
    map.insert(21, ErrorInfo::new("Measure has no populations"));
    map.insert(22, ErrorInfo::new("Invalid measure document"));

    // Generation (0100-0199)
    map.insert(100, ErrorInfo::new("Data element has no value set")
        .with_help("Attach a value set or the element lowers to a literal true"));
    map.insert(101, ErrorInfo::new("Value set has no codes or identifier"));
    map.insert(102, ErrorInfo::new("Timing requirement could not be lowered"));
    map.insert(103, ErrorInfo::new("Clinical type has no target mapping"));
    map.insert(104, ErrorInfo::new("Population logic is highly complex"));
    map.insert(105, ErrorInfo::new("Locked manual override applied"));
    map.insert(106, ErrorInfo::new("Population has no criteria"));
    map.insert(107, ErrorInfo::new("Schema binding is incomplete"));
    map.insert(108, ErrorInfo::new("Curated measure-family logic replaced authored criteria"));

    // Extraction (0200-0299)
    map.insert(200, ErrorInfo::new("Skeleton response is not valid JSON"));
    map.insert(201, ErrorInfo::new("Population detail response is not valid JSON"));
    map.insert(202, ErrorInfo::new("Validation pass failed"));
    map.insert(203, ErrorInfo::new("Value set OID failed validation"));
    map.insert(204, ErrorInfo::new("Population has no matching document section"));
    map.insert(205, ErrorInfo::new("Population reported missing"));
    map.insert(206, ErrorInfo::new("Criterion reported missing"));
    map.insert(207, ErrorInfo::new("Criterion may be hallucinated"));
    map.insert(208, ErrorInfo::new("Unknown clinical type in extracted criterion"));
    map.insert(209, ErrorInfo::new("Extraction review suggestion"));
    map.insert(210, ErrorInfo::new("Document truncated"));

    // External (0300-0399)
    map.insert(300, ErrorInfo::new("Oracle call failed"));
    map.insert(301, ErrorInfo::new("Document text extraction failed"));

    // System (0400-0499)
    map.insert(400, ErrorInfo::new("Internal error"));
    map.insert(401, ErrorInfo::new("Configuration error"));
    map.insert(402, ErrorInfo::new("Serialization error"));

    map
});

// Structural
pub const UMS0001: ErrorCode = ErrorCode::new(1);
pub const UMS0002: ErrorCode = ErrorCode::new(2);
pub const UMS0003: ErrorCode = ErrorCode::new(3);
pub const UMS0004: ErrorCode = ErrorCode::new(4);
pub const UMS0005: ErrorCode = ErrorCode::new(5);
pub const UMS0006: ErrorCode = ErrorCode::new(6);
pub const UMS0007: ErrorCode = ErrorCode::new(7);
pub const UMS0008: ErrorCode = ErrorCode::new(8);
pub const UMS0009: ErrorCode = ErrorCode::new(9);
pub const UMS0010: ErrorCode = ErrorCode::new(10);
pub const UMS0011: ErrorCode = ErrorCode::new(11);
pub const UMS0020: ErrorCode = ErrorCode::new(20);
pub const UMS0021: ErrorCode = ErrorCode::new(21);
pub const UMS0022: ErrorCode = ErrorCode::new(22);

// Generation
pub const UMS0100: ErrorCode = ErrorCode::new(100);
pub const UMS0101: ErrorCode = ErrorCode::new(101);
pub const UMS0102: ErrorCode = ErrorCode::new(102);
pub const UMS0103: ErrorCode = ErrorCode::new(103);
pub const UMS0104: ErrorCode = ErrorCode::new(104);
pub const UMS0105: ErrorCode = ErrorCode::new(105);
pub const UMS0106: ErrorCode = ErrorCode::new(106);
pub const UMS0107: ErrorCode = ErrorCode::new(107);
pub const UMS0108: ErrorCode = ErrorCode::new(108);

// Extraction
pub const UMS0200: ErrorCode = ErrorCode::new(200);
pub const UMS0201: ErrorCode = ErrorCode::new(201);
pub const UMS0202: ErrorCode = ErrorCode::new(202);
pub const UMS0203: ErrorCode = ErrorCode::new(203);
pub const UMS0204: ErrorCode = ErrorCode::new(204);
pub const UMS0205: ErrorCode = ErrorCode::new(205);
pub const UMS0206: ErrorCode = ErrorCode::new(206);
pub const UMS0207: ErrorCode = ErrorCode::new(207);
pub const UMS0208: ErrorCode = ErrorCode::new(208);
pub const UMS0209: ErrorCode = ErrorCode::new(209);
pub const UMS0210: ErrorCode = ErrorCode::new(210);

// External
pub const UMS0300: ErrorCode = ErrorCode::new(300);
pub const UMS0301: ErrorCode = ErrorCode::new(301);

// System
pub const UMS0400: ErrorCode = ErrorCode::new(400);
pub const UMS0401: ErrorCode = ErrorCode::new(401);
pub const UMS0402: ErrorCode = ErrorCode::new(402);
