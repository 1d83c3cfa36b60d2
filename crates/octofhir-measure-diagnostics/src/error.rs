//! Measure error types

use crate::{ErrorCode, SourceLocation, Span};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The output for this item could not be produced
    Error,
    /// Output was produced with a degraded fallback
    Warning,
    /// Informational message
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// A degraded-result report attached to a best-effort output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: ErrorCode,
    pub message: String,
    /// Id of the IR node (criterion, group or population) the report concerns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Location inside the source document, for extraction reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Error, code, message)
    }

    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Warning, code, message)
    }

    pub fn info(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Info, code, message)
    }

    fn with_severity(severity: Severity, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            node_id: None,
            location: None,
            help: None,
        }
    }

    /// Attach the id of the node this diagnostic is about
    pub fn for_node(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Set the span (converts to location using provided source)
    pub fn with_span(mut self, span: Span, source: &str) -> Self {
        self.location = Some(SourceLocation::from_span(span, source));
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Render with terminal colors
    #[cfg(feature = "colored")]
    pub fn render_colored(&self) -> String {
        use colored::Colorize;

        let label = match self.severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow().bold(),
            Severity::Info => "info".blue().bold(),
        };
        let mut out = format!("{}[{}]: {}", label, self.code, self.message);
        if let Some(node) = &self.node_id {
            out.push_str(&format!(" {}", format!("({node})").dimmed()));
        }
        if let Some(help) = &self.help {
            out.push_str(&format!("\n  {} {}", "help:".cyan(), help));
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} - {}", self.severity, self.code, self.message)?;
        if let Some(node) = &self.node_id {
            write!(f, " [{}]", node)?;
        }
        if let Some(loc) = &self.location {
            write!(f, " at {}", loc)?;
        }
        Ok(())
    }
}

/// Fatal measure errors
///
/// Anything short of these is reported as a [`Diagnostic`] next to a best-effort
/// result instead of being raised.
#[derive(Debug, Clone, Error)]
pub enum MeasureError {
    /// Invalid or missing required IR input
    #[error("{code}: {message}")]
    Structural {
        code: ErrorCode,
        message: String,
        node_id: Option<String>,
    },

    /// Oracle output that cannot be decoded
    #[error("{code}: {message}")]
    Parse {
        code: ErrorCode,
        message: String,
        /// Leading part of the offending input
        excerpt: String,
    },

    /// A collaborator (oracle, document extractor) could not be reached
    #[error("{code}: {collaborator}: {message}")]
    External {
        code: ErrorCode,
        collaborator: String,
        message: String,
    },

    /// Configuration or serialization problem
    #[error("{code}: {message}")]
    System { code: ErrorCode, message: String },

    /// Multiple errors collected
    #[error("Multiple errors: {}", .0.len())]
    Multiple(Vec<MeasureError>),
}

const EXCERPT_LEN: usize = 200;

impl MeasureError {
    pub fn structural(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Structural {
            code,
            message: message.into(),
            node_id: None,
        }
    }

    pub fn structural_at(code: ErrorCode, message: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self::Structural {
            code,
            message: message.into(),
            node_id: Some(node_id.into()),
        }
    }

    /// Create a parse error, keeping only a short excerpt of the input
    pub fn parse(code: ErrorCode, message: impl Into<String>, input: &str) -> Self {
        let excerpt: String = input.chars().take(EXCERPT_LEN).collect();
        Self::Parse {
            code,
            message: message.into(),
            excerpt,
        }
    }

    pub fn external(code: ErrorCode, collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::External {
            code,
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    pub fn system(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::System {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Structural { code, .. } => *code,
            Self::Parse { code, .. } => *code,
            Self::External { code, .. } => *code,
            Self::System { code, .. } => *code,
            Self::Multiple(errors) => errors.first().map(|e| e.code()).unwrap_or(ErrorCode::new(0)),
        }
    }

    /// Convert to an error-severity diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Structural { code, message, node_id } => {
                let diag = Diagnostic::error(*code, message.clone());
                match node_id {
                    Some(id) => diag.for_node(id.clone()),
                    None => diag,
                }
            }
            Self::Parse { code, message, excerpt } => {
                Diagnostic::error(*code, message.clone()).with_help(format!("response began with: {excerpt}"))
            }
            Self::External { code, collaborator, message } => {
                Diagnostic::error(*code, format!("{collaborator}: {message}"))
            }
            Self::System { code, message } => Diagnostic::error(*code, message.clone()),
            Self::Multiple(errors) => match errors.first() {
                Some(first) => first.to_diagnostic(),
                None => Diagnostic::error(ErrorCode::new(0), "Unknown error"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{UMS0020, UMS0200, UMS0300};

    #[test]
    fn test_structural_error_display() {
        let err = MeasureError::structural(UMS0020, "measure id is required");
        assert_eq!(err.to_string(), "UMS0020: measure id is required");
        assert_eq!(err.code(), UMS0020);
    }

    #[test]
    fn test_parse_error_truncates_excerpt() {
        let input = "x".repeat(1000);
        let err = MeasureError::parse(UMS0200, "not json", &input);
        match &err {
            MeasureError::Parse { excerpt, .. } => assert_eq!(excerpt.len(), EXCERPT_LEN),
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.to_diagnostic().help.is_some());
    }

    #[test]
    fn test_external_to_diagnostic() {
        let diag = MeasureError::external(UMS0300, "oracle", "connection refused").to_diagnostic();
        assert!(diag.is_error());
        assert!(diag.message.contains("connection refused"));
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::warning(UMS0200, "bad response").for_node("num-1");
        let text = diag.to_string();
        assert!(text.contains("UMS0200"));
        assert!(text.contains("[num-1]"));
    }
}
