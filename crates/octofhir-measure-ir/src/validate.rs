//! Structural validation of criteria trees

use octofhir_measure_diagnostics::{
    Diagnostic, ErrorCode, UMS0001, UMS0002, UMS0003, UMS0004, UMS0005, UMS0006, UMS0007, UMS0008,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::{LogicalClause, LogicalOperator, NodeRef, TreePath, walk};

/// Depth beyond which a tree is reported as deeply nested
pub const MAX_RECOMMENDED_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    EmptyTree,
    EmptyGroup,
    NotWithMultipleChildren,
    InvalidOperator,
    /// A node id reused within the tree
    CircularReference,
    SingleChildGroup,
    DeeplyNested,
    MixedOperators,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCode::EmptyTree => "EMPTY_TREE",
            ValidationCode::EmptyGroup => "EMPTY_GROUP",
            ValidationCode::NotWithMultipleChildren => "NOT_WITH_MULTIPLE_CHILDREN",
            ValidationCode::InvalidOperator => "INVALID_OPERATOR",
            ValidationCode::CircularReference => "CIRCULAR_REFERENCE",
            ValidationCode::SingleChildGroup => "SINGLE_CHILD_GROUP",
            ValidationCode::DeeplyNested => "DEEPLY_NESTED",
            ValidationCode::MixedOperators => "MIXED_OPERATORS",
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            ValidationCode::EmptyTree => UMS0001,
            ValidationCode::EmptyGroup => UMS0002,
            ValidationCode::NotWithMultipleChildren => UMS0003,
            ValidationCode::InvalidOperator => UMS0004,
            ValidationCode::CircularReference => UMS0005,
            ValidationCode::SingleChildGroup => UMS0006,
            ValidationCode::DeeplyNested => UMS0007,
            ValidationCode::MixedOperators => UMS0008,
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub code: ValidationCode,
    pub message: String,
    pub node_id: Option<String>,
    pub path: TreePath,
}

impl ValidationIssue {
    fn new(code: ValidationCode, message: impl Into<String>, node_id: Option<&str>, path: &TreePath) -> Self {
        Self {
            code,
            message: message.into(),
            node_id: node_id.map(str::to_string),
            path: path.clone(),
        }
    }

    pub fn to_diagnostic(&self, is_error: bool) -> Diagnostic {
        let diag = if is_error {
            Diagnostic::error(self.code.error_code(), self.message.clone())
        } else {
            Diagnostic::warning(self.code.error_code(), self.message.clone())
        };
        match &self.node_id {
            Some(id) => diag.for_node(id.clone()),
            None => diag,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeStats {
    pub total_nodes: usize,
    pub max_depth: usize,
    pub criterion_count: usize,
    pub group_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub stats: TreeStats,
}

impl ValidationResult {
    pub fn has_error(&self, code: ValidationCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    pub fn has_warning(&self, code: ValidationCode) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.errors
            .iter()
            .map(|e| e.to_diagnostic(true))
            .chain(self.warnings.iter().map(|w| w.to_diagnostic(false)))
            .collect()
    }
}

/// Validate a criteria tree; never fails, always returns a result
pub fn validate(root: Option<&LogicalClause>) -> ValidationResult {
    let Some(root) = root else {
        return ValidationResult {
            valid: false,
            errors: vec![ValidationIssue::new(
                ValidationCode::EmptyTree,
                "criteria tree is empty",
                None,
                &TreePath::root(),
            )],
            warnings: Vec::new(),
            stats: TreeStats::default(),
        };
    };

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut stats = TreeStats::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for item in walk(root) {
        stats.total_nodes += 1;
        stats.max_depth = stats.max_depth.max(item.depth);
        let id = item.node.id();

        if !seen.insert(id) {
            errors.push(ValidationIssue::new(
                ValidationCode::CircularReference,
                format!("id '{id}' is used by more than one node"),
                Some(id),
                &item.path,
            ));
        }

        match item.node {
            NodeRef::Element(_) => stats.criterion_count += 1,
            NodeRef::Clause(clause) => {
                stats.group_count += 1;
                check_clause(clause, &item.path, &mut errors, &mut warnings);
            }
        }
    }

    if stats.max_depth > MAX_RECOMMENDED_DEPTH {
        warnings.push(ValidationIssue::new(
            ValidationCode::DeeplyNested,
            format!(
                "tree depth {} exceeds the recommended maximum of {}",
                stats.max_depth, MAX_RECOMMENDED_DEPTH
            ),
            Some(&root.id),
            &TreePath::root(),
        ));
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
        warnings,
        stats,
    }
}

fn check_clause(
    clause: &LogicalClause,
    path: &TreePath,
    errors: &mut Vec<ValidationIssue>,
    warnings: &mut Vec<ValidationIssue>,
) {
    let id = Some(clause.id.as_str());
    let count = clause.children.len();

    if count == 0 {
        errors.push(ValidationIssue::new(
            ValidationCode::EmptyGroup,
            format!("{} group '{}' has no children", clause.operator, clause.id),
            id,
            path,
        ));
    } else if clause.operator == LogicalOperator::Not && count > 1 {
        errors.push(ValidationIssue::new(
            ValidationCode::NotWithMultipleChildren,
            format!("NOT group '{}' has {} children; expected exactly one", clause.id, count),
            id,
            path,
        ));
    } else if clause.operator != LogicalOperator::Not && count == 1 {
        warnings.push(ValidationIssue::new(
            ValidationCode::SingleChildGroup,
            format!("{} group '{}' has a single child", clause.operator, clause.id),
            id,
            path,
        ));
    }

    if clause.sibling_connections.is_empty() {
        return;
    }

    if clause.operator == LogicalOperator::Not {
        errors.push(ValidationIssue::new(
            ValidationCode::InvalidOperator,
            format!("NOT group '{}' cannot carry sibling connections", clause.id),
            id,
            path,
        ));
    }
    for connection in &clause.sibling_connections {
        if !connection.operator.is_binary() {
            errors.push(ValidationIssue::new(
                ValidationCode::InvalidOperator,
                format!(
                    "connection {}-{} in '{}' uses NOT, which cannot join siblings",
                    connection.from_index, connection.to_index, clause.id
                ),
                id,
                path,
            ));
        } else if !connection.is_adjacent() || connection.to_index >= count {
            errors.push(ValidationIssue::new(
                ValidationCode::InvalidOperator,
                format!(
                    "connection {}-{} in '{}' does not join adjacent children",
                    connection.from_index, connection.to_index, clause.id
                ),
                id,
                path,
            ));
        }
    }
    warnings.push(ValidationIssue::new(
        ValidationCode::MixedOperators,
        format!("group '{}' mixes operators between siblings", clause.id),
        id,
        path,
    ));
}
