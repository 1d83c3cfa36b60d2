//! Logical clauses and the polymorphic criteria node

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::{Confidence, DataElement, ReviewStatus, ValueSetReference, dedupe_value_sets};

/// Logical operator of a clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOperator {
    #[serde(rename = "AND", alias = "and", alias = "And")]
    And,
    #[serde(rename = "OR", alias = "or", alias = "Or")]
    Or,
    #[serde(rename = "NOT", alias = "not", alias = "Not")]
    Not,
}

impl LogicalOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
            LogicalOperator::Not => "NOT",
        }
    }

    /// Whether the operator can join two siblings
    pub fn is_binary(&self) -> bool {
        !matches!(self, LogicalOperator::Not)
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "AND" | "ALL" => Some(Self::And),
            "OR" | "ANY" => Some(Self::Or),
            "NOT" | "NONE" => Some(Self::Not),
            _ => None,
        }
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator override between two adjacent children of a clause
///
/// Lets "A AND B OR C" live in one clause without an extra nesting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiblingConnection {
    pub from_index: usize,
    pub to_index: usize,
    pub operator: LogicalOperator,
}

impl SiblingConnection {
    pub fn new(from_index: usize, to_index: usize, operator: LogicalOperator) -> Self {
        Self {
            from_index,
            to_index,
            operator,
        }
    }

    pub fn is_adjacent(&self) -> bool {
        self.to_index == self.from_index + 1
    }
}

/// A child of a clause: either a leaf data element or a nested clause
///
/// Children are reference counted so that edited copies share untouched subtrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CriteriaNode {
    Clause(Arc<LogicalClause>),
    Element(Arc<DataElement>),
}

impl CriteriaNode {
    pub fn id(&self) -> &str {
        match self {
            CriteriaNode::Clause(clause) => &clause.id,
            CriteriaNode::Element(element) => &element.id,
        }
    }

    pub fn is_clause(&self) -> bool {
        matches!(self, CriteriaNode::Clause(_))
    }

    pub fn as_clause(&self) -> Option<&LogicalClause> {
        match self {
            CriteriaNode::Clause(clause) => Some(clause),
            CriteriaNode::Element(_) => None,
        }
    }

    pub fn as_element(&self) -> Option<&DataElement> {
        match self {
            CriteriaNode::Element(element) => Some(element),
            CriteriaNode::Clause(_) => None,
        }
    }

    /// Short label for list editors
    pub fn label(&self) -> String {
        match self {
            CriteriaNode::Clause(clause) => format!("{} group", clause.operator),
            CriteriaNode::Element(element) => element.description.clone(),
        }
    }

    /// Whether two nodes are the same shared allocation
    pub fn ptr_eq(&self, other: &CriteriaNode) -> bool {
        match (self, other) {
            (CriteriaNode::Clause(a), CriteriaNode::Clause(b)) => Arc::ptr_eq(a, b),
            (CriteriaNode::Element(a), CriteriaNode::Element(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<DataElement> for CriteriaNode {
    fn from(element: DataElement) -> Self {
        CriteriaNode::Element(Arc::new(element))
    }
}

impl From<LogicalClause> for CriteriaNode {
    fn from(clause: LogicalClause) -> Self {
        CriteriaNode::Clause(Arc::new(clause))
    }
}

impl From<Arc<DataElement>> for CriteriaNode {
    fn from(element: Arc<DataElement>) -> Self {
        CriteriaNode::Element(element)
    }
}

impl From<Arc<LogicalClause>> for CriteriaNode {
    fn from(clause: Arc<LogicalClause>) -> Self {
        CriteriaNode::Clause(clause)
    }
}

/// Internal node of a criteria tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalClause {
    pub id: String,
    pub operator: LogicalOperator,
    pub children: Vec<CriteriaNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sibling_connections: Vec<SiblingConnection>,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub review_status: ReviewStatus,
}

impl LogicalClause {
    pub fn new(id: impl Into<String>, operator: LogicalOperator, children: Vec<CriteriaNode>) -> Self {
        Self {
            id: id.into(),
            operator,
            children,
            sibling_connections: Vec::new(),
            confidence: Confidence::default(),
            review_status: ReviewStatus::default(),
        }
    }

    pub fn and(id: impl Into<String>, children: Vec<CriteriaNode>) -> Self {
        Self::new(id, LogicalOperator::And, children)
    }

    pub fn or(id: impl Into<String>, children: Vec<CriteriaNode>) -> Self {
        Self::new(id, LogicalOperator::Or, children)
    }

    pub fn not(id: impl Into<String>, child: impl Into<CriteriaNode>) -> Self {
        Self::new(id, LogicalOperator::Not, vec![child.into()])
    }

    pub fn with_connections(mut self, connections: Vec<SiblingConnection>) -> Self {
        self.sibling_connections = connections;
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Override registered for the pair starting at `from_index`, if any
    pub fn override_between(&self, from_index: usize) -> Option<LogicalOperator> {
        self.sibling_connections
            .iter()
            .find(|c| c.from_index == from_index && c.to_index == from_index + 1)
            .map(|c| c.operator)
    }

    /// Connective joining child `from_index` with the next child
    pub fn connective_after(&self, from_index: usize) -> LogicalOperator {
        self.override_between(from_index).unwrap_or(self.operator)
    }

    pub fn has_mixed_operators(&self) -> bool {
        !self.sibling_connections.is_empty()
    }

    /// All data elements in pre-order
    pub fn elements(&self) -> Vec<&DataElement> {
        let mut out = Vec::new();
        collect_elements(self, &mut out);
        out
    }

    /// Deduplicated value sets referenced anywhere in the tree
    pub fn value_sets(&self) -> Vec<ValueSetReference> {
        dedupe_value_sets(self.elements().into_iter().filter_map(|e| e.value_set.clone()))
    }
}

fn collect_elements<'a>(clause: &'a LogicalClause, out: &mut Vec<&'a DataElement>) {
    for child in &clause.children {
        match child {
            CriteriaNode::Element(element) => out.push(element),
            CriteriaNode::Clause(nested) => collect_elements(nested, out),
        }
    }
}
