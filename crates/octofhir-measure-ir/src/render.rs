//! Recursive rendering of criteria trees
//!
//! Natural-language text, CQL expressions and SQL set algebra all share one
//! skeleton ([`render_with`]): NOT wraps its child, single-child groups render
//! their child in place, sibling-connection overrides replace the clause's
//! default connective pairwise (left to right), and nested groups with two or
//! more children are parenthesized while the root is not.

use crate::{CriteriaNode, DataElement, LogicalClause, LogicalOperator};

/// Target-specific keywords and grouping for [`render_with`]
pub trait ExpressionDialect {
    /// Keyword joining two siblings (`op` is never `Not`)
    fn connective(&self, op: LogicalOperator) -> &str;

    /// Negate an already rendered operand
    fn negate(&self, inner: &str) -> String;

    /// Rendering of a group with no children
    fn empty(&self) -> String;

    fn group(&self, inner: &str) -> String {
        format!("({inner})")
    }

    /// Close the accumulated left operand before a connective change
    fn regroup(&self, left: String) -> String {
        left
    }

    /// Join the accumulated left operand with the next sibling
    fn join(&self, left: &str, connective: &str, right: &str) -> String {
        format!("{left} {connective} {right}")
    }
}

/// Upper-case prose connectives
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalLanguage;

impl ExpressionDialect for NaturalLanguage {
    fn connective(&self, op: LogicalOperator) -> &str {
        match op {
            LogicalOperator::Or => "OR",
            _ => "AND",
        }
    }

    fn negate(&self, inner: &str) -> String {
        format!("NOT ({inner})")
    }

    fn empty(&self) -> String {
        "(no criteria)".to_string()
    }
}

/// CQL boolean connectives
#[derive(Debug, Clone, Copy, Default)]
pub struct CqlDialect;

impl ExpressionDialect for CqlDialect {
    fn connective(&self, op: LogicalOperator) -> &str {
        match op {
            LogicalOperator::Or => "or",
            _ => "and",
        }
    }

    fn negate(&self, inner: &str) -> String {
        format!("not ({inner})")
    }

    fn empty(&self) -> String {
        "true".to_string()
    }

    // `and` binds tighter than `or`
    fn regroup(&self, left: String) -> String {
        format!("({left})")
    }
}

/// Render a tree, delegating each leaf to `leaf`
pub fn render_with<D, F>(clause: &LogicalClause, dialect: &D, leaf: &mut F) -> String
where
    D: ExpressionDialect + ?Sized,
    F: FnMut(&DataElement) -> String,
{
    render_clause(clause, dialect, leaf, true)
}

/// Natural-language rendering
pub fn to_natural_language(clause: &LogicalClause) -> String {
    render_with(clause, &NaturalLanguage, &mut |element: &DataElement| element.describe())
}

/// CQL-shaped boolean expression with caller-rendered leaves
pub fn to_expression<F>(clause: &LogicalClause, mut element_renderer: F) -> String
where
    F: FnMut(&DataElement) -> String,
{
    render_with(clause, &CqlDialect, &mut element_renderer)
}

fn render_clause<D, F>(clause: &LogicalClause, dialect: &D, leaf: &mut F, is_root: bool) -> String
where
    D: ExpressionDialect + ?Sized,
    F: FnMut(&DataElement) -> String,
{
    match clause.children.len() {
        0 => dialect.empty(),
        _ if clause.operator == LogicalOperator::Not => {
            let inner = render_node(&clause.children[0], dialect, leaf, true);
            dialect.negate(&inner)
        }
        1 => render_node(&clause.children[0], dialect, leaf, is_root),
        _ => {
            let mut parts = clause
                .children
                .iter()
                .map(|child| render_node(child, dialect, leaf, false));
            let mut acc = parts.next().unwrap_or_default();
            let mut previous = None;
            for (index, part) in parts.enumerate() {
                let op = clause.connective_after(index);
                if previous.is_some_and(|prev| prev != op) {
                    acc = dialect.regroup(acc);
                }
                acc = dialect.join(&acc, dialect.connective(op), &part);
                previous = Some(op);
            }
            if is_root { acc } else { dialect.group(&acc) }
        }
    }
}

fn render_node<D, F>(node: &CriteriaNode, dialect: &D, leaf: &mut F, is_root: bool) -> String
where
    D: ExpressionDialect + ?Sized,
    F: FnMut(&DataElement) -> String,
{
    match node {
        CriteriaNode::Element(element) => leaf(element),
        CriteriaNode::Clause(clause) => render_clause(clause, dialect, leaf, is_root),
    }
}
