//! Flat list projection for linear editors

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::{
    Confidence, CriteriaNode, DataElement, LogicalClause, LogicalOperator, NodeRef, ReviewStatus, SiblingConnection,
    TreePath, walk,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FlatNodeKind {
    /// Groups carry everything but their children
    #[serde(rename_all = "camelCase")]
    Group {
        operator: LogicalOperator,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        sibling_connections: Vec<SiblingConnection>,
        #[serde(default)]
        confidence: Confidence,
        #[serde(default)]
        review_status: ReviewStatus,
    },
    Criterion,
}

impl FlatNodeKind {
    pub fn group(operator: LogicalOperator) -> Self {
        FlatNodeKind::Group {
            operator,
            sibling_connections: Vec::new(),
            confidence: Confidence::default(),
            review_status: ReviewStatus::default(),
        }
    }

    fn of_clause(clause: &LogicalClause) -> Self {
        FlatNodeKind::Group {
            operator: clause.operator,
            sibling_connections: clause.sibling_connections.clone(),
            confidence: clause.confidence,
            review_status: clause.review_status,
        }
    }
}

/// One row of the flat projection; criteria keep only their id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatNode {
    pub id: String,
    #[serde(flatten)]
    pub kind: FlatNodeKind,
    pub depth: usize,
    pub parent_id: Option<String>,
    pub label: String,
}

/// Project a tree into pre-order rows
pub fn to_flat_list(clause: &LogicalClause) -> Vec<FlatNode> {
    // parent ids resolved from paths, so no back-references are needed
    let mut ids_by_path: Vec<(TreePath, String)> = Vec::new();
    let mut rows = Vec::new();

    for item in walk(clause) {
        let parent_id = item.path.parent().and_then(|parent| {
            ids_by_path
                .iter()
                .rev()
                .find(|(path, _)| *path == parent)
                .map(|(_, id)| id.clone())
        });
        let (kind, label) = match item.node {
            NodeRef::Clause(group) => (FlatNodeKind::of_clause(group), format!("{} group", group.operator)),
            NodeRef::Element(element) => (FlatNodeKind::Criterion, element.description.clone()),
        };
        if item.is_clause {
            ids_by_path.push((item.path.clone(), item.node.id().to_string()));
        }
        rows.push(FlatNode {
            id: item.node.id().to_string(),
            kind,
            depth: item.depth,
            parent_id,
            label,
        });
    }
    rows
}

/// Rebuild a tree from rows produced by [`to_flat_list`]
///
/// Criterion bodies come from `lookup`; ids it cannot resolve are dropped,
/// along with any sibling connection that no longer joins two adjacent
/// children. Returns `None` when the list has no root group.
pub fn from_flat_list<F>(rows: &[FlatNode], mut lookup: F) -> Option<LogicalClause>
where
    F: FnMut(&str) -> Option<Arc<DataElement>>,
{
    let root = rows
        .iter()
        .find(|row| row.parent_id.is_none() && matches!(row.kind, FlatNodeKind::Group { .. }))?;

    let mut children_of: IndexMap<&str, Vec<&FlatNode>> = IndexMap::new();
    for row in rows {
        if let Some(parent) = row.parent_id.as_deref() {
            children_of.entry(parent).or_default().push(row);
        }
    }

    let mut visited = HashSet::new();
    build_group(root, &children_of, &mut lookup, &mut visited)
}

fn build_group<'a, F>(
    row: &'a FlatNode,
    children_of: &IndexMap<&str, Vec<&'a FlatNode>>,
    lookup: &mut F,
    visited: &mut HashSet<&'a str>,
) -> Option<LogicalClause>
where
    F: FnMut(&str) -> Option<Arc<DataElement>>,
{
    let FlatNodeKind::Group {
        operator,
        sibling_connections,
        confidence,
        review_status,
    } = &row.kind
    else {
        return None;
    };
    if !visited.insert(row.id.as_str()) {
        return None;
    }

    let mut children = Vec::new();
    // original child index -> rebuilt child index
    let mut positions = HashMap::new();
    for (index, &child) in children_of.get(row.id.as_str()).into_iter().flatten().enumerate() {
        let node = match child.kind {
            FlatNodeKind::Group { .. } => build_group(child, children_of, lookup, visited).map(CriteriaNode::from),
            FlatNodeKind::Criterion => lookup(&child.id).map(CriteriaNode::Element),
        };
        if let Some(node) = node {
            positions.insert(index, children.len());
            children.push(node);
        }
    }

    let connections = sibling_connections
        .iter()
        .filter_map(|c| {
            let from = *positions.get(&c.from_index)?;
            let to = *positions.get(&c.to_index)?;
            (to == from + 1).then(|| SiblingConnection::new(from, to, c.operator))
        })
        .collect();

    let mut clause = LogicalClause::new(row.id.clone(), *operator, children)
        .with_connections(connections)
        .with_confidence(*confidence);
    clause.review_status = *review_status;
    Some(clause)
}
