//! Structural equality and diff

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::{CriteriaNode, LogicalClause, LogicalOperator, NodeRef, walk};

/// Structural equality: operators and children compared pairwise by kind and id
///
/// Leaf bodies are not compared; two trees holding different versions of the
/// same criterion id are equal.
pub fn equals(a: &LogicalClause, b: &LogicalClause) -> bool {
    a.operator == b.operator
        && a.children.len() == b.children.len()
        && a.children.iter().zip(&b.children).all(|pair| match pair {
            (CriteriaNode::Element(x), CriteriaNode::Element(y)) => x.id == y.id,
            (CriteriaNode::Clause(x), CriteriaNode::Clause(y)) => x.id == y.id && equals(x, y),
            _ => false,
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorChange {
    pub group_id: String,
    pub before: LogicalOperator,
    pub after: LogicalOperator,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeDiff {
    pub added_criterion_ids: Vec<String>,
    pub removed_criterion_ids: Vec<String>,
    pub operator_changes: Vec<OperatorChange>,
}

impl TreeDiff {
    pub fn is_empty(&self) -> bool {
        self.added_criterion_ids.is_empty() && self.removed_criterion_ids.is_empty() && self.operator_changes.is_empty()
    }
}

/// Set-based diff over criterion ids plus per-group operator changes
pub fn diff(before: &LogicalClause, after: &LogicalClause) -> TreeDiff {
    let (before_criteria, before_groups) = index_tree(before);
    let (after_criteria, after_groups) = index_tree(after);

    let added_criterion_ids = after_criteria
        .iter()
        .filter(|id| !before_criteria.contains(*id))
        .map(|id| id.to_string())
        .collect();
    let removed_criterion_ids = before_criteria
        .iter()
        .filter(|id| !after_criteria.contains(*id))
        .map(|id| id.to_string())
        .collect();
    let operator_changes = before_groups
        .iter()
        .filter_map(|(id, op)| {
            let new_op = after_groups.get(id)?;
            (new_op != op).then(|| OperatorChange {
                group_id: id.to_string(),
                before: *op,
                after: *new_op,
            })
        })
        .collect();

    TreeDiff {
        added_criterion_ids,
        removed_criterion_ids,
        operator_changes,
    }
}

fn index_tree(clause: &LogicalClause) -> (IndexSet<&str>, IndexMap<&str, LogicalOperator>) {
    let mut criteria = IndexSet::new();
    let mut groups = IndexMap::new();
    for item in walk(clause) {
        match item.node {
            NodeRef::Element(element) => {
                criteria.insert(element.id.as_str());
            }
            NodeRef::Clause(group) => {
                groups.entry(group.id.as_str()).or_insert(group.operator);
            }
        }
    }
    (criteria, groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClinicalType, DataElement};
    use pretty_assertions::assert_eq;

    fn leaf(id: &str) -> CriteriaNode {
        DataElement::new(id, ClinicalType::Medication, id).into()
    }

    #[test]
    fn test_equals_ignores_leaf_bodies() {
        let a = LogicalClause::and("r", vec![leaf("a"), leaf("b")]);
        let b = LogicalClause::and(
            "r",
            vec![
                DataElement::new("a", ClinicalType::Medication, "changed text").into(),
                leaf("b"),
            ],
        );
        assert!(equals(&a, &b));
        assert!(!equals(&a, &a.set_operator(LogicalOperator::Or)));
        assert!(!equals(&a, &a.add_child(leaf("c"))));
    }

    #[test]
    fn test_equals_distinguishes_kind() {
        let a = LogicalClause::and("r", vec![leaf("x")]);
        let b = LogicalClause::and("r", vec![LogicalClause::or("x", vec![]).into()]);
        assert!(!equals(&a, &b));
    }

    #[test]
    fn test_diff() {
        let before = LogicalClause::and("r", vec![leaf("a"), LogicalClause::or("g", vec![leaf("b"), leaf("c")]).into()]);
        let after = LogicalClause::or("r", vec![leaf("a"), LogicalClause::or("g", vec![leaf("c"), leaf("d")]).into()]);
        let result = diff(&before, &after);
        assert_eq!(result.added_criterion_ids, vec!["d".to_string()]);
        assert_eq!(result.removed_criterion_ids, vec!["b".to_string()]);
        assert_eq!(
            result.operator_changes,
            vec![OperatorChange {
                group_id: "r".into(),
                before: LogicalOperator::And,
                after: LogicalOperator::Or
            }]
        );
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let tree = LogicalClause::and("r", vec![leaf("a")]);
        assert!(diff(&tree, &tree).is_empty());
    }
}
