//! Copy-on-write edits
//!
//! Every edit takes `&self` and returns a new clause. Untouched children are
//! shared with the original through their `Arc`, so earlier snapshots keep
//! their exact shape.

use octofhir_measure_diagnostics::{MeasureError, UMS0004, UMS0009, UMS0010, UMS0011};
use std::sync::Arc;
use thiserror::Error;

use crate::{CriteriaNode, LogicalClause, LogicalOperator, SiblingConnection, TreePath};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("child index {index} out of range for group '{group_id}' with {len} children")]
    IndexOutOfRange {
        group_id: String,
        index: usize,
        len: usize,
    },

    #[error("children {from} and {to} of group '{group_id}' are not adjacent")]
    NotAdjacent { group_id: String, from: usize, to: usize },

    #[error("NOT cannot join two siblings")]
    NotIsUnary,

    #[error("path {0} does not address a group")]
    InvalidPath(TreePath),
}

impl From<EditError> for MeasureError {
    fn from(err: EditError) -> Self {
        let code = match &err {
            EditError::IndexOutOfRange { .. } => UMS0009,
            EditError::NotAdjacent { .. } => UMS0010,
            EditError::NotIsUnary => UMS0004,
            EditError::InvalidPath(_) => UMS0011,
        };
        MeasureError::structural(code, err.to_string())
    }
}

impl LogicalClause {
    fn check_index(&self, index: usize) -> Result<(), EditError> {
        if index < self.children.len() {
            Ok(())
        } else {
            Err(EditError::IndexOutOfRange {
                group_id: self.id.clone(),
                index,
                len: self.children.len(),
            })
        }
    }

    /// Copy with `child` appended
    #[must_use]
    pub fn add_child(&self, child: impl Into<CriteriaNode>) -> Self {
        let mut next = self.clone();
        next.children.push(child.into());
        next
    }

    /// Copy without child `index`; overrides touching it are dropped and later
    /// overrides shift down
    pub fn remove_child(&self, index: usize) -> Result<Self, EditError> {
        self.check_index(index)?;
        let mut next = self.clone();
        next.children.remove(index);
        next.sibling_connections = self
            .sibling_connections
            .iter()
            .filter(|c| c.from_index != index && c.to_index != index)
            .map(|c| {
                if c.from_index > index {
                    SiblingConnection::new(c.from_index - 1, c.to_index - 1, c.operator)
                } else {
                    *c
                }
            })
            .collect();
        Ok(next)
    }

    pub fn replace_child(&self, index: usize, child: impl Into<CriteriaNode>) -> Result<Self, EditError> {
        self.check_index(index)?;
        let mut next = self.clone();
        next.children[index] = child.into();
        Ok(next)
    }

    /// Copy with a new default operator; pairwise overrides are cleared
    #[must_use]
    pub fn set_operator(&self, operator: LogicalOperator) -> Self {
        let mut next = self.clone();
        next.operator = operator;
        next.sibling_connections.clear();
        next
    }

    /// Override the connective between two adjacent children
    ///
    /// Setting the clause's default operator removes the override instead.
    pub fn set_operator_between(&self, from: usize, to: usize, operator: LogicalOperator) -> Result<Self, EditError> {
        if !operator.is_binary() {
            return Err(EditError::NotIsUnary);
        }
        if to != from + 1 {
            return Err(EditError::NotAdjacent {
                group_id: self.id.clone(),
                from,
                to,
            });
        }
        self.check_index(to)?;

        let mut next = self.clone();
        next.sibling_connections.retain(|c| c.from_index != from);
        if operator != self.operator {
            next.sibling_connections.push(SiblingConnection::new(from, to, operator));
            next.sibling_connections.sort_by_key(|c| c.from_index);
        }
        Ok(next)
    }

    /// Recursively unwrap single-child groups other than NOT
    ///
    /// The root itself is replaced by its only child when that child is a group.
    #[must_use]
    pub fn flatten(&self) -> Self {
        let mut next = self.clone();
        next.children = self.children.iter().map(flatten_node).collect();
        if next.operator != LogicalOperator::Not && next.children.len() == 1 {
            if let CriteriaNode::Clause(only) = &next.children[0] {
                return only.as_ref().clone();
            }
        }
        next
    }

    /// Copy with the node at `path` replaced; only the ancestors on the path are copied
    pub fn replace_at(&self, path: &TreePath, node: impl Into<CriteriaNode>) -> Result<Self, EditError> {
        let node = node.into();
        let indices = path.indices();
        let Some((&first, rest)) = indices.split_first() else {
            return match node {
                CriteriaNode::Clause(clause) => Ok(clause.as_ref().clone()),
                CriteriaNode::Element(_) => Err(EditError::InvalidPath(path.clone())),
            };
        };
        self.check_index(first)?;
        if rest.is_empty() {
            return self.replace_child(first, node);
        }
        let Some(child) = self.children[first].as_clause() else {
            return Err(EditError::InvalidPath(path.clone()));
        };
        let replaced = child
            .replace_at(&TreePath::from_indices(rest), node)
            .map_err(|err| match err {
                EditError::InvalidPath(_) => EditError::InvalidPath(path.clone()),
                other => other,
            })?;
        self.replace_child(first, replaced)
    }
}

fn flatten_node(node: &CriteriaNode) -> CriteriaNode {
    match node {
        CriteriaNode::Element(_) => node.clone(),
        CriteriaNode::Clause(clause) => {
            let children: Vec<CriteriaNode> = clause.children.iter().map(flatten_node).collect();
            if clause.operator != LogicalOperator::Not && children.len() == 1 {
                return children.into_iter().next().unwrap_or_else(|| node.clone());
            }
            let unchanged = children.iter().zip(&clause.children).all(|(a, b)| a.ptr_eq(b));
            if unchanged {
                node.clone()
            } else {
                let mut next = clause.as_ref().clone();
                next.children = children;
                CriteriaNode::Clause(Arc::new(next))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClinicalType, DataElement, to_natural_language};
    use pretty_assertions::assert_eq;

    fn leaf(id: &str) -> CriteriaNode {
        DataElement::new(id, ClinicalType::Diagnosis, id.to_uppercase()).into()
    }

    fn abc() -> LogicalClause {
        LogicalClause::and("r", vec![leaf("a"), leaf("b"), leaf("c")])
    }

    #[test]
    fn test_add_child_keeps_original_snapshot() {
        let original = abc();
        let edited = original.add_child(leaf("d"));
        assert_eq!(original.children.len(), 3);
        assert_eq!(edited.children.len(), 4);
        assert!(original.children[0].ptr_eq(&edited.children[0]));
    }

    #[test]
    fn test_remove_child_strips_and_shifts_connections() {
        let tree = LogicalClause::and("r", vec![leaf("a"), leaf("b"), leaf("c"), leaf("d")]).with_connections(vec![
            SiblingConnection::new(0, 1, LogicalOperator::Or),
            SiblingConnection::new(2, 3, LogicalOperator::Or),
        ]);
        let edited = tree.remove_child(1).unwrap();
        assert_eq!(edited.sibling_connections, vec![SiblingConnection::new(1, 2, LogicalOperator::Or)]);
        assert_eq!(to_natural_language(&edited), "A AND C OR D");
    }

    #[test]
    fn test_remove_child_out_of_range() {
        let err = abc().remove_child(5).unwrap_err();
        assert!(matches!(err, EditError::IndexOutOfRange { index: 5, len: 3, .. }));
        let measure_err: MeasureError = err.into();
        assert_eq!(measure_err.code(), UMS0009);
    }

    #[test]
    fn test_set_operator_clears_overrides() {
        let tree = abc().set_operator_between(0, 1, LogicalOperator::Or).unwrap();
        assert!(tree.has_mixed_operators());
        let tree = tree.set_operator(LogicalOperator::Or);
        assert!(!tree.has_mixed_operators());
    }

    #[test]
    fn test_set_operator_between_default_removes_override() {
        let tree = abc().set_operator_between(1, 2, LogicalOperator::Or).unwrap();
        assert_eq!(to_natural_language(&tree), "A AND B OR C");
        let tree = tree.set_operator_between(1, 2, LogicalOperator::And).unwrap();
        assert!(tree.sibling_connections.is_empty());
    }

    #[test]
    fn test_set_operator_between_rejects_non_adjacent() {
        assert!(matches!(
            abc().set_operator_between(0, 2, LogicalOperator::Or),
            Err(EditError::NotAdjacent { .. })
        ));
        assert_eq!(abc().set_operator_between(0, 1, LogicalOperator::Not), Err(EditError::NotIsUnary));
    }

    #[test]
    fn test_flatten_unwraps_single_child_groups() {
        let wrapped = LogicalClause::or("w", vec![LogicalClause::and("w2", vec![leaf("b")]).into()]);
        let negated = LogicalClause::not("n", leaf("c"));
        let tree = LogicalClause::and("r", vec![leaf("a"), wrapped.into(), negated.into()]);
        let flat = tree.flatten();
        assert_eq!(flat.children[1].id(), "b");
        assert_eq!(flat.children[2].id(), "n");
    }

    #[test]
    fn test_flatten_root_with_single_group_child() {
        let tree = LogicalClause::and("r", vec![LogicalClause::or("g", vec![leaf("a"), leaf("b")]).into()]);
        let flat = tree.flatten();
        assert_eq!(flat.id, "g");
        assert_eq!(flat.operator, LogicalOperator::Or);
    }

    #[test]
    fn test_replace_at_path() {
        let inner = LogicalClause::or("g", vec![leaf("b"), leaf("c")]);
        let tree = LogicalClause::and("r", vec![leaf("a"), inner.into()]);
        let edited = tree
            .replace_at(&TreePath::from_indices(&[1, 0]), DataElement::new("z", ClinicalType::Procedure, "Z"))
            .unwrap();
        assert_eq!(to_natural_language(&edited), "A AND (Z OR C)");
        assert_eq!(to_natural_language(&tree), "A AND (B OR C)");
        assert!(tree.children[0].ptr_eq(&edited.children[0]));
        assert!(matches!(
            tree.replace_at(&TreePath::from_indices(&[0, 0]), leaf("q")),
            Err(EditError::InvalidPath(_))
        ));
    }
}
