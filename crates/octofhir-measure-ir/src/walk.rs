//! Pre-order traversal and path addressing

use smallvec::SmallVec;
use std::fmt;

use crate::{CriteriaNode, DataElement, LogicalClause};

/// Structural address of a node: child indices from the root
///
/// The root clause has the empty path. Paths stay valid across copy-on-write
/// edits that do not reorder the addressed node's ancestors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TreePath(SmallVec<[usize; 8]>);

impl TreePath {
    pub fn root() -> Self {
        Self(SmallVec::new())
    }

    pub fn from_indices(indices: &[usize]) -> Self {
        Self(SmallVec::from_slice(indices))
    }

    pub fn child(&self, index: usize) -> Self {
        let mut path = self.0.clone();
        path.push(index);
        Self(path)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        let mut path = self.0.clone();
        path.pop();
        Some(Self(path))
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("/")?;
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join("/"))
    }
}

/// Borrowed view of a node in a tree
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Clause(&'a LogicalClause),
    Element(&'a DataElement),
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> &'a str {
        match self {
            NodeRef::Clause(clause) => &clause.id,
            NodeRef::Element(element) => &element.id,
        }
    }

    pub fn is_clause(&self) -> bool {
        matches!(self, NodeRef::Clause(_))
    }

    pub fn as_clause(&self) -> Option<&'a LogicalClause> {
        match self {
            NodeRef::Clause(clause) => Some(clause),
            NodeRef::Element(_) => None,
        }
    }

    pub fn as_element(&self) -> Option<&'a DataElement> {
        match self {
            NodeRef::Element(element) => Some(element),
            NodeRef::Clause(_) => None,
        }
    }
}

impl<'a> From<&'a CriteriaNode> for NodeRef<'a> {
    fn from(node: &'a CriteriaNode) -> Self {
        match node {
            CriteriaNode::Clause(clause) => NodeRef::Clause(clause),
            CriteriaNode::Element(element) => NodeRef::Element(element),
        }
    }
}

/// One step of a [`Walk`]
#[derive(Debug, Clone)]
pub struct WalkItem<'a> {
    pub node: NodeRef<'a>,
    /// Root is depth 0
    pub depth: usize,
    pub path: TreePath,
    pub is_clause: bool,
}

/// Lazy pre-order, depth-first iterator over a criteria tree
///
/// Created by [`walk`]; calling [`walk`] again restarts from the root.
pub struct Walk<'a> {
    stack: Vec<(NodeRef<'a>, TreePath)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = WalkItem<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (node, path) = self.stack.pop()?;
        if let NodeRef::Clause(clause) = node {
            // Reverse push keeps left-to-right visiting order
            for (index, child) in clause.children.iter().enumerate().rev() {
                self.stack.push((NodeRef::from(child), path.child(index)));
            }
        }
        Some(WalkItem {
            node,
            depth: path.depth(),
            is_clause: node.is_clause(),
            path,
        })
    }
}

pub fn walk(clause: &LogicalClause) -> Walk<'_> {
    Walk {
        stack: vec![(NodeRef::Clause(clause), TreePath::root())],
    }
}

/// Resolve a path produced by [`walk`] or [`crate::to_flat_list`]
pub fn node_at<'a>(clause: &'a LogicalClause, path: &TreePath) -> Option<NodeRef<'a>> {
    let mut current = NodeRef::Clause(clause);
    for &index in path.indices() {
        let parent = current.as_clause()?;
        current = NodeRef::from(parent.children.get(index)?);
    }
    Some(current)
}

/// Path of the first node with the given id
pub fn find_path(clause: &LogicalClause, id: &str) -> Option<TreePath> {
    walk(clause).find(|item| item.node.id() == id).map(|item| item.path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClinicalType;
    use pretty_assertions::assert_eq;

    fn leaf(id: &str) -> CriteriaNode {
        DataElement::new(id, ClinicalType::Encounter, id).into()
    }

    fn sample() -> LogicalClause {
        let inner = LogicalClause::or("g", vec![leaf("b"), leaf("c")]);
        LogicalClause::and("root", vec![leaf("a"), inner.into(), leaf("d")])
    }

    #[test]
    fn test_walk_preorder() {
        let tree = sample();
        let ids: Vec<&str> = walk(&tree).map(|i| i.node.id()).collect();
        assert_eq!(ids, vec!["root", "a", "g", "b", "c", "d"]);
    }

    #[test]
    fn test_walk_depth_and_paths() {
        let tree = sample();
        let items: Vec<(String, usize, String)> = walk(&tree)
            .map(|i| (i.node.id().to_string(), i.depth, i.path.to_string()))
            .collect();
        assert_eq!(items[0], ("root".to_string(), 0, "/".to_string()));
        assert_eq!(items[3], ("b".to_string(), 2, "/1/0".to_string()));
    }

    #[test]
    fn test_walk_is_restartable() {
        let tree = sample();
        let first: Vec<String> = walk(&tree).map(|i| i.node.id().to_string()).collect();
        let second: Vec<String> = walk(&tree).map(|i| i.node.id().to_string()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_node_at_and_find_path() {
        let tree = sample();
        let path = find_path(&tree, "c").unwrap();
        assert_eq!(path.indices(), &[1, 1]);
        assert_eq!(node_at(&tree, &path).map(|n| n.id()), Some("c"));
        assert!(node_at(&tree, &TreePath::from_indices(&[0, 0])).is_none());
        assert!(node_at(&tree, &TreePath::from_indices(&[7])).is_none());
    }
}
