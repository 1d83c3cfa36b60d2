//! Property tests over generated criteria trees

use octofhir_measure_ir::{
    ClinicalType, CriteriaNode, DataElement, LogicalClause, LogicalOperator, SiblingConnection, ValidationCode, equals,
    from_flat_list, node_at, to_flat_list, to_natural_language, validate, walk,
};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Shape {
    Leaf(usize, bool),
    /// Operator, children, and an optional override slot
    Group(u8, Vec<Shape>, Option<u8>),
}

fn shape() -> impl Strategy<Value = Shape> {
    let leaf = (0..ClinicalType::ALL.len(), any::<bool>()).prop_map(|(ty, negated)| Shape::Leaf(ty, negated));
    leaf.prop_recursive(5, 48, 4, |inner| {
        (0u8..3, prop::collection::vec(inner, 1..4), any::<Option<u8>>())
            .prop_map(|(op, children, slot)| Shape::Group(op, children, slot))
    })
}

fn build(shape: &Shape, next_id: &mut usize) -> CriteriaNode {
    let id = format!("n{next_id}");
    *next_id += 1;
    match shape {
        Shape::Leaf(ty, negated) => {
            let element = DataElement::new(id.clone(), ClinicalType::ALL[*ty], format!("criterion {id}"));
            if *negated { element.negated().into() } else { element.into() }
        }
        Shape::Group(op, children, slot) => {
            let operator = match op {
                0 => LogicalOperator::And,
                1 => LogicalOperator::Or,
                _ => LogicalOperator::Not,
            };
            let take = if operator == LogicalOperator::Not { 1 } else { children.len() };
            let children: Vec<CriteriaNode> = children.iter().take(take).map(|c| build(c, next_id)).collect();
            let connections = override_at(operator, children.len(), *slot);
            LogicalClause::new(id, operator, children).with_connections(connections).into()
        }
    }
}

/// Flip the connective between one adjacent pair of a binary group
fn override_at(operator: LogicalOperator, len: usize, slot: Option<u8>) -> Vec<SiblingConnection> {
    match (operator, slot) {
        (LogicalOperator::Not, _) | (_, None) => Vec::new(),
        _ if len < 2 => Vec::new(),
        (_, Some(slot)) => {
            let from = usize::from(slot) % (len - 1);
            let flipped = if operator == LogicalOperator::And { LogicalOperator::Or } else { LogicalOperator::And };
            vec![SiblingConnection::new(from, from + 1, flipped)]
        }
    }
}

/// Valid trees: unique ids, no empty groups, NOT always unary
fn tree() -> impl Strategy<Value = LogicalClause> {
    (prop::collection::vec(shape(), 1..5), any::<Option<u8>>()).prop_map(|(shapes, slot)| {
        let mut next_id = 0;
        let children: Vec<CriteriaNode> = shapes.iter().map(|s| build(s, &mut next_id)).collect();
        let connections = override_at(LogicalOperator::And, children.len(), slot);
        LogicalClause::and("root", children).with_connections(connections)
    })
}

fn count_nodes(clause: &LogicalClause) -> usize {
    1 + clause
        .children
        .iter()
        .map(|child| match child {
            CriteriaNode::Element(_) => 1,
            CriteriaNode::Clause(nested) => count_nodes(nested),
        })
        .sum::<usize>()
}

fn element_arcs(clause: &LogicalClause, out: &mut HashMap<String, Arc<DataElement>>) {
    for child in &clause.children {
        match child {
            CriteriaNode::Element(element) => {
                out.insert(element.id.clone(), element.clone());
            }
            CriteriaNode::Clause(nested) => element_arcs(nested, out),
        }
    }
}

proptest! {
    #[test]
    fn valid_trees_have_no_errors(t in tree()) {
        let result = validate(Some(&t));
        prop_assert!(result.valid);
        prop_assert!(result.errors.is_empty());
        prop_assert_eq!(result.stats.total_nodes, count_nodes(&t));
    }

    #[test]
    fn walk_visits_every_node_once_in_stable_order(t in tree()) {
        let first: Vec<String> = walk(&t).map(|item| item.node.id().to_string()).collect();
        let second: Vec<String> = walk(&t).map(|item| item.node.id().to_string()).collect();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.len(), count_nodes(&t));
        let unique: HashSet<&String> = first.iter().collect();
        prop_assert_eq!(unique.len(), first.len());
        prop_assert_eq!(first[0].as_str(), "root");
    }

    #[test]
    fn walk_paths_relocate_nodes(t in tree()) {
        for item in walk(&t) {
            let found = node_at(&t, &item.path);
            prop_assert_eq!(found.map(|n| n.id()), Some(item.node.id()));
            prop_assert_eq!(item.path.depth(), item.depth);
        }
    }

    #[test]
    fn flat_list_round_trip_is_structurally_equal(t in tree()) {
        let mut lookup = HashMap::new();
        element_arcs(&t, &mut lookup);
        let rows = to_flat_list(&t);
        prop_assert_eq!(rows.len(), count_nodes(&t));
        let rebuilt = from_flat_list(&rows, |id| lookup.get(id).cloned());
        let rebuilt = rebuilt.unwrap();
        prop_assert!(equals(&t, &rebuilt));
        prop_assert_eq!(to_natural_language(&rebuilt), to_natural_language(&t));
        prop_assert_eq!(rebuilt, t);
    }

    #[test]
    fn one_empty_group_yields_one_error(t in tree()) {
        let with_empty = t.add_child(LogicalClause::or("empty-group", vec![]));
        let result = validate(Some(&with_empty));
        prop_assert!(!result.valid);
        let empty_group_errors = result.errors.iter().filter(|e| e.code == ValidationCode::EmptyGroup).count();
        prop_assert_eq!(empty_group_errors, 1);
    }

    #[test]
    fn edits_never_touch_the_original(t in tree()) {
        let before = to_flat_list(&t);
        let _ = t.add_child(DataElement::new("extra", ClinicalType::Procedure, "extra"));
        let _ = t.set_operator(LogicalOperator::Or);
        let _ = t.flatten();
        let _ = t.remove_child(0);
        prop_assert_eq!(to_flat_list(&t), before);
    }
}
