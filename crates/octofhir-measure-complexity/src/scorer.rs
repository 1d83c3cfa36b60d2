//! Atomic and composite scoring

use indexmap::IndexMap;
use octofhir_measure_ir::{
    CriteriaNode, DataElement, LogicalClause, LogicalOperator, PopulationDefinition, UniversalMeasureSpec,
};
use serde::{Deserialize, Serialize};

use crate::ComplexityLevel;

const BASE_SCORE: u32 = 1;
const NEGATION_PENALTY: u32 = 2;
const MAX_TIMING_CLAUSES: u32 = 2;
const NESTING_WEIGHT: u32 = 2;

/// Breakdown of a score
///
/// Atomic scores fill `base`, `timing_clauses` and `negation`; composite scores
/// fill the remaining fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityFactors {
    pub base: u32,
    pub timing_clauses: u32,
    pub negation: u32,
    pub child_scores: u32,
    pub and_operators: u32,
    /// Longest composite-within-composite chain below this clause
    pub nesting_depth: u32,
    pub nesting_penalty: u32,
    pub unresolved_children: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentComplexity {
    pub score: u32,
    pub level: ComplexityLevel,
    pub factors: ComplexityFactors,
}

impl ComponentComplexity {
    fn from_factors(score: u32, factors: ComplexityFactors) -> Self {
        Self {
            score,
            level: ComplexityLevel::from_score(score),
            factors,
        }
    }
}

/// Score a leaf criterion: base, timing clauses and negation
pub fn score_atomic(element: &DataElement) -> ComponentComplexity {
    let factors = ComplexityFactors {
        base: BASE_SCORE,
        timing_clauses: timing_clauses(element),
        negation: if element.negation { NEGATION_PENALTY } else { 0 },
        ..ComplexityFactors::default()
    };
    ComponentComplexity::from_factors(factors.base + factors.timing_clauses + factors.negation, factors)
}

/// One clause, or two when any requirement pairs a quantity with a relative position
fn timing_clauses(element: &DataElement) -> u32 {
    if element.timing_requirements.iter().any(|t| t.is_compound()) {
        MAX_TIMING_CLAUSES
    } else {
        1
    }
}

/// Score a clause whose children are looked up through `resolve`
///
/// Children the resolver cannot resolve contribute nothing and are counted in
/// [`ComplexityFactors::unresolved_children`].
pub fn score_composite<F>(clause: &LogicalClause, resolve: F) -> ComponentComplexity
where
    F: Fn(&CriteriaNode) -> Option<CriteriaNode>,
{
    composite(clause, &resolve)
}

fn composite<F>(clause: &LogicalClause, resolve: &F) -> ComponentComplexity
where
    F: Fn(&CriteriaNode) -> Option<CriteriaNode>,
{
    let mut factors = ComplexityFactors::default();
    let mut resolved = 0u32;

    for child in &clause.children {
        let Some(node) = resolve(child) else {
            factors.unresolved_children += 1;
            continue;
        };
        resolved += 1;
        match &node {
            CriteriaNode::Element(element) => factors.child_scores += score_atomic(element).score,
            CriteriaNode::Clause(nested) => {
                let nested = composite(nested, resolve);
                factors.child_scores += nested.score;
                factors.nesting_depth = factors.nesting_depth.max(1 + nested.factors.nesting_depth);
            }
        }
    }

    if clause.operator == LogicalOperator::And && resolved > 1 {
        factors.and_operators = resolved - 1;
    }
    factors.nesting_penalty = NESTING_WEIGHT * factors.nesting_depth;

    let score = factors.child_scores + factors.and_operators + factors.nesting_penalty;
    ComponentComplexity::from_factors(score, factors)
}

/// Score a self-contained tree
pub fn score_clause(clause: &LogicalClause) -> ComponentComplexity {
    score_composite(clause, |node| Some(node.clone()))
}

pub fn score_node(node: &CriteriaNode) -> ComponentComplexity {
    match node {
        CriteriaNode::Element(element) => score_atomic(element),
        CriteriaNode::Clause(clause) => score_clause(clause),
    }
}

/// `None` when the population has no criteria
pub fn score_population(population: &PopulationDefinition) -> Option<ComponentComplexity> {
    population.criteria.as_ref().map(score_clause)
}

/// Scores keyed by population id, in population order
pub fn score_spec(spec: &UniversalMeasureSpec) -> IndexMap<String, ComponentComplexity> {
    spec.populations
        .iter()
        .filter_map(|p| score_population(p).map(|c| (p.id.clone(), c)))
        .collect()
}
