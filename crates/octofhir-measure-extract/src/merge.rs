//! Deterministic merge of per-chunk population results
//!
//! Results are grouped by population type. A type extracted once passes through
//! unchanged; a type extracted from several chunks keeps the union of top-level
//! criteria (first-seen order, deduplicated by description or id), the longest
//! narrative, and value sets merged by OID or name.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use octofhir_measure_diagnostics::{Diagnostic, Severity};
use octofhir_measure_ir::{
    CriteriaNode, LogicalClause, LogicalOperator, PopulationDefinition, PopulationType, ValueSetReference,
    dedupe_value_sets, to_natural_language,
};
use serde::{Deserialize, Serialize};

/// Outcome of the detail pass for one population (against one chunk, when chunked)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationExtractionResult {
    pub population_type: PopulationType,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<PopulationDefinition>,
    #[serde(default)]
    pub value_sets: Vec<ValueSetReference>,
    #[serde(default)]
    pub errors: Vec<Diagnostic>,
    #[serde(default)]
    pub warnings: Vec<Diagnostic>,
    /// Chunks this result was extracted from
    #[serde(default)]
    pub chunks: Vec<usize>,
}

impl PopulationExtractionResult {
    pub fn succeeded(population: PopulationDefinition, value_sets: Vec<ValueSetReference>) -> Self {
        Self {
            population_type: population.population_type,
            success: true,
            population: Some(population),
            value_sets,
            errors: Vec::new(),
            warnings: Vec::new(),
            chunks: Vec::new(),
        }
    }

    pub fn failed(population_type: PopulationType, error: Diagnostic) -> Self {
        Self {
            population_type,
            success: false,
            population: None,
            value_sets: Vec::new(),
            errors: vec![error],
            warnings: Vec::new(),
            chunks: Vec::new(),
        }
    }

    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunks.push(chunk);
        self
    }
}

/// Merge results that share a population type, preserving first-seen type order
pub fn merge_population_results(results: Vec<PopulationExtractionResult>) -> Vec<PopulationExtractionResult> {
    let mut groups: IndexMap<PopulationType, Vec<PopulationExtractionResult>> = IndexMap::new();
    for result in results {
        groups.entry(result.population_type).or_default().push(result);
    }
    groups
        .into_iter()
        .map(|(population_type, group)| match <[_; 1]>::try_from(group) {
            Ok([single]) => single,
            Err(group) => merge_group(population_type, group),
        })
        .collect()
}

fn merge_group(population_type: PopulationType, group: Vec<PopulationExtractionResult>) -> PopulationExtractionResult {
    let (succeeded, failed): (Vec<_>, Vec<_>) = group.into_iter().partition(|r| r.success);

    let mut chunks: Vec<usize> = succeeded.iter().chain(&failed).flat_map(|r| r.chunks.iter().copied()).collect();
    chunks.sort_unstable();
    chunks.dedup();

    if succeeded.is_empty() {
        let mut merged = PopulationExtractionResult {
            population_type,
            success: false,
            population: None,
            value_sets: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            chunks,
        };
        for result in failed {
            merged.errors.extend(result.errors);
            merged.warnings.extend(result.warnings);
        }
        return merged;
    }

    // A failure against one chunk is only a warning once another chunk succeeded
    let mut warnings: Vec<Diagnostic> = Vec::new();
    for result in &failed {
        warnings.extend(result.errors.iter().cloned().map(demote));
        warnings.extend(result.warnings.iter().cloned());
    }

    let mut population: Option<PopulationDefinition> = None;
    let mut value_sets = Vec::new();
    for result in succeeded {
        warnings.extend(result.warnings);
        value_sets.extend(result.value_sets);
        let Some(next) = result.population else {
            continue;
        };
        population = Some(match population {
            None => next,
            Some(current) => merge_populations(current, next),
        });
    }
    if let Some(population) = population.as_mut() {
        if let Some(criteria) = population.criteria.take() {
            let mut seen = HashSet::new();
            population.criteria = Some(unique_ids(&criteria, &mut seen));
        }
    }

    PopulationExtractionResult {
        population_type,
        success: true,
        population,
        value_sets: dedupe_value_sets(value_sets),
        errors: Vec::new(),
        warnings,
        chunks,
    }
}

fn merge_populations(mut current: PopulationDefinition, next: PopulationDefinition) -> PopulationDefinition {
    if next.narrative.trim().len() > current.narrative.trim().len() {
        current.narrative = next.narrative;
    }
    current.confidence = current.confidence.min(next.confidence);
    current.criteria = match (current.criteria.take(), next.criteria) {
        (None, other) | (other, None) => other,
        (Some(base), Some(extra)) => Some(union_criteria(&base, &extra)),
    };
    current
}

/// Append `extra`'s top-level children that `base` does not already carry
fn union_criteria(base: &LogicalClause, extra: &LogicalClause) -> LogicalClause {
    let mut merged = match base.operator {
        LogicalOperator::Not => LogicalClause::and(format!("{}-merged", base.id), vec![base.clone().into()]),
        _ => base.clone(),
    };
    let mut seen: HashSet<String> = merged.children.iter().map(criterion_key).collect();
    for child in &extra.children {
        if seen.insert(criterion_key(child)) {
            merged.children.push(child.clone());
        }
    }
    merged
}

/// Description for elements (falling back to the id), rendered text for groups
fn criterion_key(node: &CriteriaNode) -> String {
    let key = match node {
        CriteriaNode::Element(element) if !element.description.trim().is_empty() => element.description.clone(),
        CriteriaNode::Element(element) => element.id.clone(),
        CriteriaNode::Clause(clause) => to_natural_language(clause),
    };
    key.trim().to_lowercase()
}

/// Rename ids already taken elsewhere in the tree by appending `-2`, `-3`, ...
fn unique_ids(clause: &LogicalClause, seen: &mut HashSet<String>) -> LogicalClause {
    let mut renamed = clause.clone();
    renamed.id = claim(&clause.id, seen);
    renamed.children = clause
        .children
        .iter()
        .map(|child| match child {
            CriteriaNode::Clause(nested) => CriteriaNode::Clause(Arc::new(unique_ids(nested, seen))),
            CriteriaNode::Element(element) => {
                let id = claim(&element.id, seen);
                if id == element.id {
                    child.clone()
                } else {
                    let mut element = (**element).clone();
                    element.id = id;
                    element.into()
                }
            }
        })
        .collect();
    renamed
}

fn claim(id: &str, seen: &mut HashSet<String>) -> String {
    if seen.insert(id.to_string()) {
        return id.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{id}-{n}");
        if seen.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn demote(mut diagnostic: Diagnostic) -> Diagnostic {
    diagnostic.severity = Severity::Warning;
    diagnostic
}
