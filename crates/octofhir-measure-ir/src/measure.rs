//! Populations and the measure aggregate

use chrono::{Datelike, NaiveDate};
use octofhir_measure_diagnostics::{MeasureError, UMS0022, UMS0402};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Confidence, LogicalClause, ReviewStatus, ValueSetReference, dedupe_value_sets};

/// The six fixed measure populations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopulationType {
    InitialPopulation,
    Denominator,
    DenominatorExclusion,
    DenominatorException,
    Numerator,
    NumeratorExclusion,
}

impl PopulationType {
    pub const ALL: [PopulationType; 6] = [
        PopulationType::InitialPopulation,
        PopulationType::Denominator,
        PopulationType::DenominatorExclusion,
        PopulationType::DenominatorException,
        PopulationType::Numerator,
        PopulationType::NumeratorExclusion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PopulationType::InitialPopulation => "initial_population",
            PopulationType::Denominator => "denominator",
            PopulationType::DenominatorExclusion => "denominator_exclusion",
            PopulationType::DenominatorException => "denominator_exception",
            PopulationType::Numerator => "numerator",
            PopulationType::NumeratorExclusion => "numerator_exclusion",
        }
    }

    /// Name of the CQL definition for this population
    pub fn cql_name(&self) -> &'static str {
        match self {
            PopulationType::InitialPopulation => "Initial Population",
            PopulationType::Denominator => "Denominator",
            PopulationType::DenominatorExclusion => "Denominator Exclusions",
            PopulationType::DenominatorException => "Denominator Exceptions",
            PopulationType::Numerator => "Numerator",
            PopulationType::NumeratorExclusion => "Numerator Exclusions",
        }
    }

    /// Short prefix used when generating ids
    pub fn abbreviation(&self) -> &'static str {
        match self {
            PopulationType::InitialPopulation => "ip",
            PopulationType::Denominator => "den",
            PopulationType::DenominatorExclusion => "denex",
            PopulationType::DenominatorException => "denexcep",
            PopulationType::Numerator => "num",
            PopulationType::NumeratorExclusion => "numex",
        }
    }

    /// Lenient parse of labels such as "Denominator Exclusions" or "IPP"
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let ty = match normalized.as_str() {
            "initial_population" | "initialpopulation" | "ip" | "ipp" | "initial_patient_population" => {
                Self::InitialPopulation
            }
            "denominator" | "denom" | "den" => Self::Denominator,
            "denominator_exclusion" | "denominator_exclusions" | "denex" => Self::DenominatorExclusion,
            "denominator_exception" | "denominator_exceptions" | "denexcep" => Self::DenominatorException,
            "numerator" | "numer" | "num" => Self::Numerator,
            "numerator_exclusion" | "numerator_exclusions" | "numex" => Self::NumeratorExclusion,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for PopulationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cql_name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationDefinition {
    pub id: String,
    pub population_type: PopulationType,
    #[serde(default)]
    pub narrative: String,
    #[serde(default)]
    pub criteria: Option<LogicalClause>,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub review_status: ReviewStatus,
}

impl PopulationDefinition {
    pub fn new(id: impl Into<String>, population_type: PopulationType) -> Self {
        Self {
            id: id.into(),
            population_type,
            narrative: String::new(),
            criteria: None,
            confidence: Confidence::default(),
            review_status: ReviewStatus::default(),
        }
    }

    pub fn with_narrative(mut self, narrative: impl Into<String>) -> Self {
        self.narrative = narrative.into();
        self
    }

    pub fn with_criteria(mut self, criteria: LogicalClause) -> Self {
        self.criteria = Some(criteria);
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    /// Criteria with at least one child
    pub fn effective_criteria(&self) -> Option<&LogicalClause> {
        self.criteria.as_ref().filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl MeasurementPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// January 1 through December 31 of `year`
    pub fn calendar_year(year: i32) -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or_default(),
        }
    }

    pub fn year(&self) -> i32 {
        self.start.year()
    }
}

impl Default for MeasurementPeriod {
    fn default() -> Self {
        Self::calendar_year(2025)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureScoring {
    #[default]
    Proportion,
    Ratio,
    ContinuousVariable,
    Cohort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureType {
    #[default]
    Process,
    Outcome,
    Structure,
    PatientReportedOutcome,
    Intermediate,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureMetadata {
    pub measure_id: String,
    pub title: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub steward: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub measurement_period: MeasurementPeriod,
    #[serde(default)]
    pub measure_type: MeasureType,
    #[serde(default)]
    pub scoring: MeasureScoring,
}

impl MeasureMetadata {
    pub fn new(measure_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            measure_id: measure_id.into(),
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReviewProgress {
    pub total: usize,
    pub approved: usize,
    pub pending: usize,
    pub flagged: usize,
}

/// The structured measure specification: aggregate root owning populations and value sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversalMeasureSpec {
    pub metadata: MeasureMetadata,
    #[serde(default)]
    pub populations: Vec<PopulationDefinition>,
    #[serde(default)]
    pub value_sets: Vec<ValueSetReference>,
    #[serde(default)]
    pub overall_confidence: Confidence,
    #[serde(default)]
    pub review_progress: ReviewProgress,
}

impl UniversalMeasureSpec {
    pub fn new(metadata: MeasureMetadata) -> Self {
        Self {
            metadata,
            populations: Vec::new(),
            value_sets: Vec::new(),
            overall_confidence: Confidence::default(),
            review_progress: ReviewProgress::default(),
        }
    }

    /// Assemble a spec; value sets are deduplicated and review counters start
    /// from the population count
    pub fn assemble(
        metadata: MeasureMetadata,
        populations: Vec<PopulationDefinition>,
        value_sets: Vec<ValueSetReference>,
    ) -> Self {
        let overall_confidence = populations
            .iter()
            .map(|p| p.confidence)
            .min()
            .unwrap_or(Confidence::Low);
        let mut spec = Self {
            metadata,
            populations,
            value_sets: dedupe_value_sets(value_sets),
            overall_confidence,
            review_progress: ReviewProgress::default(),
        };
        spec.recompute_review_progress();
        spec
    }

    pub fn with_population(mut self, population: PopulationDefinition) -> Self {
        self.populations.push(population);
        self.recompute_review_progress();
        self
    }

    pub fn with_value_set(mut self, value_set: ValueSetReference) -> Self {
        self.add_value_set(value_set);
        self
    }

    /// Add a value set, merging codes into an existing entry with the same key
    pub fn add_value_set(&mut self, value_set: ValueSetReference) {
        let key = value_set.dedup_key();
        match self.value_sets.iter_mut().find(|vs| vs.dedup_key() == key) {
            Some(existing) => existing.merge_codes(&value_set),
            None => self.value_sets.push(value_set),
        }
    }

    pub fn population(&self, population_type: PopulationType) -> Option<&PopulationDefinition> {
        self.populations.iter().find(|p| p.population_type == population_type)
    }

    /// Declared value sets plus every value set referenced from a criteria tree
    pub fn all_value_sets(&self) -> Vec<ValueSetReference> {
        let referenced = self
            .populations
            .iter()
            .filter_map(|p| p.criteria.as_ref())
            .flat_map(|c| c.value_sets());
        dedupe_value_sets(self.value_sets.iter().cloned().chain(referenced))
    }

    pub fn set_population_review_status(&mut self, population_id: &str, status: ReviewStatus) -> bool {
        let Some(population) = self.populations.iter_mut().find(|p| p.id == population_id) else {
            return false;
        };
        population.review_status = status;
        self.recompute_review_progress();
        true
    }

    pub fn approve_all(&mut self) {
        for population in &mut self.populations {
            population.review_status = ReviewStatus::Approved;
        }
        self.recompute_review_progress();
    }

    /// Recount review progress from the populations' statuses
    pub fn recompute_review_progress(&mut self) {
        let mut progress = ReviewProgress {
            total: self.populations.len(),
            ..ReviewProgress::default()
        };
        for population in &self.populations {
            match population.review_status {
                ReviewStatus::Approved => progress.approved += 1,
                ReviewStatus::Pending => progress.pending += 1,
                ReviewStatus::Flagged => progress.flagged += 1,
            }
        }
        self.review_progress = progress;
    }

    pub fn from_json(input: &str) -> Result<Self, MeasureError> {
        serde_json::from_str(input)
            .map_err(|e| MeasureError::parse(UMS0022, format!("invalid measure document: {e}"), input))
    }

    pub fn to_json_pretty(&self) -> Result<String, MeasureError> {
        serde_json::to_string_pretty(self).map_err(|e| MeasureError::system(UMS0402, e.to_string()))
    }
}
