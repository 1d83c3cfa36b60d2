//! Leaf criteria: data elements and their timing/threshold qualifiers

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ValueSetReference;

/// Clinical category of a data element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClinicalType {
    Demographic,
    Encounter,
    Diagnosis,
    Procedure,
    Observation,
    Medication,
    Immunization,
    Assessment,
}

impl ClinicalType {
    pub const ALL: [ClinicalType; 8] = [
        ClinicalType::Demographic,
        ClinicalType::Encounter,
        ClinicalType::Diagnosis,
        ClinicalType::Procedure,
        ClinicalType::Observation,
        ClinicalType::Medication,
        ClinicalType::Immunization,
        ClinicalType::Assessment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClinicalType::Demographic => "demographic",
            ClinicalType::Encounter => "encounter",
            ClinicalType::Diagnosis => "diagnosis",
            ClinicalType::Procedure => "procedure",
            ClinicalType::Observation => "observation",
            ClinicalType::Medication => "medication",
            ClinicalType::Immunization => "immunization",
            ClinicalType::Assessment => "assessment",
        }
    }

    /// Lenient parse accepting the synonyms extraction output tends to use
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let ty = match normalized.as_str() {
            "demographic" | "demographics" | "patient" | "age" | "gender" | "sex" => Self::Demographic,
            "encounter" | "visit" | "encounters" => Self::Encounter,
            "diagnosis" | "condition" | "problem" | "diagnoses" => Self::Diagnosis,
            "procedure" | "intervention" | "procedures" => Self::Procedure,
            "observation" | "lab" | "laboratory" | "lab_result" | "result" | "vital_sign" => Self::Observation,
            "medication" | "drug" | "medications" | "prescription" => Self::Medication,
            "immunization" | "vaccine" | "vaccination" => Self::Immunization,
            "assessment" | "screening" | "questionnaire" | "survey" => Self::Assessment,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for ClinicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Days,
    Months,
    Years,
}

impl TimeUnit {
    /// CQL quantity keyword
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Days => "days",
            TimeUnit::Months => "months",
            TimeUnit::Years => "years",
        }
    }

    /// Approximate length in days, used for window comparisons
    pub fn approx_days(&self) -> f64 {
        match self {
            TimeUnit::Days => 1.0,
            TimeUnit::Months => 30.0,
            TimeUnit::Years => 365.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Before,
    After,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Before => "before",
            Direction::After => "after",
        }
    }
}

/// Quantity plus relative position, e.g. "10 years before"
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingWindow {
    pub value: f64,
    pub unit: TimeUnit,
    pub direction: Direction,
}

impl TimingWindow {
    pub fn new(value: f64, unit: TimeUnit, direction: Direction) -> Self {
        Self { value, unit, direction }
    }

    pub fn years_before(value: f64) -> Self {
        Self::new(value, TimeUnit::Years, Direction::Before)
    }
}

/// A timing qualifier on a data element
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingRequirement {
    /// Free-text phrasing from the source document
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<TimingWindow>,
    /// What the window is relative to ("end of measurement period", "IPSD")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
}

impl TimingRequirement {
    pub fn during_measurement_period() -> Self {
        Self {
            description: "during measurement period".to_string(),
            window: None,
            anchor: Some("measurement period".to_string()),
        }
    }

    pub fn window(window: TimingWindow, anchor: impl Into<String>) -> Self {
        Self {
            description: String::new(),
            window: Some(window),
            anchor: Some(anchor.into()),
        }
    }

    /// Whether this timing carries both a quantity and a relative position
    pub fn is_compound(&self) -> bool {
        self.window.is_some()
    }

    /// Human-readable phrase
    pub fn describe(&self) -> String {
        let anchor = self.anchor.as_deref().unwrap_or("measurement period");
        match &self.window {
            Some(window) => format!(
                "within {} {} {} {}",
                format_number(window.value),
                window.unit.as_str(),
                window.direction.as_str(),
                anchor
            ),
            None if !self.description.trim().is_empty() => self.description.trim().to_string(),
            None => format!("during {anchor}"),
        }
    }
}

/// Numeric bounds on a data element
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_max: Option<f64>,
}

impl Thresholds {
    pub fn age_range(min: f64, max: f64) -> Self {
        Self {
            age_min: Some(min),
            age_max: Some(max),
            ..Self::default()
        }
    }

    pub fn has_age(&self) -> bool {
        self.age_min.is_some() || self.age_max.is_some()
    }

    pub fn has_value(&self) -> bool {
        self.value_min.is_some() || self.value_max.is_some()
    }
}

/// Extraction confidence; ordered so that `min` yields the weakest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Approved,
    Flagged,
}

/// Leaf criterion
///
/// Elements are immutable once placed in a tree; edits replace them wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataElement {
    pub id: String,
    pub clinical_type: ClinicalType,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_set: Option<ValueSetReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timing_requirements: Vec<TimingRequirement>,
    #[serde(default)]
    pub negation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Thresholds>,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub review_status: ReviewStatus,
}

impl DataElement {
    pub fn new(id: impl Into<String>, clinical_type: ClinicalType, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            clinical_type,
            description: description.into(),
            value_set: None,
            timing_requirements: Vec::new(),
            negation: false,
            thresholds: None,
            confidence: Confidence::default(),
            review_status: ReviewStatus::default(),
        }
    }

    pub fn with_value_set(mut self, value_set: ValueSetReference) -> Self {
        self.value_set = Some(value_set);
        self
    }

    pub fn with_timing(mut self, timing: TimingRequirement) -> Self {
        self.timing_requirements.push(timing);
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn negated(mut self) -> Self {
        self.negation = true;
        self
    }

    /// Natural-language phrase for this element
    pub fn describe(&self) -> String {
        let mut text = String::new();
        if self.negation {
            text.push_str("NOT ");
        }
        text.push_str(self.description.trim());
        if let Some(thresholds) = &self.thresholds {
            match (thresholds.age_min, thresholds.age_max) {
                (Some(min), Some(max)) => {
                    text.push_str(&format!(" (age {}-{})", format_number(min), format_number(max)))
                }
                (Some(min), None) => text.push_str(&format!(" (age >= {})", format_number(min))),
                (None, Some(max)) => text.push_str(&format!(" (age <= {})", format_number(max))),
                (None, None) => {}
            }
        }
        let timing: Vec<String> = self
            .timing_requirements
            .iter()
            .map(TimingRequirement::describe)
            .filter(|t| !t.is_empty())
            .collect();
        if !timing.is_empty() {
            text.push_str(&format!(" ({})", timing.join("; ")));
        }
        text
    }
}

/// Render a number without a trailing `.0` for whole values
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
