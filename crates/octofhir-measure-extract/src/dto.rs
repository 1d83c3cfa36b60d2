//! Lenient decoding of oracle output
//!
//! The raw types accept what models actually return: missing ids, synonyms for
//! clinical types and population names, numbers written as strings, criteria
//! given as a bare list. Decoding into IR types never fails; anything that had
//! to be guessed is reported as a warning.

use chrono::NaiveDate;
use octofhir_measure_diagnostics::{Diagnostic, UMS0208};
use octofhir_measure_ir::{
    ClinicalType, Confidence, CriteriaNode, DataElement, Direction, LogicalClause, LogicalOperator, MeasureMetadata,
    MeasureScoring, MeasureType, MeasurementPeriod, PopulationType, SiblingConnection, Thresholds, TimeUnit,
    TimingRequirement, TimingWindow, ValueSetCode, ValueSetReference,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static NUMBER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"-?\d+(\.\d+)?").ok());
static YEAR: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").ok());

/// A JSON value that should be a number but may arrive as text ("10 years")
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(f64),
    Text(String),
}

impl NumberOrText {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NumberOrText::Number(n) => Some(*n),
            NumberOrText::Text(text) => NUMBER
                .as_ref()?
                .find(text)
                .and_then(|m| m.as_str().parse().ok()),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            NumberOrText::Number(n) => octofhir_measure_ir::format_number(*n),
            NumberOrText::Text(text) => text.trim().to_string(),
        }
    }
}

// === Skeleton ===

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSkeleton {
    #[serde(alias = "measure", alias = "measureMetadata")]
    pub metadata: Option<RawMetadata>,
    #[serde(alias = "id")]
    pub measure_id: Option<String>,
    pub title: Option<String>,
    pub populations: Vec<RawPopulationSkeleton>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMetadata {
    #[serde(alias = "id", alias = "cmsId", alias = "identifier")]
    pub measure_id: Option<String>,
    #[serde(alias = "name")]
    pub title: Option<String>,
    pub version: Option<NumberOrText>,
    pub steward: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "period")]
    pub measurement_period: Option<RawPeriod>,
    #[serde(alias = "type")]
    pub measure_type: Option<String>,
    #[serde(alias = "scoringMethod")]
    pub scoring: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPeriod {
    Range {
        #[serde(alias = "from")]
        start: Option<String>,
        #[serde(alias = "to")]
        end: Option<String>,
    },
    Text(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawPopulationSkeleton {
    #[serde(alias = "type", alias = "populationType")]
    pub population_type: String,
    pub name: Option<String>,
    #[serde(alias = "summary", alias = "narrative")]
    pub description: Option<String>,
    #[serde(alias = "estimatedCriteria", alias = "criteriaCount")]
    pub estimated_criteria_count: Option<NumberOrText>,
}

/// Decoded skeleton: metadata plus the ordered population outline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureSkeleton {
    pub metadata: MeasureMetadata,
    pub populations: Vec<PopulationSkeleton>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationSkeleton {
    pub population_type: PopulationType,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub estimated_criteria_count: usize,
}

impl RawSkeleton {
    /// Decode, dropping populations whose type cannot be recognised
    pub fn decode(self) -> (MeasureSkeleton, Vec<Diagnostic>) {
        let mut warnings = Vec::new();
        let raw = self.metadata.unwrap_or_default();

        let mut metadata = MeasureMetadata::new(
            raw.measure_id.or(self.measure_id).unwrap_or_default().trim(),
            raw.title.or(self.title).unwrap_or_default().trim(),
        );
        metadata.version = raw.version.map(|v| v.as_text()).unwrap_or_default();
        metadata.steward = raw.steward.unwrap_or_default();
        metadata.description = raw.description.filter(|d| !d.trim().is_empty());
        if let Some(period) = raw.measurement_period.and_then(|p| p.decode()) {
            metadata.measurement_period = period;
        }
        metadata.measure_type = raw.measure_type.as_deref().map(measure_type).unwrap_or_default();
        metadata.scoring = raw.scoring.as_deref().map(measure_scoring).unwrap_or_default();

        let mut populations = Vec::new();
        for population in self.populations {
            let Some(population_type) = PopulationType::from_label(&population.population_type)
                .or_else(|| population.name.as_deref().and_then(PopulationType::from_label))
            else {
                warnings.push(Diagnostic::warning(
                    UMS0208,
                    format!("skipping population of unknown type '{}'", population.population_type),
                ));
                continue;
            };
            let name = population
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| population_type.cql_name().to_string());
            populations.push(PopulationSkeleton {
                population_type,
                name,
                description: population.description.unwrap_or_default(),
                estimated_criteria_count: population
                    .estimated_criteria_count
                    .and_then(|c| c.as_f64())
                    .map_or(0, |c| c.max(0.0).round() as usize),
            });
        }
        (MeasureSkeleton { metadata, populations }, warnings)
    }
}

impl RawPeriod {
    fn decode(self) -> Option<MeasurementPeriod> {
        match self {
            RawPeriod::Range { start, end } => {
                let start = parse_date(start.as_deref()?)?;
                let end = parse_date(end.as_deref()?)?;
                (start <= end).then(|| MeasurementPeriod::new(start, end))
            }
            RawPeriod::Text(text) => {
                let year = YEAR.as_ref()?.find(&text)?.as_str().parse().ok()?;
                Some(MeasurementPeriod::calendar_year(year))
            }
        }
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let head = text.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn measure_type(label: &str) -> MeasureType {
    let label = label.to_ascii_lowercase();
    if label.contains("patient") && label.contains("reported") {
        MeasureType::PatientReportedOutcome
    } else if label.contains("intermediate") {
        MeasureType::Intermediate
    } else if label.contains("outcome") {
        MeasureType::Outcome
    } else if label.contains("structure") {
        MeasureType::Structure
    } else {
        MeasureType::Process
    }
}

fn measure_scoring(label: &str) -> MeasureScoring {
    let label = label.to_ascii_lowercase();
    if label.contains("ratio") {
        MeasureScoring::Ratio
    } else if label.contains("continuous") {
        MeasureScoring::ContinuousVariable
    } else if label.contains("cohort") {
        MeasureScoring::Cohort
    } else {
        MeasureScoring::Proportion
    }
}

fn confidence(label: Option<&str>) -> Confidence {
    match label.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
        Some("high") => Confidence::High,
        Some("low") => Confidence::Low,
        _ => Confidence::Medium,
    }
}

// === Population detail ===

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawPopulationDetail {
    #[serde(alias = "description")]
    pub narrative: Option<String>,
    #[serde(alias = "criteriaTree", alias = "tree", alias = "logic")]
    pub criteria: Option<RawCriteria>,
    #[serde(alias = "valuesets")]
    pub value_sets: Vec<RawValueSet>,
    pub confidence: Option<String>,
}

/// Criteria as a single root node or a bare list (implicitly AND-ed)
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawCriteria {
    List(Vec<RawNode>),
    Node(Box<RawNode>),
}

/// A node that is a clause when it has an operator or children, else an element
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawNode {
    pub id: Option<String>,
    pub operator: Option<String>,
    #[serde(alias = "criteria")]
    pub children: Option<Vec<RawNode>>,
    pub sibling_connections: Vec<RawConnection>,
    #[serde(alias = "type", alias = "category")]
    pub clinical_type: Option<String>,
    #[serde(alias = "name", alias = "text")]
    pub description: Option<String>,
    pub value_set: Option<RawValueSet>,
    #[serde(alias = "timing")]
    pub timing_requirements: Option<RawTimingList>,
    #[serde(alias = "negated", alias = "isNegated")]
    pub negation: bool,
    pub thresholds: Option<RawThresholds>,
    pub confidence: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTimingList {
    Many(Vec<RawTiming>),
    One(RawTiming),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTiming {
    Text(String),
    Structured(RawTimingFields),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawTimingFields {
    pub description: Option<String>,
    pub window: Option<RawWindow>,
    pub value: Option<NumberOrText>,
    pub unit: Option<String>,
    pub direction: Option<String>,
    #[serde(alias = "relativeTo")]
    pub anchor: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawWindow {
    pub value: Option<NumberOrText>,
    pub unit: Option<String>,
    pub direction: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawThresholds {
    pub age_min: Option<NumberOrText>,
    pub age_max: Option<NumberOrText>,
    pub value_min: Option<NumberOrText>,
    pub value_max: Option<NumberOrText>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawConnection {
    #[serde(alias = "from")]
    pub from_index: usize,
    #[serde(alias = "to")]
    pub to_index: usize,
    pub operator: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawValueSet {
    pub id: Option<String>,
    pub name: Option<String>,
    pub oid: Option<String>,
    pub url: Option<String>,
    pub codes: Vec<RawCode>,
    pub confidence: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCode {
    pub code: NumberOrText,
    #[serde(default, alias = "codeSystem")]
    pub system: Option<String>,
    #[serde(default)]
    pub display: Option<String>,
}

/// Decoded population detail
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationDetail {
    pub narrative: String,
    pub criteria: Option<LogicalClause>,
    pub value_sets: Vec<ValueSetReference>,
    pub confidence: Confidence,
}

/// Converts raw nodes into IR, generating ids as `{prefix}-g{n}` for groups,
/// `{prefix}-c{n}` for criteria and `{prefix}-vs{n}` for value sets
#[derive(Debug)]
pub struct DetailDecoder {
    prefix: String,
    groups: usize,
    criteria: usize,
    value_sets: usize,
    warnings: Vec<Diagnostic>,
}

impl DetailDecoder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            groups: 0,
            criteria: 0,
            value_sets: 0,
            warnings: Vec::new(),
        }
    }

    pub fn decode(mut self, raw: RawPopulationDetail) -> (PopulationDetail, Vec<Diagnostic>) {
        let criteria = raw.criteria.map(|criteria| match criteria {
            RawCriteria::Node(node) if node.is_clause() => self.clause(*node),
            RawCriteria::Node(node) => {
                let id = self.group_id(None);
                LogicalClause::and(id, vec![self.node(*node)])
            }
            RawCriteria::List(nodes) => {
                let id = self.group_id(None);
                let children = nodes.into_iter().map(|n| self.node(n)).collect();
                LogicalClause::and(id, children)
            }
        });
        let value_sets = raw.value_sets.into_iter().map(|vs| self.value_set(vs)).collect();
        let detail = PopulationDetail {
            narrative: raw.narrative.unwrap_or_default().trim().to_string(),
            criteria,
            value_sets,
            confidence: confidence(raw.confidence.as_deref()),
        };
        (detail, self.warnings)
    }

    fn group_id(&mut self, given: Option<String>) -> String {
        self.groups += 1;
        given
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("{}-g{}", self.prefix, self.groups))
    }

    fn node(&mut self, raw: RawNode) -> CriteriaNode {
        if raw.is_clause() {
            self.clause(raw).into()
        } else {
            self.element(raw).into()
        }
    }

    fn clause(&mut self, raw: RawNode) -> LogicalClause {
        let id = self.group_id(raw.id);
        let operator = match raw.operator.as_deref() {
            None => LogicalOperator::And,
            Some(label) => LogicalOperator::from_label(label).unwrap_or_else(|| {
                self.warnings.push(
                    Diagnostic::warning(UMS0208, format!("unknown operator '{label}', using AND")).for_node(id.clone()),
                );
                LogicalOperator::And
            }),
        };
        let children: Vec<CriteriaNode> = raw
            .children
            .unwrap_or_default()
            .into_iter()
            .map(|child| self.node(child))
            .collect();
        let connections = raw
            .sibling_connections
            .into_iter()
            .filter_map(|c| {
                let op = LogicalOperator::from_label(&c.operator)?;
                Some(SiblingConnection::new(c.from_index, c.to_index, op))
            })
            .filter(|c| c.is_adjacent() && c.to_index < children.len() && c.operator != operator)
            .collect();
        LogicalClause::new(id, operator, children)
            .with_connections(connections)
            .with_confidence(confidence(raw.confidence.as_deref()))
    }

    fn element(&mut self, raw: RawNode) -> DataElement {
        self.criteria += 1;
        let id = raw
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("{}-c{}", self.prefix, self.criteria));
        let description = raw.description.unwrap_or_default().trim().to_string();

        let label = raw.clinical_type.unwrap_or_default();
        let clinical_type = ClinicalType::from_label(&label).unwrap_or_else(|| {
            self.warnings.push(
                Diagnostic::warning(UMS0208, format!("unknown clinical type '{label}', treating as assessment"))
                    .for_node(id.clone())
                    .with_help("set the clinical type during review"),
            );
            ClinicalType::Assessment
        });

        let mut element = DataElement::new(id, clinical_type, description)
            .with_confidence(confidence(raw.confidence.as_deref()));
        element.negation = raw.negation;
        if let Some(vs) = raw.value_set {
            element.value_set = Some(self.value_set(vs));
        }
        element.timing_requirements = match raw.timing_requirements {
            None => Vec::new(),
            Some(RawTimingList::One(t)) => vec![timing(t)],
            Some(RawTimingList::Many(ts)) => ts.into_iter().map(timing).collect(),
        };
        element.thresholds = raw.thresholds.map(thresholds).filter(|t| t.has_age() || t.has_value());
        element
    }

    fn value_set(&mut self, raw: RawValueSet) -> ValueSetReference {
        self.value_sets += 1;
        let id = raw
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("{}-vs{}", self.prefix, self.value_sets));
        let oid = raw
            .oid
            .map(|oid| oid.trim().trim_start_matches("urn:oid:").to_string())
            .filter(|oid| !oid.is_empty());
        let name = raw
            .name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| oid.clone())
            .unwrap_or_else(|| "Unnamed value set".to_string());

        let mut vs = ValueSetReference::new(id, name.trim());
        vs.oid = oid;
        vs.url = raw.url.filter(|u| !u.trim().is_empty());
        vs.confidence = confidence(raw.confidence.as_deref());
        for code in raw.codes {
            let mut decoded = ValueSetCode::new(code.code.as_text(), code.system.unwrap_or_default());
            decoded.display = code.display;
            let exists = vs
                .codes
                .iter()
                .any(|c| c.code == decoded.code && c.system == decoded.system);
            if !exists {
                vs.codes.push(decoded);
            }
        }
        vs
    }
}

impl RawNode {
    fn is_clause(&self) -> bool {
        self.operator.is_some() || self.children.is_some()
    }
}

fn timing(raw: RawTiming) -> TimingRequirement {
    let fields = match raw {
        RawTiming::Text(text) => {
            return TimingRequirement {
                description: text.trim().to_string(),
                ..TimingRequirement::default()
            };
        }
        RawTiming::Structured(fields) => fields,
    };
    let (value, unit, direction) = match fields.window {
        Some(w) => (w.value, w.unit, w.direction),
        None => (fields.value, fields.unit, fields.direction),
    };
    let window = value.and_then(|v| v.as_f64()).map(|value| {
        TimingWindow::new(
            value,
            unit.as_deref().map_or(TimeUnit::Days, time_unit),
            direction.as_deref().map_or(Direction::Before, direction_of),
        )
    });
    TimingRequirement {
        description: fields.description.unwrap_or_default().trim().to_string(),
        window,
        anchor: fields.anchor.filter(|a| !a.trim().is_empty()),
    }
}

fn time_unit(label: &str) -> TimeUnit {
    let label = label.trim().to_ascii_lowercase();
    if label.starts_with("year") || label == "y" || label == "a" {
        TimeUnit::Years
    } else if label.starts_with("month") || label == "mo" {
        TimeUnit::Months
    } else {
        TimeUnit::Days
    }
}

fn direction_of(label: &str) -> Direction {
    let label = label.trim().to_ascii_lowercase();
    if label.starts_with("after") || label.starts_with("follow") || label.starts_with("within_after") {
        Direction::After
    } else {
        Direction::Before
    }
}

fn thresholds(raw: RawThresholds) -> Thresholds {
    let num = |v: Option<NumberOrText>| v.and_then(|v| v.as_f64());
    Thresholds {
        age_min: num(raw.age_min),
        age_max: num(raw.age_max),
        value_min: num(raw.value_min),
        value_max: num(raw.value_max),
    }
}

// === Validation pass ===

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawValidation {
    pub missing_populations: Vec<String>,
    pub missing_criteria: Vec<RawMissingCriterion>,
    #[serde(alias = "hallucinations", alias = "potentialHallucinations")]
    pub suspected_hallucinations: Vec<RawHallucination>,
    #[serde(alias = "recommendations")]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMissingCriterion {
    pub description: String,
    #[serde(alias = "populationType")]
    pub population: Option<String>,
    #[serde(alias = "sourceSpan", alias = "evidence")]
    pub source_text: Option<String>,
    pub confidence: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawHallucination {
    Description(String),
    Detailed {
        #[serde(default, alias = "criterionId", alias = "id")]
        criterion_id: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingCriterion {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population_type: Option<PopulationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspectedHallucination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criterion_id: Option<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Findings of the cross-reference validation pass
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub missing_populations: Vec<String>,
    pub missing_criteria: Vec<MissingCriterion>,
    pub suspected_hallucinations: Vec<SuspectedHallucination>,
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.missing_populations.is_empty()
            && self.missing_criteria.is_empty()
            && self.suspected_hallucinations.is_empty()
    }
}

impl From<RawValidation> for ValidationReport {
    fn from(raw: RawValidation) -> Self {
        Self {
            missing_populations: raw
                .missing_populations
                .into_iter()
                .filter(|p| !p.trim().is_empty())
                .collect(),
            missing_criteria: raw
                .missing_criteria
                .into_iter()
                .filter(|c| !c.description.trim().is_empty())
                .map(|c| MissingCriterion {
                    description: c.description.trim().to_string(),
                    population_type: c.population.as_deref().and_then(PopulationType::from_label),
                    source_text: c.source_text.filter(|s| !s.trim().is_empty()),
                    confidence: confidence(c.confidence.as_deref()),
                })
                .collect(),
            suspected_hallucinations: raw
                .suspected_hallucinations
                .into_iter()
                .map(|h| match h {
                    RawHallucination::Description(description) => SuspectedHallucination {
                        criterion_id: None,
                        description,
                        reason: None,
                    },
                    RawHallucination::Detailed {
                        criterion_id,
                        description,
                        reason,
                    } => SuspectedHallucination {
                        description: description.or_else(|| criterion_id.clone()).unwrap_or_default(),
                        criterion_id,
                        reason,
                    },
                })
                .collect(),
            suggestions: raw.suggestions,
        }
    }
}
