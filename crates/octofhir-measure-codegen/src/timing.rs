//! Timing normalization and the keyword lookback table
//!
//! Precedence for one element: an explicit window on any timing requirement,
//! then the first matching lookback rule, then "during the measurement period".

use octofhir_measure_diagnostics::{MeasureError, UMS0401};
use octofhir_measure_ir::{DataElement, Direction, TimeUnit, TimingWindow, format_number};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A period ending at the end of the measurement period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lookback {
    pub value: u32,
    pub unit: TimeUnit,
}

impl Lookback {
    pub const fn years(value: u32) -> Self {
        Self {
            value,
            unit: TimeUnit::Years,
        }
    }

    /// CQL quantity phrase, singular when the value is one
    pub fn cql_quantity(&self) -> String {
        let unit = self.unit.as_str();
        if self.value == 1 {
            format!("1 {}", unit.trim_end_matches('s'))
        } else {
            format!("{} {}", self.value, unit)
        }
    }
}

/// Source of lookback periods for procedures recognized by keyword
pub trait LookbackStrategy: Send + Sync {
    /// Lookback for the given element text, if any keyword matches
    fn lookback(&self, text: &str) -> Option<Lookback>;
}

const STANDARD_RULES: &[(&str, Lookback)] = &[
    (r"(?i)\b(fit[- ]?dna|cologuard|sdna|stool dna)", Lookback::years(3)),
    (r"(?i)\b(ct )?colonograph", Lookback::years(5)),
    (r"(?i)\bcolonoscop", Lookback::years(10)),
    (r"(?i)\bsigmoidoscop", Lookback::years(5)),
    (r"(?i)\b(fobt|fit|fecal occult|fecal immunochemical)\b", Lookback::years(1)),
    (r"(?i)\b(hpv|human papillomavirus)\b", Lookback::years(5)),
    (r"(?i)\b(pap|cervical cytology)\b", Lookback::years(3)),
    (r"(?i)\bmammogra", Lookback::years(2)),
];

static STANDARD_TABLE: Lazy<Vec<(Regex, Lookback)>> = Lazy::new(|| {
    STANDARD_RULES
        .iter()
        .filter_map(|(pattern, lookback)| Regex::new(pattern).ok().map(|re| (re, *lookback)))
        .collect()
});

/// Ordered keyword table, most specific keyword first; the first match wins
#[derive(Debug, Clone)]
pub struct KeywordLookbackTable {
    rules: Vec<(Regex, Lookback)>,
}

impl KeywordLookbackTable {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// The screening-test table (colonoscopy 10 years, mammography 2 years...)
    pub fn standard() -> Self {
        Self {
            rules: STANDARD_TABLE.clone(),
        }
    }

    /// Insert a rule ahead of the existing ones
    pub fn with_rule(mut self, pattern: &str, lookback: Lookback) -> Result<Self, MeasureError> {
        let regex = Regex::new(pattern)
            .map_err(|e| MeasureError::system(UMS0401, format!("invalid lookback pattern '{pattern}': {e}")))?;
        self.rules.insert(0, (regex, lookback));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for KeywordLookbackTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl LookbackStrategy for KeywordLookbackTable {
    fn lookback(&self, text: &str) -> Option<Lookback> {
        self.rules
            .iter()
            .find(|(regex, _)| regex.is_match(text))
            .map(|(_, lookback)| *lookback)
    }
}

/// Reference point of a timing window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    PeriodStart,
    PeriodEnd,
    /// Index prescription start date or similar index event
    IndexEvent,
    Other(String),
}

impl Anchor {
    pub fn parse(text: Option<&str>) -> Self {
        let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
            return Anchor::PeriodEnd;
        };
        let lower = text.to_lowercase();
        if lower.contains("ipsd") || lower.contains("index") {
            Anchor::IndexEvent
        } else if lower.contains("start") || lower.contains("beginning") {
            Anchor::PeriodStart
        } else if lower.contains("end") || lower.contains("measurement period") {
            Anchor::PeriodEnd
        } else {
            Anchor::Other(text.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedTiming {
    MeasurementPeriod,
    /// Any time up to the end of the measurement period
    OnOrBeforePeriodEnd,
    Lookback(Lookback),
    Window { window: TimingWindow, anchor: Anchor },
}

impl NormalizedTiming {
    pub fn describe(&self) -> String {
        match self {
            NormalizedTiming::MeasurementPeriod => "during measurement period".to_string(),
            NormalizedTiming::OnOrBeforePeriodEnd => "on or before end of measurement period".to_string(),
            NormalizedTiming::Lookback(lookback) => format!(
                "{} or less before end of measurement period",
                lookback.cql_quantity()
            ),
            NormalizedTiming::Window { window, .. } => format!(
                "{} {} {}",
                format_number(window.value),
                window.unit.as_str(),
                window.direction.as_str()
            ),
        }
    }
}

/// Normalized timing plus a note when part of the source timing was not lowered
#[derive(Debug, Clone, PartialEq)]
pub struct TimingResolution {
    pub timing: NormalizedTiming,
    pub note: Option<String>,
}

/// Text the lookback table is matched against
pub fn lookback_text(element: &DataElement) -> String {
    match &element.value_set {
        Some(vs) => format!("{} {}", element.description, vs.name),
        None => element.description.clone(),
    }
}

pub fn normalize_timing(element: &DataElement, strategy: &dyn LookbackStrategy) -> TimingResolution {
    if let Some(requirement) = element.timing_requirements.iter().find(|t| t.window.is_some()) {
        if let Some(window) = requirement.window {
            let anchor = Anchor::parse(requirement.anchor.as_deref());
            let note = match &anchor {
                Anchor::Other(text) => Some(format!(
                    "anchor '{text}' is not recognized; window measured from end of measurement period"
                )),
                _ => None,
            };
            return TimingResolution {
                timing: NormalizedTiming::Window { window, anchor },
                note,
            };
        }
    }

    if let Some(lookback) = strategy.lookback(&lookback_text(element)) {
        return TimingResolution {
            timing: NormalizedTiming::Lookback(lookback),
            note: None,
        };
    }

    let note = element
        .timing_requirements
        .iter()
        .map(|t| t.description.trim())
        .find(|d| !d.is_empty() && !d.to_lowercase().contains("measurement period"))
        .map(|d| format!("timing '{d}' lowered as during measurement period"));
    TimingResolution {
        timing: NormalizedTiming::MeasurementPeriod,
        note,
    }
}

/// Signed offset in days for a window, negative when it points backwards
pub fn window_days(window: &TimingWindow) -> i64 {
    let days = (window.value * window.unit.approx_days()).round() as i64;
    match window.direction {
        Direction::Before => -days,
        Direction::After => days,
    }
}
