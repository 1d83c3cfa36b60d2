//! Medication adherence as a running days-supply aggregate
//!
//! Two CTEs per criterion: the index event (first qualifying dispensing inside
//! the intake window) and the cumulative supply from that index date, kept
//! once the running sum reaches the threshold inside the observation window.

use octofhir_measure_ir::{DataElement, TimeUnit};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{AdherenceConfig, window_days};

static ADHERENCE_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)\b(cumulative|days?[- ]supply|adheren|persisten|proportion of days)").ok()
});

/// Whether a medication criterion asks for cumulative supply rather than a simple retrieve
pub fn is_adherence_criterion(element: &DataElement) -> bool {
    let Some(pattern) = ADHERENCE_PATTERN.as_ref() else {
        return false;
    };
    let vs_name = element.value_set.as_ref().map(|vs| vs.name.as_str()).unwrap_or_default();
    pattern.is_match(&element.description) || pattern.is_match(vs_name)
}

/// Per-element parameters: a minimum value sets the threshold, a timing window
/// sets the observation window
pub fn resolve_adherence(element: &DataElement, base: AdherenceConfig) -> AdherenceConfig {
    let mut config = base;
    if let Some(min) = element.thresholds.and_then(|t| t.value_min) {
        if min > 0.0 {
            config.days_supply_threshold = min.round() as u32;
        }
    }
    if let Some(window) = element.timing_requirements.iter().find_map(|t| t.window) {
        if window.unit == TimeUnit::Days {
            config.observation_window_days = window_days(&window).unsigned_abs() as u32;
        }
    }
    config
}

/// Bound medication table plus the value-set join for one criterion
#[derive(Debug, Clone)]
pub struct MedicationSource {
    pub table: String,
    pub patient_column: String,
    pub date_column: String,
    pub days_supply_column: String,
    pub status_filter: Option<String>,
    pub value_set_join: String,
    pub value_set_filter: String,
}

impl MedicationSource {
    fn filters(&self) -> Vec<String> {
        let mut filters = vec![self.value_set_filter.clone()];
        filters.extend(self.status_filter.clone());
        filters
    }
}

pub fn index_event_body(source: &MedicationSource, config: &AdherenceConfig) -> String {
    let mut filters = source.filters();
    filters.push(format!(
        "t.{date} BETWEEN mp.start_date AND mp.start_date + INTERVAL '{days}' DAY",
        date = source.date_column,
        days = config.intake_window_days
    ));
    format!(
        "SELECT t.{patient} AS patient_id, MIN(t.{date}) AS index_date\n\
         FROM {table} t\n\
         {join}\n\
         CROSS JOIN measurement_period mp\n\
         WHERE {filters}\n\
         GROUP BY t.{patient}",
        patient = source.patient_column,
        date = source.date_column,
        table = source.table,
        join = source.value_set_join,
        filters = filters.join("\n  AND "),
    )
}

pub fn cumulative_supply_body(source: &MedicationSource, index_cte: &str, config: &AdherenceConfig) -> String {
    let mut filters = source.filters();
    filters.push(format!(
        "t.{date} BETWEEN i.index_date AND i.index_date + INTERVAL '{days}' DAY",
        date = source.date_column,
        days = config.observation_window_days
    ));
    format!(
        "SELECT patient_id\n\
         FROM (\n\
         \x20 SELECT t.{patient} AS patient_id,\n\
         \x20        SUM(t.{supply}) OVER (\n\
         \x20          PARTITION BY t.{patient} ORDER BY t.{date}\n\
         \x20          ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW\n\
         \x20        ) AS running_days_supply\n\
         \x20 FROM {table} t\n\
         \x20 JOIN {index_cte} i ON i.patient_id = t.{patient}\n\
         \x20 {join}\n\
         \x20 WHERE {filters}\n\
         ) running\n\
         GROUP BY patient_id\n\
         HAVING MAX(running_days_supply) >= {threshold}",
        patient = source.patient_column,
        supply = source.days_supply_column,
        date = source.date_column,
        table = source.table,
        join = source.value_set_join.replace('\n', "\n  "),
        filters = filters.join("\n    AND "),
        threshold = config.days_supply_threshold,
    )
}
