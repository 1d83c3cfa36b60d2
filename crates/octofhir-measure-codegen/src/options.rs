//! Generator configuration

use octofhir_measure_complexity::ComplexityLevel;
use serde::{Deserialize, Serialize};

use crate::SchemaBinding;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CqlGeneratorOptions {
    /// Used when the measure metadata carries no version
    pub library_version: String,
    pub fhir_version: String,
    /// Emit age, gender, qualifying-encounter and hospice helper definitions
    pub include_helpers: bool,
    /// Substitute curated logic for recognized measure families
    pub family_logic: bool,
    pub emit_complexity_warnings: bool,
    pub high_complexity_threshold: ComplexityLevel,
}

impl Default for CqlGeneratorOptions {
    fn default() -> Self {
        Self {
            library_version: "1.0.000".to_string(),
            fhir_version: "4.0.1".to_string(),
            include_helpers: true,
            family_logic: true,
            emit_complexity_warnings: true,
            high_complexity_threshold: ComplexityLevel::High,
        }
    }
}

impl CqlGeneratorOptions {
    pub fn with_library_version(mut self, version: impl Into<String>) -> Self {
        self.library_version = version.into();
        self
    }

    pub fn without_helpers(mut self) -> Self {
        self.include_helpers = false;
        self
    }

    pub fn without_family_logic(mut self) -> Self {
        self.family_logic = false;
        self
    }
}

/// Cumulative days-supply parameters for medication adherence criteria
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdherenceConfig {
    /// Length of the index-event intake window, starting at the measurement period start
    pub intake_window_days: u32,
    /// Days supply that must be reached
    pub days_supply_threshold: u32,
    /// Window after the index date in which the supply must accumulate
    pub observation_window_days: u32,
}

impl Default for AdherenceConfig {
    fn default() -> Self {
        Self {
            intake_window_days: 365,
            days_supply_threshold: 180,
            observation_window_days: 231,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SqlGeneratorOptions {
    pub schema: SchemaBinding,
    pub adherence: AdherenceConfig,
    pub family_logic: bool,
    pub emit_complexity_warnings: bool,
    pub high_complexity_threshold: ComplexityLevel,
}

impl Default for SqlGeneratorOptions {
    fn default() -> Self {
        Self {
            schema: SchemaBinding::default(),
            adherence: AdherenceConfig::default(),
            family_logic: true,
            emit_complexity_warnings: true,
            high_complexity_threshold: ComplexityLevel::High,
        }
    }
}

impl SqlGeneratorOptions {
    pub fn with_schema(mut self, schema: SchemaBinding) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_adherence(mut self, adherence: AdherenceConfig) -> Self {
        self.adherence = adherence;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: CqlGeneratorOptions = serde_json::from_str(r#"{"libraryVersion": "2.0.0"}"#).unwrap();
        assert_eq!(options.library_version, "2.0.0");
        assert!(options.include_helpers);

        let sql: SqlGeneratorOptions =
            serde_json::from_str(r#"{"adherence": {"daysSupplyThreshold": 90}}"#).unwrap();
        assert_eq!(sql.adherence.days_supply_threshold, 90);
        assert_eq!(sql.adherence.observation_window_days, 231);
        assert_eq!(sql.schema.name, "HDI");
    }
}
