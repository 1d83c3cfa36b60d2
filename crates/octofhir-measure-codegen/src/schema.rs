//! Warehouse schema binding for the SQL backend
//!
//! The backend only speaks in column roles; this table maps each role of each
//! resource family to a concrete table and column, so a deployment can rebind
//! the warehouse from JSON without touching generation logic.

use indexmap::IndexMap;
use octofhir_measure_diagnostics::{MeasureError, UMS0401};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ResourceFamily;

/// Abstract column meaning used by the SQL backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    PatientId,
    Code,
    CodeSystem,
    Date,
    EndDate,
    Status,
    DaysSupply,
    Value,
    BirthDate,
    Gender,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnRole::PatientId => "patient_id",
            ColumnRole::Code => "code",
            ColumnRole::CodeSystem => "code_system",
            ColumnRole::Date => "date",
            ColumnRole::EndDate => "end_date",
            ColumnRole::Status => "status",
            ColumnRole::DaysSupply => "days_supply",
            ColumnRole::Value => "value",
            ColumnRole::BirthDate => "birth_date",
            ColumnRole::Gender => "gender",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableBinding {
    pub table: String,
    pub columns: IndexMap<ColumnRole, String>,
}

impl TableBinding {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: IndexMap::new(),
        }
    }

    pub fn column(mut self, role: ColumnRole, name: impl Into<String>) -> Self {
        self.columns.insert(role, name.into());
        self
    }

    pub fn get(&self, role: ColumnRole) -> Option<&str> {
        self.columns.get(&role).map(String::as_str)
    }
}

/// Table holding expanded value-set membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetTable {
    pub table: String,
    pub oid_column: String,
    pub name_column: String,
    pub code_column: String,
    pub code_system_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaBinding {
    /// Label written into the generated header
    pub name: String,
    pub tables: IndexMap<ResourceFamily, TableBinding>,
    pub value_sets: ValueSetTable,
}

impl SchemaBinding {
    pub fn from_json(input: &str) -> Result<Self, MeasureError> {
        serde_json::from_str(input).map_err(|e| MeasureError::system(UMS0401, format!("invalid schema binding: {e}")))
    }

    pub fn table(&self, family: ResourceFamily) -> Option<&TableBinding> {
        self.tables.get(&family)
    }

    /// Column for `role`, or a description of what is missing
    pub fn column(&self, family: ResourceFamily, role: ColumnRole) -> Result<(&str, &str), String> {
        let binding = self
            .table(family)
            .ok_or_else(|| format!("no table bound for {family} data"))?;
        let column = binding
            .get(role)
            .ok_or_else(|| format!("table {} has no {role} column bound", binding.table))?;
        Ok((binding.table.as_str(), column))
    }

    /// The Health Data Intelligence style warehouse layout
    pub fn hdi() -> Self {
        let mut tables = IndexMap::new();
        tables.insert(
            ResourceFamily::Patient,
            TableBinding::new("PH_D_PERSON")
                .column(ColumnRole::PatientId, "PERSON_ID")
                .column(ColumnRole::BirthDate, "BIRTH_DATE")
                .column(ColumnRole::Gender, "GENDER_CODE"),
        );
        tables.insert(
            ResourceFamily::Encounter,
            TableBinding::new("PH_F_ENCOUNTER")
                .column(ColumnRole::PatientId, "PERSON_ID")
                .column(ColumnRole::Code, "ENCOUNTER_TYPE_CODE")
                .column(ColumnRole::CodeSystem, "ENCOUNTER_TYPE_CODING_SYSTEM_ID")
                .column(ColumnRole::Date, "SERVICE_DATE")
                .column(ColumnRole::EndDate, "DISCHARGE_DATE")
                .column(ColumnRole::Status, "STATUS"),
        );
        tables.insert(
            ResourceFamily::Condition,
            TableBinding::new("PH_F_CONDITION")
                .column(ColumnRole::PatientId, "PERSON_ID")
                .column(ColumnRole::Code, "CONDITION_CODE")
                .column(ColumnRole::CodeSystem, "CONDITION_CODING_SYSTEM_ID")
                .column(ColumnRole::Date, "EFFECTIVE_DATE")
                .column(ColumnRole::EndDate, "RESOLUTION_DATE")
                .column(ColumnRole::Status, "STATUS"),
        );
        tables.insert(
            ResourceFamily::Procedure,
            TableBinding::new("PH_F_PROCEDURE")
                .column(ColumnRole::PatientId, "PERSON_ID")
                .column(ColumnRole::Code, "PROCEDURE_CODE")
                .column(ColumnRole::CodeSystem, "PROCEDURE_CODING_SYSTEM_ID")
                .column(ColumnRole::Date, "SERVICE_DATE")
                .column(ColumnRole::EndDate, "SERVICE_END_DATE")
                .column(ColumnRole::Status, "STATUS"),
        );
        tables.insert(
            ResourceFamily::Observation,
            TableBinding::new("PH_F_RESULT")
                .column(ColumnRole::PatientId, "PERSON_ID")
                .column(ColumnRole::Code, "RESULT_CODE")
                .column(ColumnRole::CodeSystem, "RESULT_CODING_SYSTEM_ID")
                .column(ColumnRole::Date, "SERVICE_DATE")
                .column(ColumnRole::Status, "STATUS")
                .column(ColumnRole::Value, "NUMERIC_VALUE"),
        );
        tables.insert(
            ResourceFamily::Medication,
            TableBinding::new("PH_F_MEDICATION")
                .column(ColumnRole::PatientId, "PERSON_ID")
                .column(ColumnRole::Code, "MEDICATION_CODE")
                .column(ColumnRole::CodeSystem, "MEDICATION_CODING_SYSTEM_ID")
                .column(ColumnRole::Date, "START_DATE")
                .column(ColumnRole::EndDate, "STOP_DATE")
                .column(ColumnRole::Status, "STATUS")
                .column(ColumnRole::DaysSupply, "DAYS_SUPPLY"),
        );
        tables.insert(
            ResourceFamily::Immunization,
            TableBinding::new("PH_F_IMMUNIZATION")
                .column(ColumnRole::PatientId, "PERSON_ID")
                .column(ColumnRole::Code, "IMMUNIZATION_CODE")
                .column(ColumnRole::CodeSystem, "IMMUNIZATION_CODING_SYSTEM_ID")
                .column(ColumnRole::Date, "ADMINISTRATION_DATE")
                .column(ColumnRole::Status, "STATUS"),
        );

        Self {
            name: "HDI".to_string(),
            tables,
            value_sets: ValueSetTable {
                table: "VALUESET_MEMBERS".to_string(),
                oid_column: "VALUESET_OID".to_string(),
                name_column: "VALUESET_NAME".to_string(),
                code_column: "CODE".to_string(),
                code_system_column: "CODE_SYSTEM".to_string(),
            },
        }
    }
}

impl Default for SchemaBinding {
    fn default() -> Self {
        Self::hdi()
    }
}
