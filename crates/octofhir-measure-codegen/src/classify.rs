//! Clinical-type to target-family classification shared by both backends

use octofhir_measure_ir::{ClinicalType, DataElement};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Target resource (CQL) or table (SQL) family a data element lowers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceFamily {
    Patient,
    Encounter,
    Condition,
    Procedure,
    Observation,
    Medication,
    Immunization,
}

impl ResourceFamily {
    pub fn from_clinical_type(clinical_type: ClinicalType) -> Self {
        match clinical_type {
            ClinicalType::Demographic => ResourceFamily::Patient,
            ClinicalType::Encounter => ResourceFamily::Encounter,
            ClinicalType::Diagnosis => ResourceFamily::Condition,
            ClinicalType::Procedure => ResourceFamily::Procedure,
            ClinicalType::Observation | ClinicalType::Assessment => ResourceFamily::Observation,
            ClinicalType::Medication => ResourceFamily::Medication,
            ClinicalType::Immunization => ResourceFamily::Immunization,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceFamily::Patient => "patient",
            ResourceFamily::Encounter => "encounter",
            ResourceFamily::Condition => "condition",
            ResourceFamily::Procedure => "procedure",
            ResourceFamily::Observation => "observation",
            ResourceFamily::Medication => "medication",
            ResourceFamily::Immunization => "immunization",
        }
    }

    /// FHIR resource type used in CQL retrieves
    pub fn cql_resource(&self) -> &'static str {
        match self {
            ResourceFamily::Patient => "Patient",
            ResourceFamily::Encounter => "Encounter",
            ResourceFamily::Condition => "Condition",
            ResourceFamily::Procedure => "Procedure",
            ResourceFamily::Observation => "Observation",
            ResourceFamily::Medication => "MedicationRequest",
            ResourceFamily::Immunization => "Immunization",
        }
    }

    /// Single-letter query alias
    pub fn cql_alias(&self) -> &'static str {
        match self {
            ResourceFamily::Patient => "Pt",
            ResourceFamily::Encounter => "E",
            ResourceFamily::Condition => "C",
            ResourceFamily::Procedure => "P",
            ResourceFamily::Observation => "O",
            ResourceFamily::Medication => "M",
            ResourceFamily::Immunization => "I",
        }
    }

    /// Element holding the clinically relevant time, and whether it is already an interval
    pub fn timing_path(&self) -> (&'static str, TimingShape) {
        match self {
            ResourceFamily::Patient => ("birthDate", TimingShape::Point),
            ResourceFamily::Encounter => ("period", TimingShape::Interval),
            ResourceFamily::Condition => ("onset", TimingShape::Choice),
            ResourceFamily::Procedure => ("performed", TimingShape::Choice),
            ResourceFamily::Observation => ("effective", TimingShape::Choice),
            ResourceFamily::Medication => ("authoredOn", TimingShape::Point),
            ResourceFamily::Immunization => ("occurrence", TimingShape::Choice),
        }
    }

    /// Status restriction applied inside retrieves
    pub fn cql_status_filter(&self, alias: &str) -> Option<String> {
        match self {
            ResourceFamily::Encounter => Some(format!("{alias}.status = 'finished'")),
            ResourceFamily::Procedure | ResourceFamily::Immunization => Some(format!("{alias}.status = 'completed'")),
            ResourceFamily::Observation => Some(format!("{alias}.status in {{ 'final', 'amended', 'corrected' }}")),
            ResourceFamily::Medication => Some(format!("{alias}.status in {{ 'active', 'completed' }}")),
            ResourceFamily::Patient | ResourceFamily::Condition => None,
        }
    }
}

impl fmt::Display for ResourceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a timing element is typed on the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingShape {
    Point,
    Interval,
    /// A choice type normalized with `toInterval()`
    Choice,
}

/// Classification result for one data element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementClass {
    pub family: ResourceFamily,
    /// Whether lowering needs a resolvable value set
    pub requires_value_set: bool,
}

pub fn classify(element: &DataElement) -> ElementClass {
    let family = ResourceFamily::from_clinical_type(element.clinical_type);
    ElementClass {
        family,
        requires_value_set: family != ResourceFamily::Patient,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ClinicalType::Demographic, ResourceFamily::Patient, false)]
    #[case(ClinicalType::Diagnosis, ResourceFamily::Condition, true)]
    #[case(ClinicalType::Assessment, ResourceFamily::Observation, true)]
    #[case(ClinicalType::Medication, ResourceFamily::Medication, true)]
    fn test_classify(#[case] ty: ClinicalType, #[case] family: ResourceFamily, #[case] needs_vs: bool) {
        let class = classify(&DataElement::new("e", ty, "x"));
        assert_eq!(class.family, family);
        assert_eq!(class.requires_value_set, needs_vs);
    }

    #[test]
    fn test_every_clinical_type_has_a_family() {
        for ty in ClinicalType::ALL {
            let family = ResourceFamily::from_clinical_type(ty);
            assert!(!family.cql_resource().is_empty());
        }
    }
}
