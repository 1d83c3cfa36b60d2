//! Common test utilities for extraction testing
//!
//! This module provides:
//! - Mock oracle and OID validator
//! - Canned oracle responses for a colorectal screening measure
//! - Document builders for whole and chunked runs

pub mod mocks;

pub use mocks::*;

use octofhir_measure_extract::{DETAIL_SYSTEM_PROMPT, SKELETON_SYSTEM_PROMPT, VALIDATION_SYSTEM_PROMPT};

pub const SKELETON_RESPONSE: &str = r#"```json
{
  "metadata": {
    "measureId": "CMS130v12",
    "title": "Colorectal Cancer Screening",
    "version": "12.0.000",
    "steward": "NCQA",
    "measurementPeriod": {"start": "2025-01-01", "end": "2025-12-31"},
    "measureType": "process",
    "scoring": "proportion"
  },
  "populations": [
    {"type": "initial_population", "name": "Initial Population", "description": "Patients 46-75 with a visit", "estimatedCriteriaCount": 2},
    {"type": "denominator", "name": "Denominator", "description": "Equals Initial Population", "estimatedCriteriaCount": 0},
    {"type": "numerator", "name": "Numerator", "description": "One or more screenings", "estimatedCriteriaCount": 5}
  ]
}
```"#;

pub const IP_DETAIL: &str = r#"{
  "narrative": "Patients 46-75 years of age by the end of the measurement period with a visit during the measurement period",
  "criteria": {"operator": "AND", "children": [
    {"type": "demographic", "description": "Age 46-75 at end of measurement period", "thresholds": {"ageMin": 46, "ageMax": 75}},
    {"type": "encounter", "description": "Qualifying visit",
     "valueSet": {"name": "Office Visit", "oid": "2.16.840.1.113883.3.464.1003.101.12.1001"},
     "timing": "during measurement period"}
  ]},
  "confidence": "high"
}"#;

pub const DEN_DETAIL: &str = r#"{"narrative": "Equals Initial Population", "criteria": null, "confidence": "high"}"#;

pub const NUM_DETAIL: &str = r#"Here is the numerator:
{
  "narrative": "Patients with one or more screenings for colorectal cancer",
  "criteria": {"operator": "OR", "children": [
    {"type": "procedure", "description": "Colonoscopy",
     "valueSet": {"name": "Colonoscopy", "oid": "2.16.840.1.113883.3.464.1003.108.12.1020"},
     "timing": {"value": 10, "unit": "years", "direction": "before", "anchor": "end of measurement period"}},
    {"type": "lab", "description": "Fecal occult blood test",
     "valueSet": {"name": "Fecal Occult Blood Test (FOBT)", "oid": "2.16.840.1.113883.3.464.1003.198.12.1011"}}
  ]},
  "confidence": "medium"
}"#;

/// Numerator as seen from the first chunk of a long document
pub const NUM_DETAIL_CHUNK_A: &str = r#"{
  "narrative": "Patients with one or more screenings",
  "criteria": {"operator": "OR", "children": [
    {"type": "procedure", "description": "Colonoscopy", "valueSet": {"name": "Colonoscopy", "codes": [{"code": "44388", "system": "CPT"}]}},
    {"type": "lab", "description": "FIT"}
  ]}
}"#;

/// Numerator as seen from the second chunk: repeats colonoscopy, adds two tests
pub const NUM_DETAIL_CHUNK_B: &str = r#"{
  "narrative": "Patients with one or more screenings for colorectal cancer, including sigmoidoscopy and CT colonography",
  "criteria": {"operator": "OR", "children": [
    {"type": "procedure", "description": "colonoscopy", "valueSet": {"name": "colonoscopy", "codes": [{"code": "44388", "system": "CPT"}, {"code": "45378", "system": "CPT"}]}},
    {"type": "procedure", "description": "Flexible sigmoidoscopy"},
    {"type": "procedure", "description": "CT colonography"}
  ]}
}"#;

pub const VALIDATION_RESPONSE: &str = r#"{
  "missingPopulations": ["Denominator Exclusions"],
  "missingCriteria": [{"description": "Hospice services", "population": "denominator exclusion", "sourceText": "hospice"}],
  "suspectedHallucinations": [],
  "suggestions": ["Confirm the FIT-DNA lookback"]
}"#;

pub const SHORT_DOCUMENT: &str = "CMS130v12 Colorectal Cancer Screening\n\n\
Initial Population: Patients 46-75 years of age with a visit during the measurement period.\n\n\
Denominator: Equals Initial Population.\n\n\
Denominator Exclusions: Patients in hospice care.\n\n\
Numerator: Patients with one or more screenings for colorectal cancer.\n";

/// Oracle answering every pass for [`SHORT_DOCUMENT`]
pub fn standard_oracle() -> ScriptedOracle {
    ScriptedOracle::new()
        .when(&[SKELETON_SYSTEM_PROMPT], SKELETON_RESPONSE)
        .when(&[DETAIL_SYSTEM_PROMPT, "(type: initial_population)"], IP_DETAIL)
        .when(&[DETAIL_SYSTEM_PROMPT, "(type: denominator)"], DEN_DETAIL)
        .when(&[DETAIL_SYSTEM_PROMPT, "(type: numerator)"], NUM_DETAIL)
        .when(&[VALIDATION_SYSTEM_PROMPT], VALIDATION_RESPONSE)
}

fn pad_to(document: &mut String, label: &str, target: usize) {
    let mut i = 0;
    while document.len() < target {
        document.push_str(&format!(
            "{label} paragraph {i}: {}\n\n",
            "supporting guidance text ".repeat(18).trim_end()
        ));
        i += 1;
    }
}

/// A document of at least 25,000 bytes whose numerator is described in two
/// places far enough apart to land in different chunks
pub fn long_document() -> String {
    let mut document = String::from(
        "CMS130v12 Colorectal Cancer Screening\n\n\
         Initial Population: Patients 46-75 years of age with a visit during the measurement period.\n\n\
         Denominator: Equals Initial Population.\n\n",
    );
    pad_to(&mut document, "Background", 9_500);
    document.push_str("Numerator: Patients with one or more screenings. CHUNK-A colonoscopy or FIT.\n\n");
    pad_to(&mut document, "Guidance", 19_500);
    document.push_str("Numerator (continued): CHUNK-B flexible sigmoidoscopy and CT colonography also qualify.\n\n");
    pad_to(&mut document, "Appendix", 25_000);
    document
}
