//! End-to-end CQL generation tests
//!
//! Covers:
//! - Library header and population defines
//! - Curated measure-family logic
//! - Placeholder value sets and missing data degradation
//! - Locked overrides
//! - Required identifier errors

use chrono::{TimeZone, Utc};
use octofhir_measure_codegen::{
    CodeGenerator, CodeOverride, CqlGenerator, CqlGeneratorOptions, EditNote, GenerationTarget, OverrideSet,
};
use octofhir_measure_diagnostics::{
    UMS0020, UMS0021, UMS0101, UMS0104, UMS0105, UMS0106, UMS0108,
};
use octofhir_measure_ir::{
    ClinicalType, DataElement, LogicalClause, MeasureMetadata, PopulationDefinition, PopulationType, Thresholds,
    UniversalMeasureSpec, ValueSetReference,
};
use pretty_assertions::assert_eq;

fn generate(spec: &UniversalMeasureSpec) -> octofhir_measure_codegen::GenerationResult {
    CqlGenerator::default()
        .generate(spec, &OverrideSet::new())
        .unwrap_or_else(|e| panic!("generation failed: {e}"))
}

/// Body of `define "<name>":` up to the next blank line
fn define_body<'a>(code: &'a str, name: &str) -> &'a str {
    let header = format!("define \"{name}\":\n");
    let start = code
        .find(&header)
        .unwrap_or_else(|| panic!("no define {name} in:\n{code}"))
        + header.len();
    let rest = &code[start..];
    rest.find("\n\n").map_or(rest, |end| &rest[..end]).trim()
}

fn adult_diabetes_spec() -> UniversalMeasureSpec {
    let age = DataElement::new("age", ClinicalType::Demographic, "Patients 18-75")
        .with_thresholds(Thresholds::age_range(18.0, 75.0));
    let visit = DataElement::new("visit", ClinicalType::Encounter, "Office visit")
        .with_value_set(ValueSetReference::new("vs-visit", "Office Visit").with_oid("2.16.840.1.113883.3.464.1003.101.12.1001"));
    let a1c = DataElement::new("a1c", ClinicalType::Observation, "HbA1c > 9%")
        .with_value_set(ValueSetReference::new("vs-a1c", "HbA1c Laboratory Test").with_oid("2.16.840.1.113883.3.464.1003.198.12.1013"))
        .with_thresholds(Thresholds {
            value_min: Some(9.0),
            ..Thresholds::default()
        });

    UniversalMeasureSpec::new(MeasureMetadata::new("CMS122v12", "Diabetes: Hemoglobin A1c Poor Control"))
        .with_population(
            PopulationDefinition::new("ip", PopulationType::InitialPopulation)
                .with_criteria(LogicalClause::and("ip-root", vec![age.into(), visit.into()])),
        )
        .with_population(PopulationDefinition::new("den", PopulationType::Denominator))
        .with_population(
            PopulationDefinition::new("num", PopulationType::Numerator)
                .with_criteria(LogicalClause::and("num-root", vec![a1c.into()])),
        )
}

// === Library Structure ===

#[test]
fn test_library_header_and_defines() {
    let result = generate(&adult_diabetes_spec());
    assert!(result.success, "{:?}", result.errors);

    let code = &result.code;
    assert!(code.starts_with("// Diabetes: Hemoglobin A1c Poor Control\nlibrary CMS122v12 version '1.0.000'"));
    assert!(code.contains("using FHIR version '4.0.1'"));
    assert!(code.contains("include FHIRHelpers version '4.0.1' called FHIRHelpers"));
    assert!(code.contains("codesystem \"LOINC\": 'http://loinc.org'"));
    assert!(code.contains(
        "valueset \"Office Visit\": 'http://cts.nlm.nih.gov/fhir/ValueSet/2.16.840.1.113883.3.464.1003.101.12.1001'"
    ));
    assert!(code.contains(
        "parameter \"Measurement Period\" Interval<DateTime>\n  default Interval[@2025-01-01T00:00:00.0, @2025-12-31T23:59:59.999]"
    ));
    assert!(code.contains("context Patient"));

    assert_eq!(define_body(code, "Denominator"), "\"Initial Population\"");
    assert!(define_body(code, "Numerator").contains("(O.value as Quantity).value >= 9"));
    assert_eq!(
        define_body(code, "Initial Population"),
        "AgeInYearsAt(date from end of \"Measurement Period\") in Interval[18, 75] and exists ([Encounter: \"Office Visit\"] E where E.status = 'finished' and E.period during \"Measurement Period\")"
    );
}

#[test]
fn test_helpers_follow_initial_population() {
    let code = generate(&adult_diabetes_spec()).code;
    assert_eq!(
        define_body(&code, "Age In Range"),
        "AgeInYearsAt(date from end of \"Measurement Period\") in Interval[18, 75]"
    );
    assert!(define_body(&code, "Qualifying Encounters").starts_with("[Encounter: \"Office Visit\"] E"));
    assert_eq!(define_body(&code, "Has Hospice Services"), "Hospice.\"Has Hospice Services\"");
}

#[test]
fn test_metadata_version_wins_over_option() {
    let mut spec = adult_diabetes_spec();
    spec.metadata.version = "12.0.000".into();
    let code = generate(&spec).code;
    assert!(code.contains("library CMS122v12 version '12.0.000'"));

    let generator = CqlGenerator::new(CqlGeneratorOptions::default().with_library_version("3.1.0").without_helpers());
    let code = generator.generate(&adult_diabetes_spec(), &OverrideSet::new()).unwrap().code;
    assert!(code.contains("library CMS122v12 version '3.1.0'"));
    assert!(!code.contains("Hospice"));
}

#[test]
fn test_zero_value_sets_still_succeeds() {
    let spec = UniversalMeasureSpec::new(MeasureMetadata::new("M-001", "Adult wellness"))
        .with_population(
            PopulationDefinition::new("ip", PopulationType::InitialPopulation).with_criteria(LogicalClause::and(
                "root",
                vec![DataElement::new("age", ClinicalType::Demographic, "Adults")
                    .with_thresholds(Thresholds {
                        age_min: Some(18.0),
                        ..Thresholds::default()
                    })
                    .into()],
            )),
        )
        .with_population(PopulationDefinition::new("den", PopulationType::Denominator))
        .with_population(PopulationDefinition::new("num", PopulationType::Numerator));

    let result = generate(&spec);
    assert!(result.success);
    assert!(result.code.contains("library M_001 version"));
    assert!(!result.code.contains("valueset "));
    for name in ["Initial Population", "Denominator", "Numerator"] {
        assert!(result.code.contains(&format!("define \"{name}\":")), "missing {name}");
    }
    assert_eq!(define_body(&result.code, "Numerator"), "false");
    assert!(result.has_warning(UMS0106));
}

// === Value Sets ===

#[test]
fn test_placeholder_value_set_declared_with_warning() {
    let element = DataElement::new("lab", ClinicalType::Observation, "Custom lab panel")
        .with_value_set(ValueSetReference::new("vs-lab", "Custom Lab Panel"));
    let spec = UniversalMeasureSpec::new(MeasureMetadata::new("M-2", "Lab follow-up"))
        .with_population(
            PopulationDefinition::new("num", PopulationType::Numerator)
                .with_criteria(LogicalClause::and("root", vec![element.into()])),
        );

    let result = generate(&spec);
    assert!(result.success);
    assert!(result.code.contains("valueset \"Custom Lab Panel\": 'urn:placeholder:custom-lab-panel'"));
    let warning = result
        .warnings
        .iter()
        .find(|w| w.code == UMS0101)
        .expect("placeholder warning");
    assert!(warning.message.contains("codes are undefined"));
}

#[test]
fn test_value_set_names_are_escaped() {
    let element = DataElement::new("dx", ClinicalType::Diagnosis, "Quoted")
        .with_value_set(ValueSetReference::new("vs", "The \"Quoted\" Set").with_oid("1.2.3"));
    let spec = UniversalMeasureSpec::new(MeasureMetadata::new("M-3", "t")).with_population(
        PopulationDefinition::new("num", PopulationType::Numerator)
            .with_criteria(LogicalClause::and("root", vec![element.into()])),
    );
    let code = generate(&spec).code;
    assert!(code.contains(r#"valueset "The \"Quoted\" Set": 'http://cts.nlm.nih.gov/fhir/ValueSet/1.2.3'"#));
    assert!(code.contains(r#"[Condition: "The \"Quoted\" Set"] C"#));
}

// === Measure Families ===

#[test]
fn test_colorectal_numerator_uses_curated_logic() {
    let spec = UniversalMeasureSpec::new(MeasureMetadata::new("CMS130v12", "Colorectal Cancer Screening"))
        .with_population(PopulationDefinition::new("num", PopulationType::Numerator));
    let result = generate(&spec);
    assert!(result.success);

    let numerator = define_body(&result.code, "Numerator");
    let references: Vec<&str> = numerator.split("\n    or ").collect();
    assert_eq!(
        references,
        vec![
            "\"Colonoscopy Performed\"",
            "\"Fecal Occult Blood Test Performed\"",
            "\"Flexible Sigmoidoscopy Performed\"",
            "\"Stool DNA with FIT Test Performed\"",
            "\"CT Colonography Performed\"",
        ]
    );
    assert!(define_body(&result.code, "Colonoscopy Performed")
        .contains("P.performed.toInterval() ends 10 years or less on or before end of \"Measurement Period\""));
    assert!(result.code.contains("valueset \"Colonoscopy\": 'http://cts.nlm.nih.gov/fhir/ValueSet/2.16.840.1.113883.3.464.1003.108.12.1020'"));
    assert!(!result.has_warning(UMS0101));
}

#[test]
fn test_family_initial_population_and_exclusions() {
    let spec = UniversalMeasureSpec::new(MeasureMetadata::new("CMS125v12", "Breast Cancer Screening"))
        .with_population(PopulationDefinition::new("ip", PopulationType::InitialPopulation))
        .with_population(PopulationDefinition::new("denex", PopulationType::DenominatorExclusion));
    let code = generate(&spec).code;

    assert_eq!(
        define_body(&code, "Initial Population"),
        "\"Age In Range\"\n    and \"Is Female\"\n    and exists \"Qualifying Encounters\""
    );
    assert_eq!(define_body(&code, "Is Female"), "Patient.gender = 'female'");
    assert_eq!(
        define_body(&code, "Denominator Exclusions"),
        "\"Bilateral Mastectomy Performed\"\n    or \"Has Hospice Services\""
    );
}

#[test]
fn test_family_logic_replacing_authored_criteria_warns() {
    let element = DataElement::new("c", ClinicalType::Procedure, "Colonoscopy")
        .with_value_set(ValueSetReference::new("vs", "Colonoscopy"));
    let spec = UniversalMeasureSpec::new(MeasureMetadata::new("CMS130v12", "Colorectal Cancer Screening"))
        .with_population(
            PopulationDefinition::new("num", PopulationType::Numerator)
                .with_criteria(LogicalClause::and("root", vec![element.into()])),
        );
    let result = generate(&spec);
    assert!(result.has_warning(UMS0108));

    let generic = CqlGenerator::new(CqlGeneratorOptions::default().without_family_logic())
        .generate(&spec, &OverrideSet::new())
        .unwrap();
    assert!(!generic.has_warning(UMS0108));
    assert!(define_body(&generic.code, "Numerator").starts_with("exists ([Procedure: \"Colonoscopy\"] P"));
}

// === Overrides ===

#[test]
fn test_locked_population_override_is_verbatim() {
    let ts = Utc.with_ymd_and_hms(2025, 2, 1, 9, 0, 0).unwrap();
    let overrides = OverrideSet::new().with(
        CodeOverride::new("num", GenerationTarget::Cql, "exists [Observation: \"HbA1c Laboratory Test\"]")
            .locked()
            .with_note(EditNote::new("Simplified pending steward review").by("reviewer").at(ts)),
    );
    let result = CqlGenerator::default().generate(&adult_diabetes_spec(), &overrides).unwrap();

    assert!(result.code.contains(
        "// Manual override for 'num' (locked, not regenerated)\n\
         // [2025-02-01 09:00 UTC reviewer] Simplified pending steward review\n\
         define \"Numerator\":\n  exists [Observation: \"HbA1c Laboratory Test\"]"
    ));
    assert!(result.has_warning(UMS0105));
    assert!(result.success);
}

#[test]
fn test_unlocked_override_is_ignored() {
    let overrides = OverrideSet::new().with(CodeOverride::new("num", GenerationTarget::Cql, "false"));
    let result = CqlGenerator::default().generate(&adult_diabetes_spec(), &overrides).unwrap();
    assert!(!result.has_warning(UMS0105));
    assert!(define_body(&result.code, "Numerator").starts_with("exists ("));
}

#[test]
fn test_whole_measure_override() {
    let overrides = OverrideSet::new().with(
        CodeOverride::new("CMS122v12", GenerationTarget::Cql, "library Custom version '1'\n").locked(),
    );
    let result = CqlGenerator::default().generate(&adult_diabetes_spec(), &overrides).unwrap();
    assert_eq!(
        result.code,
        "// Manual override for 'CMS122v12' (locked, not regenerated)\n// No edit notes recorded\nlibrary Custom version '1'\n"
    );
}

// === Errors and Degradation ===

#[test]
fn test_missing_identifiers_fail_before_output() {
    let no_id = UniversalMeasureSpec::new(MeasureMetadata::new("", "t"))
        .with_population(PopulationDefinition::new("ip", PopulationType::InitialPopulation));
    let err = CqlGenerator::default().generate(&no_id, &OverrideSet::new()).unwrap_err();
    assert_eq!(err.code(), UMS0020);

    let no_populations = UniversalMeasureSpec::new(MeasureMetadata::new("M-1", "t"));
    let err = CqlGenerator::default().generate(&no_populations, &OverrideSet::new()).unwrap_err();
    assert_eq!(err.code(), UMS0021);
}

#[test]
fn test_invalid_tree_reports_errors_but_emits_code() {
    let broken = LogicalClause::and(
        "root",
        vec![
            LogicalClause::or("empty", vec![]).into(),
            DataElement::new("dx", ClinicalType::Diagnosis, "Diabetes").into(),
        ],
    );
    let spec = UniversalMeasureSpec::new(MeasureMetadata::new("M-4", "t"))
        .with_population(PopulationDefinition::new("num", PopulationType::Numerator).with_criteria(broken));
    let result = generate(&spec);
    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert!(result.code.contains("define \"Numerator\":"));
    assert!(result.code.contains("/* WARNING: no value set for \"Diabetes\" */ true"));
}

#[test]
fn test_high_complexity_warning() {
    let negated = |id: &str| -> octofhir_measure_ir::CriteriaNode {
        DataElement::new(id, ClinicalType::Diagnosis, id)
            .with_value_set(ValueSetReference::new(id, id).with_oid(format!("1.2.{}", id.len())))
            .negated()
            .into()
    };
    let tree = LogicalClause::and("root", vec![negated("a"), negated("bb"), negated("ccc")]);
    let spec = UniversalMeasureSpec::new(MeasureMetadata::new("M-5", "t"))
        .with_population(PopulationDefinition::new("num", PopulationType::Numerator).with_criteria(tree));

    assert!(generate(&spec).has_warning(UMS0104));

    let mut options = CqlGeneratorOptions::default();
    options.emit_complexity_warnings = false;
    let quiet = CqlGenerator::new(options).generate(&spec, &OverrideSet::new()).unwrap();
    assert!(!quiet.has_warning(UMS0104));
}
