//! End-to-end SQL generation tests
//!
//! Covers:
//! - Set-algebra combination of leaf CTEs
//! - Negation against the all-patients anchor
//! - Medication adherence running aggregates
//! - Schema rebinding and locked overrides

use octofhir_measure_codegen::{
    AdherenceConfig, CodeGenerator, CodeOverride, ColumnRole, EditNote, GenerationResult, GenerationTarget,
    OverrideSet, ResourceFamily, SchemaBinding, SqlGenerator, SqlGeneratorOptions,
};
use octofhir_measure_diagnostics::{UMS0021, UMS0105, UMS0107};
use octofhir_measure_ir::{
    ClinicalType, DataElement, LogicalClause, MeasureMetadata, PopulationDefinition, PopulationType, Thresholds,
    UniversalMeasureSpec, ValueSetReference,
};

fn generate(spec: &UniversalMeasureSpec) -> GenerationResult {
    SqlGenerator::default()
        .generate(spec, &OverrideSet::new())
        .unwrap_or_else(|e| panic!("generation failed: {e}"))
}

/// Body of the CTE named `name`
fn cte_body<'a>(code: &'a str, name: &str) -> &'a str {
    let header = format!("{name} AS (\n");
    let start = code
        .find(&header)
        .unwrap_or_else(|| panic!("no CTE {name} in:\n{code}"))
        + header.len();
    let rest = &code[start..];
    rest.find("\n)").map_or(rest, |end| &rest[..end]).trim()
}

fn diagnosis(id: &str, name: &str, oid: &str) -> DataElement {
    DataElement::new(id, ClinicalType::Diagnosis, name).with_value_set(ValueSetReference::new(id, name).with_oid(oid))
}

fn screening_spec(numerator: LogicalClause) -> UniversalMeasureSpec {
    UniversalMeasureSpec::new(MeasureMetadata::new("M-100", "Follow-up after diagnosis"))
        .with_population(
            PopulationDefinition::new("ip", PopulationType::InitialPopulation).with_criteria(LogicalClause::and(
                "ip-root",
                vec![diagnosis("dx", "Diabetes", "2.16.840.1.113883.3.464.1003.103.12.1001").into()],
            )),
        )
        .with_population(PopulationDefinition::new("den", PopulationType::Denominator))
        .with_population(PopulationDefinition::new("num", PopulationType::Numerator).with_criteria(numerator))
}

// === Structure ===

#[test]
fn test_anchor_ctes_and_final_select() {
    let numerator = LogicalClause::and("num-root", vec![diagnosis("ckd", "Kidney Disease", "1.2.3").into()]);
    let result = generate(&screening_spec(numerator));
    assert!(result.success, "{:?}", result.errors);

    let code = &result.code;
    assert!(code.starts_with("-- Measure: M-100 Follow-up after diagnosis\n-- Schema: HDI\n"));
    assert_eq!(
        cte_body(code, "measurement_period"),
        "SELECT DATE '2025-01-01' AS start_date, DATE '2025-12-31' AS end_date"
    );
    assert_eq!(
        cte_body(code, "all_patients"),
        "SELECT DISTINCT p.PERSON_ID AS patient_id\n  FROM PH_D_PERSON p"
    );
    assert_eq!(cte_body(code, "pop_denominator"), "SELECT patient_id FROM pop_initial_population");
    assert!(code.contains("CASE WHEN ip.patient_id IS NOT NULL THEN 1 ELSE 0 END AS ip"));
    assert!(code.contains("LEFT JOIN pop_numerator num ON num.patient_id = ap.patient_id"));
    assert!(code.trim_end().ends_with(';'));
}

#[test]
fn test_implicit_denominator_follows_initial_population_cte() {
    let spec = UniversalMeasureSpec::new(MeasureMetadata::new("M-101", "Denominator listed first"))
        .with_population(PopulationDefinition::new("den", PopulationType::Denominator))
        .with_population(
            PopulationDefinition::new("ip", PopulationType::InitialPopulation).with_criteria(LogicalClause::and(
                "ip-root",
                vec![diagnosis("dx", "Diabetes", "2.16.840.1.113883.3.464.1003.103.12.1001").into()],
            )),
        );
    let result = generate(&spec);
    assert!(result.success, "{:?}", result.errors);

    let code = &result.code;
    assert_eq!(cte_body(code, "pop_denominator"), "SELECT patient_id FROM pop_initial_population");
    let defined = |name: &str| code.find(&format!("{name} AS (\n")).unwrap();
    assert!(defined("pop_initial_population") < defined("pop_denominator"));

    // flag columns keep the authored order
    let joined = |name: &str| code.find(&format!("LEFT JOIN {name} ")).unwrap();
    assert!(joined("pop_denominator") < joined("pop_initial_population"));
}

#[test]
fn test_and_or_map_to_intersect_union() {
    let numerator = LogicalClause::or(
        "num-root",
        vec![
            diagnosis("a", "A", "1.1").into(),
            LogicalClause::and("g", vec![diagnosis("b", "B", "1.2").into(), diagnosis("c", "C", "1.3").into()]).into(),
        ],
    );
    let code = generate(&screening_spec(numerator)).code;
    assert_eq!(
        cte_body(&code, "pop_numerator"),
        "(SELECT patient_id FROM leaf_a)\n  UNION\n  ((SELECT patient_id FROM leaf_b)\n  INTERSECT\n  (SELECT patient_id FROM leaf_c))"
    );
}

#[test]
fn test_negated_diagnosis_uses_except_against_all_patients() {
    let numerator = LogicalClause::and(
        "num-root",
        vec![diagnosis("hospice", "Hospice Care", "1.9").negated().into()],
    );
    let code = generate(&screening_spec(numerator)).code;
    let body = cte_body(&code, "pop_numerator");
    assert_eq!(
        body,
        "SELECT patient_id FROM all_patients\n  EXCEPT\n  (SELECT patient_id FROM leaf_hospice)"
    );
    assert!(!body.contains("INTERSECT"));
    assert!(!body.contains("UNION"));
}

#[test]
fn test_not_group_uses_except() {
    let numerator = LogicalClause::not("not", diagnosis("x", "X", "1.4"));
    let code = generate(&screening_spec(numerator)).code;
    assert!(cte_body(&code, "pop_numerator").starts_with("SELECT patient_id FROM all_patients\n  EXCEPT"));
}

// === Adherence ===

#[test]
fn test_adherence_criterion_builds_running_aggregate() {
    let medication = DataElement::new("ssri", ClinicalType::Medication, "Antidepressant days supply")
        .with_value_set(ValueSetReference::new("vs", "Antidepressant Medication").with_oid("2.16.840.1.113883.3.464.1003.196.12.1213"))
        .with_thresholds(Thresholds {
            value_min: Some(84.0),
            ..Thresholds::default()
        });
    let numerator = LogicalClause::and("num-root", vec![medication.into()]);
    let code = generate(&screening_spec(numerator)).code;

    let index = cte_body(&code, "adh_ssri_index");
    assert!(index.contains("MIN(t.START_DATE) AS index_date"));
    assert!(index.contains("mp.start_date + INTERVAL '365' DAY"));

    let cumulative = cte_body(&code, "adh_ssri_cumulative");
    assert!(cumulative.contains("SUM(t.DAYS_SUPPLY) OVER ("));
    assert!(cumulative.contains("JOIN adh_ssri_index i"));
    assert!(cumulative.ends_with("HAVING MAX(running_days_supply) >= 84"));
    assert_eq!(cte_body(&code, "leaf_ssri"), "SELECT patient_id FROM adh_ssri_cumulative");
}

#[test]
fn test_adherence_without_days_supply_column_degrades() {
    let mut options = SqlGeneratorOptions::default().with_adherence(AdherenceConfig {
        days_supply_threshold: 90,
        ..AdherenceConfig::default()
    });
    if let Some(table) = options.schema.tables.get_mut(&ResourceFamily::Medication) {
        table.columns.shift_remove(&ColumnRole::DaysSupply);
    }
    let medication = DataElement::new("m", ClinicalType::Medication, "Cumulative statin supply")
        .with_value_set(ValueSetReference::new("vs", "Statins").with_oid("1.5"));
    let spec = screening_spec(LogicalClause::and("num-root", vec![medication.into()]));
    let result = SqlGenerator::new(options).generate(&spec, &OverrideSet::new()).unwrap();

    assert!(result.has_warning(UMS0107));
    assert!(!result.code.contains("adh_m_index"));
    assert!(cte_body(&result.code, "leaf_m").contains("FROM PH_F_MEDICATION t"));
}

// === Measure Families ===

#[test]
fn test_colorectal_numerator_unions_curated_ctes() {
    let spec = UniversalMeasureSpec::new(MeasureMetadata::new("CMS130v12", "Colorectal Cancer Screening"))
        .with_population(PopulationDefinition::new("ip", PopulationType::InitialPopulation))
        .with_population(PopulationDefinition::new("num", PopulationType::Numerator));
    let code = generate(&spec).code;

    let numerator = cte_body(&code, "pop_numerator");
    assert_eq!(numerator.matches("SELECT patient_id FROM fam_").count(), 5);
    assert_eq!(numerator.matches("UNION").count(), 4);
    assert!(cte_body(&code, "fam_colonoscopy_performed").contains("INTERVAL '10' YEAR"));
    assert!(cte_body(&code, "fam_demographics").contains("p.BIRTH_DATE <= mp.end_date - INTERVAL '46' YEAR"));
}

// === Schema Binding ===

#[test]
fn test_rebound_schema_changes_tables_only() {
    let json = serde_json::to_string(&SchemaBinding::hdi())
        .unwrap()
        .replace("PH_F_CONDITION", "dx_fact")
        .replace("\"HDI\"", "\"Custom\"");
    let options = SqlGeneratorOptions::default().with_schema(SchemaBinding::from_json(&json).unwrap());
    let numerator = LogicalClause::and("num-root", vec![diagnosis("ckd", "Kidney Disease", "1.2.3").into()]);
    let code = SqlGenerator::new(options)
        .generate(&screening_spec(numerator), &OverrideSet::new())
        .unwrap()
        .code;
    assert!(code.contains("-- Schema: Custom"));
    assert!(cte_body(&code, "leaf_ckd").contains("FROM dx_fact t"));
    assert!(!code.contains("PH_F_CONDITION"));
}

// === Overrides and Errors ===

#[test]
fn test_locked_override_replaces_population_cte() {
    let overrides = OverrideSet::new().with(
        CodeOverride::new("num", GenerationTarget::Sql, "SELECT patient_id FROM local_registry;")
            .locked()
            .with_note(EditNote::new("Registry replaces claims logic")),
    );
    let numerator = LogicalClause::and("num-root", vec![diagnosis("ckd", "Kidney Disease", "1.2.3").into()]);
    let result = SqlGenerator::default()
        .generate(&screening_spec(numerator), &overrides)
        .unwrap();

    assert_eq!(
        cte_body(&result.code, "pop_numerator"),
        "-- Manual override for 'num' (locked, not regenerated)\n  -- Registry replaces claims logic\n  SELECT patient_id FROM local_registry"
    );
    assert!(!result.code.contains("leaf_ckd"));
    assert!(result.has_warning(UMS0105));
}

#[test]
fn test_no_populations_is_an_error() {
    let spec = UniversalMeasureSpec::new(MeasureMetadata::new("M-1", "t"));
    let err = SqlGenerator::default().generate(&spec, &OverrideSet::new()).unwrap_err();
    assert_eq!(err.code(), UMS0021);
}
