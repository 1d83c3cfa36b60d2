//! Tests for the multi-pass extraction pipeline
//!
//! Covers:
//! - Whole-document runs through skeleton, detail and validation
//! - Fatal skeleton failures
//! - Per-population degradation and OID warnings
//! - Chunked runs and the merge of per-chunk results
//! - Progress reporting, stage timings and document-file input

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::*;
use octofhir_measure_diagnostics::{Severity, UMS0200, UMS0202, UMS0203, UMS0205, UMS0206, UMS0209, UMS0300};
use octofhir_measure_extract::{
    DETAIL_SYSTEM_PROMPT, DocumentFile, ExtractionConfig, ExtractionProgress, ExtractionStage, MultiPassExtractor,
    PlainTextExtractor, SKELETON_SYSTEM_PROMPT, extract_from_documents, extract_with_multi_pass,
};
use octofhir_measure_ir::{ClinicalType, Confidence, LogicalOperator, PopulationType, walk};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

fn extractor(oracle: ScriptedOracle) -> (Arc<ScriptedOracle>, MultiPassExtractor) {
    let oracle = Arc::new(oracle);
    let extractor = MultiPassExtractor::new(oracle.clone());
    (oracle, extractor)
}

// === Whole document ===

#[tokio::test]
async fn test_extracts_all_skeleton_populations() {
    let (oracle, extractor) = extractor(standard_oracle());
    let result = extractor.extract(SHORT_DOCUMENT).await;

    assert!(result.success);
    assert_eq!(result.stage, ExtractionStage::Assembled);
    assert!(result.errors.is_empty());
    assert_eq!(result.chunk_count, 0);
    // skeleton + three details + validation
    assert_eq!(oracle.request_count(), 5);

    let spec = result.spec.as_ref().unwrap();
    assert_eq!(spec.metadata.measure_id, "CMS130v12");
    assert_eq!(spec.metadata.title, "Colorectal Cancer Screening");
    let types: Vec<PopulationType> = spec.populations.iter().map(|p| p.population_type).collect();
    assert_eq!(
        types,
        vec![PopulationType::InitialPopulation, PopulationType::Denominator, PopulationType::Numerator]
    );
    assert_eq!(spec.review_progress.total, 3);
    assert_eq!(spec.overall_confidence, Confidence::Medium);
}

#[tokio::test]
async fn test_detail_builds_criteria_tree() {
    let (_, extractor) = extractor(standard_oracle());
    let result = extractor.extract(SHORT_DOCUMENT).await;
    let spec = result.spec.unwrap();

    let ip = spec.population(PopulationType::InitialPopulation).unwrap();
    assert_eq!(ip.id, "ip");
    let criteria = ip.criteria.as_ref().unwrap();
    assert_eq!(criteria.operator, LogicalOperator::And);
    let elements = criteria.elements();
    assert_eq!(elements.len(), 2);
    assert_eq!(elements[0].clinical_type, ClinicalType::Demographic);
    assert_eq!(elements[1].clinical_type, ClinicalType::Encounter);
    assert_eq!(elements[1].id, "ip-c2");

    // Narrative text around the JSON object is tolerated
    let numerator = spec.population(PopulationType::Numerator).unwrap();
    assert_eq!(numerator.criteria.as_ref().unwrap().operator, LogicalOperator::Or);
    assert_eq!(numerator.confidence, Confidence::Medium);

    let denominator = spec.population(PopulationType::Denominator).unwrap();
    assert!(denominator.criteria.is_none());
    assert_eq!(denominator.narrative, "Equals Initial Population");

    // Value sets are collected from criteria across populations
    assert_eq!(spec.value_sets.len(), 3);
    assert!(spec.value_sets.iter().any(|vs| vs.name == "Office Visit"));
}

#[tokio::test]
async fn test_detail_requests_name_their_population() {
    let (oracle, extractor) = extractor(standard_oracle());
    extractor.extract(SHORT_DOCUMENT).await;

    let detail_texts: Vec<String> = oracle
        .requests()
        .iter()
        .filter(|r| r.system_prompt == DETAIL_SYSTEM_PROMPT)
        .map(|r| r.user_text())
        .collect();
    assert_eq!(detail_texts.len(), 3);
    assert!(detail_texts[0].contains("(type: initial_population)"));
    assert!(detail_texts[2].contains("(type: numerator)"));
    assert!(detail_texts.iter().all(|t| t.contains("CMS130v12 - Colorectal Cancer Screening")));
}

// === Skeleton failures ===

#[tokio::test]
async fn test_non_json_skeleton_is_fatal() {
    let oracle = ScriptedOracle::new().when(&[SKELETON_SYSTEM_PROMPT], "I could not find a measure here.");
    let (oracle, extractor) = extractor(oracle);
    let result = extractor.extract(SHORT_DOCUMENT).await;

    assert!(!result.success);
    assert!(result.spec.is_none());
    assert!(result.populations.is_empty());
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, UMS0200);
    assert_eq!(oracle.request_count(), 1);
}

#[tokio::test]
async fn test_unreachable_oracle_is_fatal() {
    let oracle = ScriptedOracle::new().fail_when(&[SKELETON_SYSTEM_PROMPT], "connection refused");
    let result = extract_with_multi_pass(Arc::new(oracle), SHORT_DOCUMENT, ExtractionConfig::default()).await;

    assert!(!result.success);
    assert!(result.has_error(UMS0300));
    assert!(result.errors[0].message.contains("connection refused"));
    assert!(result.stage_duration(ExtractionStage::Skeleton).is_some());
}

// === Per-population degradation ===

#[tokio::test]
async fn test_failed_detail_only_drops_that_population() {
    let oracle = ScriptedOracle::new()
        .when(&[SKELETON_SYSTEM_PROMPT], SKELETON_RESPONSE)
        .fail_when(&[DETAIL_SYSTEM_PROMPT, "(type: denominator)"], "rate limited")
        .when(&[DETAIL_SYSTEM_PROMPT, "(type: initial_population)"], IP_DETAIL)
        .when(&[DETAIL_SYSTEM_PROMPT, "(type: numerator)"], NUM_DETAIL);
    let (_, extractor) = extractor(oracle);
    let result = extractor
        .with_config(ExtractionConfig::default().without_validation_pass())
        .extract(SHORT_DOCUMENT)
        .await;

    assert!(result.success);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, UMS0300);
    assert_eq!(result.errors[0].node_id.as_deref(), Some("den"));

    let denominator = result.population(PopulationType::Denominator).unwrap();
    assert!(!denominator.success);

    let spec = result.spec.unwrap();
    assert_eq!(spec.populations.len(), 2);
    assert!(spec.population(PopulationType::Denominator).is_none());
    assert!(spec.population(PopulationType::Numerator).is_some());
}

#[tokio::test]
async fn test_invalid_oid_warns_without_dropping_population() {
    let validator = Arc::new(MockOidValidator::new());
    validator.reject("2.16.840.1.113883.3.464.1003.108.12.1020");
    let (_, extractor) = extractor(standard_oracle());
    let result = extractor
        .with_oid_validator(validator.clone())
        .with_config(ExtractionConfig::default().without_validation_pass())
        .extract(SHORT_DOCUMENT)
        .await;

    assert!(result.success);
    let warning = result.warnings.iter().find(|w| w.code == UMS0203).unwrap();
    assert_eq!(warning.node_id.as_deref(), Some("num"));
    assert!(warning.message.contains("Colonoscopy"));
    assert!(result.spec.unwrap().population(PopulationType::Numerator).is_some());
    assert_eq!(validator.seen().len(), 3);
}

#[tokio::test]
async fn test_unknown_population_type_is_skipped() {
    let skeleton = r#"{"metadata": {"measureId": "CMS2"}, "populations": [
        {"type": "initial population", "name": "IP"},
        {"type": "stratifier", "name": "Age band"}
    ]}"#;
    let oracle = ScriptedOracle::new()
        .when(&[SKELETON_SYSTEM_PROMPT], skeleton)
        .when(&[DETAIL_SYSTEM_PROMPT], IP_DETAIL);
    let (oracle, extractor) = extractor(oracle);
    let result = extractor
        .with_config(ExtractionConfig::default().without_validation_pass())
        .extract(SHORT_DOCUMENT)
        .await;

    assert!(result.success);
    assert_eq!(result.skeleton.unwrap().populations.len(), 1);
    assert!(result.warnings.iter().any(|w| w.message.contains("stratifier")));
    assert_eq!(oracle.request_count(), 2);
}

// === Validation pass ===

#[tokio::test]
async fn test_validation_findings_become_warnings() {
    let (_, extractor) = extractor(standard_oracle());
    let result = extractor.extract(SHORT_DOCUMENT).await;

    assert!(result.success);
    let report = result.validation.as_ref().unwrap();
    assert_eq!(report.missing_populations, vec!["Denominator Exclusions".to_string()]);

    let missing_population = result.warnings.iter().find(|w| w.code == UMS0205).unwrap();
    assert_eq!(missing_population.node_id.as_deref(), Some("denex"));

    let missing_criterion = result.warnings.iter().find(|w| w.code == UMS0206).unwrap();
    let location = missing_criterion.location.as_ref().unwrap();
    assert_eq!(location.offset, SHORT_DOCUMENT.find("hospice").unwrap());

    let suggestion = result.warnings.iter().find(|w| w.code == UMS0209).unwrap();
    assert_eq!(suggestion.severity, Severity::Info);

    // Findings never remove extracted populations
    assert_eq!(result.spec.unwrap().populations.len(), 3);
}

#[tokio::test]
async fn test_validation_failure_is_not_fatal() {
    let oracle = ScriptedOracle::new()
        .when(&[SKELETON_SYSTEM_PROMPT], SKELETON_RESPONSE)
        .when(&[DETAIL_SYSTEM_PROMPT], DEN_DETAIL);
    let (_, extractor) = extractor(oracle);
    let result = extractor.extract(SHORT_DOCUMENT).await;

    assert!(result.success);
    assert!(result.validation.is_none());
    assert!(result.has_warning(UMS0202));
    assert_eq!(result.stage, ExtractionStage::Assembled);
}

#[tokio::test]
async fn test_validation_pass_can_be_skipped() {
    let (oracle, extractor) = extractor(standard_oracle());
    let result = extractor
        .with_config(ExtractionConfig::default().without_validation_pass())
        .extract(SHORT_DOCUMENT)
        .await;

    assert!(result.validation.is_none());
    assert_eq!(oracle.request_count(), 4);
    assert!(result.stage_duration(ExtractionStage::Validation).is_none());
}

// === Chunked documents ===

fn chunked_oracle() -> ScriptedOracle {
    ScriptedOracle::new()
        .when(&[SKELETON_SYSTEM_PROMPT], SKELETON_RESPONSE)
        .when(&[DETAIL_SYSTEM_PROMPT, "(type: numerator)", "CHUNK-B"], NUM_DETAIL_CHUNK_B)
        .when(&[DETAIL_SYSTEM_PROMPT, "(type: numerator)", "CHUNK-A"], NUM_DETAIL_CHUNK_A)
        .when(&[DETAIL_SYSTEM_PROMPT, "(type: initial_population)"], IP_DETAIL)
        .when(&[DETAIL_SYSTEM_PROMPT, "(type: denominator)"], DEN_DETAIL)
}

#[tokio::test]
async fn test_long_document_merges_numerator_across_chunks() {
    let document = long_document();
    assert!(document.len() >= 25_000);

    let (oracle, extractor) = extractor(chunked_oracle());
    let result = extractor
        .with_config(ExtractionConfig::default().without_validation_pass())
        .extract(&document)
        .await;

    assert!(result.success);
    assert!(result.chunk_count >= 2);
    assert!(result.errors.is_empty());

    let numerator = result.population(PopulationType::Numerator).unwrap();
    assert!(numerator.chunks.len() >= 2);

    // The skeleton only sees the first chunk
    let skeleton_request = &oracle.requests()[0];
    assert!(!skeleton_request.user_text().contains("CHUNK-B"));

    let spec = result.spec.unwrap();
    let criteria = spec.population(PopulationType::Numerator).unwrap().criteria.clone().unwrap();
    let descriptions: Vec<&str> = criteria.elements().iter().map(|e| e.description.as_str()).collect();
    assert_eq!(
        descriptions,
        vec!["Colonoscopy", "FIT", "Flexible sigmoidoscopy", "CT colonography"]
    );

    let ids: Vec<String> = walk(&criteria).map(|v| v.node.id().to_string()).collect();
    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());

    // The longer narrative wins
    assert!(spec.population(PopulationType::Numerator).unwrap().narrative.contains("CT colonography"));

    let colonoscopy: Vec<_> = spec
        .value_sets
        .iter()
        .filter(|vs| vs.name.eq_ignore_ascii_case("colonoscopy"))
        .collect();
    assert_eq!(colonoscopy.len(), 1);
    assert_eq!(colonoscopy[0].codes.len(), 2);
}

#[tokio::test]
async fn test_chunked_result_does_not_depend_on_concurrency() {
    let document = long_document();
    let config = ExtractionConfig::default().without_validation_pass();

    let sequential = extract_with_multi_pass(Arc::new(chunked_oracle()), &document, config).await;
    let concurrent = extract_with_multi_pass(
        Arc::new(chunked_oracle()),
        &document,
        config.with_max_concurrency(4),
    )
    .await;

    assert_eq!(sequential.spec, concurrent.spec);
    assert_eq!(sequential.warnings, concurrent.warnings);
}

#[tokio::test]
async fn test_short_document_is_not_chunked() {
    let (_, extractor) = extractor(standard_oracle());
    let result = extractor.extract(SHORT_DOCUMENT).await;
    assert_eq!(result.chunk_count, 0);
    assert!(result.populations.iter().all(|p| p.chunks.is_empty()));
}

// === Progress and timings ===

#[tokio::test]
async fn test_progress_reports_each_stage_in_order() {
    let seen: Arc<Mutex<Vec<ExtractionProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let (_, extractor) = extractor(standard_oracle());
    let result = extractor
        .with_progress(Arc::new(move |progress: &ExtractionProgress| sink.lock().push(progress.clone())))
        .extract(SHORT_DOCUMENT)
        .await;
    assert!(result.success);

    let seen = seen.lock();
    let stages: Vec<ExtractionStage> = seen.iter().map(|p| p.stage).collect();
    let mut sorted = stages.clone();
    sorted.sort();
    assert_eq!(stages, sorted);
    assert_eq!(stages.first(), Some(&ExtractionStage::Start));
    assert_eq!(stages.last(), Some(&ExtractionStage::Assembled));

    let details: Vec<&ExtractionProgress> = seen.iter().filter(|p| p.stage == ExtractionStage::Detail).collect();
    assert_eq!(details.len(), 3);
    assert_eq!(details[2].completed, 3);
    assert!(details.iter().all(|p| p.total == 3));
}

#[tokio::test]
async fn test_timings_cover_every_stage_run() {
    let (_, extractor) = extractor(standard_oracle());
    let result = extractor.extract(SHORT_DOCUMENT).await;

    let stages: Vec<ExtractionStage> = result.timings.iter().map(|t| t.stage).collect();
    assert_eq!(
        stages,
        vec![
            ExtractionStage::Skeleton,
            ExtractionStage::Detail,
            ExtractionStage::Validation,
            ExtractionStage::Assembled,
        ]
    );
    assert!(result.total_duration() >= result.stage_duration(ExtractionStage::Detail).unwrap());
}

// === Document files ===

#[tokio::test]
async fn test_extracts_from_text_files() {
    let files = vec![
        DocumentFile::text("cms130.txt", SHORT_DOCUMENT),
        DocumentFile::new("scan.pdf", vec![0x25, 0x50, 0x44, 0x46]).with_media_type("application/pdf"),
    ];
    let result = extract_from_documents(
        Arc::new(standard_oracle()),
        &PlainTextExtractor,
        &files,
        ExtractionConfig::default().without_validation_pass(),
    )
    .await;

    assert!(result.success);
    assert_eq!(result.spec.unwrap().populations.len(), 3);
    // The unreadable PDF surfaces as the first warning
    assert!(result.warnings[0].message.contains("scan.pdf"));
}

#[tokio::test]
async fn test_no_readable_documents_fails() {
    let files = vec![DocumentFile::new("scan.pdf", vec![0x25, 0x50]).with_media_type("application/pdf")];
    let (oracle, extractor) = extractor(standard_oracle());
    let result = extractor.extract_documents(&PlainTextExtractor, &files).await;

    assert!(!result.success);
    assert_eq!(oracle.request_count(), 0);
}
