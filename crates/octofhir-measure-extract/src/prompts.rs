//! Oracle requests for the three extraction passes

use octofhir_measure_ir::PopulationType;

use crate::{CompletionRequest, Message, MeasureSkeleton, PopulationSkeleton};

pub const SKELETON_SYSTEM_PROMPT: &str = "\
You analyse clinical quality measure specifications. Identify the measure metadata \
and the populations the document defines. Do not extract detailed criteria yet.

Respond with a single JSON object and nothing else:
{
  \"metadata\": {
    \"measureId\": \"CMS...\", \"title\": \"...\", \"version\": \"...\", \"steward\": \"...\",
    \"description\": \"...\", \"measurementPeriod\": {\"start\": \"YYYY-MM-DD\", \"end\": \"YYYY-MM-DD\"},
    \"measureType\": \"process|outcome|structure|intermediate|patient_reported_outcome\",
    \"scoring\": \"proportion|ratio|continuous_variable|cohort\"
  },
  \"populations\": [
    {\"type\": \"initial_population|denominator|denominator_exclusion|denominator_exception|numerator|numerator_exclusion\",
     \"name\": \"...\", \"description\": \"one or two sentences\", \"estimatedCriteriaCount\": 0}
  ]
}";

pub const DETAIL_SYSTEM_PROMPT: &str = "\
You extract the complete criteria logic of one population of a clinical quality measure. \
Use only what the document states. Every criterion is a data element with a clinical type \
(demographic, encounter, diagnosis, procedure, observation, medication, immunization, assessment). \
Group criteria with AND, OR or NOT clauses; NOT has exactly one child.

Respond with a single JSON object and nothing else:
{
  \"narrative\": \"the population definition as written\",
  \"criteria\": {\"operator\": \"AND|OR|NOT\", \"children\": [
    {\"type\": \"...\", \"description\": \"...\", \"negation\": false,
     \"valueSet\": {\"name\": \"...\", \"oid\": \"2.16.840.1.113883...\"},
     \"timing\": [{\"description\": \"...\", \"value\": 0, \"unit\": \"days|months|years\",
                 \"direction\": \"before|after\", \"anchor\": \"...\"}],
     \"thresholds\": {\"ageMin\": 0, \"ageMax\": 0, \"valueMin\": 0, \"valueMax\": 0},
     \"confidence\": \"high|medium|low\"}
  ]},
  \"valueSets\": [{\"name\": \"...\", \"oid\": \"...\", \"codes\": [{\"code\": \"...\", \"system\": \"...\", \"display\": \"...\"}]}],
  \"confidence\": \"high|medium|low\"
}";

pub const VALIDATION_SYSTEM_PROMPT: &str = "\
You review an extraction of a clinical quality measure against its source document. \
Report populations the extraction missed, criteria stated in the document but absent \
from the extraction (quote the source text), extracted criteria the document does not \
support, and other suggestions.

Respond with a single JSON object and nothing else:
{
  \"missingPopulations\": [\"...\"],
  \"missingCriteria\": [{\"description\": \"...\", \"population\": \"...\", \"sourceText\": \"...\", \"confidence\": \"high|medium|low\"}],
  \"suspectedHallucinations\": [{\"criterionId\": \"...\", \"description\": \"...\", \"reason\": \"...\"}],
  \"suggestions\": [\"...\"]
}";

/// Cut `text` to at most `max_chars` characters; the flag reports whether anything was dropped
pub fn truncate_document(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => (&text[..byte_index], true),
        None => (text, false),
    }
}

pub fn skeleton_request(document: &str, max_tokens: u32) -> CompletionRequest {
    CompletionRequest::new(SKELETON_SYSTEM_PROMPT, max_tokens).with_message(Message::user(format!(
        "Measure specification document:\n\n{document}"
    )))
}

pub fn detail_request(
    skeleton: &MeasureSkeleton,
    population: &PopulationSkeleton,
    document: &str,
    max_tokens: u32,
) -> CompletionRequest {
    let prompt = format!(
        "Measure outline:\n{outline}\n\n\
         Extract the full criteria for the {name} population (type: {ty}).\n\
         Outline description: {description}\n\n\
         Document:\n\n{document}",
        outline = outline(skeleton),
        name = population.name,
        ty = population.population_type.as_str(),
        description = population.description,
    );
    CompletionRequest::new(DETAIL_SYSTEM_PROMPT, max_tokens).with_message(Message::user(prompt))
}

pub fn validation_request(document: &str, extraction_summary: &str, max_tokens: u32) -> CompletionRequest {
    let prompt = format!("Extraction so far:\n\n{extraction_summary}\n\nSource document:\n\n{document}");
    CompletionRequest::new(VALIDATION_SYSTEM_PROMPT, max_tokens).with_message(Message::user(prompt))
}

/// One line per population, used to prime detail passes
fn outline(skeleton: &MeasureSkeleton) -> String {
    let mut lines = vec![format!(
        "{} - {}",
        skeleton.metadata.measure_id, skeleton.metadata.title
    )];
    lines.extend(skeleton.populations.iter().map(|p| {
        format!(
            "- {} ({}): {}",
            p.name,
            p.population_type.as_str(),
            p.description
        )
    }));
    lines.join("\n")
}

/// Header line a detail request carries for `population_type`, for routing in logs and mocks
pub fn detail_marker(population_type: PopulationType) -> String {
    format!("(type: {})", population_type.as_str())
}
