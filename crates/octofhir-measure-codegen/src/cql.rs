//! CQL backend
//!
//! Lowers a measure into a single CQL library: header, value-set section,
//! measurement-period parameter, helper definitions and one `define` per
//! population. Leaves become `exists` retrieves; boolean structure comes from
//! the shared tree renderer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use octofhir_measure_diagnostics::{
    Diagnostic, MeasureError, UMS0100, UMS0101, UMS0102, UMS0105, UMS0106, UMS0108,
};
use octofhir_measure_ir::{
    ClinicalType, DataElement, Direction, LogicalClause, PopulationDefinition, PopulationType,
    UniversalMeasureSpec, ValueSetReference, format_number, to_expression, validate,
};

use crate::output::Diagnostics;
use crate::{
    Anchor, CodeGenerator, CqlGeneratorOptions, FamilyCriterion, FamilyProfile, GenerationResult,
    GenerationTarget, KeywordLookbackTable, LookbackStrategy, NormalizedTiming, OverrideSet,
    ResourceFamily, TimingShape, check_required, classify, detect_family, normalize_timing,
};

const MEASUREMENT_PERIOD: &str = "\"Measurement Period\"";
const AGE_AT_PERIOD_END: &str = "AgeInYearsAt(date from end of \"Measurement Period\")";

const CODE_SYSTEMS: &[(&str, &str)] = &[
    ("LOINC", "http://loinc.org"),
    ("SNOMEDCT", "http://snomed.info/sct"),
    ("ICD10CM", "http://hl7.org/fhir/sid/icd-10-cm"),
    ("CPT", "http://www.ama-assn.org/go/cpt"),
    ("RXNORM", "http://www.nlm.nih.gov/research/umls/rxnorm"),
];

/// CQL code generator
#[derive(Clone)]
pub struct CqlGenerator {
    options: CqlGeneratorOptions,
    lookback: Arc<dyn LookbackStrategy>,
}

impl Default for CqlGenerator {
    fn default() -> Self {
        Self::new(CqlGeneratorOptions::default())
    }
}

impl std::fmt::Debug for CqlGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CqlGenerator").field("options", &self.options).finish_non_exhaustive()
    }
}

impl CqlGenerator {
    pub fn new(options: CqlGeneratorOptions) -> Self {
        Self {
            options,
            lookback: Arc::new(KeywordLookbackTable::standard()),
        }
    }

    /// Replace the keyword lookback table
    pub fn with_lookback_strategy(mut self, strategy: Arc<dyn LookbackStrategy>) -> Self {
        self.lookback = strategy;
        self
    }

    pub fn options(&self) -> &CqlGeneratorOptions {
        &self.options
    }

    /// Lower a single criteria tree into a named definition
    ///
    /// Value sets are referenced by name; no library header is emitted.
    pub fn generate_component(
        &self,
        component_id: &str,
        clause: &LogicalClause,
        overrides: &OverrideSet,
    ) -> GenerationResult {
        let mut diagnostics = Diagnostics::default();
        if let Some(locked) = overrides.locked(component_id, GenerationTarget::Cql) {
            diagnostics.push(override_applied(component_id));
            let code = format!("{}{}", locked.note_comments(), locked.code);
            return GenerationResult::from_parts(GenerationTarget::Cql, code, diagnostics);
        }

        for issue in validate(Some(clause)).errors {
            diagnostics.push(issue.to_diagnostic(true));
        }
        let mut lowering = Lowering::new(self.lookback.as_ref(), diagnostics);
        for vs in clause.value_sets() {
            lowering.declare(&vs);
        }
        let expression = lowering.expression(clause);
        let code = format!("define \"{}\":\n  {expression}\n", quote_identifier(component_id));
        GenerationResult::from_parts(GenerationTarget::Cql, code, lowering.diagnostics)
    }

    fn library_header(&self, spec: &UniversalMeasureSpec, out: &mut String) {
        let metadata = &spec.metadata;
        if !metadata.title.trim().is_empty() {
            out.push_str(&format!("// {}\n", metadata.title.trim()));
        }
        let version = if metadata.version.trim().is_empty() {
            self.options.library_version.as_str()
        } else {
            metadata.version.trim()
        };
        out.push_str(&format!(
            "library {} version '{}'\n\n",
            library_name(&metadata.measure_id),
            version
        ));
        out.push_str(&format!("using FHIR version '{}'\n\n", self.options.fhir_version));
        out.push_str(&format!(
            "include FHIRHelpers version '{}' called FHIRHelpers\n",
            self.options.fhir_version
        ));
        out.push_str("include QICoreCommon version '2.0.000' called QICoreCommon\n");
        if self.options.include_helpers {
            out.push_str("include Hospice version '6.9.000' called Hospice\n");
        }
        out.push('\n');
        for (name, url) in CODE_SYSTEMS {
            out.push_str(&format!("codesystem \"{name}\": '{url}'\n"));
        }
        out.push('\n');
    }
}

impl CodeGenerator for CqlGenerator {
    fn target(&self) -> GenerationTarget {
        GenerationTarget::Cql
    }

    fn generate(&self, spec: &UniversalMeasureSpec, overrides: &OverrideSet) -> Result<GenerationResult, MeasureError> {
        check_required(spec)?;
        let measure_id = spec.metadata.measure_id.as_str();
        log::debug!("generating CQL for {measure_id}");

        let mut diagnostics = Diagnostics::default();
        if let Some(locked) = overrides.locked(measure_id, GenerationTarget::Cql) {
            diagnostics.push(override_applied(measure_id));
            let code = format!("{}{}", locked.note_comments(), locked.code);
            return Ok(GenerationResult::from_parts(GenerationTarget::Cql, code, diagnostics));
        }

        let threshold = self
            .options
            .emit_complexity_warnings
            .then_some(self.options.high_complexity_threshold);
        diagnostics.check_populations(spec, threshold);

        let family = if self.options.family_logic {
            detect_family(&spec.metadata)
        } else {
            None
        };
        if let Some(profile) = family {
            log::debug!("{measure_id} matches curated family {:?}", profile.family);
        }

        let mut lowering = Lowering::new(self.lookback.as_ref(), diagnostics);
        let mut out = String::new();
        self.library_header(spec, &mut out);

        // Value sets
        let mut declared_keys = HashSet::new();
        for vs in spec.all_value_sets() {
            declared_keys.insert(vs.dedup_key());
            lowering.declare_with_warnings(&vs, &mut out);
        }
        if let Some(profile) = family {
            for vs in profile.value_sets() {
                if declared_keys.insert(vs.dedup_key()) {
                    lowering.declare_with_warnings(&vs, &mut out);
                }
            }
        }
        if !declared_keys.is_empty() {
            out.push('\n');
        }

        let period = &spec.metadata.measurement_period;
        out.push_str(&format!(
            "parameter {MEASUREMENT_PERIOD} Interval<DateTime>\n  default Interval[@{}T00:00:00.0, @{}T23:59:59.999]\n\n",
            period.start.format("%Y-%m-%d"),
            period.end.format("%Y-%m-%d")
        ));
        out.push_str("context Patient\n\n");

        let helpers = HelperSet::plan(spec, family, self.options.include_helpers);
        helpers.write(&mut lowering, &mut out);
        if let Some(profile) = family {
            for criterion in profile.criteria() {
                let body = lowering.family_criterion(criterion);
                push_define(&mut out, criterion.define_name, &body);
            }
        }

        let mut used_names: HashSet<String> = HashSet::new();
        for population in &spec.populations {
            let name = unique_define_name(population.population_type.cql_name(), &mut used_names);
            if let Some(locked) = overrides.locked(&population.id, GenerationTarget::Cql) {
                lowering.diagnostics.push(override_applied(&population.id));
                out.push_str(&locked.note_comments());
                let code = locked.code.trim_end();
                if code.trim_start().starts_with("define ") {
                    out.push_str(code);
                    out.push_str("\n\n");
                } else {
                    push_define(&mut out, &name, &indent_continuation(code));
                }
                continue;
            }
            let body = lowering.population_body(population, family, &helpers);
            push_define(&mut out, &name, &body);
        }

        let code = format!("{}\n", out.trim_end());
        let result = GenerationResult::from_parts(GenerationTarget::Cql, code, lowering.diagnostics);
        log::info!(
            "generated CQL for {measure_id}: {} warnings, {} errors",
            result.warnings.len(),
            result.errors.len()
        );
        Ok(result)
    }
}

/// Helper definitions emitted ahead of the population defines
#[derive(Debug, Default)]
struct HelperSet {
    enabled: bool,
    age: Option<(Option<f64>, Option<f64>)>,
    gender: Option<&'static str>,
    encounter_value_sets: Vec<ValueSetReference>,
}

impl HelperSet {
    fn plan(spec: &UniversalMeasureSpec, family: Option<&FamilyProfile>, enabled: bool) -> Self {
        let ip_elements: Vec<&DataElement> = spec
            .population(PopulationType::InitialPopulation)
            .and_then(PopulationDefinition::effective_criteria)
            .map(LogicalClause::elements)
            .unwrap_or_default();

        let age = ip_elements
            .iter()
            .filter(|e| e.clinical_type == ClinicalType::Demographic)
            .filter_map(|e| e.thresholds)
            .find(|t| t.has_age())
            .map(|t| (t.age_min, t.age_max))
            .or_else(|| family.map(|f| (Some(f64::from(f.age_min)), Some(f64::from(f.age_max)))));

        let gender = ip_elements
            .iter()
            .filter(|e| e.clinical_type == ClinicalType::Demographic)
            .find_map(|e| gender_of(&e.description))
            .or_else(|| family.and_then(|f| f.gender));

        let encounter_value_sets = ip_elements
            .iter()
            .filter(|e| classify(e).family == ResourceFamily::Encounter)
            .filter_map(|e| e.value_set.clone())
            .collect();

        Self {
            enabled,
            age,
            gender,
            encounter_value_sets,
        }
    }

    fn gender_define(&self) -> Option<String> {
        self.gender.map(|g| {
            let mut name = String::from("Is ");
            let mut chars = g.chars();
            if let Some(first) = chars.next() {
                name.extend(first.to_uppercase());
                name.push_str(chars.as_str());
            }
            name
        })
    }

    fn write(&self, lowering: &mut Lowering<'_>, out: &mut String) {
        if !self.enabled {
            return;
        }
        if let Some(expression) = self.age.and_then(|(min, max)| age_expression(min, max)) {
            push_define(out, "Age In Range", &expression);
        }
        if let (Some(name), Some(gender)) = (self.gender_define(), self.gender) {
            push_define(out, &name, &format!("Patient.gender = '{gender}'"));
        }

        let mut seen = HashSet::new();
        let retrieves: Vec<String> = self
            .encounter_value_sets
            .iter()
            .filter(|vs| seen.insert(vs.dedup_key()))
            .map(|vs| format!("[Encounter: \"{}\"]", quote_identifier(&lowering.value_set_name(vs))))
            .collect();
        let source = match retrieves.len() {
            0 => "[Encounter]".to_string(),
            1 => retrieves[0].clone(),
            _ => format!("({})", retrieves.join("\n    union ")),
        };
        push_define(
            out,
            "Qualifying Encounters",
            &format!("{source} E\n    where E.status = 'finished'\n      and E.period during {MEASUREMENT_PERIOD}"),
        );
        push_define(out, "Has Hospice Services", "Hospice.\"Has Hospice Services\"");
    }

    /// Initial population built from helpers or inline demographics
    fn initial_population(&self) -> Option<String> {
        let mut parts = Vec::new();
        if self.enabled {
            if self.age.is_some_and(|(min, max)| min.is_some() || max.is_some()) {
                parts.push("\"Age In Range\"".to_string());
            }
            if let Some(name) = self.gender_define() {
                parts.push(format!("\"{name}\""));
            }
            parts.push("exists \"Qualifying Encounters\"".to_string());
        } else {
            if let Some(expression) = self.age.and_then(|(min, max)| age_expression(min, max)) {
                parts.push(expression);
            }
            if let Some(gender) = self.gender {
                parts.push(format!("Patient.gender = '{gender}'"));
            }
        }
        (!parts.is_empty()).then(|| parts.join("\n    and "))
    }
}

/// Per-generation state: declared value-set names and accumulated diagnostics
struct Lowering<'a> {
    lookback: &'a dyn LookbackStrategy,
    value_set_names: HashMap<String, String>,
    used_value_set_names: HashSet<String>,
    diagnostics: Diagnostics,
}

impl<'a> Lowering<'a> {
    fn new(lookback: &'a dyn LookbackStrategy, diagnostics: Diagnostics) -> Self {
        Self {
            lookback,
            value_set_names: HashMap::new(),
            used_value_set_names: HashSet::new(),
            diagnostics,
        }
    }

    /// Register a value set under a unique declared name
    fn declare(&mut self, vs: &ValueSetReference) -> String {
        if let Some(name) = self.value_set_names.get(&vs.dedup_key()) {
            return name.clone();
        }
        let base = match vs.name.trim() {
            "" if !vs.id.trim().is_empty() => vs.id.trim().to_string(),
            "" => format!("Value Set {}", self.value_set_names.len() + 1),
            name => name.to_string(),
        };
        let mut name = base.clone();
        let mut suffix = 2;
        while !self.used_value_set_names.insert(name.to_lowercase()) {
            name = format!("{base} ({suffix})");
            suffix += 1;
        }
        self.value_set_names.insert(vs.dedup_key(), name.clone());
        name
    }

    /// Declare and write a `valueset` line, warning on placeholders
    fn declare_with_warnings(&mut self, vs: &ValueSetReference, out: &mut String) {
        let name = self.declare(vs);
        let url = match vs.canonical_url() {
            Some(url) => {
                if vs.codes.is_empty() && vs.confidence != octofhir_measure_ir::Confidence::High {
                    self.diagnostics.warn(
                        Diagnostic::warning(
                            UMS0101,
                            format!("value set \"{name}\" has no expanded codes; codes resolve from {url}"),
                        )
                        .for_node(vs.id.clone()),
                    );
                }
                url
            }
            None => {
                self.diagnostics.warn(
                    Diagnostic::warning(
                        UMS0101,
                        format!("value set \"{name}\" has no OID or URL; codes are undefined"),
                    )
                    .for_node(vs.id.clone())
                    .with_help("Add the VSAC OID for this value set before evaluation"),
                );
                format!("urn:placeholder:{}", slug(&name))
            }
        };
        out.push_str(&format!("valueset \"{}\": '{url}'\n", quote_identifier(&name)));
    }

    fn value_set_name(&mut self, vs: &ValueSetReference) -> String {
        self.declare(vs)
    }

    fn expression(&mut self, clause: &LogicalClause) -> String {
        to_expression(clause, |element| self.element(element))
    }

    fn element(&mut self, element: &DataElement) -> String {
        let class = classify(element);
        if class.family == ResourceFamily::Patient {
            let expression = demographic_expression(element).unwrap_or_else(|| "true".to_string());
            return if element.negation {
                format!("not ({expression})")
            } else {
                expression
            };
        }

        let Some(vs) = element.value_set.as_ref().filter(|vs| !vs.name.trim().is_empty() || vs.oid().is_some())
        else {
            self.diagnostics.warn(
                Diagnostic::warning(
                    UMS0100,
                    format!("\"{}\" has no value set; lowered as true", element.description.trim()),
                )
                .for_node(element.id.clone()),
            );
            return format!(
                "/* WARNING: no value set for \"{}\" */ true",
                element.description.trim().replace("*/", "* /")
            );
        };
        let name = self.value_set_name(vs);

        let resolution = normalize_timing(element, self.lookback);
        if let Some(note) = resolution.note {
            self.diagnostics
                .warn(Diagnostic::warning(UMS0102, note).for_node(element.id.clone()));
        }

        let alias = class.family.cql_alias();
        let mut filters: Vec<String> = class.family.cql_status_filter(alias).into_iter().collect();
        filters.extend(self.timing_predicate(class.family, &resolution.timing, &element.id));
        if class.family == ResourceFamily::Observation {
            if let Some(thresholds) = element.thresholds {
                if let Some(min) = thresholds.value_min {
                    filters.push(format!("({alias}.value as Quantity).value >= {}", format_number(min)));
                }
                if let Some(max) = thresholds.value_max {
                    filters.push(format!("({alias}.value as Quantity).value <= {}", format_number(max)));
                }
            }
        }

        let query = retrieve_query(class.family, &name, &filters, " and ");
        if element.negation {
            format!("not exists ({query})")
        } else {
            format!("exists ({query})")
        }
    }

    fn family_criterion(&mut self, criterion: &FamilyCriterion) -> String {
        let family = ResourceFamily::from_clinical_type(criterion.clinical_type);
        let name = self.value_set_name(&criterion.value_set.to_reference());
        let timing = match criterion.lookback {
            Some(lookback) => NormalizedTiming::Lookback(lookback),
            None => NormalizedTiming::OnOrBeforePeriodEnd,
        };
        let alias = family.cql_alias();
        let mut filters: Vec<String> = family.cql_status_filter(alias).into_iter().collect();
        filters.extend(self.timing_predicate(family, &timing, criterion.define_name));
        format!("exists ({})", retrieve_query(family, &name, &filters, "\n      and "))
    }

    fn timing_predicate(&mut self, family: ResourceFamily, timing: &NormalizedTiming, node_id: &str) -> Option<String> {
        if family == ResourceFamily::Patient {
            return None;
        }
        let alias = family.cql_alias();
        let (path, shape) = family.timing_path();
        let operand = match shape {
            TimingShape::Choice => format!("{alias}.{path}.toInterval()"),
            TimingShape::Point | TimingShape::Interval => format!("{alias}.{path}"),
        };
        let is_point = shape == TimingShape::Point;

        let predicate = match timing {
            NormalizedTiming::MeasurementPeriod if family == ResourceFamily::Condition => {
                format!("{operand} overlaps {MEASUREMENT_PERIOD}")
            }
            NormalizedTiming::MeasurementPeriod => format!("{operand} during {MEASUREMENT_PERIOD}"),
            NormalizedTiming::OnOrBeforePeriodEnd if is_point => {
                format!("{operand} on or before end of {MEASUREMENT_PERIOD}")
            }
            NormalizedTiming::OnOrBeforePeriodEnd => {
                format!("{operand} starts on or before end of {MEASUREMENT_PERIOD}")
            }
            NormalizedTiming::Lookback(lookback) => {
                let ends = if is_point { "" } else { "ends " };
                format!(
                    "{operand} {ends}{} or less on or before end of {MEASUREMENT_PERIOD}",
                    lookback.cql_quantity()
                )
            }
            NormalizedTiming::Window { window, anchor } => {
                let boundary = match anchor {
                    Anchor::PeriodStart => "start",
                    Anchor::IndexEvent => {
                        self.diagnostics.warn(
                            Diagnostic::warning(
                                UMS0102,
                                "index-event anchors are not lowered to CQL; window measured from end of measurement period",
                            )
                            .for_node(node_id.to_string()),
                        );
                        "end"
                    }
                    Anchor::PeriodEnd | Anchor::Other(_) => "end",
                };
                let quantity = format!("{} {}", format_number(window.value), window.unit.as_str());
                let (keyword, relation) = match window.direction {
                    Direction::Before => ("ends ", "before"),
                    Direction::After => ("starts ", "after"),
                };
                let keyword = if is_point { "" } else { keyword };
                format!("{operand} {keyword}{quantity} or less {relation} {boundary} of {MEASUREMENT_PERIOD}")
            }
        };
        Some(predicate)
    }

    fn population_body(
        &mut self,
        population: &PopulationDefinition,
        family: Option<&FamilyProfile>,
        helpers: &HelperSet,
    ) -> String {
        let ty = population.population_type;
        let curated = family.and_then(|profile| match ty {
            PopulationType::Numerator => Some(or_chain(profile.numerator.iter().map(|c| c.define_name), None)),
            PopulationType::DenominatorExclusion => Some(or_chain(
                profile.exclusions.iter().map(|c| c.define_name),
                helpers.enabled.then_some("Has Hospice Services"),
            )),
            _ => None,
        });
        if let Some(body) = curated {
            if population.effective_criteria().is_some() {
                self.diagnostics.warn(
                    Diagnostic::warning(
                        UMS0108,
                        format!("{ty} criteria replaced by curated measure-family logic"),
                    )
                    .for_node(population.id.clone()),
                );
            }
            return body;
        }

        if let Some(criteria) = population.effective_criteria() {
            return self.expression(criteria);
        }

        match ty {
            PopulationType::Denominator => "\"Initial Population\"".to_string(),
            PopulationType::InitialPopulation => match family.and(helpers.initial_population()) {
                Some(body) => body,
                None => {
                    self.diagnostics.warn(
                        Diagnostic::warning(UMS0106, "Initial Population has no criteria; lowered as true")
                            .for_node(population.id.clone()),
                    );
                    "true".to_string()
                }
            },
            PopulationType::Numerator => {
                self.diagnostics.warn(
                    Diagnostic::warning(UMS0106, "Numerator has no criteria; lowered as false")
                        .for_node(population.id.clone()),
                );
                "false".to_string()
            }
            PopulationType::DenominatorExclusion
            | PopulationType::DenominatorException
            | PopulationType::NumeratorExclusion => "false".to_string(),
        }
    }
}

fn override_applied(component_id: &str) -> Diagnostic {
    Diagnostic::info(UMS0105, format!("locked override applied for '{component_id}'")).for_node(component_id.to_string())
}

fn retrieve_query(family: ResourceFamily, value_set: &str, filters: &[String], separator: &str) -> String {
    let alias = family.cql_alias();
    let retrieve = format!("[{}: \"{}\"] {alias}", family.cql_resource(), quote_identifier(value_set));
    if filters.is_empty() {
        return retrieve;
    }
    let lead = if separator.contains('\n') { "\n    where " } else { " where " };
    format!("{retrieve}{lead}{}", filters.join(separator))
}

fn or_chain<'s>(names: impl Iterator<Item = &'s str>, extra: Option<&'s str>) -> String {
    names
        .chain(extra)
        .map(|name| format!("\"{}\"", quote_identifier(name)))
        .collect::<Vec<_>>()
        .join("\n    or ")
}

fn age_expression(min: Option<f64>, max: Option<f64>) -> Option<String> {
    match (min, max) {
        (Some(min), Some(max)) => Some(format!(
            "{AGE_AT_PERIOD_END} in Interval[{}, {}]",
            format_number(min),
            format_number(max)
        )),
        (Some(min), None) => Some(format!("{AGE_AT_PERIOD_END} >= {}", format_number(min))),
        (None, Some(max)) => Some(format!("{AGE_AT_PERIOD_END} <= {}", format_number(max))),
        (None, None) => None,
    }
}

/// Administrative gender named in a demographic description
pub(crate) fn gender_of(description: &str) -> Option<&'static str> {
    let lower = description.to_lowercase();
    let words: Vec<&str> = lower.split(|c: char| !c.is_ascii_alphabetic()).collect();
    if words.iter().any(|w| matches!(*w, "female" | "females" | "woman" | "women")) {
        Some("female")
    } else if words.iter().any(|w| matches!(*w, "male" | "males" | "man" | "men")) {
        Some("male")
    } else {
        None
    }
}

fn demographic_expression(element: &DataElement) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(thresholds) = element.thresholds {
        parts.extend(age_expression(thresholds.age_min, thresholds.age_max));
    }
    if let Some(gender) = gender_of(&element.description) {
        parts.push(format!("Patient.gender = '{gender}'"));
    }
    (!parts.is_empty()).then(|| parts.join(" and "))
}

fn push_define(out: &mut String, name: &str, body: &str) {
    out.push_str(&format!("define \"{}\":\n  {body}\n\n", quote_identifier(name)));
}

fn indent_continuation(code: &str) -> String {
    code.lines().collect::<Vec<_>>().join("\n  ")
}

fn unique_define_name(base: &str, used: &mut HashSet<String>) -> String {
    let mut name = base.to_string();
    let mut suffix = 2;
    while !used.insert(name.clone()) {
        name = format!("{base} {suffix}");
        suffix += 1;
    }
    name
}

/// Library identifier derived from the measure id
pub fn library_name(measure_id: &str) -> String {
    let mut name: String = measure_id
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "Measure_");
    }
    name
}

/// Escape a name for use inside a quoted CQL identifier
pub fn quote_identifier(name: &str) -> String {
    name.replace('\\', "\\\\").replace('"', "\\\"")
}

fn slug(name: &str) -> String {
    let mut out = String::new();
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}
