//! SQL backend (CTE style)
//!
//! Every leaf becomes a predicate CTE over the bound warehouse tables, every
//! population a CTE combining them with set algebra: AND is INTERSECT, OR is
//! UNION and NOT is EXCEPT against the `all_patients` anchor. The final SELECT
//! flags each patient's membership per population.

use std::collections::HashSet;
use std::sync::Arc;

use octofhir_measure_diagnostics::{
    Diagnostic, MeasureError, UMS0100, UMS0101, UMS0102, UMS0105, UMS0106, UMS0107, UMS0108,
};
use octofhir_measure_ir::{
    DataElement, Direction, ExpressionDialect, LogicalClause, LogicalOperator, PopulationDefinition,
    PopulationType, TimeUnit, UniversalMeasureSpec, ValueSetReference, format_number, render_with, validate,
};

use crate::adherence::{MedicationSource, cumulative_supply_body, index_event_body};
use crate::cql::gender_of;
use crate::output::Diagnostics;
use crate::{
    Anchor, CodeGenerator, ColumnRole, FamilyCriterion, FamilyProfile, GenerationResult, GenerationTarget,
    KeywordLookbackTable, LookbackStrategy, NormalizedTiming, OverrideSet, ResourceFamily, SchemaBinding,
    SqlGeneratorOptions, TableBinding, check_required, classify, detect_family, is_adherence_criterion,
    normalize_timing, resolve_adherence,
};

const ALL_PATIENTS: &str = "SELECT patient_id FROM all_patients";
const NO_PATIENTS: &str = "SELECT patient_id FROM all_patients WHERE 1 = 0";

/// Set-algebra rendering of criteria trees
#[derive(Debug, Clone, Copy, Default)]
pub struct SetAlgebraDialect;

impl ExpressionDialect for SetAlgebraDialect {
    fn connective(&self, op: LogicalOperator) -> &str {
        match op {
            LogicalOperator::Or => "UNION",
            _ => "INTERSECT",
        }
    }

    fn negate(&self, inner: &str) -> String {
        format!("{ALL_PATIENTS}\nEXCEPT\n({inner})")
    }

    fn empty(&self) -> String {
        ALL_PATIENTS.to_string()
    }

    // `join` already parenthesizes both operands
    fn group(&self, inner: &str) -> String {
        inner.to_string()
    }

    fn join(&self, left: &str, connective: &str, right: &str) -> String {
        format!("({left})\n{connective}\n({right})")
    }
}

/// SQL code generator
#[derive(Clone)]
pub struct SqlGenerator {
    options: SqlGeneratorOptions,
    lookback: Arc<dyn LookbackStrategy>,
}

impl Default for SqlGenerator {
    fn default() -> Self {
        Self::new(SqlGeneratorOptions::default())
    }
}

impl std::fmt::Debug for SqlGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlGenerator").field("options", &self.options).finish_non_exhaustive()
    }
}

impl SqlGenerator {
    pub fn new(options: SqlGeneratorOptions) -> Self {
        Self {
            options,
            lookback: Arc::new(KeywordLookbackTable::standard()),
        }
    }

    pub fn with_lookback_strategy(mut self, strategy: Arc<dyn LookbackStrategy>) -> Self {
        self.lookback = strategy;
        self
    }

    pub fn options(&self) -> &SqlGeneratorOptions {
        &self.options
    }

    /// Lower a single criteria tree into a standalone WITH query returning patient ids
    pub fn generate_component(
        &self,
        component_id: &str,
        clause: &LogicalClause,
        overrides: &OverrideSet,
    ) -> GenerationResult {
        let mut diagnostics = Diagnostics::default();
        if let Some(locked) = overrides.locked(component_id, GenerationTarget::Sql) {
            diagnostics.push(override_applied(component_id));
            let code = format!("{}{}", locked.note_comments(), locked.code);
            return GenerationResult::from_parts(GenerationTarget::Sql, code, diagnostics);
        }
        for issue in validate(Some(clause)).errors {
            diagnostics.push(issue.to_diagnostic(true));
        }

        let mut lowering = SqlLowering::new(&self.options, self.lookback.as_ref(), diagnostics);
        lowering.anchor_ctes(&Default::default());
        let expression = lowering.expression(clause);
        let name = lowering.add_cte(&format!("component_{}", sql_identifier(component_id)), expression);
        let mut code = String::new();
        lowering.write_with(&mut code);
        code.push_str(&format!("SELECT patient_id FROM {name};\n"));
        GenerationResult::from_parts(GenerationTarget::Sql, code, lowering.diagnostics)
    }
}

impl CodeGenerator for SqlGenerator {
    fn target(&self) -> GenerationTarget {
        GenerationTarget::Sql
    }

    fn generate(&self, spec: &UniversalMeasureSpec, overrides: &OverrideSet) -> Result<GenerationResult, MeasureError> {
        check_required(spec)?;
        let measure_id = spec.metadata.measure_id.as_str();
        log::debug!("generating SQL for {measure_id} against schema {}", self.options.schema.name);

        let mut diagnostics = Diagnostics::default();
        if let Some(locked) = overrides.locked(measure_id, GenerationTarget::Sql) {
            diagnostics.push(override_applied(measure_id));
            let code = format!("{}{}", locked.note_comments(), locked.code);
            return Ok(GenerationResult::from_parts(GenerationTarget::Sql, code, diagnostics));
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

        let mut lowering = SqlLowering::new(&self.options, self.lookback.as_ref(), diagnostics);
        lowering.anchor_ctes(&spec.metadata.measurement_period);

        // Initial Population first, so an implicit Denominator can select from its CTE
        let mut order: Vec<usize> = (0..spec.populations.len()).collect();
        order.sort_by_key(|&i| spec.populations[i].population_type != PopulationType::InitialPopulation);

        let mut population_ctes: Vec<Option<String>> = vec![None; spec.populations.len()];
        let mut initial_population: Option<String> = None;
        for index in order {
            let population = &spec.populations[index];
            let body = match overrides.locked(&population.id, GenerationTarget::Sql) {
                Some(locked) => {
                    lowering.diagnostics.push(override_applied(&population.id));
                    format!("{}{}", locked.note_comments(), locked.code.trim_end().trim_end_matches(';'))
                }
                None => lowering.population_body(population, family, initial_population.as_deref()),
            };
            let cte = lowering.add_cte(&format!("pop_{}", population.population_type.as_str()), body);
            if population.population_type == PopulationType::InitialPopulation && initial_population.is_none() {
                initial_population = Some(cte.clone());
            }
            population_ctes[index] = Some(cte);
        }

        let mut used_aliases = HashSet::new();
        let flags: Vec<(String, String)> = spec
            .populations
            .iter()
            .zip(population_ctes)
            .filter_map(|(population, cte)| {
                let cte = cte?;
                Some((unique_name(population.population_type.abbreviation(), &mut used_aliases, "_"), cte))
            })
            .collect();

        let mut code = String::new();
        code.push_str(&format!("-- Measure: {} {}\n", measure_id, spec.metadata.title.trim()));
        code.push_str(&format!("-- Schema: {}\n", self.options.schema.name));
        let period = &spec.metadata.measurement_period;
        code.push_str(&format!("-- Measurement period: {} to {}\n", period.start, period.end));
        lowering.write_with(&mut code);

        code.push_str("SELECT ap.patient_id");
        for (alias, _) in &flags {
            code.push_str(&format!(
                ",\n       CASE WHEN {alias}.patient_id IS NOT NULL THEN 1 ELSE 0 END AS {alias}"
            ));
        }
        code.push_str("\nFROM all_patients ap");
        for (alias, cte) in &flags {
            code.push_str(&format!("\nLEFT JOIN {cte} {alias} ON {alias}.patient_id = ap.patient_id"));
        }
        code.push_str(";\n");

        let result = GenerationResult::from_parts(GenerationTarget::Sql, code, lowering.diagnostics);
        log::info!(
            "generated SQL for {measure_id}: {} CTEs, {} warnings, {} errors",
            lowering.ctes.len(),
            result.warnings.len(),
            result.errors.len()
        );
        Ok(result)
    }
}

/// Predicate-level retrieve parameters shared by authored leaves and curated criteria
struct Retrieve<'r> {
    node_id: &'r str,
    family: ResourceFamily,
    value_set: &'r ValueSetReference,
    timing: NormalizedTiming,
    value_min: Option<f64>,
    value_max: Option<f64>,
}

struct SqlLowering<'a> {
    schema: &'a SchemaBinding,
    options: &'a SqlGeneratorOptions,
    lookback: &'a dyn LookbackStrategy,
    diagnostics: Diagnostics,
    ctes: Vec<(String, String)>,
    cte_names: HashSet<String>,
}

impl<'a> SqlLowering<'a> {
    fn new(options: &'a SqlGeneratorOptions, lookback: &'a dyn LookbackStrategy, diagnostics: Diagnostics) -> Self {
        Self {
            schema: &options.schema,
            options,
            lookback,
            diagnostics,
            ctes: Vec::new(),
            cte_names: HashSet::new(),
        }
    }

    fn add_cte(&mut self, base: &str, body: String) -> String {
        let name = unique_name(base, &mut self.cte_names, "_");
        self.ctes.push((name.clone(), body));
        name
    }

    fn write_with(&self, out: &mut String) {
        let rendered: Vec<String> = self
            .ctes
            .iter()
            .map(|(name, body)| format!("{name} AS (\n  {}\n)", body.replace('\n', "\n  ")))
            .collect();
        out.push_str("WITH ");
        out.push_str(&rendered.join(",\n"));
        out.push('\n');
    }

    fn incomplete_binding(&mut self, node_id: &str, reason: String) -> String {
        self.diagnostics.warn(
            Diagnostic::warning(UMS0107, format!("{reason}; criterion treated as satisfied"))
                .for_node(node_id.to_string())
                .with_help("Bind the missing table or column in the schema configuration"),
        );
        format!("-- {reason}\n{ALL_PATIENTS}")
    }

    fn anchor_ctes(&mut self, period: &octofhir_measure_ir::MeasurementPeriod) {
        self.add_cte(
            "measurement_period",
            format!(
                "SELECT DATE '{}' AS start_date, DATE '{}' AS end_date",
                period.start, period.end
            ),
        );
        let body = match self.schema.column(ResourceFamily::Patient, ColumnRole::PatientId) {
            Ok((table, column)) => format!("SELECT DISTINCT p.{column} AS patient_id\nFROM {table} p"),
            Err(reason) => {
                self.diagnostics.warn(
                    Diagnostic::warning(UMS0107, format!("{reason}; patient anchor is empty"))
                        .for_node("all_patients"),
                );
                "SELECT CAST(NULL AS VARCHAR(64)) AS patient_id WHERE 1 = 0".to_string()
            }
        };
        self.add_cte("all_patients", body);
    }

    fn expression(&mut self, clause: &LogicalClause) -> String {
        render_with(clause, &SetAlgebraDialect, &mut |element: &DataElement| self.element(element))
    }

    fn element(&mut self, element: &DataElement) -> String {
        let cte = self.element_cte(element);
        let select = format!("SELECT patient_id FROM {cte}");
        if element.negation {
            SetAlgebraDialect.negate(&select)
        } else {
            select
        }
    }

    fn element_cte(&mut self, element: &DataElement) -> String {
        let base = format!("leaf_{}", sql_identifier(&element.id));
        let class = classify(element);
        if class.family == ResourceFamily::Patient {
            let thresholds = element.thresholds.unwrap_or_default();
            let body = self.demographic_body(
                &element.id,
                thresholds.age_min,
                thresholds.age_max,
                gender_of(&element.description),
            );
            return self.add_cte(&base, body);
        }

        let Some(vs) = element
            .value_set
            .as_ref()
            .filter(|vs| !vs.name.trim().is_empty() || vs.oid().is_some())
        else {
            self.diagnostics.warn(
                Diagnostic::warning(
                    UMS0100,
                    format!("\"{}\" has no value set; treated as satisfied", element.description.trim()),
                )
                .for_node(element.id.clone()),
            );
            let body = format!(
                "-- WARNING: no value set for \"{}\"\n{ALL_PATIENTS}",
                element.description.trim().replace('\n', " ")
            );
            return self.add_cte(&base, body);
        };

        if class.family == ResourceFamily::Medication && is_adherence_criterion(element) {
            match self.adherence_ctes(element, vs, &base) {
                Ok(cumulative) => return self.add_cte(&base, format!("SELECT patient_id FROM {cumulative}")),
                Err(reason) => {
                    self.diagnostics.warn(
                        Diagnostic::warning(
                            UMS0107,
                            format!("{reason}; adherence lowered as a simple retrieve"),
                        )
                        .for_node(element.id.clone()),
                    );
                }
            }
        }

        let resolution = normalize_timing(element, self.lookback);
        if let Some(note) = resolution.note {
            self.diagnostics
                .warn(Diagnostic::warning(UMS0102, note).for_node(element.id.clone()));
        }
        let thresholds = element.thresholds.unwrap_or_default();
        let retrieve = Retrieve {
            node_id: &element.id,
            family: class.family,
            value_set: vs,
            timing: resolution.timing,
            value_min: thresholds.value_min,
            value_max: thresholds.value_max,
        };
        let body = self.retrieve_body(&retrieve);
        self.add_cte(&base, body)
    }

    fn family_cte(&mut self, criterion: &FamilyCriterion) -> String {
        let value_set = criterion.value_set.to_reference();
        let timing = match criterion.lookback {
            Some(lookback) => NormalizedTiming::Lookback(lookback),
            None => NormalizedTiming::OnOrBeforePeriodEnd,
        };
        let retrieve = Retrieve {
            node_id: criterion.define_name,
            family: ResourceFamily::from_clinical_type(criterion.clinical_type),
            value_set: &value_set,
            timing,
            value_min: None,
            value_max: None,
        };
        let body = self.retrieve_body(&retrieve);
        self.add_cte(&format!("fam_{}", sql_identifier(criterion.define_name)), body)
    }

    /// Value-set join and filter against the bound membership table
    fn code_match(&mut self, binding: &TableBinding, vs: &ValueSetReference, node_id: &str) -> Result<(String, String), String> {
        let members = &self.schema.value_sets;
        let code = binding
            .get(ColumnRole::Code)
            .ok_or_else(|| format!("table {} has no code column bound", binding.table))?;
        let mut join = format!("JOIN {} vs\n  ON vs.{} = t.{code}", members.table, members.code_column);
        if let Some(system) = binding.get(ColumnRole::CodeSystem) {
            join.push_str(&format!("\n AND vs.{} = t.{system}", members.code_system_column));
        }
        let filter = match vs.oid() {
            Some(oid) => format!("vs.{} = {}", members.oid_column, sql_string(oid)),
            None => {
                let filter = format!("vs.{} = {}", members.name_column, sql_string(vs.name.trim()));
                self.diagnostics.warn(
                    Diagnostic::warning(
                        UMS0101,
                        format!("value set \"{}\" has no OID; members matched by name", vs.name.trim()),
                    )
                    .for_node(node_id.to_string()),
                );
                filter
            }
        };
        Ok((join, filter))
    }

    fn retrieve_body(&mut self, retrieve: &Retrieve<'_>) -> String {
        match self.try_retrieve_body(retrieve) {
            Ok(body) => body,
            Err(reason) => self.incomplete_binding(retrieve.node_id, reason),
        }
    }

    fn try_retrieve_body(&mut self, retrieve: &Retrieve<'_>) -> Result<String, String> {
        let schema = self.schema;
        let binding = schema
            .table(retrieve.family)
            .ok_or_else(|| format!("no table bound for {} data", retrieve.family))?;
        let patient = required(binding, ColumnRole::PatientId)?;
        let (join, vs_filter) = self.code_match(binding, retrieve.value_set, retrieve.node_id)?;

        let mut filters = vec![vs_filter];
        filters.extend(status_condition(binding, retrieve.family));
        filters.extend(self.timing_condition(binding, retrieve)?);
        if let Some(value) = binding.get(ColumnRole::Value) {
            if let Some(min) = retrieve.value_min {
                filters.push(format!("t.{value} >= {}", format_number(min)));
            }
            if let Some(max) = retrieve.value_max {
                filters.push(format!("t.{value} <= {}", format_number(max)));
            }
        }

        Ok(format!(
            "SELECT DISTINCT t.{patient} AS patient_id\nFROM {} t\n{join}\nCROSS JOIN measurement_period mp\nWHERE {}",
            binding.table,
            filters.join("\n  AND ")
        ))
    }

    fn timing_condition(&mut self, binding: &TableBinding, retrieve: &Retrieve<'_>) -> Result<Option<String>, String> {
        if retrieve.family == ResourceFamily::Patient {
            return Ok(None);
        }
        let date = required(binding, ColumnRole::Date)?;
        let column = format!("t.{date}");
        let condition = match &retrieve.timing {
            NormalizedTiming::MeasurementPeriod if retrieve.family == ResourceFamily::Condition => {
                match binding.get(ColumnRole::EndDate) {
                    Some(end) => format!(
                        "{column} <= mp.end_date\n  AND (t.{end} IS NULL OR t.{end} >= mp.start_date)"
                    ),
                    None => format!("{column} <= mp.end_date"),
                }
            }
            NormalizedTiming::MeasurementPeriod => format!("{column} BETWEEN mp.start_date AND mp.end_date"),
            NormalizedTiming::OnOrBeforePeriodEnd => format!("{column} <= mp.end_date"),
            NormalizedTiming::Lookback(lookback) => format!(
                "{column} BETWEEN mp.end_date - {} AND mp.end_date",
                interval(f64::from(lookback.value), lookback.unit)
            ),
            NormalizedTiming::Window { window, anchor } => {
                let boundary = match anchor {
                    Anchor::PeriodStart => "mp.start_date",
                    Anchor::IndexEvent => {
                        self.diagnostics.warn(
                            Diagnostic::warning(
                                UMS0102,
                                "index-event anchors are only lowered for adherence criteria; window measured from end of measurement period",
                            )
                            .for_node(retrieve.node_id.to_string()),
                        );
                        "mp.end_date"
                    }
                    Anchor::PeriodEnd | Anchor::Other(_) => "mp.end_date",
                };
                let span = interval(window.value, window.unit);
                match window.direction {
                    Direction::Before => format!("{column} BETWEEN {boundary} - {span} AND {boundary}"),
                    Direction::After => format!("{column} BETWEEN {boundary} AND {boundary} + {span}"),
                }
            }
        };
        Ok(Some(condition))
    }

    fn demographic_body(
        &mut self,
        node_id: &str,
        age_min: Option<f64>,
        age_max: Option<f64>,
        gender: Option<&str>,
    ) -> String {
        if age_min.is_none() && age_max.is_none() && gender.is_none() {
            return ALL_PATIENTS.to_string();
        }
        match self.try_demographic_body(age_min, age_max, gender) {
            Ok(body) => body,
            Err(reason) => self.incomplete_binding(node_id, reason),
        }
    }

    fn try_demographic_body(&self, age_min: Option<f64>, age_max: Option<f64>, gender: Option<&str>) -> Result<String, String> {
        let binding = self
            .schema
            .table(ResourceFamily::Patient)
            .ok_or_else(|| "no table bound for patient data".to_string())?;
        let patient = required(binding, ColumnRole::PatientId)?;
        let mut filters = Vec::new();
        if age_min.is_some() || age_max.is_some() {
            let birth = required(binding, ColumnRole::BirthDate)?;
            if let Some(min) = age_min {
                filters.push(format!("p.{birth} <= mp.end_date - INTERVAL '{}' YEAR", format_number(min.floor())));
            }
            if let Some(max) = age_max {
                filters.push(format!(
                    "p.{birth} > mp.end_date - INTERVAL '{}' YEAR",
                    format_number(max.floor() + 1.0)
                ));
            }
        }
        if let Some(gender) = gender {
            let column = required(binding, ColumnRole::Gender)?;
            filters.push(format!("p.{column} = {}", sql_string(gender)));
        }
        Ok(format!(
            "SELECT DISTINCT p.{patient} AS patient_id\nFROM {} p\nCROSS JOIN measurement_period mp\nWHERE {}",
            binding.table,
            filters.join("\n  AND ")
        ))
    }

    /// Index-event and cumulative-supply CTEs; returns the cumulative CTE name
    fn adherence_ctes(&mut self, element: &DataElement, vs: &ValueSetReference, base: &str) -> Result<String, String> {
        let schema = self.schema;
        let binding = schema
            .table(ResourceFamily::Medication)
            .ok_or_else(|| "no table bound for medication data".to_string())?;
        let source = MedicationSource {
            table: binding.table.clone(),
            patient_column: required(binding, ColumnRole::PatientId)?.to_string(),
            date_column: required(binding, ColumnRole::Date)?.to_string(),
            days_supply_column: required(binding, ColumnRole::DaysSupply)?.to_string(),
            status_filter: status_condition(binding, ResourceFamily::Medication),
            value_set_join: String::new(),
            value_set_filter: String::new(),
        };
        let (join, filter) = self.code_match(binding, vs, &element.id)?;
        let source = MedicationSource {
            value_set_join: join,
            value_set_filter: filter,
            ..source
        };

        let config = resolve_adherence(element, self.options.adherence);
        let stem = base.trim_start_matches("leaf_");
        let index = self.add_cte(&format!("adh_{stem}_index"), index_event_body(&source, &config));
        let cumulative = self.add_cte(
            &format!("adh_{stem}_cumulative"),
            cumulative_supply_body(&source, &index, &config),
        );
        log::debug!(
            "adherence criterion {}: threshold {} days within {} days",
            element.id,
            config.days_supply_threshold,
            config.observation_window_days
        );
        Ok(cumulative)
    }

    fn union_of(&mut self, criteria: &[FamilyCriterion]) -> String {
        let parts: Vec<String> = criteria
            .iter()
            .map(|criterion| format!("SELECT patient_id FROM {}", self.family_cte(criterion)))
            .collect();
        if parts.is_empty() {
            NO_PATIENTS.to_string()
        } else {
            parts.join("\nUNION\n")
        }
    }

    fn population_body(
        &mut self,
        population: &PopulationDefinition,
        family: Option<&FamilyProfile>,
        initial_population: Option<&str>,
    ) -> String {
        let ty = population.population_type;
        if let Some(profile) = family {
            let curated = match ty {
                PopulationType::Numerator => Some(profile.numerator),
                PopulationType::DenominatorExclusion => Some(profile.exclusions),
                _ => None,
            };
            if let Some(criteria) = curated {
                if population.effective_criteria().is_some() {
                    self.diagnostics.warn(
                        Diagnostic::warning(
                            UMS0108,
                            format!("{ty} criteria replaced by curated measure-family logic"),
                        )
                        .for_node(population.id.clone()),
                    );
                }
                return self.union_of(criteria);
            }
        }

        if let Some(criteria) = population.effective_criteria() {
            return self.expression(criteria);
        }

        match ty {
            PopulationType::Denominator => match initial_population {
                Some(cte) => format!("SELECT patient_id FROM {cte}"),
                None => ALL_PATIENTS.to_string(),
            },
            PopulationType::InitialPopulation => match family {
                Some(profile) => {
                    let body = self.demographic_body(
                        &population.id,
                        Some(f64::from(profile.age_min)),
                        Some(f64::from(profile.age_max)),
                        profile.gender,
                    );
                    let cte = self.add_cte("fam_demographics", body);
                    format!("SELECT patient_id FROM {cte}")
                }
                None => {
                    self.diagnostics.warn(
                        Diagnostic::warning(UMS0106, "Initial Population has no criteria; all patients included")
                            .for_node(population.id.clone()),
                    );
                    ALL_PATIENTS.to_string()
                }
            },
            PopulationType::Numerator => {
                self.diagnostics.warn(
                    Diagnostic::warning(UMS0106, "Numerator has no criteria; no patients included")
                        .for_node(population.id.clone()),
                );
                NO_PATIENTS.to_string()
            }
            PopulationType::DenominatorExclusion
            | PopulationType::DenominatorException
            | PopulationType::NumeratorExclusion => NO_PATIENTS.to_string(),
        }
    }
}

fn override_applied(component_id: &str) -> Diagnostic {
    Diagnostic::info(UMS0105, format!("locked override applied for '{component_id}'")).for_node(component_id.to_string())
}

fn required(binding: &TableBinding, role: ColumnRole) -> Result<&str, String> {
    binding
        .get(role)
        .ok_or_else(|| format!("table {} has no {role} column bound", binding.table))
}

fn status_condition(binding: &TableBinding, family: ResourceFamily) -> Option<String> {
    let values: &[&str] = match family {
        ResourceFamily::Encounter => &["finished"],
        ResourceFamily::Procedure | ResourceFamily::Immunization => &["completed"],
        ResourceFamily::Observation => &["final", "amended", "corrected"],
        ResourceFamily::Medication => &["active", "completed"],
        ResourceFamily::Patient | ResourceFamily::Condition => &[],
    };
    let column = binding.get(ColumnRole::Status)?;
    match values {
        [] => None,
        [single] => Some(format!("t.{column} = {}", sql_string(single))),
        many => Some(format!(
            "t.{column} IN ({})",
            many.iter().map(|v| sql_string(v)).collect::<Vec<_>>().join(", ")
        )),
    }
}

/// ANSI interval literal; fractional quantities fall back to days
fn interval(value: f64, unit: TimeUnit) -> String {
    if value.fract() == 0.0 {
        let unit = match unit {
            TimeUnit::Days => "DAY",
            TimeUnit::Months => "MONTH",
            TimeUnit::Years => "YEAR",
        };
        format!("INTERVAL '{}' {unit}", format_number(value))
    } else {
        format!("INTERVAL '{}' DAY", (value * unit.approx_days()).round() as i64)
    }
}

fn unique_name(base: &str, used: &mut HashSet<String>, separator: &str) -> String {
    let mut name = base.to_string();
    let mut suffix = 2;
    while !used.insert(name.clone()) {
        name = format!("{base}{separator}{suffix}");
        suffix += 1;
    }
    name
}

/// Single-quoted SQL literal
pub fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Lower-case identifier fragment made of ASCII alphanumerics and underscores
pub fn sql_identifier(text: &str) -> String {
    let mut out = String::new();
    for c in text.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let out = out.trim_matches('_').to_string();
    if out.is_empty() { "node".to_string() } else { out }
}
