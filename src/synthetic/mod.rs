//! Synthetic patient generation from study expectations
//!
//! Produces in-memory patients whose extracted variables roughly follow the
//! study's `default_expectations` and per-variable `return_expectations`.
//! Derived variables (categories, flags) are not generated; they follow from
//! the generated source data.
//!
//! Conventions:
//! - `registered_as_of` only honours incidence set on the variable itself and
//!   otherwise registers everybody.
//! - `age_as_of` uses the variable's own `int` distribution if it declares
//!   one. Otherwise, when a category over that age alone carries category
//!   ratios, a band is drawn by weight and an age inside it. Failing both,
//!   ages follow `population_ages`.
//! - Other expectations on derived variables are ignored with a warning.
//! - Events are generated once per event name, using the expectations of the
//!   first variable that reads that event.

use chrono::{Duration, Months, NaiveDate};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::algorithm::categorizer::Categorizer;
use crate::error::{CohortError, Result};
use crate::models::{PatientData, PatientRecord, Value, ValueType, fields};
use crate::study::dates::DateAnchor;
use crate::study::definition::{StudyDefinition, VariableDefinition, VariableKind};
use crate::study::expectations::{
    CategoryExpectation, DateExpectation, Distribution, Expectations, NumericExpectation, Rate,
};
use crate::utils::logging::log_warning;

/// Age bands and weights approximating a general practice list
const POPULATION_AGE_BANDS: [(u32, u32, f64); 5] = [
    (0, 19, 0.23),
    (20, 39, 0.27),
    (40, 59, 0.27),
    (60, 79, 0.18),
    (80, 99, 0.05),
];

/// Oldest age drawn for an age band
const MAX_BANDED_AGE: u32 = 99;

/// Years of registration history given to registered patients
const REGISTRATION_HISTORY_YEARS: u32 = 10;

/// Ages sharing one category label, with the label's weight
#[derive(Debug, Clone)]
struct AgeBand {
    weight: f64,
    ages: Vec<u32>,
}

/// Seeded generator of synthetic patients
#[derive(Debug)]
pub struct SyntheticGenerator<'a> {
    definition: &'a StudyDefinition,
    index_date: NaiveDate,
    age_bands: FxHashMap<String, Vec<AgeBand>>,
    rng: StdRng,
}

impl<'a> SyntheticGenerator<'a> {
    /// Create a generator, validating every expectation in the definition
    ///
    /// Without a seed the generator draws from the operating system and is
    /// not reproducible.
    pub fn new(definition: &'a StudyDefinition, seed: Option<u64>) -> Result<Self> {
        let index_date = NaiveDate::parse_from_str(&definition.index_date, "%Y-%m-%d").map_err(|_| {
            CohortError::invalid_date(definition.index_date.as_str(), "index date must be YYYY-MM-DD")
        })?;
        validate(&definition.default_expectations, "default_expectations")?;
        for variable in declared(definition) {
            if let Some(expectations) = &variable.return_expectations {
                validate(expectations, &variable.name)?;
            }
        }

        let age_bands = age_bands(definition)?;

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            definition,
            index_date,
            age_bands,
            rng,
        })
    }

    /// Generate `count` patients with ids `1..=count`
    pub fn generate(&mut self, count: usize) -> Vec<PatientData> {
        debug!("Generating {count} synthetic patients");
        (1..=count).map(|id| self.patient(id.to_string())).collect()
    }

    fn patient(&mut self, id: String) -> PatientData {
        let mut patient = PatientData::new(id);
        let mut events_done = FxHashSet::default();
        let definition = self.definition;

        for variable in declared(definition) {
            let expectations = variable
                .return_expectations
                .clone()
                .unwrap_or_default()
                .merged_over(&definition.default_expectations);

            match &variable.kind {
                VariableKind::RegisteredAsOf { date } => {
                    let own = variable.return_expectations.clone().unwrap_or_default();
                    let anchor = self.anchor(date);
                    self.registration(&mut patient, anchor, own.effective_incidence());
                }
                VariableKind::AgeAsOf { date } => {
                    if patient.attributes.contains_key(fields::DATE_OF_BIRTH) {
                        continue;
                    }
                    let anchor = self.anchor(date);
                    let own_int = variable.return_expectations.as_ref().and_then(|own| own.int);
                    let age = self.age(&variable.name, own_int);
                    if let Some(birth) = self.birth_date(anchor, age) {
                        patient = patient.with_birth_date(birth);
                    }
                }
                VariableKind::Attribute { field, value_type } => {
                    if patient.attributes.contains_key(field) {
                        continue;
                    }
                    if let Some(value) = self.value(&expectations, *value_type) {
                        patient = patient.with_attribute(field, value);
                    }
                }
                VariableKind::ValueAsOf {
                    field,
                    date,
                    value_type,
                } => {
                    if !patient.timeline(field).is_empty() {
                        continue;
                    }
                    let anchor = self.anchor(date);
                    if let Some(value) = self.value(&expectations, *value_type) {
                        let back = self.rng.random_range(0..=365 * 5);
                        let effective = anchor - Duration::days(back);
                        patient = patient.with_value(field, effective, value);
                    }
                }
                VariableKind::EventInWindow { event, .. } => {
                    if !events_done.insert(event.clone()) {
                        continue;
                    }
                    if self.rng.random_bool(expectations.effective_incidence()) {
                        let date = self.event_date(&expectations);
                        patient = patient.with_event(event, date);
                    }
                }
                VariableKind::CategorisedAs(_) | VariableKind::Satisfying { .. } => {}
            }
        }
        patient
    }

    fn anchor(&self, expression: &str) -> NaiveDate {
        DateAnchor::parse(expression)
            .ok()
            .and_then(|anchor| anchor.resolve(self.index_date))
            .unwrap_or(self.index_date)
    }

    fn registration(&mut self, patient: &mut PatientData, anchor: NaiveDate, incidence: f64) {
        if !patient.registrations.is_empty() {
            return;
        }
        let start = anchor
            .checked_sub_months(Months::new(12 * REGISTRATION_HISTORY_YEARS))
            .unwrap_or(anchor);
        let end = if self.rng.random_bool(incidence) {
            None
        } else {
            anchor.pred_opt()
        };
        *patient = std::mem::take(patient).with_registration(start, end);
    }

    fn age(&mut self, variable: &str, distribution: Option<NumericExpectation>) -> u32 {
        match distribution {
            Some(expectation) if expectation.distribution != Distribution::PopulationAges => {
                let sample = self.numeric(expectation).round();
                // Negative or absurd samples are clamped into a plausible age
                sample.clamp(0.0, 120.0) as u32
            }
            _ => self
                .banded_age(variable)
                .unwrap_or_else(|| self.population_age()),
        }
    }

    fn banded_age(&mut self, variable: &str) -> Option<u32> {
        let bands = self.age_bands.get(variable)?;
        let band = bands.choose_weighted(&mut self.rng, |band| band.weight).ok()?;
        band.ages.choose(&mut self.rng).copied()
    }

    fn population_age(&mut self) -> u32 {
        POPULATION_AGE_BANDS
            .choose_weighted(&mut self.rng, |band| band.2)
            .ok()
            .copied()
            .map_or(0, |(low, high, _)| self.rng.random_range(low..=high))
    }

    fn birth_date(&mut self, anchor: NaiveDate, age: u32) -> Option<NaiveDate> {
        let birthday = anchor.checked_sub_months(Months::new(12 * age))?;
        let previous = anchor.checked_sub_months(Months::new(12 * (age + 1)))?;
        // Any day after `previous` up to `birthday` keeps the age exact
        let gap = (birthday - previous).num_days().max(1);
        let back = self.rng.random_range(0..gap);
        birthday.checked_sub_signed(Duration::days(back))
    }

    fn value(&mut self, expectations: &Expectations, value_type: ValueType) -> Option<Value> {
        if !self.rng.random_bool(expectations.effective_incidence()) {
            return None;
        }
        match value_type {
            ValueType::Str => expectations
                .category
                .as_ref()
                .and_then(|category| self.category(category))
                .map(Value::Str),
            ValueType::Int => expectations
                .int
                .map(|int| Value::Int(self.numeric(int).round() as i64)),
            ValueType::Float => expectations.float.map(|float| Value::Float(self.numeric(float))),
            ValueType::Date => Some(Value::Date(self.event_date(expectations))),
            ValueType::Bool => Some(Value::Bool(true)),
        }
    }

    fn category(&mut self, expectation: &CategoryExpectation) -> Option<String> {
        let labels: Vec<(&String, f64)> = expectation
            .ratios
            .iter()
            .map(|(label, weight)| (label, *weight))
            .collect();
        labels
            .choose_weighted(&mut self.rng, |(_, weight)| *weight)
            .ok()
            .map(|(label, _)| (*label).clone())
    }

    fn numeric(&mut self, expectation: NumericExpectation) -> f64 {
        let NumericExpectation { mean, stddev, .. } = expectation;
        match expectation.distribution {
            Distribution::Normal => Normal::new(mean, stddev).map_or(mean, |normal| self.rng.sample(normal)),
            Distribution::Uniform => self.rng.random_range(mean - stddev..=mean + stddev),
            Distribution::PopulationAges => f64::from(self.population_age()),
        }
    }

    fn event_date(&mut self, expectations: &Expectations) -> NaiveDate {
        let range = expectations.date.unwrap_or(DateExpectation {
            earliest: self.index_date,
            latest: self.index_date + Duration::days(365),
        });
        let span = (range.latest - range.earliest).num_days().max(0);
        let u = self.rng.random::<f64>();
        let fraction = match expectations.rate {
            Some(Rate::ExponentialIncrease) => {
                // Inverse CDF of a density proportional to exp(k * x) on [0, 1]
                const K: f64 = 3.0;
                (u * (K.exp() - 1.0)).ln_1p() / K
            }
            _ => u,
        };
        let offset = (fraction * span as f64).floor() as i64;
        range.earliest + Duration::days(offset.clamp(0, span))
    }
}

/// Generate `count` patients for a study definition
///
/// # Errors
/// Returns a configuration error for an invalid index date or expectations
pub fn generate_patients(definition: &StudyDefinition, count: usize, seed: Option<u64>) -> Result<Vec<PatientData>> {
    Ok(SyntheticGenerator::new(definition, seed)?.generate(count))
}

fn declared(definition: &StudyDefinition) -> impl Iterator<Item = &VariableDefinition> {
    definition
        .population
        .variables
        .iter()
        .chain(&definition.variables)
}

/// Age bands per age variable, from categories that carry category ratios
fn age_bands(definition: &StudyDefinition) -> Result<FxHashMap<String, Vec<AgeBand>>> {
    let ages: FxHashSet<&str> = declared(definition)
        .filter(|variable| matches!(variable.kind, VariableKind::AgeAsOf { .. }))
        .map(|variable| variable.name.as_str())
        .collect();

    let mut bands = FxHashMap::default();
    for variable in declared(definition) {
        let Some(expectations) = &variable.return_expectations else {
            continue;
        };
        let category = match &variable.kind {
            VariableKind::CategorisedAs(category) => category,
            VariableKind::Satisfying { .. } => {
                log_warning(
                    &format!("Expectations of derived flag '{}' are ignored", variable.name),
                    None,
                );
                continue;
            }
            _ => continue,
        };

        let categorizer =
            Categorizer::from_definition(&variable.name, category, definition.expression_precedence)?;
        let required = categorizer.required_variables();
        let age = required
            .iter()
            .next()
            .filter(|name| required.len() == 1 && ages.contains(name.as_str()));
        let (Some(expected), Some(age)) = (&expectations.category, age) else {
            log_warning(
                &format!(
                    "Expectations of category '{}' are ignored: only ratios over a single age are used",
                    variable.name
                ),
                None,
            );
            continue;
        };

        let mut ages_by_label: FxHashMap<String, Vec<u32>> = FxHashMap::default();
        for years in 0..=MAX_BANDED_AGE {
            let row = FxHashMap::from_iter([(age.clone(), Value::Int(i64::from(years)))]);
            ages_by_label
                .entry(categorizer.categorise(&row).to_string())
                .or_default()
                .push(years);
        }
        let weighted: Vec<AgeBand> = expected
            .ratios
            .iter()
            .filter(|(_, weight)| **weight > 0.0)
            .filter_map(|(label, weight)| {
                ages_by_label.get(label).map(|ages| AgeBand {
                    weight: *weight,
                    ages: ages.clone(),
                })
            })
            .collect();
        if weighted.is_empty() {
            log_warning(
                &format!("No ratio of category '{}' matches an age band", variable.name),
                None,
            );
            continue;
        }
        debug!("Ages for '{age}' follow the {} bands of '{}'", weighted.len(), variable.name);
        bands.insert(age.clone(), weighted);
    }
    Ok(bands)
}

fn validate(expectations: &Expectations, variable: &str) -> Result<()> {
    let invalid = |reason: String| CohortError::InvalidExpectations {
        variable: variable.to_string(),
        reason,
    };
    if let Some(incidence) = expectations.incidence {
        if !(0.0..=1.0).contains(&incidence) {
            return Err(invalid(format!("incidence {incidence} is outside [0, 1]")));
        }
    }
    if let Some(date) = expectations.date {
        if date.earliest > date.latest {
            return Err(invalid(format!(
                "earliest date {} is after latest date {}",
                date.earliest, date.latest
            )));
        }
    }
    for numeric in [expectations.int, expectations.float].into_iter().flatten() {
        if numeric.stddev < 0.0 || !numeric.stddev.is_finite() || !numeric.mean.is_finite() {
            return Err(invalid("distribution needs a finite mean and a non-negative stddev".to_string()));
        }
    }
    if let Some(category) = &expectations.category {
        if category.ratios.values().any(|ratio| *ratio < 0.0 || !ratio.is_finite()) {
            return Err(invalid("category ratios must be non-negative".to_string()));
        }
        if category.ratios.values().sum::<f64>() <= 0.0 {
            return Err(invalid("category ratios must not all be zero".to_string()));
        }
    }
    Ok(())
}
