//! Compilation of a study definition into an executable study
//!
//! Every configuration problem is reported here, before any patient is
//! touched: bad names, malformed dates and expressions, references to
//! undeclared variables, dependency cycles and invalid measures.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use itertools::Itertools;
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::algorithm::categorizer::Categorizer;
use crate::algorithm::measure::Measure;
use crate::algorithm::resolver::Extraction;
use crate::error::{CohortError, Result};
use crate::filter::{Precedence, parse_expression};
use crate::models::RowSchema;
use crate::study::dates::{DateAnchor, DateWindow};
use crate::study::definition::{StudyDefinition, VariableDefinition, VariableKind};
use crate::study::{CompiledVariable, PATIENT_ID, POPULATION, Study};

/// Compile and validate a definition
pub(crate) fn compile(definition: StudyDefinition) -> Result<Study> {
    let index_date = NaiveDate::parse_from_str(&definition.index_date, "%Y-%m-%d").map_err(|_| {
        CohortError::invalid_date(definition.index_date.as_str(), "index date must be YYYY-MM-DD")
    })?;
    let precedence = definition.expression_precedence;

    let declared: Vec<&VariableDefinition> = definition
        .population
        .variables
        .iter()
        .chain(&definition.variables)
        .collect();
    check_names(&declared)?;

    let mut variables: Vec<(String, Extraction)> = declared
        .iter()
        .map(|variable| {
            compile_extraction(variable, precedence).map(|extraction| (variable.name.clone(), extraction))
        })
        .collect::<Result<_>>()?;

    let population = parse_expression(&definition.population.expression, precedence).map_err(|source| {
        CohortError::Expression {
            context: POPULATION.to_string(),
            source,
        }
    })?;
    variables.push((POPULATION.to_string(), Extraction::Satisfying(population)));

    let schema = Arc::new(RowSchema::new(
        variables
            .iter()
            .map(|(name, extraction)| (name.clone(), extraction.value_type()))
            .collect(),
    ));

    let order = resolution_order(&variables, &schema)?;
    debug!(
        "Resolution order: {}",
        order.iter().map(|slot| variables[*slot].0.as_str()).join(", ")
    );

    let mut slots: Vec<Option<(String, Extraction)>> = variables.into_iter().map(Some).collect();
    let compiled = order
        .into_iter()
        .filter_map(|slot| {
            slots[slot].take().map(|(name, extraction)| CompiledVariable {
                name,
                slot,
                extraction,
            })
        })
        .collect();

    let mut measure_ids = FxHashSet::default();
    let measures = definition
        .measures
        .iter()
        .map(|measure| {
            if !measure_ids.insert(measure.id.as_str()) {
                return Err(CohortError::invalid_measure(measure.id.as_str(), "duplicate measure id"));
            }
            Measure::compile(measure, &schema)
        })
        .collect::<Result<Vec<_>>>()?;

    let population_slot = schema.len() - 1;
    Ok(Study::from_parts(
        definition,
        index_date,
        schema,
        compiled,
        population_slot,
        measures,
    ))
}

fn check_names(declared: &[&VariableDefinition]) -> Result<()> {
    let mut seen = FxHashSet::default();
    for variable in declared {
        let name = variable.name.as_str();
        if name == POPULATION || name == PATIENT_ID {
            return Err(CohortError::ReservedName(name.to_string()));
        }
        if name.is_empty() {
            return Err(CohortError::ReservedName(String::new()));
        }
        if !seen.insert(name) {
            return Err(CohortError::DuplicateVariable(name.to_string()));
        }
    }
    Ok(())
}

fn compile_extraction(variable: &VariableDefinition, precedence: Precedence) -> Result<Extraction> {
    let extraction = match &variable.kind {
        VariableKind::RegisteredAsOf { date } => Extraction::RegisteredAsOf(DateAnchor::parse(date)?),
        VariableKind::AgeAsOf { date } => Extraction::AgeAsOf(DateAnchor::parse(date)?),
        VariableKind::Attribute { field, value_type } => Extraction::Attribute {
            field: field.clone(),
            value_type: *value_type,
        },
        VariableKind::ValueAsOf {
            field,
            date,
            value_type,
        } => Extraction::ValueAsOf {
            field: field.clone(),
            anchor: DateAnchor::parse(date)?,
            value_type: *value_type,
        },
        VariableKind::EventInWindow {
            event,
            on_or_before,
            on_or_after,
            between,
            returning,
            find,
        } => Extraction::EventInWindow {
            event: event.clone(),
            window: compile_window(
                &variable.name,
                on_or_before.as_deref(),
                on_or_after.as_deref(),
                between.as_ref(),
            )?,
            returning: *returning,
            find: *find,
        },
        VariableKind::CategorisedAs(category) => {
            Extraction::Categorised(Categorizer::from_definition(&variable.name, category, precedence)?)
        }
        VariableKind::Satisfying { expression } => Extraction::Satisfying(
            parse_expression(expression, precedence).map_err(|source| CohortError::Expression {
                context: variable.name.clone(),
                source,
            })?,
        ),
    };
    Ok(extraction)
}

fn compile_window(
    variable: &str,
    on_or_before: Option<&str>,
    on_or_after: Option<&str>,
    between: Option<&[String; 2]>,
) -> Result<DateWindow> {
    let invalid = |reason: &str| CohortError::InvalidWindow {
        variable: variable.to_string(),
        reason: reason.to_string(),
    };
    let parse = |text: Option<&str>| text.map(DateAnchor::parse).transpose();

    match between {
        Some(_) if on_or_before.is_some() || on_or_after.is_some() => {
            Err(invalid("'between' cannot be combined with 'on_or_before' or 'on_or_after'"))
        }
        Some([start, end]) => Ok(DateWindow {
            start: Some(DateAnchor::parse(start)?),
            end: Some(DateAnchor::parse(end)?),
        }),
        None if on_or_before.is_none() && on_or_after.is_none() => {
            Err(invalid("one of 'between', 'on_or_before' or 'on_or_after' is required"))
        }
        None => Ok(DateWindow {
            start: parse(on_or_after)?,
            end: parse(on_or_before)?,
        }),
    }
}

/// Slots in an order where every variable follows its dependencies
///
/// Among variables whose dependencies are satisfied, the earliest declared
/// goes first, so independent variables keep declaration order.
fn resolution_order(variables: &[(String, Extraction)], schema: &RowSchema) -> Result<Vec<usize>> {
    let mut dependencies: Vec<Vec<usize>> = Vec::with_capacity(variables.len());
    for (name, extraction) in variables {
        let slots = extraction
            .dependencies()
            .iter()
            .map(|reference| {
                schema
                    .slot(reference)
                    .ok_or_else(|| CohortError::undefined(name.as_str(), reference.as_str()))
            })
            .collect::<Result<Vec<_>>>()?;
        dependencies.push(slots);
    }

    let mut dependents: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
    let mut pending: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    for (slot, deps) in dependencies.iter().enumerate() {
        for dep in deps {
            dependents.entry(*dep).or_default().push(slot);
        }
    }

    let mut ready: BTreeSet<usize> = (0..variables.len()).filter(|slot| pending[*slot] == 0).collect();
    let mut order = Vec::with_capacity(variables.len());
    while let Some(slot) = ready.pop_first() {
        order.push(slot);
        for dependent in dependents.get(&slot).into_iter().flatten() {
            pending[*dependent] -= 1;
            if pending[*dependent] == 0 {
                ready.insert(*dependent);
            }
        }
    }

    if order.len() < variables.len() {
        let cycle = find_cycle(&dependencies, &pending)
            .into_iter()
            .map(|slot| variables[slot].0.clone())
            .collect();
        return Err(CohortError::CyclicDependency(cycle));
    }
    Ok(order)
}

/// Walk unresolved dependencies until a slot repeats
///
/// Every unresolved slot has at least one unresolved dependency, so the walk
/// always closes a cycle.
fn find_cycle(dependencies: &[Vec<usize>], pending: &[usize]) -> Vec<usize> {
    let Some(start) = pending.iter().position(|count| *count > 0) else {
        return Vec::new();
    };
    let mut path = vec![start];
    let mut current = start;
    loop {
        let Some(next) = dependencies[current]
            .iter()
            .copied()
            .find(|dep| pending[*dep] > 0)
        else {
            return path;
        };
        if let Some(position) = path.iter().position(|slot| *slot == next) {
            let mut cycle = path.split_off(position);
            cycle.push(next);
            return cycle;
        }
        path.push(next);
        current = next;
    }
}
