//! Study definitions and their compiled, executable form
//!
//! A [`StudyDefinition`] is plain configuration. [`Study::compile`] checks it
//! and produces a [`Study`]: variables in resolution order, a row schema
//! shared by every patient, the population flag and compiled measures.

pub mod dates;
pub mod definition;
pub mod expectations;
mod plan;

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::algorithm::measure::Measure;
use crate::algorithm::resolver::Extraction;
use crate::error::Result;
use crate::models::{PatientRecord, ResolvedRow, RowSchema};

pub use definition::StudyDefinition;

/// Name of the implicit population flag
pub const POPULATION: &str = "population";

/// Name of the patient identifier column in extracts
pub const PATIENT_ID: &str = "patient_id";

/// A variable ready for resolution
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledVariable {
    /// Variable name
    pub name: String,
    /// Column in the row schema
    pub slot: usize,
    /// How the value is obtained
    pub extraction: Extraction,
}

/// A validated, executable study
#[derive(Debug, Clone)]
pub struct Study {
    definition: StudyDefinition,
    index_date: NaiveDate,
    schema: Arc<RowSchema>,
    variables: Vec<CompiledVariable>,
    population_slot: usize,
    measures: Vec<Measure>,
}

impl Study {
    /// Validate and compile a definition
    pub fn compile(definition: StudyDefinition) -> Result<Self> {
        plan::compile(definition)
    }

    /// Compile a definition given as JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::compile(StudyDefinition::from_json_str(json)?)
    }

    /// Compile a definition read from a JSON file
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::compile(StudyDefinition::from_path(path)?)
    }

    pub(crate) const fn from_parts(
        definition: StudyDefinition,
        index_date: NaiveDate,
        schema: Arc<RowSchema>,
        variables: Vec<CompiledVariable>,
        population_slot: usize,
        measures: Vec<Measure>,
    ) -> Self {
        Self {
            definition,
            index_date,
            schema,
            variables,
            population_slot,
            measures,
        }
    }

    /// The definition this study was compiled from
    #[must_use]
    pub const fn definition(&self) -> &StudyDefinition {
        &self.definition
    }

    /// The configured index date
    #[must_use]
    pub const fn index_date(&self) -> NaiveDate {
        self.index_date
    }

    /// Columns of every resolved row, in declaration order with `population` last
    #[must_use]
    pub fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    /// Compiled measures in declaration order
    #[must_use]
    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    /// Variables in resolution order
    #[must_use]
    pub fn variables(&self) -> &[CompiledVariable] {
        &self.variables
    }

    /// Variable names in resolution order
    pub fn resolution_order(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|variable| variable.name.as_str())
    }

    /// Resolve every variable for one patient
    pub fn resolve<P: PatientRecord + ?Sized>(&self, record: &P, index_date: NaiveDate) -> ResolvedRow {
        let mut row = ResolvedRow::new(record.patient_id(), Arc::clone(&self.schema));
        for variable in &self.variables {
            let value = variable.extraction.resolve(record, index_date, &row);
            row.set(variable.slot, value);
        }
        row
    }

    /// Whether a resolved row belongs to the population
    #[must_use]
    pub fn includes(&self, row: &ResolvedRow) -> bool {
        row.value_at(self.population_slot)
            .is_some_and(|value| value.is_truthy())
    }
}
