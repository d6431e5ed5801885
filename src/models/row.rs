//! Resolved rows: one patient's variable values

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::models::value::{Value, ValueType};

/// Something that can answer "what is the value of variable `name`"
pub trait VariableLookup {
    /// The resolved value, `None` when missing or unknown
    fn lookup(&self, name: &str) -> Option<&Value>;
}

/// Column layout shared by every row of a study
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSchema {
    names: Vec<String>,
    types: Vec<ValueType>,
    index: FxHashMap<String, usize>,
}

impl RowSchema {
    /// Build a schema from `(name, type)` pairs in column order
    #[must_use]
    pub fn new(columns: Vec<(String, ValueType)>) -> Self {
        let mut names = Vec::with_capacity(columns.len());
        let mut types = Vec::with_capacity(columns.len());
        let mut index = FxHashMap::default();
        for (slot, (name, value_type)) in columns.into_iter().enumerate() {
            index.insert(name.clone(), slot);
            names.push(name);
            types.push(value_type);
        }
        Self {
            names,
            types,
            index,
        }
    }

    /// Slot of a column by name
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Column names in order
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Declared type of the column in `slot`
    #[must_use]
    pub fn value_type(&self, slot: usize) -> Option<ValueType> {
        self.types.get(slot).copied()
    }

    /// Number of columns
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the schema has no columns
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Variable values for one patient
///
/// Created fresh per patient and consumed by the filter, the categorizer and
/// the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRow {
    patient_id: String,
    schema: Arc<RowSchema>,
    values: Vec<Option<Value>>,
}

impl ResolvedRow {
    /// Create a row with every value missing
    #[must_use]
    pub fn new(patient_id: impl Into<String>, schema: Arc<RowSchema>) -> Self {
        let values = vec![None; schema.len()];
        Self {
            patient_id: patient_id.into(),
            schema,
            values,
        }
    }

    /// The patient this row belongs to
    #[must_use]
    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    /// The row's schema
    #[must_use]
    pub fn schema(&self) -> &RowSchema {
        &self.schema
    }

    /// Value by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.slot(name).and_then(|slot| self.value_at(slot))
    }

    /// Value by slot
    #[must_use]
    pub fn value_at(&self, slot: usize) -> Option<&Value> {
        self.values.get(slot).and_then(Option::as_ref)
    }

    /// Store the value for `slot`
    pub fn set(&mut self, slot: usize, value: Option<Value>) {
        if let Some(cell) = self.values.get_mut(slot) {
            *cell = value;
        }
    }

    /// Iterate `(name, value)` pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.schema
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(Option::as_ref))
    }
}

impl VariableLookup for ResolvedRow {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl VariableLookup for FxHashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}
