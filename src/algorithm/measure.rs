//! Grouped numerator/denominator measures
//!
//! Counting happens in [`MeasureAccumulator`]s that can be built per worker
//! and merged in any order. [`Measure::finish`] turns the merged counts into
//! a [`CohortResult`] with ratios and small-number suppression applied.

use std::fmt;

use chrono::NaiveDate;
use itertools::Itertools;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::{CohortError, Result};
use crate::models::{ResolvedRow, RowSchema, ValueType};
use crate::study::definition::{MeasureDefinition, SuppressionMode};

/// Suppression threshold used when a measure enables suppression without one
pub const DEFAULT_SUPPRESSION_THRESHOLD: u64 = 5;

/// Values of the group-by dimensions for one group
pub type GroupKey = SmallVec<[String; 4]>;

/// Small-number suppression policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuppressionPolicy {
    /// Whether suppression is applied at all
    pub enabled: bool,
    /// Largest withheld count
    pub threshold: u64,
    /// How withheld cells are reported
    pub mode: SuppressionMode,
}

impl SuppressionPolicy {
    /// Report every cell verbatim
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            threshold: DEFAULT_SUPPRESSION_THRESHOLD,
            mode: SuppressionMode::Redact,
        }
    }

    /// Whether a group with these counts must be withheld
    #[must_use]
    pub fn applies(&self, numerator: u64, denominator: u64) -> bool {
        let small = |count: u64| (1..=self.threshold).contains(&count);
        self.enabled && (small(numerator) || small(denominator))
    }
}

impl Default for SuppressionPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// A compiled measure bound to a row schema
#[derive(Debug, Clone, PartialEq)]
pub struct Measure {
    id: String,
    numerator: String,
    denominator: String,
    group_by: Vec<String>,
    numerator_slot: usize,
    denominator_slot: usize,
    group_slots: Vec<usize>,
    suppression: SuppressionPolicy,
}

impl Measure {
    /// Validate a measure definition against the row schema
    ///
    /// Numerator and denominator must be boolean variables, group-by
    /// dimensions must exist and must not repeat the numerator or denominator.
    pub fn compile(definition: &MeasureDefinition, schema: &RowSchema) -> Result<Self> {
        let id = definition.id.as_str();
        let flag_slot = |role: &str, name: &str| -> Result<usize> {
            let slot = schema
                .slot(name)
                .ok_or_else(|| CohortError::undefined(format!("measure {id} {role}"), name))?;
            match schema.value_type(slot) {
                Some(ValueType::Bool) => Ok(slot),
                other => Err(CohortError::invalid_measure(
                    id,
                    format!("{role} '{name}' must be a binary flag, found {other:?}"),
                )),
            }
        };
        let numerator_slot = flag_slot("numerator", &definition.numerator)?;
        let denominator_slot = flag_slot("denominator", &definition.denominator)?;

        let mut group_slots = Vec::with_capacity(definition.group_by.len());
        for name in &definition.group_by {
            if *name == definition.numerator || *name == definition.denominator {
                return Err(CohortError::invalid_measure(
                    id,
                    format!("'{name}' cannot be both counted and grouped by"),
                ));
            }
            if definition.group_by.iter().filter(|other| *other == name).count() > 1 {
                return Err(CohortError::invalid_measure(id, format!("'{name}' is grouped by twice")));
            }
            let slot = schema
                .slot(name)
                .ok_or_else(|| CohortError::undefined(format!("measure {id} group_by"), name.as_str()))?;
            group_slots.push(slot);
        }

        let suppression = SuppressionPolicy {
            enabled: definition.small_number_suppression,
            threshold: definition
                .suppression_threshold
                .unwrap_or(DEFAULT_SUPPRESSION_THRESHOLD),
            mode: definition.suppression_mode,
        };

        Ok(Self {
            id: definition.id.clone(),
            numerator: definition.numerator.clone(),
            denominator: definition.denominator.clone(),
            group_by: definition.group_by.clone(),
            numerator_slot,
            denominator_slot,
            group_slots,
            suppression,
        })
    }

    /// Measure identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Numerator variable name
    #[must_use]
    pub fn numerator(&self) -> &str {
        &self.numerator
    }

    /// Denominator variable name
    #[must_use]
    pub fn denominator(&self) -> &str {
        &self.denominator
    }

    /// Group-by dimension names
    #[must_use]
    pub fn group_by(&self) -> &[String] {
        &self.group_by
    }

    /// Suppression policy
    #[must_use]
    pub const fn suppression(&self) -> SuppressionPolicy {
        self.suppression
    }

    /// Replace the suppression policy
    #[must_use]
    pub fn with_suppression(mut self, suppression: SuppressionPolicy) -> Self {
        self.suppression = suppression;
        self
    }

    /// Group key of a row, `None` if any dimension is missing
    fn group_key(&self, row: &ResolvedRow) -> Option<GroupKey> {
        self.group_slots
            .iter()
            .map(|slot| row.value_at(*slot).map(ToString::to_string))
            .collect()
    }

    /// Turn merged counts into a result for one index date
    #[must_use]
    pub fn finish(&self, accumulator: MeasureAccumulator, index_date: NaiveDate) -> CohortResult {
        let mut groups = accumulator.groups;
        if groups.is_empty() && self.group_by.is_empty() {
            groups.insert(GroupKey::new(), GroupCounts::default());
        }

        let rows = groups
            .into_iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(key, counts)| self.report(key, counts))
            .collect();

        CohortResult {
            measure_id: self.id.clone(),
            index_date,
            group_by: self.group_by.clone(),
            numerator: self.numerator.clone(),
            denominator: self.denominator.clone(),
            rows,
        }
    }

    fn report(&self, key: GroupKey, counts: GroupCounts) -> GroupRow {
        let key = key.into_vec();
        if self.suppression.applies(counts.numerator, counts.denominator) {
            let withheld = match self.suppression.mode {
                SuppressionMode::Redact => None,
                SuppressionMode::Zero => Some(0),
            };
            return GroupRow {
                key,
                numerator: withheld,
                denominator: withheld,
                ratio: Ratio::Suppressed,
            };
        }
        GroupRow {
            key,
            numerator: Some(counts.numerator),
            denominator: Some(counts.denominator),
            ratio: Ratio::from_counts(counts.numerator, counts.denominator),
        }
    }
}

/// Counts for one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupCounts {
    /// Rows where the numerator is true
    pub numerator: u64,
    /// Rows where the denominator is true
    pub denominator: u64,
}

/// Partial counts of one measure
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasureAccumulator {
    groups: FxHashMap<GroupKey, GroupCounts>,
}

impl MeasureAccumulator {
    /// Create an empty accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one population row
    ///
    /// Rows outside the denominator or missing a group-by value are skipped.
    /// The numerator is only counted for denominator rows.
    pub fn observe(&mut self, measure: &Measure, row: &ResolvedRow) {
        let flag = |slot: usize| row.value_at(slot).is_some_and(|value| value.is_truthy());
        if !flag(measure.denominator_slot) {
            return;
        }
        let Some(key) = measure.group_key(row) else {
            return;
        };
        let counts = self.groups.entry(key).or_default();
        counts.denominator += 1;
        if flag(measure.numerator_slot) {
            counts.numerator += 1;
        }
    }

    /// Add another accumulator's counts to this one
    pub fn merge(&mut self, other: Self) {
        for (key, counts) in other.groups {
            let entry = self.groups.entry(key).or_default();
            entry.numerator += counts.numerator;
            entry.denominator += counts.denominator;
        }
    }

    /// Number of groups seen so far
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

/// The ratio reported for a group
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ratio {
    /// numerator / denominator
    Value(f64),
    /// Zero denominator
    Undefined,
    /// Withheld by small-number suppression
    Suppressed,
}

impl Ratio {
    /// Ratio of two counts, undefined for a zero denominator
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(numerator: u64, denominator: u64) -> Self {
        if denominator == 0 {
            Self::Undefined
        } else {
            Self::Value(numerator as f64 / denominator as f64)
        }
    }

    /// The numeric value, if any
    #[must_use]
    pub const fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Undefined | Self::Suppressed => None,
        }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::Undefined => f.write_str("undefined"),
            Self::Suppressed => f.write_str("suppressed"),
        }
    }
}

/// One output row of a measure
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    /// Group-by values, in dimension order
    pub key: Vec<String>,
    /// Numerator count, `None` when redacted
    pub numerator: Option<u64>,
    /// Denominator count, `None` when redacted
    pub denominator: Option<u64>,
    /// Ratio
    pub ratio: Ratio,
}

/// Result of one measure for one index date
#[derive(Debug, Clone, PartialEq)]
pub struct CohortResult {
    /// Measure identifier
    pub measure_id: String,
    /// Index date of the run
    pub index_date: NaiveDate,
    /// Group-by dimension names
    pub group_by: Vec<String>,
    /// Numerator variable name
    pub numerator: String,
    /// Denominator variable name
    pub denominator: String,
    /// Rows sorted by group key
    pub rows: Vec<GroupRow>,
}

impl CohortResult {
    /// Row for a group key, if the group is present
    #[must_use]
    pub fn group(&self, key: &[&str]) -> Option<&GroupRow> {
        self.rows
            .iter()
            .find(|row| row.key.iter().map(String::as_str).eq(key.iter().copied()))
    }

    /// Sum of reported numerators
    #[must_use]
    pub fn total_numerator(&self) -> u64 {
        self.rows.iter().filter_map(|row| row.numerator).sum()
    }

    /// Sum of reported denominators
    #[must_use]
    pub fn total_denominator(&self) -> u64 {
        self.rows.iter().filter_map(|row| row.denominator).sum()
    }
}
