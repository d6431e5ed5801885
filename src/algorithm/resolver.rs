//! Variable resolution against a patient record
//!
//! Each compiled variable holds an [`Extraction`]. Resolution is a pure
//! function of the record, the index date and the values already resolved
//! for the same patient; anything absent from the record comes back as
//! `None` rather than an error.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};

use crate::algorithm::categorizer::Categorizer;
use crate::filter::Expr;
use crate::models::{PatientRecord, ResolvedRow, Value, ValueType, fields};
use crate::study::dates::{DateAnchor, DateWindow};
use crate::study::definition::{EventMatch, EventReturn};

/// How a variable's value is obtained
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Whether any registration period covers the anchor date
    RegisteredAsOf(DateAnchor),

    /// Age in whole years on the anchor date
    AgeAsOf(DateAnchor),

    /// A fixed attribute
    Attribute {
        /// Attribute name
        field: String,
        /// Declared type
        value_type: ValueType,
    },

    /// Latest timeline entry on or before the anchor date
    ValueAsOf {
        /// Timeline name
        field: String,
        /// Anchor date
        anchor: DateAnchor,
        /// Declared type
        value_type: ValueType,
    },

    /// Events inside an inclusive window
    EventInWindow {
        /// Event timeline name
        event: String,
        /// Window bounds
        window: DateWindow,
        /// What to report
        returning: EventReturn,
        /// Which event a date return reports
        find: EventMatch,
    },

    /// Label from ordered predicates
    Categorised(Categorizer),

    /// Flag computed from other variables
    Satisfying(Expr),
}

impl Extraction {
    /// Type of the values this extraction produces
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::RegisteredAsOf(_) | Self::Satisfying(_) => ValueType::Bool,
            Self::AgeAsOf(_) => ValueType::Int,
            Self::Attribute { value_type, .. } | Self::ValueAsOf { value_type, .. } => *value_type,
            Self::EventInWindow { returning, .. } => match returning {
                EventReturn::BinaryFlag => ValueType::Bool,
                EventReturn::Date => ValueType::Date,
                EventReturn::NumberOfMatches => ValueType::Int,
            },
            Self::Categorised(_) => ValueType::Str,
        }
    }

    /// Other variables that must be resolved first
    #[must_use]
    pub fn dependencies(&self) -> BTreeSet<String> {
        match self {
            Self::Categorised(categorizer) => categorizer.required_variables(),
            Self::Satisfying(expr) => expr.required_variables(),
            _ => BTreeSet::new(),
        }
    }

    /// Resolve the value for one patient
    ///
    /// `row` holds the values resolved so far; dependencies are guaranteed
    /// to be present in it by the resolution order.
    pub fn resolve<P: PatientRecord + ?Sized>(
        &self,
        record: &P,
        index_date: NaiveDate,
        row: &ResolvedRow,
    ) -> Option<Value> {
        match self {
            Self::RegisteredAsOf(anchor) => {
                let date = anchor.resolve(index_date)?;
                Some(Value::Bool(
                    record.registrations().iter().any(|period| period.covers(date)),
                ))
            }
            Self::AgeAsOf(anchor) => {
                let date = anchor.resolve(index_date)?;
                let birth = record.attribute(fields::DATE_OF_BIRTH)?.as_date()?;
                age_in_years(birth, date).map(|age| Value::Int(i64::from(age)))
            }
            // Stored values of another type resolve as missing
            Self::Attribute { field, value_type } => record.attribute(field)?.clone().coerce_to(*value_type),
            Self::ValueAsOf {
                field,
                anchor,
                value_type,
            } => {
                let date = anchor.resolve(index_date)?;
                record
                    .timeline(field)
                    .iter()
                    .filter(|entry| entry.date <= date)
                    .max_by_key(|entry| entry.date)?
                    .value
                    .clone()
                    .coerce_to(*value_type)
            }
            Self::EventInWindow {
                event,
                window,
                returning,
                find,
            } => {
                let window = window.resolve(index_date)?;
                let mut matches = record
                    .timeline(event)
                    .iter()
                    .map(|entry| entry.date)
                    .filter(|date| window.contains(*date));
                match returning {
                    EventReturn::BinaryFlag => Some(Value::Bool(matches.next().is_some())),
                    EventReturn::NumberOfMatches => {
                        Some(Value::Int(i64::try_from(matches.count()).unwrap_or(i64::MAX)))
                    }
                    EventReturn::Date => match find {
                        EventMatch::First => matches.min(),
                        EventMatch::Last => matches.max(),
                    }
                    .map(Value::Date),
                }
            }
            Self::Categorised(categorizer) => Some(Value::Str(categorizer.categorise(row).to_string())),
            Self::Satisfying(expr) => Some(Value::Bool(expr.evaluate(row))),
        }
    }
}

/// Whole years between `birth` and `date`, `None` if born after `date`
#[must_use]
pub fn age_in_years(birth: NaiveDate, date: NaiveDate) -> Option<i32> {
    if birth > date {
        return None;
    }
    let years = date.year() - birth.year();
    // Birthday not yet reached this year
    if (date.month(), date.day()) < (birth.month(), birth.day()) {
        Some(years - 1)
    } else {
        Some(years)
    }
}
