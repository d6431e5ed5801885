//! Patient record capability and an in-memory implementation
//!
//! The engine never looks inside a patient record directly. Everything it
//! needs is answered through [`PatientRecord`], so a record backed by a
//! database cursor or a columnar batch can replace [`PatientData`] without
//! touching the resolver.

use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::models::value::Value;

/// Well-known field names used by the built-in extraction kinds
pub mod fields {
    /// Fixed attribute holding the date of birth
    pub const DATE_OF_BIRTH: &str = "date_of_birth";
    /// Fixed attribute holding sex
    pub const SEX: &str = "sex";
    /// Event timeline holding deaths from any cause
    pub const DEATH: &str = "death";
}

/// A value recorded on a specific date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedValue {
    /// Date from which the value is effective (or on which the event occurred)
    pub date: NaiveDate,
    /// The recorded value
    pub value: Value,
}

/// A period of registration with a practice, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationPeriod {
    /// First day of registration
    pub start: NaiveDate,
    /// Last day of registration, `None` while still registered
    pub end: Option<NaiveDate>,
}

impl RegistrationPeriod {
    /// Whether this period covers the given date
    #[must_use]
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start <= date && self.end.is_none_or(|end| date <= end)
    }
}

/// Capability the engine requires from a patient record
pub trait PatientRecord {
    /// Stable identifier of the patient
    fn patient_id(&self) -> &str;

    /// A fixed attribute such as sex or date of birth
    fn attribute(&self, field: &str) -> Option<&Value>;

    /// Dated entries for a time-varying field or an event type
    ///
    /// Entries need not be sorted. Unknown fields yield an empty slice.
    fn timeline(&self, field: &str) -> &[TimedValue];

    /// Registration periods of the patient
    fn registrations(&self) -> &[RegistrationPeriod];
}

/// In-memory patient record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientData {
    /// Patient identifier
    pub id: String,
    /// Fixed attributes by field name
    #[serde(default)]
    pub attributes: FxHashMap<String, Value>,
    /// Timelines by field name
    #[serde(default)]
    pub timelines: FxHashMap<String, Vec<TimedValue>>,
    /// Registration history
    #[serde(default)]
    pub registrations: Vec<RegistrationPeriod>,
}

impl PatientData {
    /// Create an empty record with the given identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Set a fixed attribute
    #[must_use]
    pub fn with_attribute(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(field.to_string(), value.into());
        self
    }

    /// Set the date of birth
    #[must_use]
    pub fn with_birth_date(self, date: NaiveDate) -> Self {
        self.with_attribute(fields::DATE_OF_BIRTH, date)
    }

    /// Set sex
    #[must_use]
    pub fn with_sex(self, sex: &str) -> Self {
        self.with_attribute(fields::SEX, sex)
    }

    /// Record a value effective from `date` on a time-varying field
    #[must_use]
    pub fn with_value(mut self, field: &str, date: NaiveDate, value: impl Into<Value>) -> Self {
        self.push_value(field, date, value.into());
        self
    }

    /// Record an event occurring on `date`
    #[must_use]
    pub fn with_event(self, event: &str, date: NaiveDate) -> Self {
        self.with_value(event, date, true)
    }

    /// Record death on `date`
    #[must_use]
    pub fn with_death(self, date: NaiveDate) -> Self {
        self.with_event(fields::DEATH, date)
    }

    /// Add a registration period
    #[must_use]
    pub fn with_registration(mut self, start: NaiveDate, end: Option<NaiveDate>) -> Self {
        self.registrations.push(RegistrationPeriod { start, end });
        self
    }

    /// Append a dated value in place
    pub fn push_value(&mut self, field: &str, date: NaiveDate, value: Value) {
        self.timelines
            .entry(field.to_string())
            .or_default()
            .push(TimedValue { date, value });
    }
}

impl PatientRecord for PatientData {
    fn patient_id(&self) -> &str {
        &self.id
    }

    fn attribute(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    fn timeline(&self, field: &str) -> &[TimedValue] {
        self.timelines.get(field).map_or(&[], Vec::as_slice)
    }

    fn registrations(&self) -> &[RegistrationPeriod] {
        &self.registrations
    }
}
