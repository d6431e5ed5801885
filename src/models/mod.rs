//! Data model shared by the engine components
//!
//! Values, patient records and resolved rows.

pub mod record;
pub mod row;
pub mod value;

pub use record::{PatientData, PatientRecord, RegistrationPeriod, TimedValue, fields};
pub use row::{ResolvedRow, RowSchema, VariableLookup};
pub use value::{Value, ValueType};
