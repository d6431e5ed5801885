//! A Rust library for evaluating declarative cohort study definitions:
//! resolving patient variables, filtering a study population, categorizing
//! patients into bands and computing grouped numerator/denominator measures.

pub mod algorithm;
pub mod async_io;
pub mod config;
pub mod error;
pub mod filter;
pub mod models;
pub mod study;
pub mod synthetic;
pub mod utils;

// Re-export the most common types for easier use
// Core types
pub use config::{CancellationToken, RunConfig};
pub use error::{CohortError, Result};
pub use models::{PatientData, PatientRecord, ResolvedRow, RowSchema, Value, ValueType, VariableLookup};
pub use study::{Study, StudyDefinition};

// Expressions
pub use filter::{Expr, ParseError, Precedence, parse_expression};

// Evaluation
pub use algorithm::categorizer::Categorizer;
pub use algorithm::measure::{CohortResult, GroupRow, Measure, MeasureAccumulator, Ratio, SuppressionPolicy};
pub use algorithm::population::{
    PopulationStats, StudyOutput, extract_population, run_for_dates, run_study, run_study_at,
};

// Async functionality
pub use async_io::{patient_batches, read_patients_async, run_study_stream, write_patients_async};

// Output
pub use utils::io::{OutputFormat, write_extract, write_measure_outputs};

// Synthetic data
pub use synthetic::{SyntheticGenerator, generate_patients};
