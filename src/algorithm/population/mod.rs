//! Study evaluation over a patient population
//!
//! This module runs a compiled study over in-memory patients, in parallel,
//! and summarises the outcome.

pub mod core;
pub mod statistics;

pub use self::core::{
    StudyAccumulator, StudyOutput, accumulate_batch, extract_population, run_for_dates, run_study,
    run_study_at,
};
pub use statistics::{MeasureStats, PopulationStats};
