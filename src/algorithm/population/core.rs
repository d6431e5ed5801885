//! Core study evaluation
//!
//! Every patient is resolved, filtered and counted independently. Workers
//! fold patients into their own [`StudyAccumulator`] and the partial
//! accumulators are merged at the end, so the outcome does not depend on
//! how patients are split between threads.

use std::time::Instant;

use chrono::NaiveDate;
use indicatif::ParallelProgressIterator;
use log::info;
use rayon::prelude::*;

use crate::algorithm::measure::{CohortResult, MeasureAccumulator};
use crate::config::RunConfig;
use crate::error::{CohortError, Result};
use crate::models::{PatientRecord, ResolvedRow};
use crate::study::Study;
use crate::utils::logging::{
    create_main_progress_bar, finish_progress_bar, log_operation_complete, log_operation_start,
};

/// Partial counts for every measure of a study
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudyAccumulator {
    patients: u64,
    population: u64,
    measures: Vec<MeasureAccumulator>,
}

impl StudyAccumulator {
    /// Create an empty accumulator for a study
    #[must_use]
    pub fn new(study: &Study) -> Self {
        Self {
            patients: 0,
            population: 0,
            measures: vec![MeasureAccumulator::new(); study.measures().len()],
        }
    }

    /// Resolve one patient and count it if it belongs to the population
    pub fn observe<P: PatientRecord + ?Sized>(&mut self, study: &Study, record: &P, index_date: NaiveDate) {
        let row = study.resolve(record, index_date);
        self.observe_row(study, &row);
    }

    /// Count an already resolved row
    pub fn observe_row(&mut self, study: &Study, row: &ResolvedRow) {
        self.patients += 1;
        if !study.includes(row) {
            return;
        }
        self.population += 1;
        for (measure, accumulator) in study.measures().iter().zip(&mut self.measures) {
            accumulator.observe(measure, row);
        }
    }

    /// Add another accumulator's counts to this one
    pub fn merge(&mut self, other: Self) {
        self.patients += other.patients;
        self.population += other.population;
        if self.measures.is_empty() {
            self.measures = other.measures;
            return;
        }
        for (mine, theirs) in self.measures.iter_mut().zip(other.measures) {
            mine.merge(theirs);
        }
    }

    /// Merge and return `self`
    #[must_use]
    pub fn merged(mut self, other: Self) -> Self {
        self.merge(other);
        self
    }

    /// Patients seen so far
    #[must_use]
    pub const fn patients(&self) -> u64 {
        self.patients
    }

    /// Patients in the population so far
    #[must_use]
    pub const fn population(&self) -> u64 {
        self.population
    }

    /// Produce the results for one index date
    #[must_use]
    pub fn finish(self, study: &Study, index_date: NaiveDate) -> StudyOutput {
        let results = study
            .measures()
            .iter()
            .zip(self.measures)
            .map(|(measure, accumulator)| measure.finish(accumulator, index_date))
            .collect();
        StudyOutput {
            index_date,
            patients_processed: self.patients,
            population_size: self.population,
            results,
        }
    }
}

/// Outcome of a study run for one index date
#[derive(Debug, Clone, PartialEq)]
pub struct StudyOutput {
    /// Index date of the run
    pub index_date: NaiveDate,
    /// Patients evaluated
    pub patients_processed: u64,
    /// Patients passing the population filter
    pub population_size: u64,
    /// One result per measure, in declaration order
    pub results: Vec<CohortResult>,
}

impl StudyOutput {
    /// Result of a measure by id
    #[must_use]
    pub fn result(&self, measure_id: &str) -> Option<&CohortResult> {
        self.results.iter().find(|result| result.measure_id == measure_id)
    }
}

/// Count a batch of patients on the current thread
///
/// # Errors
/// Returns [`CohortError::Cancelled`] if the run is cancelled mid-batch
pub fn accumulate_batch<P: PatientRecord>(
    study: &Study,
    patients: &[P],
    index_date: NaiveDate,
    config: &RunConfig,
) -> Result<StudyAccumulator> {
    let mut accumulator = StudyAccumulator::new(study);
    for patient in patients {
        if config.is_cancelled() {
            return Err(CohortError::Cancelled);
        }
        accumulator.observe(study, patient, index_date);
    }
    Ok(accumulator)
}

/// Run a study at its configured index date
pub fn run_study<P: PatientRecord + Sync>(
    study: &Study,
    patients: &[P],
    config: &RunConfig,
) -> Result<StudyOutput> {
    run_study_at(study, patients, study.index_date(), config)
}

/// Run a study at an explicit index date
pub fn run_study_at<P: PatientRecord + Sync>(
    study: &Study,
    patients: &[P],
    index_date: NaiveDate,
    config: &RunConfig,
) -> Result<StudyOutput> {
    let pool = build_pool(config)?;
    pool.install(|| evaluate(study, patients, index_date, config))
}

/// Run a study once per index date, sharing one thread pool
pub fn run_for_dates<P: PatientRecord + Sync>(
    study: &Study,
    patients: &[P],
    index_dates: &[NaiveDate],
    config: &RunConfig,
) -> Result<Vec<StudyOutput>> {
    let pool = build_pool(config)?;
    index_dates
        .iter()
        .map(|index_date| pool.install(|| evaluate(study, patients, *index_date, config)))
        .collect()
}

/// Resolved rows of the population members, in input order
pub fn extract_population<P: PatientRecord + Sync>(
    study: &Study,
    patients: &[P],
    index_date: NaiveDate,
    config: &RunConfig,
) -> Result<Vec<ResolvedRow>> {
    let pool = build_pool(config)?;
    let rows = pool.install(|| {
        patients
            .par_iter()
            .map(|patient| {
                if config.is_cancelled() {
                    return Err(CohortError::Cancelled);
                }
                let row = study.resolve(patient, index_date);
                Ok(study.includes(&row).then_some(row))
            })
            .collect::<Result<Vec<_>>>()
    })?;
    Ok(rows.into_iter().flatten().collect())
}

fn build_pool(config: &RunConfig) -> Result<rayon::ThreadPool> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads.max(1))
        .build()?)
}

fn evaluate<P: PatientRecord + Sync>(
    study: &Study,
    patients: &[P],
    index_date: NaiveDate,
    config: &RunConfig,
) -> Result<StudyOutput> {
    let start = Instant::now();
    log_operation_start("Evaluating study at index date", index_date);

    let identity = || StudyAccumulator::new(study);
    let fold = |mut accumulator: StudyAccumulator, patient: &P| {
        if config.is_cancelled() {
            return Err(CohortError::Cancelled);
        }
        accumulator.observe(study, patient, index_date);
        Ok(accumulator)
    };
    let reduce = |left: StudyAccumulator, right: StudyAccumulator| -> Result<StudyAccumulator> {
        Ok(left.merged(right))
    };

    let accumulator: Result<StudyAccumulator> = if config.show_progress {
        let pb = create_main_progress_bar(patients.len() as u64, Some("Evaluating patients"));
        let accumulator = patients
            .par_iter()
            .progress_with(pb.clone())
            .try_fold(identity, fold)
            .try_reduce(identity, reduce);
        finish_progress_bar(&pb, Some("Evaluation complete"));
        accumulator
    } else {
        patients
            .par_iter()
            .try_fold(identity, fold)
            .try_reduce(identity, reduce)
    };

    let output = accumulator?.finish(study, index_date);
    info!(
        "Population at {}: {} of {} patients",
        index_date, output.population_size, output.patients_processed
    );
    log_operation_complete("evaluated", index_date, patients.len(), Some(start.elapsed()));
    Ok(output)
}
