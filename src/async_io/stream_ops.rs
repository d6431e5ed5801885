//! Study evaluation over streams of patient batches

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use itertools::Itertools;

use crate::algorithm::population::{StudyAccumulator, StudyOutput, accumulate_batch};
use crate::config::RunConfig;
use crate::error::Result;
use crate::models::PatientRecord;
use crate::study::Study;
use crate::utils::logging::{create_spinner, finish_progress_bar, log_operation_complete, log_operation_start};

/// Split patients into a stream of batches of `batch_size`
#[must_use]
pub fn patient_batches<P>(patients: Vec<P>, batch_size: usize) -> impl Stream<Item = Result<Vec<P>>> {
    let batches = patients
        .into_iter()
        .chunks(batch_size.max(1))
        .into_iter()
        .map(|chunk| Ok(chunk.collect_vec()))
        .collect_vec();
    stream::iter(batches)
}

/// Run a study over a stream of patient batches
///
/// Up to `config.threads` batches are evaluated at once, each on tokio's
/// blocking pool. The result equals running the same patients in one slice.
///
/// # Arguments
/// * `study` - The compiled study
/// * `index_date` - Index date of the run
/// * `batches` - Stream of patient batches
/// * `config` - Run configuration
///
/// # Errors
/// Returns the first error produced by the stream or by a batch, including
/// cancellation
pub async fn run_study_stream<P, S>(
    study: Arc<Study>,
    index_date: NaiveDate,
    batches: S,
    config: &RunConfig,
) -> Result<StudyOutput>
where
    P: PatientRecord + Send + 'static,
    S: Stream<Item = Result<Vec<P>>>,
{
    let start = Instant::now();
    log_operation_start("Evaluating streamed patients at index date", index_date);
    let spinner = config
        .show_progress
        .then(|| create_spinner(Some("Evaluating patient batches")));

    let accumulator = batches
        .map(|batch| {
            let study = Arc::clone(&study);
            let config = config.clone();
            async move {
                let batch = batch?;
                tokio::task::spawn_blocking(move || accumulate_batch(&study, &batch, index_date, &config))
                    .await?
            }
        })
        .buffer_unordered(config.threads.max(1))
        .inspect_ok(|partial| {
            if let Some(spinner) = &spinner {
                spinner.inc(partial.patients());
            }
        })
        .try_fold(StudyAccumulator::new(&study), |total, partial| async move {
            Ok(total.merged(partial))
        })
        .await?;

    if let Some(spinner) = &spinner {
        finish_progress_bar(spinner, Some("Evaluation complete"));
    }
    let processed = usize::try_from(accumulator.patients()).unwrap_or(usize::MAX);
    let output = accumulator.finish(&study, index_date);
    log::info!(
        "Population at {}: {} of {} patients",
        index_date,
        output.population_size,
        output.patients_processed
    );
    log_operation_complete("evaluated", index_date, processed, Some(start.elapsed()));
    Ok(output)
}
