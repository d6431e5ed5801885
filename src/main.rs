use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, bail};
use chrono::NaiveDate;
use cohort_engine::algorithm::population::PopulationStats;
use cohort_engine::{
    OutputFormat, PatientData, RunConfig, Study, extract_population, generate_patients, patient_batches,
    read_patients_async, run_for_dates, run_study_stream, write_extract, write_measure_outputs,
    write_patients_async,
};
use log::info;

/// Study used when none is given on the command line
const DEFAULT_STUDY: &str = "studies/mortality.json";
/// Output directory used when none is given
const DEFAULT_OUTPUT_DIR: &str = "output";
/// Synthetic patients generated when no patient file is given
const DEFAULT_SYNTHETIC_PATIENTS: usize = 10_000;

/// Usage: `cohort-engine [STUDY_JSON] [OUTPUT_DIR] [PATIENTS_JSON | SYNTHETIC_COUNT]`
///
/// Environment:
/// - `COHORT_SEED` seeds the synthetic generator
/// - `COHORT_INDEX_DATES` comma separated index dates overriding the study's
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let start = Instant::now();

    let mut args = std::env::args().skip(1);
    let study_path = PathBuf::from(args.next().unwrap_or_else(|| DEFAULT_STUDY.to_string()));
    let output_dir = PathBuf::from(args.next().unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()));
    let patients_arg = args.next();

    let study = Arc::new(
        Study::from_path(&study_path)
            .with_context(|| format!("Failed to load study {}", study_path.display()))?,
    );
    info!(
        "Loaded study {} with {} variables and {} measures",
        study_path.display(),
        study.variables().len(),
        study.measures().len()
    );

    let config = RunConfig::default().with_progress(true);
    info!("{config}");

    let patients = load_patients(&study, patients_arg.as_deref(), &output_dir).await?;
    let index_dates = index_dates(&study)?;

    let outputs = if let [index_date] = index_dates.as_slice() {
        let batches = patient_batches(patients.clone(), config.batch_size);
        vec![run_study_stream(Arc::clone(&study), *index_date, batches, &config).await?]
    } else {
        run_for_dates(&study, &patients, &index_dates, &config)?
    };

    for output in &outputs {
        info!("Index date {}\n{}", output.index_date, PopulationStats::from_output(output));
    }

    let written = write_measure_outputs(&output_dir, &outputs, OutputFormat::Csv)?;
    info!("Wrote {} measure files to {}", written.len(), output_dir.display());

    let rows = extract_population(&study, &patients, study.index_date(), &config)?;
    write_extract(&output_dir.join("input.csv"), study.schema(), &rows, OutputFormat::Csv)?;

    info!("Finished in {:?}", start.elapsed());
    Ok(())
}

/// Read patients from a JSON file, or generate synthetic ones
async fn load_patients(study: &Study, arg: Option<&str>, output_dir: &Path) -> anyhow::Result<Vec<PatientData>> {
    if let Some(path) = arg.map(Path::new).filter(|path| path.exists()) {
        return Ok(read_patients_async(path).await?);
    }

    let count = match arg {
        Some(text) => text
            .parse()
            .with_context(|| format!("'{text}' is neither a patient file nor a patient count"))?,
        None => DEFAULT_SYNTHETIC_PATIENTS,
    };
    let seed = std::env::var("COHORT_SEED")
        .ok()
        .map(|text| text.parse::<u64>())
        .transpose()
        .context("COHORT_SEED must be an unsigned integer")?;

    let patients = generate_patients(study.definition(), count, seed)?;
    info!("Generated {} synthetic patients", patients.len());
    write_patients_async(&output_dir.join("patients.json"), &patients).await?;
    Ok(patients)
}

/// Index dates from `COHORT_INDEX_DATES`, or the study's own
fn index_dates(study: &Study) -> anyhow::Result<Vec<NaiveDate>> {
    let Ok(text) = std::env::var("COHORT_INDEX_DATES") else {
        return Ok(vec![study.index_date()]);
    };
    let dates = text
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            NaiveDate::parse_from_str(part, "%Y-%m-%d")
                .with_context(|| format!("Invalid index date '{part}' in COHORT_INDEX_DATES"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    if dates.is_empty() {
        bail!("COHORT_INDEX_DATES is set but lists no dates");
    }
    Ok(dates)
}
