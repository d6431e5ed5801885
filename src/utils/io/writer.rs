//! Writing record batches to CSV and Parquet files

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::csv::WriterBuilder;
use arrow::record_batch::RecordBatch;
use itertools::Itertools;
use parquet::arrow::ArrowWriter;

use crate::algorithm::population::StudyOutput;
use crate::error::Result;
use crate::models::{ResolvedRow, RowSchema};
use crate::utils::io::record_batch::{extract_schema, extract_to_record_batch, measure_schema, result_to_record_batch};
use crate::utils::logging::{log_operation_complete, log_warning};

/// Tabular file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Comma separated values with a header row
    #[default]
    Csv,
    /// Apache Parquet
    Parquet,
}

impl OutputFormat {
    /// File extension without the dot
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }

    /// Guess the format from a path's extension, defaulting to CSV
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("parquet") => Self::Parquet,
            _ => Self::Csv,
        }
    }
}

/// Write one record batch to a file
///
/// # Arguments
/// * `path` - Destination file, parent directories are created
/// * `batch` - The batch to write
/// * `format` - Output format
///
/// # Errors
/// Returns an error if the file cannot be created or encoding fails
pub fn write_batch(path: &Path, batch: &RecordBatch, format: OutputFormat) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    match format {
        OutputFormat::Csv => {
            let mut writer = WriterBuilder::new().with_header(true).build(file);
            writer.write(batch)?;
        }
        OutputFormat::Parquet => {
            let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
            writer.write(batch)?;
            writer.close()?;
        }
    }
    log_operation_complete("wrote", path.display(), batch.num_rows(), None);
    Ok(())
}

/// Write every measure to `measure_<id>.<ext>` in `dir`
///
/// Results of several index dates are written to the same file, one block of
/// rows per date in the order given.
///
/// # Errors
/// Returns an error if conversion or writing fails
pub fn write_measure_outputs(dir: &Path, outputs: &[StudyOutput], format: OutputFormat) -> Result<Vec<PathBuf>> {
    let results_by_measure = outputs
        .iter()
        .flat_map(|output| &output.results)
        .into_group_map_by(|result| result.measure_id.clone());

    let mut written = Vec::with_capacity(results_by_measure.len());
    for (measure_id, results) in results_by_measure.into_iter().sorted_by(|(a, _), (b, _)| a.cmp(b)) {
        let Some(first) = results.first() else {
            continue;
        };
        let schema = Arc::new(measure_schema(first));
        let batches = results
            .iter()
            .map(|result| result_to_record_batch(result))
            .collect::<Result<Vec<_>>>()?;
        let batch = concat_batches(&schema, &batches)?;

        let path = dir.join(format!("measure_{measure_id}.{}", format.extension()));
        write_batch(&path, &batch, format)?;
        written.push(path);
    }

    if written.is_empty() {
        log_warning("Study defines no measures, nothing written", Some(dir));
    }
    Ok(written)
}

/// Write the resolved rows of the population as one extract file
///
/// # Errors
/// Returns an error if conversion or writing fails
pub fn write_extract(path: &Path, schema: &RowSchema, rows: &[ResolvedRow], format: OutputFormat) -> Result<()> {
    let batch = if rows.is_empty() {
        RecordBatch::new_empty(Arc::new(extract_schema(schema)))
    } else {
        extract_to_record_batch(schema, rows)?
    };
    write_batch(path, &batch, format)
}
