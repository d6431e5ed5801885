//! IO utilities for tabular output
//!
//! This module converts measure results and per-patient extracts into Arrow
//! record batches and writes them as CSV or Parquet files.

pub mod record_batch;
pub mod writer;

pub use record_batch::{extract_to_record_batch, result_to_record_batch};
pub use writer::{OutputFormat, write_batch, write_extract, write_measure_outputs};
