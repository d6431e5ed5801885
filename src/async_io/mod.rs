//! Asynchronous patient input
//!
//! Patients can arrive as an asynchronous stream of batches (from files, a
//! database or the synthetic generator). Each batch is evaluated on the
//! blocking thread pool and the partial counts are merged as batches finish.

pub mod file_ops;
pub mod stream_ops;

pub use file_ops::{read_patients_async, write_patients_async};
pub use stream_ops::{patient_batches, run_study_stream};
