//! Async file operations for patient data

use std::path::Path;

use tokio::fs;

use crate::error::Result;
use crate::models::PatientData;
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// Read patients from a JSON array file
///
/// Values are untagged, so any `YYYY-MM-DD` string is read back as a date,
/// including text attributes that happen to look like one. Variables
/// declared as strings resolve such dates to the same text again.
///
/// # Arguments
/// * `path` - Path to the JSON file
///
/// # Errors
/// Returns an error if the file cannot be read or is not a JSON array of patients
pub async fn read_patients_async(path: &Path) -> Result<Vec<PatientData>> {
    let start = std::time::Instant::now();
    log_operation_start("Reading patients from", path.display());

    let text = fs::read_to_string(path).await?;
    let patients: Vec<PatientData> = serde_json::from_str(&text)?;

    log_operation_complete("read", path.display(), patients.len(), Some(start.elapsed()));
    Ok(patients)
}

/// Write patients to a JSON array file
///
/// # Arguments
/// * `path` - Destination path, parent directories are created
/// * `patients` - Patients to write
///
/// # Errors
/// Returns an error if serialization or writing fails
pub async fn write_patients_async(path: &Path, patients: &[PatientData]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let text = serde_json::to_string(patients)?;
    fs::write(path, text).await?;
    log_operation_complete("wrote", path.display(), patients.len(), None);
    Ok(())
}
