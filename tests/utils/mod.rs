use std::path::PathBuf;

use chrono::NaiveDate;
use cohort_engine::{PatientData, Study, StudyDefinition};
use cohort_engine::study::definition::MeasureDefinition;

/// Index date of the bundled mortality study
pub const INDEX_DATE: (i32, u32, u32) = (2018, 1, 1);

/// Shorthand for a calendar date
#[must_use]
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

/// Index date of the bundled study as a date
#[must_use]
pub fn index_date() -> NaiveDate {
    date(INDEX_DATE.0, INDEX_DATE.1, INDEX_DATE.2)
}

/// Path of a bundled study definition
#[must_use]
pub fn study_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("studies")
        .join(format!("{name}.json"))
}

/// The bundled mortality study definition
#[must_use]
pub fn mortality_definition() -> StudyDefinition {
    StudyDefinition::from_path(&study_path("mortality")).expect("bundled study parses")
}

/// The bundled mortality study with its measures replaced
#[must_use]
pub fn mortality_with_measures(measures: Vec<MeasureDefinition>) -> Study {
    let mut definition = mortality_definition();
    definition.measures = measures;
    Study::compile(definition).expect("study compiles")
}

/// A measure counting deaths within a year, grouped by the given dimensions
#[must_use]
pub fn death_measure(id: &str, group_by: &[&str]) -> MeasureDefinition {
    MeasureDefinition {
        id: id.to_string(),
        numerator: "death_1year".to_string(),
        denominator: "population".to_string(),
        group_by: group_by.iter().map(ToString::to_string).collect(),
        small_number_suppression: false,
        suppression_threshold: None,
        suppression_mode: Default::default(),
    }
}

/// A registered patient of the given sex and age in whole years at the index date
///
/// Birthdays fall mid-year so the age does not depend on the day of the index date.
#[must_use]
pub fn patient(id: &str, sex: &str, age: i32) -> PatientData {
    PatientData::new(id)
        .with_sex(sex)
        .with_birth_date(date(INDEX_DATE.0 - age - 1, 7, 1))
        .with_registration(date(2000, 1, 1), None)
        .with_value("region", date(2010, 1, 1), "London")
}

/// Ten registered patients, two of whom die within a year of the index date
///
/// Men aged 3, 12, 27, 52 and 81, women aged 8, 33, 61, 45 and 90. The man
/// aged 81 and the woman aged 90 die in 2018.
#[must_use]
pub fn ten_patients() -> Vec<PatientData> {
    let men = [3, 12, 27, 52, 81];
    let women = [8, 33, 61, 45, 90];
    let mut patients = Vec::with_capacity(10);
    for (i, age) in men.into_iter().enumerate() {
        patients.push(patient(&format!("m{i}"), "M", age));
    }
    for (i, age) in women.into_iter().enumerate() {
        patients.push(patient(&format!("f{i}"), "F", age));
    }
    for patient in &mut patients {
        if patient.id == "m4" || patient.id == "f4" {
            *patient = std::mem::take(patient).with_death(date(2018, 6, 1));
        }
    }
    patients
}
