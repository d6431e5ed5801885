//! Tests for measure and extract files written from study runs

use std::fs::{self, File};
use std::path::PathBuf;

use arrow::array::{Array, StringArray, UInt64Array};
use cohort_engine::{
    OutputFormat, RunConfig, extract_population, run_for_dates, run_study, write_extract,
    write_measure_outputs,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::utils::{date, death_measure, mortality_with_measures, ten_patients};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cohort-engine-{name}-{}", std::process::id()));
    fs::remove_dir_all(&dir).ok();
    dir
}

#[test]
fn test_measure_csv_has_one_row_per_group() {
    let dir = scratch_dir("measure-csv");
    let study = mortality_with_measures(vec![death_measure("death", &["sex", "ageband5year"])]);
    let output = run_study(&study, &ten_patients(), &RunConfig::default()).unwrap();

    let written = write_measure_outputs(&dir, &[output], OutputFormat::Csv).unwrap();
    assert_eq!(written, vec![dir.join("measure_death.csv")]);

    let text = fs::read_to_string(&written[0]).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines[0], "sex,ageband5year,death_1year,population,value,date");
    assert_eq!(lines.len(), 11);
    assert!(lines.contains(&"M,80-84,1,1,1.0,2018-01-01") || lines.contains(&"M,80-84,1,1,1,2018-01-01"));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_measures_over_several_dates_share_a_file() {
    let dir = scratch_dir("measure-parquet");
    let study = mortality_with_measures(vec![
        death_measure("by_sex", &["sex"]),
        death_measure("overall", &[]),
    ]);
    let dates = [date(2018, 1, 1), date(2019, 1, 1)];
    let outputs = run_for_dates(&study, &ten_patients(), &dates, &RunConfig::default()).unwrap();

    let written = write_measure_outputs(&dir, &outputs, OutputFormat::Parquet).unwrap();
    assert_eq!(
        written,
        vec![dir.join("measure_by_sex.parquet"), dir.join("measure_overall.parquet")]
    );

    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&written[0]).unwrap())
        .unwrap()
        .build()
        .unwrap();
    let batches: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
    let rows: usize = batches.iter().map(|batch| batch.num_rows()).sum();
    assert_eq!(rows, 4);

    let batch = &batches[0];
    let sex = batch
        .column_by_name("sex")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(sex.value(0), "F");
    assert_eq!(sex.value(1), "M");
    let denominator = batch
        .column_by_name("population")
        .unwrap()
        .as_any()
        .downcast_ref::<UInt64Array>()
        .unwrap();
    assert_eq!(denominator.value(0), 5);
    assert_eq!(denominator.value(2), 4);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_population_extract() {
    let dir = scratch_dir("extract");
    let study = mortality_with_measures(Vec::new());
    let rows = extract_population(&study, &ten_patients(), study.index_date(), &RunConfig::default()).unwrap();

    let path = dir.join("input.csv");
    write_extract(&path, study.schema(), &rows, OutputFormat::Csv).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("patient_id,"));
    assert!(header.contains("ageband5year"));
    assert!(header.ends_with("population"));
    assert_eq!(lines.count(), 10);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_empty_extract_still_has_header() {
    let dir = scratch_dir("empty-extract");
    let study = mortality_with_measures(Vec::new());
    let path = dir.join("input.csv");
    write_extract(&path, study.schema(), &[], OutputFormat::Csv).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 1);
    assert!(text.starts_with("patient_id,"));

    fs::remove_dir_all(&dir).ok();
}
