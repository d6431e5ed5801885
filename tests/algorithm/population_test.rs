//! Tests for population filtering and study runs

use cohort_engine::filter::ParseError;
use cohort_engine::{
    CancellationToken, CohortError, Precedence, RunConfig, Study, extract_population,
    run_for_dates, run_study, run_study_at,
};

use crate::utils::{date, death_measure, mortality_definition, mortality_with_measures, patient, ten_patients};

fn with_population(expression: &str) -> Result<Study, CohortError> {
    let mut definition = mortality_definition();
    definition.population.expression = expression.to_string();
    definition.measures = vec![death_measure("by_sex", &["sex"])];
    Study::compile(definition)
}

fn mixed_population() -> Vec<cohort_engine::PatientData> {
    let mut patients = ten_patients();
    patients.push(patient("too_old", "F", 115));
    patients.push(patient("unknown_sex", "U", 40));
    patients.push(patient("dead", "M", 40).with_death(date(2016, 3, 1)));
    patients
}

#[test]
fn test_reordering_predicates_keeps_population() {
    let original = with_population(
        r#"registered AND age >= 0 AND age <= 110 AND (sex = "M" OR sex = "F") AND NOT has_died"#,
    )
    .unwrap();
    let reordered = with_population(
        r#"NOT has_died AND (sex = "F" OR sex = "M") AND age <= 110 AND registered AND age >= 0"#,
    )
    .unwrap();

    let patients = mixed_population();
    let config = RunConfig::default();
    let left = run_study(&original, &patients, &config).unwrap();
    let right = run_study(&reordered, &patients, &config).unwrap();

    assert_eq!(left.population_size, 10);
    assert_eq!(left, right);
}

#[test]
fn test_mixed_and_or_is_rejected() {
    let err = with_population(r#"registered AND sex = "M" OR sex = "F""#).unwrap_err();
    match err {
        CohortError::Expression { context, source } => {
            assert_eq!(context, "population");
            assert!(matches!(source, ParseError::AmbiguousPrecedence { .. }));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_conventional_precedence_accepts_mixing() {
    let mut definition = mortality_definition();
    definition.expression_precedence = Precedence::Conventional;
    definition.population.expression = r#"registered AND sex = "M" OR sex = "F""#.to_string();
    definition.measures.clear();
    let study = Study::compile(definition).unwrap();

    // Women pass regardless of registration under AND-before-OR grouping
    let patients = vec![
        patient("m", "M", 40),
        cohort_engine::PatientData::new("unregistered_woman")
            .with_sex("F")
            .with_birth_date(date(1980, 7, 1)),
    ];
    let output = run_study(&study, &patients, &RunConfig::default()).unwrap();
    assert_eq!(output.population_size, 2);
}

#[test]
fn test_thread_count_does_not_change_results() {
    let study = Study::compile(mortality_definition()).unwrap();
    let patients = mixed_population();

    let single = run_study(&study, &patients, &RunConfig::default().with_threads(1)).unwrap();
    let many = run_study(&study, &patients, &RunConfig::default().with_threads(8)).unwrap();
    assert_eq!(single, many);
}

#[test]
fn test_extract_population_rows() {
    let study = Study::compile(mortality_definition()).unwrap();
    let patients = mixed_population();
    let rows = extract_population(&study, &patients, study.index_date(), &RunConfig::default()).unwrap();

    assert_eq!(rows.len(), 10);
    assert_eq!(rows[0].patient_id(), "m0");
    assert!(rows.iter().all(|row| study.includes(row)));
    assert!(rows.iter().all(|row| row.patient_id() != "dead"));
}

#[test]
fn test_later_index_date_ages_the_population() {
    let study = mortality_with_measures(vec![death_measure("by_sex", &["sex"])]);
    let patients = vec![patient("old", "M", 110)];

    let now = run_study(&study, &patients, &RunConfig::default()).unwrap();
    assert_eq!(now.population_size, 1);

    let later = run_study_at(&study, &patients, date(2019, 1, 1), &RunConfig::default()).unwrap();
    assert_eq!(later.population_size, 0);
    assert_eq!(later.index_date, date(2019, 1, 1));
}

#[test]
fn test_run_for_several_index_dates() {
    let study = mortality_with_measures(vec![death_measure("overall", &[])]);
    let patients = ten_patients();
    let dates = [date(2017, 1, 1), date(2018, 1, 1), date(2019, 1, 1)];
    let outputs = run_for_dates(&study, &patients, &dates, &RunConfig::default()).unwrap();

    assert_eq!(outputs.len(), 3);
    assert_eq!(outputs.iter().map(|o| o.index_date).collect::<Vec<_>>(), dates);
    // Both deaths fall in mid 2018: only the 2018 window sees them, and by 2019 they are gone
    assert_eq!(outputs[0].result("overall").unwrap().total_numerator(), 0);
    assert_eq!(outputs[1].result("overall").unwrap().total_numerator(), 2);
    assert_eq!(outputs[2].population_size, 8);
}

#[test]
fn test_cancelled_run_returns_error() {
    let study = Study::compile(mortality_definition()).unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let result = run_study(&study, &ten_patients(), &RunConfig::default().with_cancellation(token));
    assert!(matches!(result, Err(CohortError::Cancelled)));
}
