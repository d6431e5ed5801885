//! End-to-end runs of the bundled mortality study on hand-built patients

use cohort_engine::algorithm::measure::Ratio;
use cohort_engine::{PatientData, RunConfig, Study, Value, run_study};

use crate::utils::{
    date, death_measure, index_date, mortality_definition, mortality_with_measures, patient,
    ten_patients,
};

#[test]
fn test_bundled_study_compiles() {
    let study = Study::compile(mortality_definition()).unwrap();
    assert_eq!(study.index_date(), index_date());
    assert_eq!(study.measures().len(), 1);
    assert_eq!(study.measures()[0].group_by(), &["sex", "ageband5year", "region"]);

    let order: Vec<&str> = study.resolution_order().collect();
    let position = |name: &str| order.iter().position(|n| *n == name).unwrap();
    assert!(position("age") < position("ageband5year"));
    assert!(position("has_died") < position("population"));
    assert_eq!(order.last(), Some(&"population"));
}

#[test]
fn test_deaths_by_sex_and_ageband() {
    let study = mortality_with_measures(vec![death_measure("death", &["sex", "ageband5year"])]);
    let output = run_study(&study, &ten_patients(), &RunConfig::default()).unwrap();

    assert_eq!(output.patients_processed, 10);
    assert_eq!(output.population_size, 10);

    let result = output.result("death").unwrap();
    assert_eq!(result.rows.len(), 10);
    assert_eq!(result.total_denominator(), 10);
    assert_eq!(result.total_numerator(), 2);

    for key in [["M", "80-84"], ["F", "90+"]] {
        let row = result.group(&key).unwrap();
        assert_eq!(row.numerator, Some(1));
        assert_eq!(row.denominator, Some(1));
        assert_eq!(row.ratio, Ratio::Value(1.0));
    }
    for key in [
        ["M", "0-4"],
        ["M", "10-14"],
        ["M", "25-29"],
        ["M", "50-54"],
        ["F", "5-9"],
        ["F", "30-34"],
        ["F", "45-49"],
        ["F", "60-64"],
    ] {
        let row = result.group(&key).unwrap();
        assert_eq!(row.numerator, Some(0), "group {key:?}");
        assert_eq!(row.denominator, Some(1), "group {key:?}");
        assert_eq!(row.ratio, Ratio::Value(0.0), "group {key:?}");
    }
}

#[test]
fn test_unregistered_patient_is_excluded() {
    let study = mortality_with_measures(vec![death_measure("by_sex", &["sex"])]);
    let mut patients = ten_patients();
    patients.push(PatientData::new("unregistered").with_sex("M").with_birth_date(date(1980, 7, 1)));
    patients.push(
        PatientData::new("lapsed")
            .with_sex("F")
            .with_birth_date(date(1980, 7, 1))
            .with_registration(date(1990, 1, 1), Some(date(2017, 12, 31))),
    );

    let output = run_study(&study, &patients, &RunConfig::default()).unwrap();
    assert_eq!(output.patients_processed, 12);
    assert_eq!(output.population_size, 10);
    let result = output.result("by_sex").unwrap();
    assert_eq!(result.group(&["M"]).unwrap().denominator, Some(5));
    assert_eq!(result.group(&["F"]).unwrap().denominator, Some(5));
}

#[test]
fn test_death_before_index_date_is_excluded() {
    let study = mortality_with_measures(vec![death_measure("overall", &[])]);
    let patients = vec![
        patient("alive", "M", 40),
        patient("dead", "F", 40).with_death(date(2017, 12, 31)),
        patient("dies_on_index", "F", 40).with_death(index_date()),
    ];
    let output = run_study(&study, &patients, &RunConfig::default()).unwrap();

    assert_eq!(output.population_size, 2);
    let overall = &output.result("overall").unwrap().rows[0];
    assert!(overall.key.is_empty());
    assert_eq!(overall.numerator, Some(1));
    assert_eq!(overall.denominator, Some(2));
    assert_eq!(overall.ratio, Ratio::Value(0.5));
}

#[test]
fn test_missing_region_only_drops_region_groups() {
    let study = mortality_with_measures(vec![
        death_measure("by_region", &["region"]),
        death_measure("by_sex", &["sex"]),
    ]);
    let mut patients = ten_patients();
    patients[0].timelines.remove("region");

    let output = run_study(&study, &patients, &RunConfig::default()).unwrap();
    assert_eq!(output.population_size, 10);

    let by_region = output.result("by_region").unwrap();
    assert_eq!(by_region.rows.len(), 1);
    assert_eq!(by_region.group(&["London"]).unwrap().denominator, Some(9));

    let by_sex = output.result("by_sex").unwrap();
    assert_eq!(by_sex.total_denominator(), 10);
}

#[test]
fn test_region_follows_latest_move_before_index_date() {
    let study = mortality_with_measures(vec![death_measure("by_region", &["region"])]);
    let patients = vec![
        patient("moved", "M", 30)
            .with_value("region", date(2017, 6, 1), "North East")
            .with_value("region", date(2018, 6, 1), "South West"),
    ];
    let row = study.resolve(&patients[0], index_date());
    assert_eq!(row.get("region"), Some(&Value::from("North East")));

    let output = run_study(&study, &patients, &RunConfig::default()).unwrap();
    let by_region = output.result("by_region").unwrap();
    assert!(by_region.group(&["North East"]).is_some());
    assert!(by_region.group(&["South West"]).is_none());
}

#[test]
fn test_numerator_never_exceeds_denominator() {
    let study = mortality_with_measures(vec![death_measure("death", &["sex", "ageband5year"])]);
    let mut patients = ten_patients();
    // Dead before the index date and outside the population, but with a death in the window too
    patients.push(
        patient("twice", "M", 81)
            .with_death(date(2017, 1, 1))
            .with_death(date(2018, 2, 1)),
    );
    let output = run_study(&study, &patients, &RunConfig::default()).unwrap();

    for row in &output.result("death").unwrap().rows {
        let (numerator, denominator) = (row.numerator.unwrap(), row.denominator.unwrap());
        assert!(numerator <= denominator);
        match row.ratio {
            Ratio::Value(ratio) => {
                assert!((ratio - numerator as f64 / denominator as f64).abs() < f64::EPSILON);
            }
            other => panic!("unexpected ratio {other:?}"),
        }
    }
    assert_eq!(output.result("death").unwrap().group(&["M", "80-84"]).unwrap().denominator, Some(1));
}
