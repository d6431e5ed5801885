//! End-to-end runs of the bundled study on synthetic patients

use cohort_engine::study::definition::VariableKind;
use cohort_engine::study::expectations::CategoryExpectation;
use cohort_engine::{RunConfig, Study, Value, generate_patients, run_study};

use crate::utils::mortality_definition;

#[test]
fn test_synthetic_mortality_run() {
    let definition = mortality_definition();
    let patients = generate_patients(&definition, 2000, Some(2018)).unwrap();
    assert_eq!(patients.len(), 2000);

    let study = Study::compile(definition.clone()).unwrap();
    let output = run_study(&study, &patients, &RunConfig::default()).unwrap();

    // Everyone is registered, aged under 100 and alive at the index date
    assert_eq!(output.patients_processed, 2000);
    assert_eq!(output.population_size, 2000);

    let death = output.result("death").unwrap();
    assert_eq!(death.total_denominator(), 2000);
    let deaths = death.total_numerator();
    assert!(deaths > 40 && deaths < 200, "{deaths} deaths within a year");

    let regions = region_ratios(&definition);
    for row in &death.rows {
        assert!(row.numerator.unwrap() <= row.denominator.unwrap());
        assert!(row.key[0] == "M" || row.key[0] == "F");
        assert!(!row.key[1].is_empty(), "every age falls in a band");
        assert!(regions.ratios.contains_key(&row.key[2]));
    }
}

#[test]
fn test_synthetic_sex_ratio() {
    let definition = mortality_definition();
    let patients = generate_patients(&definition, 4000, Some(11)).unwrap();
    let study = Study::compile(definition).unwrap();

    let women = patients
        .iter()
        .map(|patient| study.resolve(patient, study.index_date()))
        .filter(|row| row.get("sex") == Some(&Value::from("F")))
        .count();
    let share = women as f64 / 4000.0;
    assert!((0.46..0.56).contains(&share), "share of women {share}");
}

fn region_ratios(definition: &cohort_engine::StudyDefinition) -> CategoryExpectation {
    definition
        .variables
        .iter()
        .find(|variable| {
            matches!(&variable.kind, VariableKind::ValueAsOf { field, .. } if field == "region")
        })
        .and_then(|variable| variable.return_expectations.as_ref())
        .and_then(|expectations| expectations.category.clone())
        .unwrap()
}
