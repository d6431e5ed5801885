//! Tests for measures computed through whole study runs

use arrow::array::{Array, BooleanArray};
use cohort_engine::algorithm::measure::{DEFAULT_SUPPRESSION_THRESHOLD, Ratio};
use cohort_engine::study::definition::{SuppressionMode, VariableDefinition, VariableKind};
use cohort_engine::utils::io::extract_to_record_batch;
use cohort_engine::{
    CohortError, RunConfig, Study, Value, ValueType, extract_population, run_study,
};

use crate::utils::{death_measure, mortality_definition, mortality_with_measures, patient, ten_patients};

fn satisfying(name: &str, expression: &str) -> VariableDefinition {
    VariableDefinition {
        name: name.to_string(),
        kind: VariableKind::Satisfying {
            expression: expression.to_string(),
        },
        return_expectations: None,
    }
}

#[test]
fn test_numerator_only_counts_denominator_rows() {
    let mut definition = mortality_definition();
    definition.variables.push(satisfying("over_80", "age >= 80"));
    let mut measure = death_measure("death_over_80", &["sex"]);
    measure.denominator = "over_80".to_string();
    definition.measures = vec![measure];
    let study = Study::compile(definition).unwrap();

    let mut patients = ten_patients();
    patients.push(patient("young_death", "M", 20).with_death(crate::utils::date(2018, 3, 1)));

    let output = run_study(&study, &patients, &RunConfig::default()).unwrap();
    let result = output.result("death_over_80").unwrap();
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.total_denominator(), 2);
    assert_eq!(result.total_numerator(), 2);
    assert_eq!(result.group(&["M"]).unwrap().ratio, Ratio::Value(1.0));
}

#[test]
fn test_small_groups_are_redacted() {
    let mut measure = death_measure("by_sex", &["sex"]);
    measure.small_number_suppression = true;
    let study = mortality_with_measures(vec![measure]);
    assert_eq!(study.measures()[0].suppression().threshold, DEFAULT_SUPPRESSION_THRESHOLD);

    let output = run_study(&study, &ten_patients(), &RunConfig::default()).unwrap();
    let result = output.result("by_sex").unwrap();
    for row in &result.rows {
        assert_eq!(row.numerator, None);
        assert_eq!(row.denominator, None);
        assert_eq!(row.ratio, Ratio::Suppressed);
    }
}

#[test]
fn test_zero_counts_are_not_suppressed() {
    let mut measure = death_measure("by_sex", &["sex"]);
    measure.small_number_suppression = true;
    measure.suppression_threshold = Some(1);
    measure.suppression_mode = SuppressionMode::Zero;
    let study = mortality_with_measures(vec![measure]);

    let patients: Vec<_> = (0..4).map(|i| patient(&format!("m{i}"), "M", 40)).collect();
    let output = run_study(&study, &patients, &RunConfig::default()).unwrap();
    let male = output.result("by_sex").unwrap().group(&["M"]).unwrap();
    assert_eq!(male.numerator, Some(0));
    assert_eq!(male.denominator, Some(4));
    assert_eq!(male.ratio, Ratio::Value(0.0));
}

#[test]
fn test_empty_population_gives_undefined_ratio() {
    let study = mortality_with_measures(vec![
        death_measure("overall", &[]),
        death_measure("by_sex", &["sex"]),
    ]);
    let output = run_study(&study, &[] as &[cohort_engine::PatientData], &RunConfig::default()).unwrap();

    assert_eq!(output.population_size, 0);
    let overall = output.result("overall").unwrap();
    assert_eq!(overall.rows.len(), 1);
    assert_eq!(overall.rows[0].denominator, Some(0));
    assert_eq!(overall.rows[0].ratio, Ratio::Undefined);
    assert!(output.result("by_sex").unwrap().rows.is_empty());
}

#[test]
fn test_measure_over_non_flag_is_rejected() {
    let mut measure = death_measure("bad", &[]);
    measure.numerator = "age".to_string();
    let mut definition = mortality_definition();
    definition.measures = vec![measure];
    let err = Study::compile(definition).unwrap_err();
    assert!(matches!(err, CohortError::InvalidMeasure { ref measure, .. } if measure == "bad"));
}

#[test]
fn test_measure_over_unknown_variable_is_rejected() {
    let mut definition = mortality_definition();
    definition.measures = vec![death_measure("bad", &["postcode"])];
    assert!(matches!(
        Study::compile(definition),
        Err(CohortError::UndefinedVariable { ref reference, .. }) if reference == "postcode"
    ));
}

#[test]
fn test_duplicate_measure_ids_are_rejected() {
    let mut definition = mortality_definition();
    definition.measures = vec![death_measure("death", &["sex"]), death_measure("death", &[])];
    let err = Study::compile(definition).unwrap_err();
    assert!(err.is_configuration_error());
}

#[test]
fn test_mistyped_flag_is_not_counted() {
    let mut definition = mortality_definition();
    definition.variables.push(VariableDefinition {
        name: "smoker".to_string(),
        kind: VariableKind::Attribute {
            field: "smoker".to_string(),
            value_type: ValueType::Bool,
        },
        return_expectations: None,
    });
    let mut measure = death_measure("smokers", &[]);
    measure.numerator = "smoker".to_string();
    definition.measures = vec![measure];
    let study = Study::compile(definition).unwrap();

    let mut patients = ten_patients();
    patients[0] = std::mem::take(&mut patients[0]).with_attribute("smoker", "no");
    patients[1] = std::mem::take(&mut patients[1]).with_attribute("smoker", "false");
    patients[2] = std::mem::take(&mut patients[2]).with_attribute("smoker", Value::Int(1));
    patients[5] = std::mem::take(&mut patients[5]).with_attribute("smoker", true);

    let config = RunConfig::default();
    let output = run_study(&study, &patients, &config).unwrap();
    let result = output.result("smokers").unwrap();
    assert_eq!(result.rows[0].numerator, Some(1));
    assert_eq!(result.rows[0].denominator, Some(10));

    // The extract reports the same cells the measure counted
    let rows = extract_population(&study, &patients, study.index_date(), &config).unwrap();
    let batch = extract_to_record_batch(study.schema(), &rows).unwrap();
    let smoker = batch
        .column_by_name("smoker")
        .unwrap()
        .as_any()
        .downcast_ref::<BooleanArray>()
        .unwrap();
    assert_eq!(smoker.true_count(), 1);
    assert_eq!(smoker.null_count(), 9);
    assert!(smoker.is_null(0) && smoker.is_null(1) && smoker.is_null(2));
    assert!(smoker.value(5));
}
