//! Tests for categorization against the bundled age bands

use cohort_engine::algorithm::resolver::Extraction;
use cohort_engine::study::definition::{CategoryDefinition, VariableKind};
use cohort_engine::{Categorizer, CohortError, Precedence, Study, Value, parse_expression};
use rustc_hash::FxHashMap;

use crate::utils::mortality_definition;

fn ageband_definition() -> CategoryDefinition {
    mortality_definition()
        .variables
        .into_iter()
        .find_map(|variable| match variable.kind {
            VariableKind::CategorisedAs(categories) if variable.name == "ageband5year" => {
                Some(categories)
            }
            _ => None,
        })
        .unwrap()
}

fn row_with_age(age: i64) -> FxHashMap<String, Value> {
    let mut row = FxHashMap::default();
    row.insert("age".to_string(), Value::Int(age));
    row
}

#[test]
fn test_age_bands_cover_every_age_exactly_once() {
    let definition = ageband_definition();
    let predicates: Vec<_> = definition
        .categories
        .iter()
        .map(|band| parse_expression(&band.expression, Precedence::Explicit).unwrap())
        .collect();
    let categorizer =
        Categorizer::from_definition("ageband5year", &definition, Precedence::Explicit).unwrap();

    for age in 0..=150 {
        let row = row_with_age(age);
        let matches = predicates.iter().filter(|p| p.evaluate(&row)).count();
        assert_eq!(matches, 1, "age {age} matched {matches} bands");
        assert!(categorizer.matching_band(&row).is_some());
        assert_ne!(categorizer.categorise(&row), categorizer.default_label());
    }
}

#[test]
fn test_age_band_labels() {
    let categorizer =
        Categorizer::from_definition("ageband5year", &ageband_definition(), Precedence::Explicit)
            .unwrap();
    for (age, label) in [(0, "0-4"), (4, "0-4"), (5, "5-9"), (52, "50-54"), (89, "85-89"), (90, "90+"), (150, "90+")] {
        assert_eq!(categorizer.categorise(&row_with_age(age)), label, "age {age}");
    }
}

#[test]
fn test_missing_age_falls_back_to_default() {
    let categorizer =
        Categorizer::from_definition("ageband5year", &ageband_definition(), Precedence::Explicit)
            .unwrap();
    let empty: FxHashMap<String, Value> = FxHashMap::default();
    assert_eq!(categorizer.matching_band(&empty), None);
    assert_eq!(categorizer.categorise(&empty), "");
    assert_eq!(categorizer.categorise(&row_with_age(-1)), "");
}

#[test]
fn test_compiled_study_carries_the_categorizer() {
    let study = Study::compile(mortality_definition()).unwrap();
    let ageband = study
        .variables()
        .iter()
        .find(|variable| variable.name == "ageband5year")
        .unwrap();
    let Extraction::Categorised(categorizer) = &ageband.extraction else {
        panic!("ageband5year should be a category");
    };
    assert_eq!(categorizer.labels().count(), 19);
    assert_eq!(categorizer.required_variables().into_iter().collect::<Vec<_>>(), vec!["age"]);
}

#[test]
fn test_duplicate_label_is_rejected() {
    let mut definition = mortality_definition();
    for variable in &mut definition.variables {
        if let VariableKind::CategorisedAs(categories) = &mut variable.kind {
            let first = categories.categories[0].clone();
            categories.categories.push(first);
        }
    }
    let err = Study::compile(definition).unwrap_err();
    assert!(matches!(err, CohortError::DuplicateCategoryLabel { ref label, .. } if label == "0-4"));
    assert!(err.is_configuration_error());
}

#[test]
fn test_swapping_disjoint_bands_keeps_labels() {
    let definition = ageband_definition();
    let original =
        Categorizer::from_definition("ageband5year", &definition, Precedence::Explicit).unwrap();

    for first in 0..definition.categories.len() - 1 {
        let mut swapped = definition.clone();
        swapped.categories.swap(first, first + 1);
        let reordered =
            Categorizer::from_definition("ageband5year", &swapped, Precedence::Explicit).unwrap();

        for age in 0..=150 {
            let row = row_with_age(age);
            assert_eq!(
                reordered.categorise(&row),
                original.categorise(&row),
                "age {age} after swapping bands {first} and {}",
                first + 1
            );
        }
    }
}

#[test]
fn test_first_matching_overlapping_band_wins() {
    let rule = |label: &str, expression: &str| {
        (label.to_string(), parse_expression(expression, Precedence::Explicit).unwrap())
    };
    let adults_first = Categorizer::new(
        "group",
        "unknown",
        vec![rule("adult", "age >= 18"), rule("everyone", "age >= 0")],
    )
    .unwrap();
    let everyone_first = Categorizer::new(
        "group",
        "unknown",
        vec![rule("everyone", "age >= 0"), rule("adult", "age >= 18")],
    )
    .unwrap();

    assert_eq!(adults_first.categorise(&row_with_age(40)), "adult");
    assert_eq!(everyone_first.categorise(&row_with_age(40)), "everyone");
    // Children only match the wider band, whatever the order
    assert_eq!(adults_first.categorise(&row_with_age(10)), "everyone");
    assert_eq!(everyone_first.categorise(&row_with_age(10)), "everyone");
}
