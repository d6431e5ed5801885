//! Categorization of resolved rows into labelled bands
//!
//! Bands are tried in declaration order and the first matching predicate
//! wins. Rows matching no band receive the default label; whether the bands
//! cover the intended domain is up to the study author.

use std::collections::BTreeSet;

use rustc_hash::FxHashSet;

use crate::error::{CohortError, Result};
use crate::filter::{Expr, Precedence, parse_expression};
use crate::models::VariableLookup;
use crate::study::definition::CategoryDefinition;

/// Ordered labelled predicates with a default label
#[derive(Debug, Clone, PartialEq)]
pub struct Categorizer {
    default: String,
    rules: Vec<(String, Expr)>,
}

impl Categorizer {
    /// Create a categorizer, rejecting repeated labels
    pub fn new(variable: &str, default: impl Into<String>, rules: Vec<(String, Expr)>) -> Result<Self> {
        let mut seen = FxHashSet::default();
        for (label, _) in &rules {
            if !seen.insert(label.as_str()) {
                return Err(CohortError::DuplicateCategoryLabel {
                    variable: variable.to_string(),
                    label: label.clone(),
                });
            }
        }
        Ok(Self {
            default: default.into(),
            rules,
        })
    }

    /// Compile a category definition, parsing every band's expression
    pub fn from_definition(
        variable: &str,
        definition: &CategoryDefinition,
        precedence: Precedence,
    ) -> Result<Self> {
        let rules = definition
            .categories
            .iter()
            .map(|band| {
                parse_expression(&band.expression, precedence)
                    .map(|expr| (band.label.clone(), expr))
                    .map_err(|source| CohortError::Expression {
                        context: format!("{variable}[{}]", band.label),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(variable, definition.default.clone(), rules)
    }

    /// Label of the first matching band, or the default
    pub fn categorise<L: VariableLookup + ?Sized>(&self, row: &L) -> &str {
        self.rules
            .iter()
            .find(|(_, predicate)| predicate.evaluate(row))
            .map_or(self.default.as_str(), |(label, _)| label.as_str())
    }

    /// Label of the first matching band, `None` when the default would apply
    pub fn matching_band<L: VariableLookup + ?Sized>(&self, row: &L) -> Option<&str> {
        self.rules
            .iter()
            .find(|(_, predicate)| predicate.evaluate(row))
            .map(|(label, _)| label.as_str())
    }

    /// The default label
    #[must_use]
    pub fn default_label(&self) -> &str {
        &self.default
    }

    /// Band labels in evaluation order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(label, _)| label.as_str())
    }

    /// Variables read by any band
    #[must_use]
    pub fn required_variables(&self) -> BTreeSet<String> {
        self.rules
            .iter()
            .flat_map(|(_, predicate)| predicate.required_variables())
            .collect()
    }
}
