//! Expectations describing what synthetic data should look like
//!
//! A study carries `default_expectations`; each variable may override parts
//! of them with `return_expectations`. Only the synthetic data generator
//! reads these, the evaluation engine ignores them.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Date range for generated dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateExpectation {
    /// Earliest generated date
    pub earliest: NaiveDate,
    /// Latest generated date
    pub latest: NaiveDate,
}

/// How generated dates are spread over the date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rate {
    /// Every patient gets a value
    Universal,
    /// Dates uniformly spread over the range
    Uniform,
    /// Dates increasingly likely towards the end of the range
    ExponentialIncrease,
}

/// Shape of a numeric distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    /// Gaussian with `mean` and `stddev`
    Normal,
    /// Uniform between `mean - stddev` and `mean + stddev`
    Uniform,
    /// Ages shaped like a general practice population
    PopulationAges,
}

/// Numeric distribution parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericExpectation {
    /// Distribution shape
    pub distribution: Distribution,
    /// Mean (ignored by `population_ages`)
    #[serde(default)]
    pub mean: f64,
    /// Standard deviation or half-width (ignored by `population_ages`)
    #[serde(default)]
    pub stddev: f64,
}

/// Relative frequencies of category labels
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryExpectation {
    /// Weight per label
    pub ratios: BTreeMap<String, f64>,
}

/// Expectations for a variable or the study as a whole
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Expectations {
    /// Date range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateExpectation>,
    /// Date spread or universality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<Rate>,
    /// Fraction of patients with a value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incidence: Option<f64>,
    /// Integer distribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int: Option<NumericExpectation>,
    /// Float distribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub float: Option<NumericExpectation>,
    /// Category frequencies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryExpectation>,
}

impl Expectations {
    /// Combine with defaults, preferring values set on `self`
    #[must_use]
    pub fn merged_over(&self, defaults: &Self) -> Self {
        Self {
            date: self.date.or(defaults.date),
            rate: self.rate.or(defaults.rate),
            incidence: self.incidence.or(defaults.incidence),
            int: self.int.or(defaults.int),
            float: self.float.or(defaults.float),
            category: self.category.clone().or_else(|| defaults.category.clone()),
        }
    }

    /// Fraction of patients that should get a value
    ///
    /// A `universal` rate overrides any incidence.
    #[must_use]
    pub fn effective_incidence(&self) -> f64 {
        if self.rate == Some(Rate::Universal) {
            1.0
        } else {
            self.incidence.unwrap_or(1.0).clamp(0.0, 1.0)
        }
    }
}
