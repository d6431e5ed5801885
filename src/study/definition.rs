//! Study definition schema
//!
//! Pure data: these types describe a study exactly as written in its JSON
//! configuration and perform no validation. [`crate::study::Study::compile`]
//! turns a definition into an executable study.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::filter::Precedence;
use crate::models::ValueType;
use crate::study::expectations::Expectations;

/// A complete study: index date, population, variables and measures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyDefinition {
    /// Index date as an ISO date
    pub index_date: String,
    /// Defaults for synthetic data generation
    #[serde(default)]
    pub default_expectations: Expectations,
    /// How AND/OR mixing is treated in every expression of the study
    #[serde(default)]
    pub expression_precedence: Precedence,
    /// The study population
    pub population: PopulationDefinition,
    /// Variables extracted for every patient, in declaration order
    #[serde(default)]
    pub variables: Vec<VariableDefinition>,
    /// Measures computed over the population
    #[serde(default)]
    pub measures: Vec<MeasureDefinition>,
}

impl StudyDefinition {
    /// Parse a definition from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a definition from a JSON file
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// The population filter and the variables only it needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationDefinition {
    /// Boolean expression deciding membership
    pub expression: String,
    /// Variables declared alongside the filter, sharing the study namespace
    #[serde(default)]
    pub variables: Vec<VariableDefinition>,
}

/// A named variable and how to extract it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDefinition {
    /// Unique name
    pub name: String,
    /// Extraction rule
    #[serde(flatten)]
    pub kind: VariableKind,
    /// Overrides of the default expectations for synthetic data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_expectations: Option<Expectations>,
}

/// Extraction rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VariableKind {
    /// Whether a registration period covers the date
    RegisteredAsOf {
        /// Date expression
        date: String,
    },

    /// Age in whole years on the date
    AgeAsOf {
        /// Date expression
        date: String,
    },

    /// A fixed attribute of the patient
    Attribute {
        /// Attribute name
        field: String,
        /// Declared value type
        #[serde(default = "default_value_type")]
        value_type: ValueType,
    },

    /// The latest value of a time-varying field on or before the date
    ValueAsOf {
        /// Timeline name
        field: String,
        /// Date expression
        date: String,
        /// Declared value type
        #[serde(default = "default_value_type")]
        value_type: ValueType,
    },

    /// Events of one type within a date window
    EventInWindow {
        /// Event timeline name
        event: String,
        /// Upper bound of the window
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_or_before: Option<String>,
        /// Lower bound of the window
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_or_after: Option<String>,
        /// Both bounds of the window
        #[serde(default, skip_serializing_if = "Option::is_none")]
        between: Option<[String; 2]>,
        /// What to return about the matching events
        #[serde(default)]
        returning: EventReturn,
        /// Which matching event a date return refers to
        #[serde(default)]
        find: EventMatch,
    },

    /// A label chosen by ordered predicates
    CategorisedAs(CategoryDefinition),

    /// A flag computed from other variables
    Satisfying {
        /// Boolean expression
        expression: String,
    },
}

const fn default_value_type() -> ValueType {
    ValueType::Str
}

/// What an event extraction returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventReturn {
    /// Whether any event matched
    #[default]
    BinaryFlag,
    /// Date of the selected matching event
    Date,
    /// Number of matching events
    NumberOfMatches,
}

/// Which event a date return refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventMatch {
    /// Earliest matching event
    #[default]
    First,
    /// Latest matching event
    Last,
}

/// A category: ordered bands and a default label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    /// Label used when no band matches
    #[serde(default)]
    pub default: String,
    /// Bands in evaluation order
    pub categories: Vec<BandDefinition>,
}

/// One labelled predicate of a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandDefinition {
    /// Label assigned on match
    pub label: String,
    /// Boolean expression
    pub expression: String,
}

/// A grouped numerator/denominator ratio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureDefinition {
    /// Identifier, used in output file names
    pub id: String,
    /// Binary flag counted in the numerator
    pub numerator: String,
    /// Binary flag counted in the denominator, usually `population`
    pub denominator: String,
    /// Dimensions to group by
    #[serde(default)]
    pub group_by: Vec<String>,
    /// Whether small counts are withheld
    #[serde(default)]
    pub small_number_suppression: bool,
    /// Largest count that is withheld when suppression is on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppression_threshold: Option<u64>,
    /// How withheld cells are reported
    #[serde(default)]
    pub suppression_mode: SuppressionMode,
}

/// How suppressed cells are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionMode {
    /// Counts and ratio are left empty
    #[default]
    Redact,
    /// Counts are reported as zero and the ratio left empty
    Zero,
}
