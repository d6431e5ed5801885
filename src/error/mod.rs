//! Error handling for the cohort engine.
//!
//! Configuration problems are detected while a study definition is compiled,
//! before any patient is processed. Missing patient data is never an error:
//! it travels through the engine as an explicit missing value.

use std::io;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;

use crate::filter::parser::ParseError;

/// Specialized error type for the cohort engine
#[derive(Debug, thiserror::Error)]
pub enum CohortError {
    /// A date expression could not be parsed or resolved
    #[error("Invalid date expression '{expression}': {reason}")]
    InvalidDate {
        /// The offending expression
        expression: String,
        /// What went wrong
        reason: String,
    },

    /// A boolean expression failed to parse
    #[error("Invalid expression in '{context}': {source}")]
    Expression {
        /// Variable or section that owns the expression
        context: String,
        /// Parser failure
        #[source]
        source: ParseError,
    },

    /// Two variables share a name
    #[error("Variable '{0}' is defined more than once")]
    DuplicateVariable(String),

    /// A variable uses a name the engine reserves for itself
    #[error("'{0}' is a reserved name and cannot be used for a variable")]
    ReservedName(String),

    /// An expression or measure references an unknown variable
    #[error("'{context}' references undefined variable '{reference}'")]
    UndefinedVariable {
        /// The referencing variable, measure or section
        context: String,
        /// The unknown name
        reference: String,
    },

    /// The variable dependency graph contains a cycle
    #[error("Cyclic dependency between variables: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    /// A category declares the same label twice
    #[error("Category '{variable}' declares label '{label}' more than once")]
    DuplicateCategoryLabel {
        /// The categorised variable
        variable: String,
        /// The repeated label
        label: String,
    },

    /// A measure definition is inconsistent with the variables
    #[error("Measure '{measure}': {reason}")]
    InvalidMeasure {
        /// Measure identifier
        measure: String,
        /// What is wrong with it
        reason: String,
    },

    /// An event window combines incompatible bounds
    #[error("Invalid event window for '{variable}': {reason}")]
    InvalidWindow {
        /// The variable declaring the window
        variable: String,
        /// What is wrong with it
        reason: String,
    },

    /// Synthetic data expectations are unusable
    #[error("Invalid expectations for '{variable}': {reason}")]
    InvalidExpectations {
        /// The variable declaring the expectations
        variable: String,
        /// What is wrong with them
        reason: String,
    },

    /// The run was cancelled between patients
    #[error("Run cancelled")]
    Cancelled,

    /// Error opening, reading or writing a file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error decoding a study definition
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error building record batches or writing CSV
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Error writing Parquet output
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// Error creating the worker pool
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A blocking evaluation task failed to complete
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CohortError {
    /// Whether this error was raised while loading a study definition
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidDate { .. }
                | Self::Expression { .. }
                | Self::DuplicateVariable(_)
                | Self::ReservedName(_)
                | Self::UndefinedVariable { .. }
                | Self::CyclicDependency(_)
                | Self::DuplicateCategoryLabel { .. }
                | Self::InvalidMeasure { .. }
                | Self::InvalidWindow { .. }
                | Self::InvalidExpectations { .. }
        )
    }

    /// Create an invalid date error
    pub fn invalid_date(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDate {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid measure error
    pub fn invalid_measure(measure: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMeasure {
            measure: measure.into(),
            reason: reason.into(),
        }
    }

    /// Create an undefined variable error
    pub fn undefined(context: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::UndefinedVariable {
            context: context.into(),
            reference: reference.into(),
        }
    }
}

/// Result type for cohort engine operations
pub type Result<T> = std::result::Result<T, CohortError>;
