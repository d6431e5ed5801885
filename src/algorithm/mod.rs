//! Algorithm implementations for cohort studies
//!
//! Variable resolution, categorization, measure aggregation and the
//! parallel population runner built on top of them.

pub mod categorizer;
pub mod measure;
pub mod population;
pub mod resolver;
