//! Shared utilities: tabular output and logging

pub mod io;
pub mod logging;
