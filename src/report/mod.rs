//! Reporting utilities: formatted terminal output for search and fit runs.

pub mod format;

pub use format::*;
