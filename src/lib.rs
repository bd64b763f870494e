//! `lcm-search` library crate.
//!
//! Searches for the number of states of the single hidden variable in a latent
//! class model: fit candidates of growing cardinality by EM with restarts,
//! score them with BIC, stop at the first increment that does not pay off.
//!
//! The binary (`lcm`) is a thin wrapper around this library so that the core
//! logic is testable without spawning processes.

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod models;
pub mod report;
