//! Input/output helpers.
//!
//! - CSV ingest (`ingest`)
//! - model files in BIF (`bif`)
//! - search run exports as JSON (`export`)

pub mod bif;
pub mod export;
pub mod ingest;

pub use bif::*;
pub use export::*;
pub use ingest::*;
