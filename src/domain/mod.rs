//! Domain types used throughout the search.
//!
//! This module defines:
//!
//! - discrete variables (`Variable`)
//! - run configuration (`EmSettings`, `SearchConfig`, `EscapeMethod`)
//! - search diagnostics (`SearchStep`)

pub mod types;

pub use types::*;
