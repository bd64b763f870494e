//! Fitting and model search.
//!
//! Responsibilities:
//!
//! - fit a skeleton's parameters by EM with random restarts (`em`)
//! - score fitted models with BIC (`score`)
//! - grow the latent cardinality until the score stops improving (`search`)

pub mod em;
pub mod score;
pub mod search;

pub use em::*;
pub use score::*;
pub use search::*;
