//! Observed data: the dataset representation and synthetic sample generation.

pub mod dataset;
pub mod sample;

pub use dataset::*;
pub use sample::*;
