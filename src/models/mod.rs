//! Latent class model representation and skeleton construction.

pub mod lcm;

pub use lcm::*;
