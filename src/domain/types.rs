//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed by reference through the search and the fitter
//! - exported to JSON next to the fitted model
//! - built directly from CLI flags

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// File name of the final model inside the output directory.
pub const FINAL_MODEL_FILE: &str = "M.LCM.bif";

/// Smallest latent cardinality the search proposes.
pub const MIN_CARDINALITY: usize = 2;

/// A discrete random variable with a fixed, ordered set of state labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub states: Vec<String>,
}

impl Variable {
    pub fn new(name: impl Into<String>, states: Vec<String>) -> Self {
        Self {
            name: name.into(),
            states,
        }
    }

    /// Variable with states labelled `s0 .. s{n-1}`.
    pub fn with_cardinality(name: impl Into<String>, cardinality: usize) -> Self {
        Self::new(name, (0..cardinality).map(|i| format!("s{i}")).collect())
    }

    pub fn cardinality(&self) -> usize {
        self.states.len()
    }
}

/// Heuristic used by the fitter to escape poor local optima across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EscapeMethod {
    /// Advance all restarts in short bursts and repeatedly discard the worse half.
    ChickeringHeckerman,
    /// Run every restart to convergence and keep the best one.
    BestOfRestarts,
}

/// Settings handed to the EM fitter on every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmSettings {
    /// Number of random restarts per fit.
    pub restarts: usize,
    /// Maximum number of EM steps per restart.
    pub max_steps: usize,
    /// Stop once the log-likelihood improves by no more than this.
    pub threshold: f64,
    pub escape: EscapeMethod,
    /// Base seed for restart initializations.
    pub seed: u64,
}

impl Default for EmSettings {
    fn default() -> Self {
        Self {
            restarts: 20,
            max_steps: 100,
            threshold: 0.01,
            escape: EscapeMethod::ChickeringHeckerman,
            seed: 42,
        }
    }
}

impl EmSettings {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.restarts == 0 {
            return Err(AppError::new(2, "EM restart count must be > 0."));
        }
        if self.max_steps == 0 {
            return Err(AppError::new(2, "EM max steps must be > 0."));
        }
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(AppError::new(2, "EM threshold must be a positive number."));
        }
        Ok(())
    }
}

/// A full search run's configuration.
///
/// Built once (usually from CLI flags) and passed by reference into the search;
/// nothing mutates it during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub em: EmSettings,
    /// Minimum BIC gain required to accept a larger model (strict).
    pub bic_threshold: f64,
    /// Directory that receives the final model file.
    pub output_dir: PathBuf,
    /// Optional upper bound on the latent cardinality.
    pub max_cardinality: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            em: EmSettings::default(),
            bic_threshold: 1.0,
            output_dir: PathBuf::from("."),
            max_cardinality: None,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        self.em.validate()?;
        if !self.bic_threshold.is_finite() {
            return Err(AppError::new(2, "BIC threshold must be finite."));
        }
        if let Some(max) = self.max_cardinality {
            if max < MIN_CARDINALITY {
                return Err(AppError::new(
                    2,
                    format!("Max cardinality must be >= {MIN_CARDINALITY} (got {max})."),
                ));
            }
        }
        Ok(())
    }

    /// Path the final model is persisted to: `<output_dir>/M.LCM.bif`.
    pub fn final_model_path(&self) -> PathBuf {
        final_model_path(&self.output_dir)
    }
}

pub fn final_model_path(output_dir: &Path) -> PathBuf {
    output_dir.join(FINAL_MODEL_FILE)
}

/// One proposed cardinality increment and the decision taken on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchStep {
    pub cardinality: usize,
    pub score: f64,
    /// Candidate score minus the running best score.
    pub gain: f64,
    pub accepted: bool,
}
