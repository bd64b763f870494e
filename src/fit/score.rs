//! Penalized goodness-of-fit scores.
//!
//! BIC in the "higher is better" convention used by the search:
//!
//! ```text
//! BIC = ln L - (d / 2) * ln(N)
//! ```
//!
//! where `d` is the number of free parameters and `N` the total case weight.

use crate::data::DataSet;
use crate::models::LatentClassModel;

/// Scores a fitted model against a dataset. Implementations must be pure.
pub trait ScoreFunction {
    fn score(&self, model: &LatentClassModel, data: &DataSet) -> f64;
}

impl<F> ScoreFunction for F
where
    F: Fn(&LatentClassModel, &DataSet) -> f64,
{
    fn score(&self, model: &LatentClassModel, data: &DataSet) -> f64 {
        self(model, data)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BicScore;

impl ScoreFunction for BicScore {
    fn score(&self, model: &LatentClassModel, data: &DataSet) -> f64 {
        bic(model.loglik(data), model.param_count(), data.total_weight())
    }
}

pub fn bic(loglik: f64, param_count: usize, sample_size: f64) -> f64 {
    loglik - 0.5 * param_count as f64 * sample_size.ln()
}
