//! Latent class model: one hidden variable connected to every manifest variable.
//!
//! Parameters:
//! - `prior[y]             = P(Y = y)`
//! - `conditionals[i][y][x] = P(X_i = x | Y = y)`
//!
//! A model is never resized in place. A different cardinality always means a
//! fresh skeleton from a [`ModelFactory`].

use rand::Rng;
use rand_distr::Exp1;
use serde::{Deserialize, Serialize};

use crate::data::{DataCase, DataSet};
use crate::domain::{MIN_CARDINALITY, Variable};
use crate::error::AppError;

/// Name given to the hidden variable.
pub const LATENT_NAME: &str = "Y";

/// Tolerance when checking that a distribution sums to one.
const NORMALIZATION_TOL: f64 = 1e-6;

/// Builds unfitted skeletons for a given latent cardinality.
pub trait ModelFactory {
    fn create_skeleton(&self, manifests: &[Variable], cardinality: usize) -> Result<LatentClassModel, AppError>;
}

/// Default factory: uniform parameters everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct LcmFactory;

impl ModelFactory for LcmFactory {
    fn create_skeleton(&self, manifests: &[Variable], cardinality: usize) -> Result<LatentClassModel, AppError> {
        if manifests.is_empty() {
            return Err(AppError::new(3, "Cannot build a latent class model without manifest variables."));
        }
        if cardinality < MIN_CARDINALITY {
            return Err(AppError::new(
                2,
                format!("Latent cardinality must be >= {MIN_CARDINALITY} (got {cardinality})."),
            ));
        }
        if let Some(v) = manifests.iter().find(|v| v.cardinality() == 0) {
            return Err(AppError::new(2, format!("Manifest variable '{}' has no states.", v.name)));
        }

        let prior = vec![1.0 / cardinality as f64; cardinality];
        let conditionals = manifests
            .iter()
            .map(|v| vec![vec![1.0 / v.cardinality() as f64; v.cardinality()]; cardinality])
            .collect();

        Ok(LatentClassModel {
            latent: Variable::with_cardinality(LATENT_NAME, cardinality),
            manifests: manifests.to_vec(),
            prior,
            conditionals,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatentClassModel {
    latent: Variable,
    manifests: Vec<Variable>,
    prior: Vec<f64>,
    conditionals: Vec<Vec<Vec<f64>>>,
}

impl LatentClassModel {
    /// Build a model from explicit parameters, validating shapes and normalization.
    pub fn from_parameters(
        latent: Variable,
        manifests: Vec<Variable>,
        prior: Vec<f64>,
        conditionals: Vec<Vec<Vec<f64>>>,
    ) -> Result<Self, AppError> {
        let k = latent.cardinality();
        check_distribution(&prior, k, "latent prior")?;
        if conditionals.len() != manifests.len() {
            return Err(AppError::new(
                2,
                format!(
                    "Expected {} conditional tables, got {}.",
                    manifests.len(),
                    conditionals.len()
                ),
            ));
        }
        for (var, table) in manifests.iter().zip(&conditionals) {
            if table.len() != k {
                return Err(AppError::new(
                    2,
                    format!("Table for '{}' has {} rows, expected {k}.", var.name, table.len()),
                ));
            }
            for row in table {
                check_distribution(row, var.cardinality(), &var.name)?;
            }
        }

        Ok(Self {
            latent,
            manifests,
            prior,
            conditionals,
        })
    }

    pub fn latent(&self) -> &Variable {
        &self.latent
    }

    pub fn manifests(&self) -> &[Variable] {
        &self.manifests
    }

    /// Number of states of the hidden variable.
    pub fn cardinality(&self) -> usize {
        self.latent.cardinality()
    }

    pub fn prior(&self) -> &[f64] {
        &self.prior
    }

    /// `P(X_i | Y)` as `[latent state][manifest state]`.
    pub fn conditional(&self, manifest: usize) -> &[Vec<f64>] {
        &self.conditionals[manifest]
    }

    pub fn conditionals(&self) -> &[Vec<Vec<f64>>] {
        &self.conditionals
    }

    /// Number of free parameters: `(k - 1) + Σ k (|X_i| - 1)`.
    pub fn param_count(&self) -> usize {
        let k = self.cardinality();
        let edges: usize = self
            .manifests
            .iter()
            .map(|v| k * v.cardinality().saturating_sub(1))
            .sum();
        k.saturating_sub(1) + edges
    }

    /// Fail unless this model is defined over exactly the dataset's variables.
    pub fn check_compatible(&self, data: &DataSet) -> Result<(), AppError> {
        let vars = data.variables();
        if vars.len() != self.manifests.len() {
            return Err(AppError::new(
                4,
                format!(
                    "Model has {} manifest variables but the dataset has {}.",
                    self.manifests.len(),
                    vars.len()
                ),
            ));
        }
        for (m, v) in self.manifests.iter().zip(vars) {
            if m.name != v.name || m.cardinality() != v.cardinality() {
                return Err(AppError::new(
                    4,
                    format!(
                        "Model variable '{}' ({} states) does not match dataset variable '{}' ({} states).",
                        m.name,
                        m.cardinality(),
                        v.name,
                        v.cardinality()
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Fill `out[y]` with `ln P(Y = y, observed values)`; missing values are skipped.
    pub(crate) fn log_joint(&self, states: &[Option<usize>], out: &mut [f64]) {
        for (y, slot) in out.iter_mut().enumerate() {
            let mut acc = self.prior[y].ln();
            for (i, state) in states.iter().enumerate() {
                if let Some(x) = *state {
                    acc += self.conditionals[i][y][x].ln();
                }
            }
            *slot = acc;
        }
    }

    /// Weighted log-likelihood of the dataset.
    pub fn loglik(&self, data: &DataSet) -> f64 {
        let mut scratch = vec![0.0; self.cardinality()];
        data.cases()
            .iter()
            .map(|case| {
                self.log_joint(&case.states, &mut scratch);
                case.weight * log_sum_exp(&scratch)
            })
            .sum()
    }

    /// Posterior `P(Y | case)`.
    pub fn posterior(&self, case: &DataCase) -> Vec<f64> {
        let mut out = vec![0.0; self.cardinality()];
        self.log_joint(&case.states, &mut out);
        normalize_log(&mut out);
        out
    }

    /// A new model with the same structure and Dirichlet(1) random parameters.
    pub fn randomized<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let k = self.cardinality();
        let prior = random_distribution(rng, k);
        let conditionals: Vec<Vec<Vec<f64>>> = self
            .manifests
            .iter()
            .map(|v| {
                (0..k)
                    .map(|_| random_distribution(rng, v.cardinality()))
                    .collect::<Vec<_>>()
            })
            .collect();

        Self {
            latent: self.latent.clone(),
            manifests: self.manifests.clone(),
            prior,
            conditionals,
        }
    }

    /// Same structure, new parameters. Shapes are the caller's responsibility.
    pub(crate) fn with_parameters(&self, prior: Vec<f64>, conditionals: Vec<Vec<Vec<f64>>>) -> Self {
        Self {
            latent: self.latent.clone(),
            manifests: self.manifests.clone(),
            prior,
            conditionals,
        }
    }
}

/// `ln Σ exp(v)`, returning `-inf` when every entry is `-inf`.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Turn log-weights into probabilities in place.
pub(crate) fn normalize_log(values: &mut [f64]) -> f64 {
    let lse = log_sum_exp(values);
    if lse.is_finite() {
        for v in values.iter_mut() {
            *v = (*v - lse).exp();
        }
    } else {
        let uniform = 1.0 / values.len() as f64;
        values.iter_mut().for_each(|v| *v = uniform);
    }
    lse
}

fn random_distribution<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<f64> {
    // Normalized Exp(1) draws are Dirichlet(1, .., 1).
    let mut draws: Vec<f64> = (0..n).map(|_| rng.sample::<f64, _>(Exp1).max(1e-12)).collect();
    let total: f64 = draws.iter().sum();
    draws.iter_mut().for_each(|d| *d /= total);
    draws
}

fn check_distribution(values: &[f64], expected_len: usize, label: &str) -> Result<(), AppError> {
    if values.len() != expected_len {
        return Err(AppError::new(
            2,
            format!("Distribution for '{label}' has {} entries, expected {expected_len}.", values.len()),
        ));
    }
    if values.iter().any(|p| !(p.is_finite() && *p >= 0.0)) {
        return Err(AppError::new(2, format!("Distribution for '{label}' has invalid entries.")));
    }
    let total: f64 = values.iter().sum();
    if (total - 1.0).abs() > NORMALIZATION_TOL {
        return Err(AppError::new(
            2,
            format!("Distribution for '{label}' sums to {total:.6}, expected 1."),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn manifests() -> Vec<Variable> {
        vec![
            Variable::with_cardinality("a", 2),
            Variable::with_cardinality("b", 3),
        ]
    }

    #[test]
    fn skeleton_has_requested_shape() {
        for k in 2..6 {
            let model = LcmFactory.create_skeleton(&manifests(), k).unwrap();
            assert_eq!(model.cardinality(), k);
            assert_eq!(model.manifests(), manifests().as_slice());
            assert_eq!(model.conditional(1).len(), k);
            assert_eq!(model.conditional(1)[0].len(), 3);
        }
    }

    #[test]
    fn skeleton_rejects_degenerate_inputs() {
        assert_eq!(LcmFactory.create_skeleton(&[], 2).unwrap_err().exit_code(), 3);
        assert_eq!(LcmFactory.create_skeleton(&manifests(), 1).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn param_count_matches_formula() {
        let model = LcmFactory.create_skeleton(&manifests(), 3).unwrap();
        // (3 - 1) + 3 * (2 - 1) + 3 * (3 - 1)
        assert_eq!(model.param_count(), 2 + 3 + 6);
    }

    #[test]
    fn randomized_leaves_skeleton_untouched() {
        let skeleton = LcmFactory.create_skeleton(&manifests(), 3).unwrap();
        let before = skeleton.clone();
        let mut rng = StdRng::seed_from_u64(7);
        let random = skeleton.randomized(&mut rng);

        assert_eq!(skeleton, before);
        assert_ne!(random, skeleton);
        let total: f64 = random.prior().iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn uniform_model_loglik_is_sum_of_uniform_terms() {
        let vars = manifests();
        let data = DataSet::from_rows(vars.clone(), vec![vec![Some(0), Some(2)], vec![Some(1), None]]).unwrap();
        let model = LcmFactory.create_skeleton(&vars, 2).unwrap();
        let expected = (0.5f64 * (1.0 / 3.0)).ln() + 0.5f64.ln();
        assert!((model.loglik(&data) - expected).abs() < 1e-12);
    }

    #[test]
    fn posterior_sums_to_one() {
        let vars = manifests();
        let model = LcmFactory
            .create_skeleton(&vars, 4)
            .unwrap()
            .randomized(&mut StdRng::seed_from_u64(1));
        let case = DataCase {
            states: vec![Some(1), Some(0)],
            weight: 1.0,
        };
        let post = model.posterior(&case);
        assert_eq!(post.len(), 4);
        assert!((post.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn check_compatible_detects_mismatch() {
        let model = LcmFactory.create_skeleton(&manifests(), 2).unwrap();
        let other = DataSet::from_rows(vec![Variable::with_cardinality("a", 2)], vec![vec![Some(0)]]).unwrap();
        assert_eq!(model.check_compatible(&other).unwrap_err().exit_code(), 4);
    }

    #[test]
    fn from_parameters_rejects_unnormalized_rows() {
        let latent = Variable::with_cardinality(LATENT_NAME, 2);
        let vars = vec![Variable::with_cardinality("a", 2)];
        let err = LatentClassModel::from_parameters(
            latent,
            vars,
            vec![0.5, 0.5],
            vec![vec![vec![0.5, 0.6], vec![0.5, 0.5]]],
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn log_sum_exp_handles_all_negative_infinity() {
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY; 3]), f64::NEG_INFINITY);
        assert!((log_sum_exp(&[0.0, 0.0]) - 2f64.ln()).abs() < 1e-12);
    }
}
