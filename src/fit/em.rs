//! EM parameter fitting with random restarts.
//!
//! Every fit starts from `restarts` independent random initializations of the
//! skeleton. Restarts share nothing but the read-only dataset, so they run on
//! rayon workers and are reduced to a single best-of-restarts model.
//!
//! Escape methods:
//! - `ChickeringHeckerman`: advance every restart by a short burst of EM steps,
//!   drop the worse half, repeat until one restart is left, then run it to
//!   convergence.
//! - `BestOfRestarts`: run every restart to convergence, keep the best.
//!
//! Ranking uses the log-likelihood of each restart's model as it stands after
//! its last burst; ties are broken by restart index so the result does not
//! depend on scheduling.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use tracing::{debug, debug_span, trace};

use crate::data::DataSet;
use crate::domain::{EmSettings, EscapeMethod};
use crate::error::AppError;
use crate::models::LatentClassModel;
use crate::models::lcm::normalize_log;

/// Fits the parameters of a skeleton to a dataset.
pub trait ModelFitter {
    /// Return a new, fitted model. Neither `skeleton` nor `data` is modified.
    fn fit(
        &self,
        skeleton: &LatentClassModel,
        data: &DataSet,
        settings: &EmSettings,
    ) -> Result<LatentClassModel, AppError>;
}

/// Expectation-maximization fitter.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmFitter;

impl ModelFitter for EmFitter {
    fn fit(
        &self,
        skeleton: &LatentClassModel,
        data: &DataSet,
        settings: &EmSettings,
    ) -> Result<LatentClassModel, AppError> {
        settings.validate()?;
        data.ensure_fittable()?;
        skeleton.check_compatible(data)?;

        let k = skeleton.cardinality();
        let _span = debug_span!("em", cardinality = k, restarts = settings.restarts).entered();

        let pool: Vec<RestartRun> = (0..settings.restarts)
            .map(|index| {
                let mut rng = StdRng::seed_from_u64(restart_seed(settings.seed, k, index));
                RestartRun::new(index, skeleton.randomized(&mut rng))
            })
            .collect();

        let best = match settings.escape {
            EscapeMethod::ChickeringHeckerman => chickering_heckerman(pool, data, settings)?,
            EscapeMethod::BestOfRestarts => best_of_restarts(pool, data, settings)?,
        };

        debug!(
            restart = best.index,
            steps = best.steps,
            converged = best.converged,
            loglik = best.current,
            "EM finished"
        );
        Ok(best.model)
    }
}

/// One independent EM run from a random start.
#[derive(Debug, Clone)]
struct RestartRun {
    index: usize,
    model: LatentClassModel,
    /// Log-likelihood from the most recent E-step, i.e. of the model before
    /// the last M-step. Drives the convergence test.
    loglik: f64,
    /// Log-likelihood of `model` itself. Used for ranking restarts.
    current: f64,
    steps: usize,
    converged: bool,
}

impl RestartRun {
    fn new(index: usize, model: LatentClassModel) -> Self {
        Self {
            index,
            model,
            loglik: f64::NEG_INFINITY,
            current: f64::NEG_INFINITY,
            steps: 0,
            converged: false,
        }
    }

    fn is_done(&self, max_steps: usize) -> bool {
        self.converged || self.steps >= max_steps
    }

    /// Run up to `budget` EM steps, stopping early on convergence or at `max_steps`.
    fn advance(&mut self, data: &DataSet, budget: usize, settings: &EmSettings) -> Result<(), AppError> {
        let mut remaining = budget;
        while remaining > 0 && !self.is_done(settings.max_steps) {
            let stats = ExpectedCounts::collect(&self.model, data);
            if !stats.loglik.is_finite() {
                return Err(AppError::new(
                    4,
                    format!("Non-finite log-likelihood in EM restart {} at step {}.", self.index, self.steps),
                ));
            }

            let improvement = stats.loglik - self.loglik;
            self.loglik = stats.loglik;
            if improvement <= settings.threshold {
                self.converged = true;
                break;
            }

            self.model = stats.maximize(&self.model);
            self.steps += 1;
            remaining -= 1;
        }

        // A converged run stopped before its M-step, so its E-step value is current.
        self.current = if self.converged {
            self.loglik
        } else {
            self.model.loglik(data)
        };
        if !self.current.is_finite() {
            return Err(AppError::new(
                4,
                format!("Non-finite log-likelihood in EM restart {} after step {}.", self.index, self.steps),
            ));
        }

        trace!(restart = self.index, steps = self.steps, loglik = self.loglik, "restart advanced");
        Ok(())
    }
}

/// Expected sufficient statistics from one E-step.
struct ExpectedCounts {
    loglik: f64,
    prior: Vec<f64>,
    conditionals: Vec<Vec<Vec<f64>>>,
}

impl ExpectedCounts {
    fn collect(model: &LatentClassModel, data: &DataSet) -> Self {
        let k = model.cardinality();
        let mut prior = vec![0.0; k];
        let mut conditionals: Vec<Vec<Vec<f64>>> = model
            .manifests()
            .iter()
            .map(|v| vec![vec![0.0; v.cardinality()]; k])
            .collect();

        let mut loglik = 0.0;
        let mut posterior = vec![0.0; k];
        for case in data.cases() {
            model.log_joint(&case.states, &mut posterior);
            loglik += case.weight * normalize_log(&mut posterior);

            for (y, p) in posterior.iter().enumerate() {
                let w = case.weight * p;
                prior[y] += w;
                for (i, state) in case.states.iter().enumerate() {
                    if let Some(x) = *state {
                        conditionals[i][y][x] += w;
                    }
                }
            }
        }

        Self {
            loglik,
            prior,
            conditionals,
        }
    }

    /// M-step: normalize the expected counts into a new model.
    fn maximize(mut self, model: &LatentClassModel) -> LatentClassModel {
        normalize_counts(&mut self.prior);
        for table in self.conditionals.iter_mut() {
            for row in table.iter_mut() {
                normalize_counts(row);
            }
        }
        model.with_parameters(self.prior, self.conditionals)
    }
}

/// Normalize counts in place; an all-zero row becomes uniform.
fn normalize_counts(counts: &mut [f64]) {
    let total: f64 = counts.iter().sum();
    if total > 0.0 && total.is_finite() {
        counts.iter_mut().for_each(|c| *c /= total);
    } else {
        let uniform = 1.0 / counts.len() as f64;
        counts.iter_mut().for_each(|c| *c = uniform);
    }
}

fn chickering_heckerman(
    mut pool: Vec<RestartRun>,
    data: &DataSet,
    settings: &EmSettings,
) -> Result<RestartRun, AppError> {
    let rounds = (pool.len() as f64).log2().ceil() as usize;
    let burst = (settings.max_steps / (rounds + 1)).max(1);

    while pool.len() > 1 {
        advance_all(&mut pool, data, burst, settings)?;
        rank(&mut pool);
        let keep = pool.len().div_ceil(2);
        pool.truncate(keep);
        debug!(survivors = pool.len(), best_loglik = pool[0].current, "screening round");
    }

    let mut winner = pool
        .pop()
        .ok_or_else(|| AppError::new(4, "EM restart pool is empty."))?;
    winner.advance(data, settings.max_steps, settings)?;
    Ok(winner)
}

fn best_of_restarts(
    mut pool: Vec<RestartRun>,
    data: &DataSet,
    settings: &EmSettings,
) -> Result<RestartRun, AppError> {
    advance_all(&mut pool, data, settings.max_steps, settings)?;
    rank(&mut pool);
    pool.into_iter()
        .next()
        .ok_or_else(|| AppError::new(4, "EM restart pool is empty."))
}

fn advance_all(pool: &mut [RestartRun], data: &DataSet, budget: usize, settings: &EmSettings) -> Result<(), AppError> {
    pool.par_iter_mut()
        .try_for_each(|run| run.advance(data, budget, settings))
}

/// Best current log-likelihood first; ties by restart index.
fn rank(pool: &mut [RestartRun]) {
    pool.sort_by(|a, b| {
        b.current
            .partial_cmp(&a.current)
            .unwrap_or(Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });
}

fn restart_seed(seed: u64, cardinality: usize, index: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    cardinality.hash(&mut hasher);
    index.hash(&mut hasher);
    hasher.finish()
}
