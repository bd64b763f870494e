//! Cardinality search for a single latent variable.
//!
//! Starting from a fitted model at the initial cardinality, the search keeps
//! proposing a fresh skeleton with one more latent state, fits it, and accepts
//! it only if its score beats the running best by strictly more than
//! `bic_threshold`. The first rejected increment ends the search.
//!
//! Policy notes:
//! - Growth is greedy and never backtracks; only adjacent cardinalities
//!   (`k` vs `k + 1`) are compared.
//! - Each candidate is fitted from an untrained skeleton. Parameters of the
//!   previous best are never used as a warm start.
//! - Any failure aborts the whole run; there is no partial result.

use serde::Serialize;
use tracing::{info, info_span};

use crate::data::DataSet;
use crate::domain::{MIN_CARDINALITY, SearchConfig, SearchStep};
use crate::error::AppError;
use crate::fit::em::{EmFitter, ModelFitter};
use crate::fit::score::{BicScore, ScoreFunction};
use crate::models::{LatentClassModel, LcmFactory, ModelFactory};

/// Result of a search run.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub best: LatentClassModel,
    pub best_score: f64,
    /// Score of the fitted initial model.
    pub initial_score: f64,
    /// Every proposed increment, in order.
    pub steps: Vec<SearchStep>,
}

impl SearchOutcome {
    pub fn cardinality(&self) -> usize {
        self.best.cardinality()
    }
}

/// Drives the search over its three collaborators.
#[derive(Debug, Clone, Default)]
pub struct SearchController<F = EmFitter, S = BicScore, M = LcmFactory> {
    fitter: F,
    scorer: S,
    factory: M,
}

impl SearchController {
    /// EM fitting, BIC scoring, uniform skeletons.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<F, S, M> SearchController<F, S, M>
where
    F: ModelFitter,
    S: ScoreFunction,
    M: ModelFactory,
{
    pub fn with_parts(fitter: F, scorer: S, factory: M) -> Self {
        Self {
            fitter,
            scorer,
            factory,
        }
    }

    /// Search from a latent class model with the minimum cardinality.
    pub fn search(&self, data: &DataSet, config: &SearchConfig) -> Result<SearchOutcome, AppError> {
        config.validate()?;
        data.ensure_fittable()?;
        let initial = self.factory.create_skeleton(data.variables(), MIN_CARDINALITY)?;
        self.search_from(&initial, data, MIN_CARDINALITY, config)
    }

    /// Search starting from `initial`, whose cardinality must be `start_cardinality`.
    pub fn search_from(
        &self,
        initial: &LatentClassModel,
        data: &DataSet,
        start_cardinality: usize,
        config: &SearchConfig,
    ) -> Result<SearchOutcome, AppError> {
        config.validate()?;
        data.ensure_fittable()?;
        if initial.cardinality() != start_cardinality {
            return Err(AppError::new(
                2,
                format!(
                    "Initial model has cardinality {} but the search was asked to start at {start_cardinality}.",
                    initial.cardinality()
                ),
            ));
        }

        let _span = info_span!("lcm_search", start = start_cardinality).entered();

        let mut best = self
            .fitter
            .fit(initial, data, &config.em)
            .and_then(|fitted| ensure_cardinality(fitted, start_cardinality))
            .map_err(|e| e.context(format!("Fitting initial cardinality {start_cardinality}")))?;
        let mut best_score = self.scorer.score(&best, data);
        let initial_score = best_score;
        let mut current = start_cardinality;
        let mut steps = Vec::new();
        info!(cardinality = current, score = best_score, "initial model fitted");

        loop {
            if config.max_cardinality.is_some_and(|max| current >= max) {
                info!(cardinality = current, "max cardinality reached");
                break;
            }

            let next = current + 1;
            let _step = info_span!("step", cardinality = next).entered();
            let (candidate, score) = self
                .evaluate(next, data, config)
                .map_err(|e| e.context(format!("Cardinality step {current} -> {next}")))?;

            let gain = score - best_score;
            let accepted = gain > config.bic_threshold;
            steps.push(SearchStep {
                cardinality: next,
                score,
                gain,
                accepted,
            });

            if accepted {
                info!(score, gain, "candidate accepted");
                best = candidate;
                best_score = score;
                current = next;
            } else {
                info!(score, gain, threshold = config.bic_threshold, "candidate rejected");
                break;
            }
        }

        Ok(SearchOutcome {
            best,
            best_score,
            initial_score,
            steps,
        })
    }

    /// Build, fit and score a fresh candidate.
    fn evaluate(
        &self,
        cardinality: usize,
        data: &DataSet,
        config: &SearchConfig,
    ) -> Result<(LatentClassModel, f64), AppError> {
        let skeleton = self.factory.create_skeleton(data.variables(), cardinality)?;
        let fitted = ensure_cardinality(self.fitter.fit(&skeleton, data, &config.em)?, cardinality)?;
        let score = self.scorer.score(&fitted, data);
        Ok((fitted, score))
    }
}

fn ensure_cardinality(model: LatentClassModel, expected: usize) -> Result<LatentClassModel, AppError> {
    if model.cardinality() != expected {
        return Err(AppError::new(
            4,
            format!(
                "Fitter returned a model with {} latent states, expected {expected}.",
                model.cardinality()
            ),
        ));
    }
    Ok(model)
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::data::{SampleSpec, simulate};
    use crate::domain::{EmSettings, EscapeMethod, Variable};

    /// Returns the skeleton unchanged and records every call.
    #[derive(Default)]
    struct RecordingFitter {
        seen: RefCell<Vec<LatentClassModel>>,
    }

    impl ModelFitter for RecordingFitter {
        fn fit(
            &self,
            skeleton: &LatentClassModel,
            _data: &DataSet,
            _settings: &EmSettings,
        ) -> Result<LatentClassModel, AppError> {
            self.seen.borrow_mut().push(skeleton.clone());
            Ok(skeleton.clone())
        }
    }

    /// Fails once the skeleton reaches `from` states; counts calls.
    struct FailingFitter {
        from: usize,
        calls: Cell<usize>,
    }

    impl FailingFitter {
        fn from(from: usize) -> Self {
            Self {
                from,
                calls: Cell::new(0),
            }
        }
    }

    impl ModelFitter for FailingFitter {
        fn fit(
            &self,
            skeleton: &LatentClassModel,
            _data: &DataSet,
            _settings: &EmSettings,
        ) -> Result<LatentClassModel, AppError> {
            self.calls.set(self.calls.get() + 1);
            if skeleton.cardinality() >= self.from {
                Err(AppError::new(4, "EM did not converge"))
            } else {
                Ok(skeleton.clone())
            }
        }
    }

    /// Always answers with a fresh skeleton of a fixed cardinality.
    struct ResizingFitter {
        cardinality: usize,
    }

    impl ModelFitter for ResizingFitter {
        fn fit(
            &self,
            skeleton: &LatentClassModel,
            _data: &DataSet,
            _settings: &EmSettings,
        ) -> Result<LatentClassModel, AppError> {
            LcmFactory.create_skeleton(skeleton.manifests(), self.cardinality)
        }
    }

    fn scores(table: &'static [(usize, f64)]) -> impl Fn(&LatentClassModel, &DataSet) -> f64 {
        move |m: &LatentClassModel, _: &DataSet| {
            table
                .iter()
                .find(|(k, _)| *k == m.cardinality())
                .map(|(_, s)| *s)
                .unwrap_or(f64::NEG_INFINITY)
        }
    }

    fn small_data() -> DataSet {
        simulate(&SampleSpec {
            classes: 2,
            variables: 3,
            states: 2,
            cases: 50,
            seed: 4,
        })
        .unwrap()
    }

    fn config() -> SearchConfig {
        SearchConfig::default()
    }

    #[test]
    fn stops_at_first_plateau() {
        let controller = SearchController::with_parts(
            RecordingFitter::default(),
            scores(&[(2, 10.0), (3, 15.0), (4, 15.5)]),
            LcmFactory,
        );
        let outcome = controller.search(&small_data(), &config()).unwrap();

        assert_eq!(outcome.cardinality(), 3);
        assert_eq!(outcome.best_score, 15.0);
        assert_eq!(outcome.initial_score, 10.0);
        assert_eq!(outcome.steps.len(), 2);
        assert!(outcome.steps[0].accepted);
        assert_eq!(outcome.steps[0].gain, 5.0);
        assert!(!outcome.steps[1].accepted);
        assert_eq!(outcome.steps[1].cardinality, 4);
        assert_eq!(outcome.steps[1].gain, 0.5);
    }

    #[test]
    fn gain_equal_to_threshold_is_rejected() {
        let controller = SearchController::with_parts(
            RecordingFitter::default(),
            scores(&[(2, 10.0), (3, 11.0)]),
            LcmFactory,
        );
        let config = SearchConfig {
            bic_threshold: 1.0,
            ..config()
        };
        let outcome = controller.search(&small_data(), &config).unwrap();

        assert_eq!(outcome.cardinality(), 2);
        assert_eq!(outcome.steps.len(), 1);
        assert!(!outcome.steps[0].accepted);
    }

    #[test]
    fn every_candidate_starts_from_a_fresh_skeleton() {
        let fitter = RecordingFitter::default();
        let controller = SearchController::with_parts(
            fitter,
            scores(&[(2, 1.0), (3, 5.0), (4, 9.0), (5, 9.0)]),
            LcmFactory,
        );
        let data = small_data();
        let outcome = controller.search(&data, &config()).unwrap();
        assert_eq!(outcome.cardinality(), 4);

        let seen = controller.fitter.seen.borrow();
        let cardinalities: Vec<usize> = seen.iter().map(|m| m.cardinality()).collect();
        assert_eq!(cardinalities, vec![2, 3, 4, 5]);
        for model in seen.iter() {
            let fresh = LcmFactory.create_skeleton(data.variables(), model.cardinality()).unwrap();
            assert_eq!(*model, fresh);
        }
    }

    #[test]
    fn fitting_failure_aborts_the_search() {
        let controller = SearchController::with_parts(FailingFitter::from(2), BicScore, LcmFactory);
        let err = controller.search(&small_data(), &config()).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.message().contains("cardinality 2"), "{err}");
    }

    #[test]
    fn failure_names_the_failing_step() {
        let controller = SearchController::with_parts(
            FailingFitter::from(4),
            scores(&[(2, 1.0), (3, 5.0)]),
            LcmFactory,
        );
        let err = controller.search(&small_data(), &config()).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.message().contains("3 -> 4"), "{err}");
        assert_eq!(controller.fitter.calls.get(), 3);
    }

    #[test]
    fn fitter_changing_the_cardinality_is_a_fit_failure() {
        let controller = SearchController::with_parts(
            ResizingFitter { cardinality: 2 },
            |m: &LatentClassModel, _: &DataSet| m.cardinality() as f64,
            LcmFactory,
        );
        let err = controller.search(&small_data(), &config()).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.message().contains("2 -> 3"), "{err}");
        assert!(err.message().contains("expected 3"), "{err}");

        let controller = SearchController::with_parts(ResizingFitter { cardinality: 5 }, BicScore, LcmFactory);
        let err = controller.search(&small_data(), &config()).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.message().contains("initial cardinality 2"), "{err}");
    }

    #[test]
    fn empty_inputs_fail_before_any_fit() {
        let controller = SearchController::with_parts(FailingFitter::from(99), BicScore, LcmFactory);

        let no_cases = DataSet::new(vec![Variable::with_cardinality("a", 2)], Vec::new()).unwrap();
        assert_eq!(controller.search(&no_cases, &config()).unwrap_err().exit_code(), 3);

        let no_vars = DataSet::new(Vec::new(), Vec::new()).unwrap();
        assert_eq!(controller.search(&no_vars, &config()).unwrap_err().exit_code(), 3);

        assert_eq!(controller.fitter.calls.get(), 0);
    }

    #[test]
    fn invalid_config_fails_before_any_fit() {
        let controller = SearchController::with_parts(FailingFitter::from(99), BicScore, LcmFactory);
        let mut config = config();
        config.em.restarts = 0;
        assert_eq!(controller.search(&small_data(), &config).unwrap_err().exit_code(), 2);
        assert_eq!(controller.fitter.calls.get(), 0);
    }

    #[test]
    fn start_cardinality_must_match_initial_model() {
        let controller = SearchController::new();
        let data = small_data();
        let initial = LcmFactory.create_skeleton(data.variables(), 3).unwrap();
        let err = controller.search_from(&initial, &data, 2, &config()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn search_from_a_larger_start() {
        let controller = SearchController::with_parts(
            RecordingFitter::default(),
            scores(&[(4, 1.0), (5, 3.0), (6, 3.5)]),
            LcmFactory,
        );
        let data = small_data();
        let initial = LcmFactory.create_skeleton(data.variables(), 4).unwrap();
        let outcome = controller.search_from(&initial, &data, 4, &config()).unwrap();
        assert_eq!(outcome.cardinality(), 5);
        assert_eq!(outcome.steps.len(), 2);
    }

    #[test]
    fn max_cardinality_caps_growth() {
        let controller = SearchController::with_parts(
            RecordingFitter::default(),
            |m: &LatentClassModel, _: &DataSet| 10.0 * m.cardinality() as f64,
            LcmFactory,
        );
        let config = SearchConfig {
            max_cardinality: Some(5),
            ..config()
        };
        let outcome = controller.search(&small_data(), &config).unwrap();
        assert_eq!(outcome.cardinality(), 5);
        assert_eq!(outcome.steps.len(), 3);
        assert!(outcome.steps.iter().all(|s| s.accepted));
    }

    #[test]
    fn single_manifest_variable_yields_a_valid_model() {
        let vars = vec![Variable::with_cardinality("only", 2)];
        let rows = vec![vec![Some(0)], vec![Some(1)], vec![Some(1)], vec![Some(0)], vec![Some(1)]];
        let data = DataSet::from_rows(vars.clone(), rows).unwrap();

        let outcome = SearchController::new().search(&data, &config()).unwrap();
        assert!(outcome.cardinality() >= MIN_CARDINALITY);
        assert_eq!(outcome.best.manifests(), vars.as_slice());
        assert!(outcome.best_score.is_finite());
    }

    #[test]
    fn recovers_planted_two_class_structure() {
        let data = simulate(&SampleSpec {
            classes: 2,
            variables: 5,
            states: 2,
            cases: 1000,
            seed: 21,
        })
        .unwrap();
        let config = SearchConfig {
            em: EmSettings {
                restarts: 8,
                max_steps: 150,
                threshold: 1e-3,
                escape: EscapeMethod::ChickeringHeckerman,
                seed: 8,
            },
            ..config()
        };

        let outcome = SearchController::new().search(&data, &config).unwrap();
        assert_eq!(outcome.cardinality(), 2);
        assert_eq!(outcome.steps.len(), 1);
        assert!(!outcome.steps[0].accepted);
    }
}
