//! Synthetic datasets drawn from a known latent class model.
//!
//! Used by the `simulate` command and by tests that need data with a known
//! number of classes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand::rngs::StdRng;

use crate::data::DataSet;
use crate::domain::Variable;
use crate::error::AppError;
use crate::models::{LATENT_NAME, LatentClassModel};

/// Probability mass a class puts on its "own" state of each manifest variable.
const PLANTED_PEAK: f64 = 0.8;

/// Shape of a planted model.
#[derive(Debug, Clone)]
pub struct SampleSpec {
    pub classes: usize,
    pub variables: usize,
    pub states: usize,
    pub cases: usize,
    pub seed: u64,
}

/// Build a latent class model whose classes are well separated.
///
/// Class `y` prefers state `(y + i) % states` on variable `i`, with mass
/// `PLANTED_PEAK`; the remaining mass is spread evenly.
pub fn planted_model(classes: usize, variables: usize, states: usize) -> Result<LatentClassModel, AppError> {
    if classes == 0 || variables == 0 {
        return Err(AppError::new(2, "Planted model needs at least one class and one variable."));
    }
    if states < 2 {
        return Err(AppError::new(2, "Planted manifest variables need at least 2 states."));
    }

    let manifests: Vec<Variable> = (0..variables)
        .map(|i| Variable::with_cardinality(format!("x{}", i + 1), states))
        .collect();
    let off_peak = (1.0 - PLANTED_PEAK) / (states - 1) as f64;
    let conditionals: Vec<Vec<Vec<f64>>> = (0..variables)
        .map(|i| {
            (0..classes)
                .map(|y| {
                    let peak = (y + i) % states;
                    (0..states)
                        .map(|x| if x == peak { PLANTED_PEAK } else { off_peak })
                        .collect::<Vec<f64>>()
                })
                .collect::<Vec<_>>()
        })
        .collect();

    LatentClassModel::from_parameters(
        Variable::with_cardinality(LATENT_NAME, classes),
        manifests,
        vec![1.0 / classes as f64; classes],
        conditionals,
    )
}

/// Draw `cases` complete observations from `model`.
pub fn generate_sample(model: &LatentClassModel, cases: usize, seed: u64) -> Result<DataSet, AppError> {
    if cases == 0 {
        return Err(AppError::new(2, "Sample case count must be > 0."));
    }

    let mut rng = StdRng::seed_from_u64(sample_seed(model, seed));
    let class_dist = weighted(model.prior())?;
    let tables = model
        .conditionals()
        .iter()
        .map(|table| table.iter().map(|row| weighted(row)).collect::<Result<Vec<_>, _>>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::with_capacity(cases);
    for _ in 0..cases {
        let y = class_dist.sample(&mut rng);
        let row: Vec<Option<usize>> = tables.iter().map(|table| Some(table[y].sample(&mut rng))).collect();
        rows.push(row);
    }

    DataSet::from_rows(model.manifests().to_vec(), rows)
}

/// Draw a sample from a planted model described by `spec`.
pub fn simulate(spec: &SampleSpec) -> Result<DataSet, AppError> {
    let model = planted_model(spec.classes, spec.variables, spec.states)?;
    generate_sample(&model, spec.cases, spec.seed)
}

fn weighted(probs: &[f64]) -> Result<WeightedIndex<f64>, AppError> {
    WeightedIndex::new(probs).map_err(|e| AppError::new(2, format!("Invalid sampling distribution: {e}")))
}

fn sample_seed(model: &LatentClassModel, seed: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    model.cardinality().hash(&mut hasher);
    model.manifests().len().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planted_model_is_normalized() {
        let model = planted_model(3, 4, 3).unwrap();
        assert_eq!(model.cardinality(), 3);
        for table in model.conditionals() {
            for row in table {
                assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn sample_is_reproducible_for_a_seed() {
        let spec = SampleSpec {
            classes: 2,
            variables: 3,
            states: 2,
            cases: 200,
            seed: 11,
        };
        let a = simulate(&spec).unwrap();
        let b = simulate(&spec).unwrap();
        assert_eq!(a.cases(), b.cases());
        assert_eq!(a.total_weight(), 200.0);
        assert_eq!(a.variables().len(), 3);
    }

    #[test]
    fn zero_cases_is_rejected() {
        let model = planted_model(2, 2, 2).unwrap();
        assert_eq!(generate_sample(&model, 0, 1).unwrap_err().exit_code(), 2);
    }
}
