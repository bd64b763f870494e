//! Immutable collection of observed cases over a fixed set of manifest variables.
//!
//! Identical rows are aggregated into a single weighted case, so the E-step
//! visits each distinct observation pattern once.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::Variable;
use crate::error::AppError;

/// One distinct observation pattern and its multiplicity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataCase {
    /// Observed state index per manifest variable (`None` = missing).
    pub states: Vec<Option<usize>>,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSet {
    variables: Vec<Variable>,
    cases: Vec<DataCase>,
}

impl DataSet {
    /// Build a dataset from weighted cases.
    ///
    /// Every case must have one entry per variable, in-range state indices and
    /// a positive finite weight. Empty variable lists and empty case lists are
    /// accepted here; the search rejects them before fitting.
    pub fn new(variables: Vec<Variable>, cases: Vec<DataCase>) -> Result<Self, AppError> {
        for (row, case) in cases.iter().enumerate() {
            if case.states.len() != variables.len() {
                return Err(AppError::new(
                    2,
                    format!(
                        "Case {row} has {} values but the dataset has {} variables.",
                        case.states.len(),
                        variables.len()
                    ),
                ));
            }
            if !(case.weight.is_finite() && case.weight > 0.0) {
                return Err(AppError::new(2, format!("Case {row} has a non-positive weight.")));
            }
            for (state, var) in case.states.iter().zip(&variables) {
                if let Some(s) = *state {
                    if s >= var.cardinality() {
                        return Err(AppError::new(
                            2,
                            format!(
                                "Case {row}: state {s} out of range for '{}' ({} states).",
                                var.name,
                                var.cardinality()
                            ),
                        ));
                    }
                }
            }
        }

        Ok(Self { variables, cases })
    }

    /// Build a dataset from unweighted rows, merging identical rows.
    ///
    /// Distinct rows keep the order of their first appearance.
    pub fn from_rows(variables: Vec<Variable>, rows: Vec<Vec<Option<usize>>>) -> Result<Self, AppError> {
        let mut index: HashMap<Vec<Option<usize>>, usize> = HashMap::new();
        let mut cases: Vec<DataCase> = Vec::new();
        for row in rows {
            match index.get(&row) {
                Some(&i) => cases[i].weight += 1.0,
                None => {
                    index.insert(row.clone(), cases.len());
                    cases.push(DataCase {
                        states: row,
                        weight: 1.0,
                    });
                }
            }
        }
        Self::new(variables, cases)
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn cases(&self) -> &[DataCase] {
        &self.cases
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Sample size (sum of case weights).
    pub fn total_weight(&self) -> f64 {
        self.cases.iter().map(|c| c.weight).sum()
    }

    /// Fail unless there is at least one manifest variable and one case.
    pub fn ensure_fittable(&self) -> Result<(), AppError> {
        if self.variables.is_empty() {
            return Err(AppError::new(3, "Dataset has no manifest variables."));
        }
        if self.cases.is_empty() {
            return Err(AppError::new(3, "Dataset has no cases."));
        }
        Ok(())
    }
}
