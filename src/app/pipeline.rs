//! Shared "search pipeline" logic used by the CLI commands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! CSV ingest -> search -> persist model -> optional JSON export
//!
//! The command handlers can then focus on presentation.

use std::path::Path;

use crate::data::DataSet;
use crate::domain::{EmSettings, SearchConfig};
use crate::error::AppError;
use crate::fit::em::{EmFitter, ModelFitter};
use crate::fit::score::{BicScore, ScoreFunction};
use crate::fit::search::{SearchController, SearchOutcome};
use crate::io::{load_dataset, write_bif, write_outcome_json};
use crate::models::{LatentClassModel, LcmFactory, ModelFactory};

/// All computed outputs of a single `lcm search` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub data: DataSet,
    pub outcome: SearchOutcome,
    /// Result of writing `M.LCM.bif` (and the JSON export, if requested).
    pub persisted: Result<(), AppError>,
}

/// Outputs of a single-cardinality fit.
#[derive(Debug, Clone)]
pub struct FitOutput {
    pub data: DataSet,
    pub model: LatentClassModel,
    pub loglik: f64,
    pub bic: f64,
}

/// Load the dataset, run the search, and persist the chosen model.
///
/// The output directory is created before any fit. A failure to write the
/// results after the search is reported in `RunOutput::persisted` next to the
/// outcome.
pub fn run_search(data_path: &Path, config: &SearchConfig, export_json: Option<&Path>) -> Result<RunOutput, AppError> {
    config.validate()?;
    std::fs::create_dir_all(&config.output_dir).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create output directory '{}': {e}", config.output_dir.display()),
        )
    })?;
    let data = load_dataset(data_path)?;
    let outcome = SearchController::new().search(&data, config)?;

    let persisted = persist(&outcome, config, export_json);
    Ok(RunOutput {
        data,
        outcome,
        persisted,
    })
}

fn persist(outcome: &SearchOutcome, config: &SearchConfig, export_json: Option<&Path>) -> Result<(), AppError> {
    write_bif(&config.final_model_path(), &outcome.best)?;
    if let Some(path) = export_json {
        write_outcome_json(path, outcome, config)?;
    }
    Ok(())
}

/// Fit a single cardinality and score it.
pub fn run_fit(data_path: &Path, cardinality: usize, settings: &EmSettings) -> Result<FitOutput, AppError> {
    settings.validate()?;
    let data = load_dataset(data_path)?;
    data.ensure_fittable()?;

    let skeleton = LcmFactory.create_skeleton(data.variables(), cardinality)?;
    let model = EmFitter.fit(&skeleton, &data, settings)?;
    let loglik = model.loglik(&data);
    let bic = BicScore.score(&model, &data);

    Ok(FitOutput {
        data,
        model,
        loglik,
        bic,
    })
}
