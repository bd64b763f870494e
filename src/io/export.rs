//! Exports: search runs as JSON, datasets as CSV.
//!
//! The JSON file carries the configuration, every proposed step and the
//! parameters of the chosen model, so a run can be inspected without re-fitting.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::data::DataSet;
use crate::domain::SearchConfig;
use crate::error::AppError;
use crate::fit::search::SearchOutcome;

#[derive(Debug, Serialize)]
struct RunExport<'a> {
    tool: &'static str,
    config: &'a SearchConfig,
    model_path: PathBuf,
    cardinality: usize,
    outcome: &'a SearchOutcome,
}

/// Write the search run to `path` as pretty-printed JSON.
pub fn write_outcome_json(path: &Path, outcome: &SearchOutcome, config: &SearchConfig) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create JSON export '{}': {e}", path.display())))?;

    let export = RunExport {
        tool: "lcm",
        config,
        model_path: config.final_model_path(),
        cardinality: outcome.cardinality(),
        outcome,
    };

    serde_json::to_writer_pretty(file, &export)
        .map_err(|e| AppError::new(2, format!("Failed to write JSON export: {e}")))?;

    Ok(())
}

/// Write a dataset as CSV, repeating each case by its weight.
///
/// Only whole-number weights can be expanded into rows; any other weight is
/// rejected before the file is created. Missing values are written as `?`,
/// which `read_dataset` reads back as missing.
pub fn write_dataset_csv(path: &Path, data: &DataSet) -> Result<(), AppError> {
    if let Some((row, case)) = data.cases().iter().enumerate().find(|(_, c)| c.weight.fract() != 0.0) {
        return Err(AppError::new(
            2,
            format!("Case {row} has weight {} which cannot be written as CSV rows.", case.weight),
        ));
    }

    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create CSV '{}': {e}", path.display())))?;
    let write_err = |e: csv::Error| AppError::new(2, format!("Failed to write CSV '{}': {e}", path.display()));

    writer
        .write_record(data.variables().iter().map(|v| v.name.as_str()))
        .map_err(write_err)?;
    for case in data.cases() {
        let record: Vec<&str> = case
            .states
            .iter()
            .zip(data.variables())
            .map(|(state, var)| state.map_or("?", |s| var.states[s].as_str()))
            .collect();
        for _ in 0..case.weight as usize {
            writer.write_record(&record).map_err(write_err)?;
        }
    }
    writer.flush().map_err(|e| AppError::new(2, format!("Failed to flush CSV: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataCase;
    use crate::domain::{SearchStep, Variable};
    use crate::io::read_dataset;
    use crate::models::{LcmFactory, ModelFactory};

    #[test]
    fn export_contains_steps_and_model() {
        let vars = vec![Variable::with_cardinality("a", 2)];
        let outcome = SearchOutcome {
            best: LcmFactory.create_skeleton(&vars, 2).unwrap(),
            best_score: -10.0,
            initial_score: -10.0,
            steps: vec![SearchStep {
                cardinality: 3,
                score: -12.0,
                gain: -2.0,
                accepted: false,
            }],
        };
        let path = std::env::temp_dir().join(format!("lcm-export-{}.json", std::process::id()));

        write_outcome_json(&path, &outcome, &SearchConfig::default()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(json["tool"], "lcm");
        assert_eq!(json["cardinality"], 2);
        assert_eq!(json["outcome"]["steps"][0]["cardinality"], 3);
        assert_eq!(json["outcome"]["steps"][0]["accepted"], false);
        assert_eq!(json["config"]["em"]["escape"], "chickering-heckerman");
        assert_eq!(json["outcome"]["best"]["prior"][0], 0.5);
    }

    #[test]
    fn dataset_csv_reads_back_identically() {
        let vars = vec![
            Variable::new("a", vec!["x".into(), "y".into()]),
            Variable::new("b", vec!["p".into(), "q".into()]),
        ];
        let rows = vec![
            vec![Some(0), Some(1)],
            vec![Some(1), None],
            vec![Some(0), Some(1)],
            vec![Some(1), Some(0)],
        ];
        let data = DataSet::from_rows(vars, rows).unwrap();
        let path = std::env::temp_dir().join(format!("lcm-data-{}.csv", std::process::id()));

        write_dataset_csv(&path, &data).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let back = read_dataset(text.as_bytes()).unwrap();
        assert_eq!(back.variables(), data.variables());
        assert_eq!(back.cases(), data.cases());
    }

    #[test]
    fn fractional_weights_are_rejected() {
        let vars = vec![Variable::with_cardinality("a", 2)];
        let cases = vec![
            DataCase {
                states: vec![Some(0)],
                weight: 2.0,
            },
            DataCase {
                states: vec![Some(1)],
                weight: 1.5,
            },
        ];
        let data = DataSet::new(vars, cases).unwrap();
        let path = std::env::temp_dir().join(format!("lcm-frac-{}.csv", std::process::id()));

        let err = write_dataset_csv(&path, &data).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("Case 1"), "{err}");
        assert!(!path.exists());
    }
}
