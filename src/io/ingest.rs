//! CSV ingest.
//!
//! Layout:
//! - header row: one column per manifest variable
//! - each cell: a state label; empty cells and `?` are missing values
//!
//! The states of a variable are its distinct observed labels in sorted order.
//! Identical rows are merged into weighted cases.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use tracing::info;

use crate::data::DataSet;
use crate::domain::Variable;
use crate::error::AppError;

/// Cell value treated as missing, besides the empty string.
const MISSING_LABEL: &str = "?";

/// Load a dataset from a CSV file.
pub fn load_dataset(path: &Path) -> Result<DataSet, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    let data = read_dataset(file)?;
    info!(
        path = %path.display(),
        variables = data.variables().len(),
        distinct_cases = data.cases().len(),
        total_weight = data.total_weight(),
        "dataset loaded"
    );
    Ok(data)
}

/// Read a dataset from any CSV source.
pub fn read_dataset<R: Read>(source: R) -> Result<DataSet, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let names = parse_headers(&headers)?;

    let mut records: Vec<StringRecord> = Vec::new();
    for (i, record) in reader.records().enumerate() {
        // Header is line 1.
        let line = i + 2;
        let record = record.map_err(|e| AppError::new(2, format!("CSV line {line}: {e}")))?;
        if record.len() != names.len() {
            return Err(AppError::new(
                2,
                format!("CSV line {line} has {} fields, expected {}.", record.len(), names.len()),
            ));
        }
        records.push(record);
    }

    let mut labels: Vec<BTreeSet<String>> = vec![BTreeSet::new(); names.len()];
    for record in &records {
        for (set, cell) in labels.iter_mut().zip(record.iter()) {
            if !is_missing(cell) {
                set.insert(cell.to_string());
            }
        }
    }

    let variables: Vec<Variable> = names
        .into_iter()
        .zip(labels)
        .map(|(name, states)| Variable::new(name, states.into_iter().collect()))
        .collect();

    if let Some(v) = variables.iter().find(|v| v.cardinality() == 0) {
        if !records.is_empty() {
            return Err(AppError::new(2, format!("Column '{}' has no observed values.", v.name)));
        }
    }

    let rows = records
        .iter()
        .map(|record| {
            record
                .iter()
                .zip(&variables)
                .map(|(cell, var)| {
                    if is_missing(cell) {
                        None
                    } else {
                        var.states.iter().position(|s| s == cell)
                    }
                })
                .collect::<Vec<_>>()
        })
        .collect();

    DataSet::from_rows(variables, rows)
}

fn parse_headers(headers: &StringRecord) -> Result<Vec<String>, AppError> {
    let mut seen = BTreeSet::new();
    let mut names = Vec::with_capacity(headers.len());
    for (i, h) in headers.iter().enumerate() {
        if h.is_empty() {
            return Err(AppError::new(2, format!("CSV header column {} is empty.", i + 1)));
        }
        if !seen.insert(h.to_string()) {
            return Err(AppError::new(2, format!("Duplicate CSV column '{h}'.")));
        }
        names.push(h.to_string());
    }
    Ok(names)
}

fn is_missing(cell: &str) -> bool {
    cell.is_empty() || cell == MISSING_LABEL
}
