//! Write latent class models in BIF.
//!
//! Layout:
//!
//! ```text
//! network "M" {
//! }
//! variable "Y" {
//!     type discrete[2] { "s0" "s1" };
//! }
//! probability ( "Y" ) {
//!     table 0.4 0.6;
//! }
//! probability ( "x1" | "Y" ) {
//!     table 0.9 0.1 0.2 0.8;
//! }
//! ```
//!
//! Conditional tables list one latent state after another, with the child's
//! states varying fastest.

use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::Local;
use tracing::info;

use crate::domain::Variable;
use crate::error::AppError;
use crate::models::LatentClassModel;

const NETWORK_NAME: &str = "M";

/// Write `model` to `path`, replacing any existing file.
pub fn write_bif(path: &Path, model: &LatentClassModel) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create model file '{}': {e}", path.display())))?;

    writeln!(file, "// Latent class model, generated {}", Local::now().to_rfc3339())
        .and_then(|_| file.write_all(format_bif(model).as_bytes()))
        .map_err(|e| AppError::new(2, format!("Failed to write model file '{}': {e}", path.display())))?;

    info!(path = %path.display(), cardinality = model.cardinality(), "model written");
    Ok(())
}

/// Render `model` as BIF text.
pub fn format_bif(model: &LatentClassModel) -> String {
    let mut out = String::new();
    let latent = model.latent();

    let _ = writeln!(out, "network \"{NETWORK_NAME}\" {{\n}}\n");

    push_variable(&mut out, latent);
    for v in model.manifests() {
        push_variable(&mut out, v);
    }

    let _ = writeln!(out, "probability ( \"{}\" ) {{", escape(&latent.name));
    let _ = writeln!(out, "\ttable {};", join_probs(model.prior().iter()));
    let _ = writeln!(out, "}}\n");

    for (i, v) in model.manifests().iter().enumerate() {
        let _ = writeln!(
            out,
            "probability ( \"{}\" | \"{}\" ) {{",
            escape(&v.name),
            escape(&latent.name)
        );
        let table = model.conditional(i);
        let _ = writeln!(out, "\ttable {};", join_probs(table.iter().flatten()));
        let _ = writeln!(out, "}}\n");
    }

    out
}

fn push_variable(out: &mut String, var: &Variable) {
    let states: Vec<String> = var.states.iter().map(|s| format!("\"{}\"", escape(s))).collect();
    let _ = writeln!(out, "variable \"{}\" {{", escape(&var.name));
    let _ = writeln!(out, "\ttype discrete[{}] {{ {} }};", var.cardinality(), states.join(" "));
    let _ = writeln!(out, "}}\n");
}

fn join_probs<'a>(values: impl Iterator<Item = &'a f64>) -> String {
    values.map(|p| format!("{p}")).collect::<Vec<_>>().join(" ")
}

fn escape(name: &str) -> String {
    name.replace('\\', "\\\\").replace('"', "\\\"")
}
