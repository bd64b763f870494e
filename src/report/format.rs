//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the fitting/search code stays clean and testable
//! - output changes are localized

use std::path::Path;

use crate::data::DataSet;
use crate::domain::SearchConfig;
use crate::fit::search::SearchOutcome;
use crate::models::LatentClassModel;

/// Format the full search summary (dataset + per-step decisions + chosen model).
pub fn format_search_summary(data: &DataSet, outcome: &SearchOutcome, config: &SearchConfig) -> String {
    let mut out = String::new();

    out.push_str("=== lcm - Latent Class Cardinality Search ===\n");
    out.push_str(&format_dataset_line(data));
    out.push_str(&format!(
        "EM: restarts={} max_steps={} threshold={} escape={:?} seed={}\n",
        config.em.restarts, config.em.max_steps, config.em.threshold, config.em.escape, config.em.seed
    ));
    out.push_str(&format!("BIC threshold: {}\n", config.bic_threshold));

    out.push_str("\nSearch steps:\n");
    out.push_str(&format!("{:>4} {:>14} {:>12} {:<8}\n", "k", "BIC", "gain", "decision"));
    out.push_str(&format!("{:->4} {:->14} {:->12} {:-<8}\n", "", "", "", ""));
    let initial_k = outcome.steps.first().map_or(outcome.cardinality(), |s| s.cardinality - 1);
    out.push_str(&format!(
        "{:>4} {:>14.3} {:>12} {:<8}\n",
        initial_k, outcome.initial_score, "-", "initial"
    ));
    for step in &outcome.steps {
        let decision = if step.accepted { "accept" } else { "reject" };
        out.push_str(&format!(
            "{:>4} {:>14.3} {:>12.3} {:<8}\n",
            step.cardinality, step.score, step.gain, decision
        ));
    }

    out.push_str(&format!(
        "\nChosen model: {} latent states, BIC={:.3}, params={}\n",
        outcome.cardinality(),
        outcome.best_score,
        outcome.best.param_count()
    ));
    out.push_str(&format_class_profiles(&outcome.best));
    out.push_str(&format!("\nModel file: {}\n", display_path(&config.final_model_path())));

    out
}

/// Format a single-cardinality fit.
pub fn format_fit_summary(data: &DataSet, model: &LatentClassModel, loglik: f64, bic: f64) -> String {
    let mut out = String::new();
    out.push_str("=== lcm - Latent Class Fit ===\n");
    out.push_str(&format_dataset_line(data));
    out.push_str(&format!(
        "Latent states: {} | params={} | loglik={:.3} | BIC={:.3}\n\n",
        model.cardinality(),
        model.param_count(),
        loglik,
        bic
    ));
    out.push_str(&format_class_profiles(model));
    out
}

/// Class sizes and, per manifest variable, the most likely state in each class.
pub fn format_class_profiles(model: &LatentClassModel) -> String {
    let mut out = String::new();

    out.push_str(&format!("{:<16}", "class"));
    for y in 0..model.cardinality() {
        out.push_str(&format!(" {:>14}", format!("{} (p={:.2})", model.latent().states[y], model.prior()[y])));
    }
    out.push('\n');

    for (i, var) in model.manifests().iter().enumerate() {
        out.push_str(&format!("{:<16}", truncate(&var.name, 16)));
        for row in model.conditional(i) {
            let (mode, p) = row
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |acc, (x, &p)| if p > acc.1 { (x, p) } else { acc });
            let cell = format!("{}:{:.2}", truncate(&var.states[mode], 8), p);
            out.push_str(&format!(" {cell:>14}"));
        }
        out.push('\n');
    }

    out
}

fn format_dataset_line(data: &DataSet) -> String {
    format!(
        "Data: variables={} | distinct cases={} | N={}\n",
        data.variables().len(),
        data.cases().len(),
        data.total_weight()
    )
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
