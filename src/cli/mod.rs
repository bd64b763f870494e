//! Command-line parsing for the latent class search tool.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! fitting/search code. Flags map 1:1 onto `EmSettings` / `SearchConfig`.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::domain::EscapeMethod;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "lcm", version, about = "Latent class model cardinality search")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search for the best latent cardinality and write the model to `<output-dir>/M.LCM.bif`.
    Search(SearchArgs),
    /// Fit a single latent cardinality and report its log-likelihood and BIC.
    Fit(FitArgs),
    /// Generate a synthetic CSV dataset from a planted latent class model.
    Simulate(SimulateArgs),
}

/// EM settings shared by `search` and `fit`.
#[derive(Debug, Args, Clone)]
pub struct EmArgs {
    /// Number of random restarts per EM fit.
    #[arg(long, default_value_t = 20)]
    pub restarts: usize,

    /// Maximum EM steps per restart.
    #[arg(long, default_value_t = 100)]
    pub max_steps: usize,

    /// EM convergence threshold on the log-likelihood improvement.
    #[arg(long, default_value_t = 0.01)]
    pub em_threshold: f64,

    /// Local-optimum escape heuristic across restarts.
    #[arg(long, value_enum, default_value_t = EscapeMethod::ChickeringHeckerman)]
    pub escape: EscapeMethod,

    /// Seed for restart initializations.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Options for `lcm search`.
#[derive(Debug, Args, Clone)]
pub struct SearchArgs {
    /// Input CSV (header = variable names, cells = state labels).
    #[arg(short = 'd', long, value_name = "CSV")]
    pub data: PathBuf,

    #[command(flatten)]
    pub em: EmArgs,

    /// Minimum BIC gain required to accept one more latent state.
    #[arg(long, default_value_t = 1.0)]
    pub bic_threshold: f64,

    /// Optional upper bound on the latent cardinality.
    #[arg(long)]
    pub max_cardinality: Option<usize>,

    /// Directory receiving `M.LCM.bif`.
    #[arg(short = 'o', long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Also export the search trace and chosen model to JSON.
    #[arg(long, value_name = "JSON")]
    pub export_json: Option<PathBuf>,
}

/// Options for `lcm fit`.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Input CSV (header = variable names, cells = state labels).
    #[arg(short = 'd', long, value_name = "CSV")]
    pub data: PathBuf,

    /// Latent cardinality to fit.
    #[arg(short = 'k', long, default_value_t = 2)]
    pub cardinality: usize,

    #[command(flatten)]
    pub em: EmArgs,

    /// Write the fitted model to this BIF file.
    #[arg(long, value_name = "BIF")]
    pub out: Option<PathBuf>,
}

/// Options for `lcm simulate`.
#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Number of latent classes in the planted model.
    #[arg(long, default_value_t = 3)]
    pub classes: usize,

    /// Number of manifest variables.
    #[arg(long, default_value_t = 6)]
    pub variables: usize,

    /// States per manifest variable.
    #[arg(long, default_value_t = 3)]
    pub states: usize,

    /// Number of cases to draw.
    #[arg(short = 'n', long, default_value_t = 1000)]
    pub cases: usize,

    /// Random seed for sampling.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output CSV path.
    #[arg(long, value_name = "CSV")]
    pub out: PathBuf,
}
