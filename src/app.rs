//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - installs the log subscriber
//! - dispatches to the search / fit / simulate commands
//! - prints reports

use clap::Parser;
use tracing::Level;

use crate::cli::{Command, EmArgs, FitArgs, SearchArgs, SimulateArgs};
use crate::data::{SampleSpec, simulate};
use crate::domain::{EmSettings, SearchConfig};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `lcm` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Search(args) => handle_search(args),
        Command::Fit(args) => handle_fit(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    // A subscriber may already be installed when embedded; keep that one.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_search(args: SearchArgs) -> Result<(), AppError> {
    let config = search_config_from_args(&args);
    let run = pipeline::run_search(&args.data, &config, args.export_json.as_deref())?;

    println!(
        "{}",
        crate::report::format_search_summary(&run.data, &run.outcome, &config)
    );
    run.persisted
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let settings = em_settings_from_args(&args.em);
    let fit = pipeline::run_fit(&args.data, args.cardinality, &settings)?;

    println!(
        "{}",
        crate::report::format_fit_summary(&fit.data, &fit.model, fit.loglik, fit.bic)
    );

    if let Some(path) = &args.out {
        crate::io::write_bif(path, &fit.model)?;
    }
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let spec = SampleSpec {
        classes: args.classes,
        variables: args.variables,
        states: args.states,
        cases: args.cases,
        seed: args.seed,
    };
    let data = simulate(&spec)?;
    crate::io::write_dataset_csv(&args.out, &data)?;

    println!(
        "Wrote {} cases over {} variables ({} planted classes) to {}",
        args.cases,
        args.variables,
        args.classes,
        args.out.display()
    );
    Ok(())
}

pub fn em_settings_from_args(args: &EmArgs) -> EmSettings {
    EmSettings {
        restarts: args.restarts,
        max_steps: args.max_steps,
        threshold: args.em_threshold,
        escape: args.escape,
        seed: args.seed,
    }
}

pub fn search_config_from_args(args: &SearchArgs) -> SearchConfig {
    SearchConfig {
        em: em_settings_from_args(&args.em),
        bic_threshold: args.bic_threshold,
        output_dir: args.output_dir.clone(),
        max_cardinality: args.max_cardinality,
    }
}
