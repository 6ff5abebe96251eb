//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and installs logging
//! - runs ingest, fitting and model selection
//! - prints reports
//! - writes optional exports

use std::path::Path;

use clap::Parser;
use tracing::info;

use crate::cli::{Command, FitArgs, SynthArgs};
use crate::data::{SyntheticSpec, generate_sample, reference_locations, reference_params};
use crate::domain::FitConfig;
use crate::error::FitError;

pub mod pipeline;

/// Entry point for the `tcsf` binary.
pub fn run() -> Result<(), FitError> {
    let cli = crate::cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Fit(args) => handle_fit(&args),
        Command::Synth(args) => handle_synth(&args),
    }
}

fn handle_fit(args: &FitArgs) -> Result<(), FitError> {
    let config = fit_config_from_args(args);
    let run = pipeline::run_fit(&args.csv, args.resume.as_deref(), &config, args.top)?;

    if !run.ingest.row_errors.is_empty() {
        println!(
            "Skipped {} of {} CSV rows (first: line {}: {}).",
            run.ingest.row_errors.len(),
            run.ingest.rows_read,
            run.ingest.row_errors[0].line,
            run.ingest.row_errors[0].message
        );
    }
    println!("{}", crate::report::format_run_summary(&run.selection, &config));
    println!("{}", crate::report::format_misfits(&run.worst));
    println!(
        "RMS log10 residual ({}): {:.4}",
        run.selection.selected,
        crate::report::rms(&run.residuals)
    );

    // Optional exports.
    if let Some(path) = &args.export {
        crate::io::results::write_selection_json(path, &run.selection)?;
    }
    if let Some(path) = &args.export_quick_fits {
        crate::io::results::write_quick_fit_cache(path, &run.selection.quick_fit_cache())?;
    }
    if let Some(path) = &args.export_locations {
        crate::io::export::save_locations_csv(path, &run.selection)?;
    }
    if let Some(path) = &args.export_residuals {
        crate::io::export::save_residuals_csv(path, run.selection.selected, &run.residuals)?;
    }
    if args.debug_bundle {
        let path = crate::debug::write_debug_bundle(Path::new("debug"), &run.selection, &config)?;
        println!("Debug bundle: {}", path.display());
    }

    Ok(())
}

fn handle_synth(args: &SynthArgs) -> Result<(), FitError> {
    let spec = synthetic_spec_from_args(args);
    let sample = generate_sample(&spec)?;
    crate::io::ingest::save_observations_csv(&args.out, &sample.observations)?;
    info!(rows = sample.observations.len(), path = %args.out.display(), "synthetic data written");
    println!(
        "Wrote {} observations at {} locations to {}.",
        sample.observations.len(),
        sample.truth.len(),
        args.out.display()
    );
    Ok(())
}

pub fn fit_config_from_args(args: &FitArgs) -> FitConfig {
    let mut config = FitConfig {
        quick_fit_starts: args.starts,
        seed: args.seed,
        max_refine_sweeps: args.refine_sweeps,
        max_selection_loops: args.max_loops,
        parallel: !args.serial,
        diagnostics: args.diagnostics || args.debug_bundle,
        ..FitConfig::default()
    };
    config.optimizer.max_iterations = args.max_iter;
    config
}

pub fn synthetic_spec_from_args(args: &SynthArgs) -> SyntheticSpec {
    let variant = args.model.variant();
    let locations = reference_locations();
    SyntheticSpec {
        variant,
        params: reference_params(variant, &locations),
        locations,
        frequencies: args.frequencies.clone(),
        noise_sd: args.noise,
        gamut_limit: args.gamut,
        seed: args.seed,
        ..SyntheticSpec::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;

    #[test]
    fn fit_flags_map_onto_the_config() {
        let cli = Cli::parse_from([
            "tcsf",
            "fit",
            "--csv",
            "obs.csv",
            "--starts",
            "2",
            "--max-iter",
            "50",
            "--serial",
            "--debug-bundle",
        ]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        let config = fit_config_from_args(&args);
        assert_eq!(config.quick_fit_starts, 2);
        assert_eq!(config.optimizer.max_iterations, 50);
        assert!(!config.parallel);
        assert!(config.diagnostics);
        assert_eq!(cli.log_level, tracing::Level::WARN);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn synth_spec_matches_the_requested_law() {
        let cli = Cli::parse_from([
            "tcsf",
            "--log-level",
            "debug",
            "synth",
            "--out",
            "s.csv",
            "--model",
            "double",
            "--frequencies",
            "2,10",
        ]);
        let Command::Synth(args) = cli.command else {
            panic!("expected synth");
        };
        let spec = synthetic_spec_from_args(&args);
        assert_eq!(spec.params.len(), 19);
        assert_eq!(spec.frequencies, vec![2.0, 10.0]);
        assert!(generate_sample(&spec).is_ok());
        assert_eq!(cli.log_level, tracing::Level::DEBUG);
    }
}
