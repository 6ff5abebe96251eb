//! Command-line parsing for the temporal contrast sensitivity fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::domain::Variant;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "tcsf", version, about = "Temporal contrast sensitivity model fitting")]
pub struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit every model variant to a threshold CSV and report the best-supported one.
    Fit(FitArgs),
    /// Write a synthetic threshold CSV generated from a reference model.
    Synth(SynthArgs),
}

/// Options for fitting.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Observation CSV (`l, m, tf, oog, x, y[, session]`).
    #[arg(long, value_name = "CSV")]
    pub csv: PathBuf,

    /// Reuse quick fits from a cache (or result) JSON instead of the multi-start search.
    #[arg(long, value_name = "JSON")]
    pub resume: Option<PathBuf>,

    /// Random starts per location in addition to the default start.
    #[arg(long, default_value_t = 4)]
    pub starts: usize,

    /// Seed for the random starts.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Maximum cross-location refinement sweeps.
    #[arg(long, default_value_t = 25)]
    pub refine_sweeps: usize,

    /// Maximum passes of the model-selection loop.
    #[arg(long, default_value_t = 6)]
    pub max_loops: usize,

    /// Maximum optimizer iterations per attempt.
    #[arg(long, default_value_t = 300)]
    pub max_iter: usize,

    /// Run everything on one thread.
    #[arg(long)]
    pub serial: bool,

    /// Keep a log of every optimizer attempt.
    #[arg(long)]
    pub diagnostics: bool,

    /// Write a Markdown debug bundle into `debug/` (implies `--diagnostics`).
    #[arg(long)]
    pub debug_bundle: bool,

    /// Show the N worst-fitting observations of the chosen variant.
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Write the full result to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,

    /// Write the quick fits as a resume cache.
    #[arg(long = "export-quick-fits", value_name = "JSON")]
    pub export_quick_fits: Option<PathBuf>,

    /// Write per-location fits and errors to CSV.
    #[arg(long = "export-locations", value_name = "CSV")]
    pub export_locations: Option<PathBuf>,

    /// Write per-observation residuals of the chosen variant to CSV.
    #[arg(long = "export-residuals", value_name = "CSV")]
    pub export_residuals: Option<PathBuf>,
}

/// Reference model used to generate synthetic data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SynthModel {
    /// Rampy trough (variant 2).
    Rampy,
    /// Tilted rampy trough (variant 3).
    Tilted,
    /// Double tilted (variant 4).
    Double,
    /// Yoked tilt (variant 5).
    Yoked,
}

impl SynthModel {
    pub fn variant(self) -> Variant {
        match self {
            SynthModel::Rampy => Variant::RampyTrough,
            SynthModel::Tilted => Variant::TiltedTrough,
            SynthModel::Double => Variant::DoubleTilted,
            SynthModel::Yoked => Variant::YokedTilted,
        }
    }
}

/// Options for synthetic data.
#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// Output CSV.
    #[arg(long, value_name = "CSV")]
    pub out: PathBuf,

    /// Positional law of the reference model.
    #[arg(long, value_enum, default_value_t = SynthModel::Yoked)]
    pub model: SynthModel,

    /// Noise standard deviation in log10 threshold units.
    #[arg(long, default_value_t = 0.01)]
    pub noise: f64,

    /// Largest displayable cone-contrast vector length.
    #[arg(long, default_value_t = 0.5)]
    pub gamut: f64,

    /// Temporal frequencies (Hz), comma separated.
    #[arg(long, value_delimiter = ',', default_values_t = [1.0, 3.0, 8.0, 15.0, 25.0])]
    pub frequencies: Vec<f64>,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}
