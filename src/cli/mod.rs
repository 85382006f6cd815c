//! Command-line parsing for the SIR parameter estimator.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code. Every tunable can also be set through a
//! `SIRFIT_*` environment variable (or a `.env` file).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "sirfit", version, about = "Per-region SIR parameter estimation from case-count tables")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit every region, write the fitted table and print a summary.
    Fit(FitArgs),
    /// Only pivot the raw table into per-region series.
    Reshape(ReshapeArgs),
    /// Write a synthetic raw table with known parameters.
    Synth(SynthArgs),
    /// Print a saved parameter report.
    Show(ShowArgs),
}

/// Options for the full fitting pipeline.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Raw case-count CSV (region, 3 metadata columns, one column per date).
    #[arg(short = 'i', long, env = "SIRFIT_INPUT", value_name = "CSV")]
    pub input: PathBuf,

    /// Fitted output table (`Date`, `<region>`, `<region>_fitted`).
    #[arg(short = 'o', long, env = "SIRFIT_OUTPUT", value_name = "CSV")]
    pub output: PathBuf,

    /// Also write the reshaped per-region series.
    #[arg(long, env = "SIRFIT_INTERMEDIATE", value_name = "CSV")]
    pub intermediate: Option<PathBuf>,

    /// Also write the per-region parameter report.
    #[arg(long, env = "SIRFIT_PARAMS", value_name = "JSON")]
    pub params: Option<PathBuf>,

    /// Only fit these regions (repeatable).
    #[arg(short = 'r', long = "region", value_name = "NAME")]
    pub regions: Vec<String>,

    /// Drop this many leading days of the date axis before fitting.
    #[arg(long, env = "SIRFIT_SKIP_DAYS", default_value_t = 0)]
    pub skip_days: usize,

    /// Closed-population size N0 used for every region.
    #[arg(long, env = "SIRFIT_POPULATION", default_value_t = 1_000_000.0)]
    pub population: f64,

    /// Initial transmission rate.
    #[arg(long, env = "SIRFIT_BETA0", default_value_t = 0.4)]
    pub beta0: f64,

    /// Initial recovery rate.
    #[arg(long, env = "SIRFIT_GAMMA0", default_value_t = 0.1)]
    pub gamma0: f64,

    /// Forward-model evaluation cap per region.
    #[arg(long, env = "SIRFIT_MAX_EVALS", default_value_t = 5000)]
    pub max_evals: usize,

    /// Wall-clock budget per region in seconds (no limit when omitted).
    #[arg(long, env = "SIRFIT_TIMEOUT_SECS")]
    pub timeout_secs: Option<f64>,

    /// Worker threads (defaults to one per core).
    #[arg(long, env = "SIRFIT_THREADS")]
    pub threads: Option<usize>,

    /// Integrator relative tolerance.
    #[arg(long, env = "SIRFIT_RTOL", default_value_t = 1e-10)]
    pub rtol: f64,

    /// Integrator absolute tolerance.
    #[arg(long, env = "SIRFIT_ATOL", default_value_t = 1e-8)]
    pub atol: f64,

    /// Integrator step budget between consecutive days.
    #[arg(long, env = "SIRFIT_MAX_STEPS", default_value_t = 2000)]
    pub max_steps: usize,

    /// Delimiter of the raw input table.
    #[arg(long, env = "SIRFIT_INPUT_DELIMITER", default_value_t = ',')]
    pub input_delimiter: char,

    /// Delimiter of the written tables.
    #[arg(long, env = "SIRFIT_OUTPUT_DELIMITER", default_value_t = ';')]
    pub output_delimiter: char,
}

/// Options for the reshape-only command.
#[derive(Debug, Parser, Clone)]
pub struct ReshapeArgs {
    #[arg(short = 'i', long, env = "SIRFIT_INPUT", value_name = "CSV")]
    pub input: PathBuf,

    /// Per-region series table (`Date`, one column per region).
    #[arg(short = 'o', long, value_name = "CSV")]
    pub output: PathBuf,

    #[arg(long, env = "SIRFIT_INPUT_DELIMITER", default_value_t = ',')]
    pub input_delimiter: char,

    #[arg(long, env = "SIRFIT_OUTPUT_DELIMITER", default_value_t = ';')]
    pub output_delimiter: char,
}

/// Options for synthetic data generation.
#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// Raw table to write (comma-delimited, input schema).
    #[arg(short = 'o', long, value_name = "CSV")]
    pub output: PathBuf,

    #[arg(long, default_value_t = 5)]
    pub regions: usize,

    #[arg(long, default_value_t = 120)]
    pub days: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Standard deviation of the multiplicative log-normal noise.
    #[arg(long, default_value_t = 0.05)]
    pub noise: f64,

    #[arg(long, env = "SIRFIT_POPULATION", default_value_t = 1_000_000.0)]
    pub population: f64,
}

/// Options for printing a saved report.
#[derive(Debug, Parser)]
pub struct ShowArgs {
    /// Parameter report produced by `sirfit fit --params`.
    #[arg(long, value_name = "JSON")]
    pub params: PathBuf,
}
