//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - initializes logging and loads `.env`
//! - parses CLI arguments
//! - runs the fit pipeline and prints reports
//! - writes the output table and optional exports

use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::{Command, FitArgs, ReshapeArgs, ShowArgs, SynthArgs};
use crate::data::{SynthConfig, generate_synthetic};
use crate::domain::{FitConfig, ModelParameters};
use crate::error::AppError;
use crate::fit::EstimatorConfig;
use crate::math::IntegratorOptions;

pub mod pipeline;

/// Entry point for the `sirfit` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Reshape(args) => handle_reshape(args),
        Command::Synth(args) => handle_synth(args),
        Command::Show(args) => handle_show(args),
    }
}

/// Logs go to stderr; stdout carries only the report. `RUST_LOG` overrides the filter.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args)?;
    let run = pipeline::run_fit(&config)?;

    crate::io::export::write_output_file(&config.output_path, &run.table, config.output_delimiter)?;
    info!(path = %config.output_path.display(), "wrote fitted table");

    if let Some(path) = &config.params_path {
        let params = crate::io::params::build_params_file(
            &run.outcomes,
            &run.reshaped.dates,
            config.estimator.population,
            config.estimator.seed,
        );
        crate::io::params::write_params_json(path, &params)?;
        info!(path = %path.display(), "wrote parameter report");
    }

    println!("{}", crate::report::format_run_summary(&run.reshaped, &config));
    println!("{}", crate::report::format_fit_table(&run.outcomes));
    let failures = crate::report::format_failures(&run.outcomes);
    if !failures.is_empty() {
        println!("{failures}");
    }

    info!(
        fitted = run.fitted_count(),
        failed = run.outcomes.len() - run.fitted_count(),
        "run complete"
    );
    Ok(())
}

fn handle_reshape(args: ReshapeArgs) -> Result<(), AppError> {
    let input_delimiter = delimiter_byte(args.input_delimiter, "input")?;
    let output_delimiter = delimiter_byte(args.output_delimiter, "output")?;

    let ingested = crate::io::ingest::read_raw_table(&args.input, input_delimiter)?;
    let reshaped = crate::series::reshape(&ingested.table)?;
    crate::io::export::write_series_file(&args.output, &reshaped, output_delimiter)?;

    println!(
        "Reshaped {} rows into {} regions x {} days -> {}",
        reshaped.rows_read,
        reshaped.series.len(),
        reshaped.axis_len(),
        args.output.display()
    );
    if !reshaped.row_errors.is_empty() {
        print!("{}", crate::report::format_row_errors(&reshaped.row_errors, 10));
    }
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let config = SynthConfig {
        regions: args.regions,
        days: args.days,
        seed: args.seed,
        noise: args.noise,
        population: args.population,
        ..SynthConfig::default()
    };
    let data = generate_synthetic(&config)?;
    crate::io::export::write_raw_file(&args.output, &data.table, b',')?;

    println!("Wrote {} regions x {} days -> {}", data.regions.len(), config.days, args.output.display());
    for r in &data.regions {
        println!(
            "  {:<12} beta={:.4} gamma={:.4} onset=day {} I0={}",
            r.region, r.parameters.beta, r.parameters.gamma, r.onset, r.initial_infected
        );
    }
    Ok(())
}

fn handle_show(args: ShowArgs) -> Result<(), AppError> {
    let params = crate::io::params::read_params_json(&args.params)?;
    print!("{}", crate::report::format_params_file(&params));
    Ok(())
}

fn delimiter_byte(c: char, which: &str) -> Result<u8, AppError> {
    if c.is_ascii() && !c.is_ascii_alphanumeric() && c != '"' && c != '\n' && c != '\r' {
        Ok(c as u8)
    } else {
        Err(AppError::new(2, format!("Invalid {which} delimiter {c:?} (must be ASCII punctuation or whitespace).")))
    }
}

/// Turn parsed arguments into a validated run configuration.
pub fn fit_config_from_args(args: &FitArgs) -> Result<FitConfig, AppError> {
    let timeout = match args.timeout_secs {
        None => None,
        Some(secs) if secs.is_finite() && secs > 0.0 => Some(Duration::from_secs_f64(secs)),
        Some(secs) => {
            return Err(AppError::new(2, format!("Invalid timeout {secs}s (must be finite and > 0).")));
        }
    };
    if args.threads == Some(0) {
        return Err(AppError::new(2, "Worker count must be >= 1."));
    }

    let config = FitConfig {
        input_path: args.input.clone(),
        output_path: args.output.clone(),
        intermediate_path: args.intermediate.clone(),
        params_path: args.params.clone(),
        input_delimiter: delimiter_byte(args.input_delimiter, "input")?,
        output_delimiter: delimiter_byte(args.output_delimiter, "output")?,
        skip_days: args.skip_days,
        regions: args.regions.clone(),
        threads: args.threads,
        estimator: EstimatorConfig {
            population: args.population,
            seed: ModelParameters::new(args.beta0, args.gamma0),
            max_evaluations: args.max_evals,
            timeout,
            integrator: IntegratorOptions {
                rtol: args.rtol,
                atol: args.atol,
                max_steps: args.max_steps,
            },
        },
    };
    config.estimator.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;

    fn fit_args(extra: &[&str]) -> FitArgs {
        let mut argv = vec!["sirfit", "fit", "-i", "raw.csv", "-o", "out.csv"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Fit(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn defaults_map_to_estimator_defaults() {
        let config = fit_config_from_args(&fit_args(&[])).unwrap();
        assert_eq!(config.estimator.seed, ModelParameters::SEED);
        assert_eq!(config.estimator.population, 1_000_000.0);
        assert_eq!(config.estimator.max_evaluations, 5000);
        assert_eq!(config.estimator.timeout, None);
        assert_eq!(config.output_delimiter, b';');
        assert_eq!(config.input_delimiter, b',');
    }

    #[test]
    fn overrides_are_applied() {
        let config = fit_config_from_args(&fit_args(&[
            "--population",
            "5000",
            "--beta0",
            "0.3",
            "--timeout-secs",
            "1.5",
            "--output-delimiter",
            ",",
        ]))
        .unwrap();
        assert_eq!(config.estimator.population, 5000.0);
        assert_eq!(config.estimator.seed.beta, 0.3);
        assert_eq!(config.estimator.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.output_delimiter, b',');
    }

    #[test]
    fn invalid_settings_are_configuration_errors() {
        for extra in [
            &["--population", "0"][..],
            &["--beta0=-1"][..],
            &["--max-evals", "0"][..],
            &["--timeout-secs=-2"][..],
            &["--threads", "0"][..],
            &["--output-delimiter", "x"][..],
        ] {
            let err = fit_config_from_args(&fit_args(extra)).unwrap_err();
            assert_eq!(err.exit_code(), 2, "{extra:?}");
        }
    }
}
