//! Read/write the per-region parameter report (JSON).
//!
//! The report records the run settings that affect the fit (population, seed)
//! and, for each region in output order, either the fitted parameters with
//! diagnostics or the reason the fit failed. Non-finite numbers (infinite
//! standard errors, infinite `R0`) are written as `null`.

use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{FitResult, ModelParameters, RegionOutcome};
use crate::error::AppError;
use crate::math::Termination;

pub const TOOL_NAME: &str = "sirfit";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamsFile {
    pub tool: String,
    pub population: f64,
    pub seed: ModelParameters,
    pub regions: Vec<RegionEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RegionEntry {
    Fitted(FittedEntry),
    Failed(FailedEntry),
}

impl RegionEntry {
    pub fn region(&self) -> &str {
        match self {
            RegionEntry::Fitted(f) => &f.region,
            RegionEntry::Failed(f) => &f.region,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedEntry {
    pub region: String,
    pub beta: f64,
    pub gamma: f64,
    pub beta_std_error: Option<f64>,
    pub gamma_std_error: Option<f64>,
    pub r0: Option<f64>,
    pub onset_date: Option<NaiveDate>,
    pub observations: usize,
    pub seed_sse: f64,
    pub sse: f64,
    pub rmse: f64,
    pub evaluations: usize,
    pub iterations: usize,
    pub termination: Termination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub region: String,
    pub kind: String,
    pub reason: String,
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

impl FittedEntry {
    fn from_fit(fit: &FitResult, dates: &[NaiveDate]) -> Self {
        Self {
            region: fit.region.clone(),
            beta: fit.parameters.beta,
            gamma: fit.parameters.gamma,
            beta_std_error: finite(fit.parameter_std_errors.beta),
            gamma_std_error: finite(fit.parameter_std_errors.gamma),
            r0: finite(fit.parameters.r0()),
            onset_date: dates.get(fit.onset).copied(),
            observations: fit.fitted_infected.len(),
            seed_sse: fit.quality.seed_sse,
            sse: fit.quality.sse,
            rmse: fit.quality.rmse,
            evaluations: fit.quality.evaluations,
            iterations: fit.quality.iterations,
            termination: fit.quality.termination,
        }
    }
}

/// Build the report for a finished run.
pub fn build_params_file(
    outcomes: &[RegionOutcome],
    dates: &[NaiveDate],
    population: f64,
    seed: ModelParameters,
) -> ParamsFile {
    let regions = outcomes
        .iter()
        .map(|o| match &o.result {
            Ok(fit) => RegionEntry::Fitted(FittedEntry::from_fit(fit, dates)),
            Err(err) => RegionEntry::Failed(FailedEntry {
                region: o.region.clone(),
                kind: err.kind().to_string(),
                reason: err.to_string(),
            }),
        })
        .collect();

    ParamsFile {
        tool: TOOL_NAME.to_string(),
        population,
        seed,
        regions,
    }
}

/// Write a parameter report.
pub fn write_params_json(path: &Path, params: &ParamsFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create params JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, params)
        .map_err(|e| AppError::new(2, format!("Failed to write params JSON: {e}")))?;
    Ok(())
}

/// Read a parameter report.
pub fn read_params_json(path: &Path) -> Result<ParamsFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open params JSON '{}': {e}", path.display())))?;
    let params: ParamsFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid params JSON: {e}")))?;
    Ok(params)
}
