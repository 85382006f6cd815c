//! Shared domain types.
//!
//! Every stage of the pipeline produces a new value from the previous one; none of
//! these types are mutated after construction.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::FitError;
use crate::fit::EstimatorConfig;
use crate::math::Termination;

/// Raw wide-format case table exactly as read from the input file.
///
/// Cells are kept as text; interpretation (region column, date headers, counts)
/// belongs to the series reshaper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCaseTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

/// One data row of the raw table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based line number in the source file (header is line 1).
    pub line: usize,
    pub cells: Vec<String>,
}

/// A row that was skipped while reshaping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub line: usize,
    pub region: Option<String>,
    pub message: String,
}

/// Case counts of one region aligned to the shared date axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSeries {
    pub region: String,
    pub dates: Arc<[NaiveDate]>,
    pub counts: Vec<u64>,
}

impl RegionSeries {
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Index of the first strictly positive observation (start of the trimmed window).
    pub fn onset(&self) -> Option<usize> {
        self.counts.iter().position(|&c| c > 0)
    }
}

/// Compartment sizes at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelState {
    pub susceptible: f64,
    pub infected: f64,
    pub recovered: f64,
}

impl ModelState {
    /// Initial state for a closed population with `infected` cases and nobody recovered.
    pub fn outbreak(population: f64, infected: f64) -> Self {
        Self {
            susceptible: population - infected,
            infected,
            recovered: 0.0,
        }
    }

    pub fn total(&self) -> f64 {
        self.susceptible + self.infected + self.recovered
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.susceptible, self.infected, self.recovered]
    }

    pub fn from_array(v: [f64; 3]) -> Self {
        Self {
            susceptible: v[0],
            infected: v[1],
            recovered: v[2],
        }
    }
}

/// Free parameters of the SIR model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// Transmission rate per day.
    pub beta: f64,
    /// Recovery rate per day.
    pub gamma: f64,
}

impl ModelParameters {
    /// Seed used for every region unless overridden.
    pub const SEED: ModelParameters = ModelParameters { beta: 0.4, gamma: 0.1 };

    pub fn new(beta: f64, gamma: f64) -> Self {
        Self { beta, gamma }
    }

    /// Basic reproduction number `beta / gamma`.
    pub fn r0(&self) -> f64 {
        if self.gamma > 0.0 {
            self.beta / self.gamma
        } else {
            f64::INFINITY
        }
    }
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self::SEED
    }
}

/// Standard errors of the fitted parameters (square roots of the covariance diagonal).
///
/// Infinite when the covariance cannot be estimated (e.g. exactly two points).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterErrors {
    pub beta: f64,
    pub gamma: f64,
}

/// Fit diagnostics for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct FitQuality {
    /// Sum of squared residuals at the seed parameters.
    pub seed_sse: f64,
    /// Sum of squared residuals at the optimum.
    pub sse: f64,
    pub rmse: f64,
    /// Forward-model evaluations spent, including Jacobian columns.
    pub evaluations: usize,
    pub iterations: usize,
    pub termination: Termination,
}

/// Successful fit of one region.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub region: String,
    pub parameters: ModelParameters,
    pub parameter_std_errors: ParameterErrors,
    /// `I(t)` over the trimmed window; same length as the window.
    pub fitted_infected: Vec<f64>,
    /// Index of the trimmed window's first day on the shared date axis.
    pub onset: usize,
    pub quality: FitQuality,
}

/// Estimation outcome for one region; failures are kept next to successes.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionOutcome {
    pub region: String,
    pub result: Result<FitResult, FitError>,
}

impl RegionOutcome {
    pub fn fit(&self) -> Option<&FitResult> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&FitError> {
        self.result.as_ref().err()
    }
}

/// Observed and fitted columns of one region in the output table.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionColumns {
    pub region: String,
    pub observed: Vec<u64>,
    /// Zero-padded fitted trajectory; all zeros when the fit failed.
    pub fitted: Vec<f64>,
    pub has_fit: bool,
}

/// Final table consumed by the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTable {
    pub dates: Arc<[NaiveDate]>,
    pub regions: Vec<RegionColumns>,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults and environment).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Optional intermediate artifact (reshaped per-region series).
    pub intermediate_path: Option<PathBuf>,
    /// Optional JSON parameter report.
    pub params_path: Option<PathBuf>,

    pub input_delimiter: u8,
    pub output_delimiter: u8,

    /// Leading date columns dropped before fitting.
    pub skip_days: usize,
    /// Regions to keep; empty keeps all.
    pub regions: Vec<String>,

    /// Worker pool size; `None` uses one worker per core.
    pub threads: Option<usize>,

    pub estimator: EstimatorConfig,
}
