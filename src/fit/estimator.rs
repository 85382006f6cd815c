//! Per-region SIR parameter estimation.
//!
//! For one region:
//! - trim the series to its first strictly positive count (the trimmed window)
//! - start the outbreak at that count (`I0`), everyone else susceptible
//! - fit `(beta, gamma)` by Levenberg–Marquardt on the SSE between simulated
//!   `I(t)` and the observed counts, starting from the configured seed
//! - derive standard errors from the covariance diagonal and re-simulate at the optimum
//!
//! The optimizer works on `(ln beta, ln gamma)`: both rates stay strictly positive
//! and the isotropic damping sees dimensionless coordinates. Optima at a zero or
//! unbounded rate (a flat or collapsing series) sit at infinity in these
//! coordinates, so the search also stops once every residual is below
//! [`RESIDUAL_FLOOR`] times the largest observed count.

use std::time::{Duration, Instant};

use nalgebra::DVector;

use crate::domain::{FitQuality, FitResult, ModelParameters, ModelState, ParameterErrors, RegionSeries};
use crate::error::{AppError, ConvergenceError, FitError, IntegrationError};
use crate::math::{IntegratorOptions, LmError, LmOptions, levenberg_marquardt};
use crate::models::infected_trajectory;

/// Default closed-population size shared by all regions.
pub const DEFAULT_POPULATION: f64 = 1_000_000.0;

/// Default cap on forward-model evaluations per region.
pub const DEFAULT_MAX_EVALUATIONS: usize = 5000;

/// Per-point residual, relative to the largest count, treated as an exact fit.
pub const RESIDUAL_FLOOR: f64 = 1e-6;

/// Settings shared by every region's fit.
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    /// Closed-population constant `N0`.
    pub population: f64,
    /// Starting point of the optimizer.
    pub seed: ModelParameters,
    pub max_evaluations: usize,
    /// Wall-clock budget per region; `None` disables it.
    pub timeout: Option<Duration>,
    pub integrator: IntegratorOptions,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            population: DEFAULT_POPULATION,
            seed: ModelParameters::SEED,
            max_evaluations: DEFAULT_MAX_EVALUATIONS,
            timeout: None,
            integrator: IntegratorOptions::default(),
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.population.is_finite() && self.population > 0.0) {
            return Err(AppError::new(2, format!("Invalid population {} (must be finite and > 0).", self.population)));
        }
        if !(self.seed.beta.is_finite() && self.seed.beta > 0.0 && self.seed.gamma.is_finite() && self.seed.gamma > 0.0) {
            return Err(AppError::new(
                2,
                format!(
                    "Invalid seed beta={}, gamma={} (both must be finite and > 0).",
                    self.seed.beta, self.seed.gamma
                ),
            ));
        }
        if self.max_evaluations == 0 {
            return Err(AppError::new(2, "Evaluation cap must be >= 1."));
        }
        let ig = &self.integrator;
        if !(ig.rtol.is_finite() && ig.rtol > 0.0 && ig.atol.is_finite() && ig.atol > 0.0) {
            return Err(AppError::new(2, "Integrator tolerances must be finite and > 0."));
        }
        if ig.max_steps == 0 {
            return Err(AppError::new(2, "Integrator step budget must be >= 1."));
        }
        Ok(())
    }
}

/// Trimmed window of one region: `(onset index, counts from onset on)`.
pub fn trimmed_window(series: &RegionSeries) -> Result<(usize, &[u64]), FitError> {
    let onset = series
        .onset()
        .ok_or(FitError::InsufficientData { usable: 0 })?;
    let window = &series.counts[onset..];
    if window.len() < 2 {
        return Err(FitError::InsufficientData { usable: window.len() });
    }
    Ok((onset, window))
}

/// Forward problem of one region: fixed initial state, time grid and observations.
struct RegionProblem<'a> {
    initial: ModelState,
    population: f64,
    times: Vec<f64>,
    observed: Vec<f64>,
    integrator: &'a IntegratorOptions,
}

impl RegionProblem<'_> {
    fn trajectory(&self, params: &ModelParameters) -> Result<Vec<f64>, IntegrationError> {
        infected_trajectory(self.initial, params, self.population, &self.times, self.integrator)
    }

    fn residuals(&self, params: &ModelParameters) -> Result<DVector<f64>, IntegrationError> {
        let fitted = self.trajectory(params)?;
        Ok(DVector::from_iterator(
            fitted.len(),
            fitted.iter().zip(&self.observed).map(|(f, o)| f - o),
        ))
    }
}

fn to_log(params: &ModelParameters) -> DVector<f64> {
    DVector::from_row_slice(&[params.beta.ln(), params.gamma.ln()])
}

fn from_log(p: &DVector<f64>) -> ModelParameters {
    ModelParameters::new(p[0].exp(), p[1].exp())
}

/// Fit one region.
pub fn estimate_region(series: &RegionSeries, config: &EstimatorConfig) -> Result<FitResult, FitError> {
    let (onset, window) = trimmed_window(series)?;
    let observed: Vec<f64> = window.iter().map(|&c| c as f64).collect();
    let k = observed.len();

    if observed[0] >= config.population {
        return Err(ConvergenceError::Degenerate("initial infected exceeds population N0".to_string()).into());
    }

    let scale = observed.iter().copied().fold(1.0_f64, f64::max);
    let problem = RegionProblem {
        initial: ModelState::outbreak(config.population, observed[0]),
        population: config.population,
        times: (0..k).map(|d| d as f64).collect(),
        observed,
        integrator: &config.integrator,
    };

    let opts = LmOptions {
        max_evaluations: config.max_evaluations,
        sse_floor: k as f64 * (RESIDUAL_FLOOR * scale).powi(2),
        deadline: config.timeout.map(|budget| Instant::now() + budget),
        ..LmOptions::default()
    };

    let report = levenberg_marquardt(|p| problem.residuals(&from_log(p)), to_log(&config.seed), &opts)
        .map_err(|err| match err {
            LmError::Residual(e) => FitError::from(ConvergenceError::ForwardModel(e)),
            LmError::BudgetExhausted { evaluations } => {
                FitError::from(ConvergenceError::BudgetExhausted { evaluations })
            }
            LmError::DeadlineExceeded { .. } => FitError::Timeout {
                budget: config.timeout.unwrap_or_default(),
            },
            LmError::Degenerate(msg) => FitError::from(ConvergenceError::Degenerate(msg)),
        })?;

    let parameters = from_log(&report.params);

    // d(beta) = beta * d(ln beta), so the natural-scale standard error is
    // the log-scale one times the parameter.
    let cov = report.covariance();
    let parameter_std_errors = ParameterErrors {
        beta: parameters.beta * cov[(0, 0)].max(0.0).sqrt(),
        gamma: parameters.gamma * cov[(1, 1)].max(0.0).sqrt(),
    };

    let fitted_infected = problem
        .trajectory(&parameters)
        .map_err(|e| FitError::from(ConvergenceError::ForwardModel(e)))?;

    tracing::debug!(
        region = %series.region,
        beta = parameters.beta,
        gamma = parameters.gamma,
        sse = report.sse,
        evaluations = report.evaluations,
        termination = report.termination.label(),
        "region converged"
    );

    Ok(FitResult {
        region: series.region.clone(),
        parameters,
        parameter_std_errors,
        fitted_infected,
        onset,
        quality: FitQuality {
            seed_sse: report.initial_sse,
            sse: report.sse,
            rmse: (report.sse / k as f64).sqrt(),
            evaluations: report.evaluations,
            iterations: report.iterations,
            termination: report.termination,
        },
    })
}
