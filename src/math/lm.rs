//! Levenberg–Marquardt nonlinear least squares.
//!
//! Minimizes `Σ r_i(p)²` for a residual function evaluated as a black box. The
//! Jacobian is approximated by forward differences, so every iteration costs
//! `1 + n` residual evaluations (fewer when steps are rejected).
//!
//! Implementation choices:
//! - Damping is isotropic, `λ·max_j ||J_j||²·I`. Parameters should therefore be
//!   expressed on comparable (e.g. logarithmic) scales. With nearly collinear
//!   columns a weakly identified parameter then stays close to its starting value
//!   instead of absorbing the whole correction.
//! - Steps are capped by a trust radius that starts at
//!   `step_bound·max(||p||, 1)`, halves on every rejected trial and doubles when
//!   a step at the radius is accepted.
//! - Only steps that reduce the objective are accepted, so the returned SSE never
//!   exceeds the SSE at the starting point. A trial point where the residual
//!   function fails counts as a rejected step; failures at the starting point or
//!   at an accepted point end the search.
//! - Every residual evaluation counts against `max_evaluations`; the optional
//!   deadline is checked before each evaluation.

use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::math::lstsq::{damped_step, unscaled_covariance};

/// Optimizer settings.
#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    /// Hard cap on residual evaluations during the search.
    pub max_evaluations: usize,
    /// Stop when an accepted step improves SSE by less than this fraction.
    pub ftol: f64,
    /// Stop when the proposed step is this small relative to the parameters.
    pub xtol: f64,
    /// Stop when the scaled gradient falls below this value.
    pub gtol: f64,
    /// Stop once SSE is at or below this absolute value.
    pub sse_floor: f64,
    /// Relative forward-difference step for the Jacobian.
    pub fd_step: f64,
    pub initial_lambda: f64,
    /// Initial trust radius as a multiple of `max(||p||, 1)`.
    pub step_bound: f64,
    /// Abandon the search once this instant has passed.
    pub deadline: Option<Instant>,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_evaluations: 5000,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            gtol: 1e-12,
            sse_floor: 0.0,
            fd_step: 1e-6,
            initial_lambda: 1e-3,
            step_bound: 1.0,
            deadline: None,
        }
    }
}

/// Why the search stopped successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Termination {
    /// SSE reached `sse_floor` (zero by default).
    ExactFit,
    /// Relative SSE reduction of the last accepted step is below `ftol`.
    RelativeReduction,
    /// Step size (or damping) cannot make further progress.
    StepSize,
    /// Scaled gradient is below `gtol`.
    Gradient,
}

impl Termination {
    pub fn label(self) -> &'static str {
        match self {
            Termination::ExactFit => "exact-fit",
            Termination::RelativeReduction => "ftol",
            Termination::StepSize => "xtol",
            Termination::Gradient => "gtol",
        }
    }
}

/// Result of a converged search.
#[derive(Debug, Clone)]
pub struct LmReport {
    pub params: DVector<f64>,
    pub residuals: DVector<f64>,
    /// Jacobian of the residuals at `params`.
    pub jacobian: DMatrix<f64>,
    pub initial_sse: f64,
    pub sse: f64,
    pub evaluations: usize,
    pub iterations: usize,
    pub termination: Termination,
}

impl LmReport {
    /// Parameter covariance `s² (JᵀJ)⁻¹` with `s² = SSE / (m - n)`.
    ///
    /// Entries are infinite when it cannot be estimated: rank-deficient Jacobian,
    /// or no residual degrees of freedom (`m <= n`).
    pub fn covariance(&self) -> DMatrix<f64> {
        let (m, n) = self.jacobian.shape();
        match unscaled_covariance(&self.jacobian) {
            Some(cov) if m > n => cov * (self.sse / (m - n) as f64),
            _ => DMatrix::from_element(n, n, f64::INFINITY),
        }
    }
}

/// Search failures. `E` is the residual function's own error type.
#[derive(Debug, Clone, PartialEq)]
pub enum LmError<E> {
    /// The residual function failed.
    Residual(E),
    BudgetExhausted { evaluations: usize },
    DeadlineExceeded { evaluations: usize },
    /// Empty problem, or non-finite residuals at the starting point.
    Degenerate(String),
}

struct Evaluator<'a, F> {
    residual_fn: &'a mut F,
    evaluations: usize,
    max_evaluations: usize,
    deadline: Option<Instant>,
}

impl<F, E> Evaluator<'_, F>
where
    F: FnMut(&DVector<f64>) -> Result<DVector<f64>, E>,
{
    fn call(&mut self, params: &DVector<f64>) -> Result<DVector<f64>, LmError<E>> {
        if self.evaluations >= self.max_evaluations {
            return Err(LmError::BudgetExhausted {
                evaluations: self.evaluations,
            });
        }
        self.call_unbounded(params)
    }

    fn call_with(&mut self, params: &DVector<f64>, bounded: bool) -> Result<DVector<f64>, LmError<E>> {
        if bounded {
            self.call(params)
        } else {
            self.call_unbounded(params)
        }
    }

    fn call_unbounded(&mut self, params: &DVector<f64>) -> Result<DVector<f64>, LmError<E>> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(LmError::DeadlineExceeded {
                    evaluations: self.evaluations,
                });
            }
        }
        self.evaluations += 1;
        (self.residual_fn)(params).map_err(LmError::Residual)
    }

    /// Forward differences, falling back to a backward difference for a column
    /// whose shifted point the residual function rejects.
    fn jacobian(
        &mut self,
        params: &DVector<f64>,
        residuals: &DVector<f64>,
        fd_step: f64,
        bounded: bool,
    ) -> Result<DMatrix<f64>, LmError<E>> {
        let m = residuals.len();
        let n = params.len();
        let mut jac = DMatrix::<f64>::zeros(m, n);
        for j in 0..n {
            let h = fd_step * params[j].abs().max(1.0);
            let mut shifted = params.clone();
            shifted[j] += h;
            let (r, h) = match self.call_with(&shifted, bounded) {
                Ok(r) => (r, h),
                Err(LmError::Residual(_)) => {
                    shifted[j] = params[j] - h;
                    (self.call_with(&shifted, bounded)?, -h)
                }
                Err(e) => return Err(e),
            };
            for i in 0..m {
                jac[(i, j)] = (r[i] - residuals[i]) / h;
            }
        }
        Ok(jac)
    }
}

/// Minimize `||residual_fn(p)||²` starting from `initial`.
///
/// The final Jacobian (for the covariance) is evaluated at the returned
/// parameters after the search and is not subject to the evaluation cap.
pub fn levenberg_marquardt<F, E>(
    mut residual_fn: F,
    initial: DVector<f64>,
    opts: &LmOptions,
) -> Result<LmReport, LmError<E>>
where
    F: FnMut(&DVector<f64>) -> Result<DVector<f64>, E>,
{
    let mut eval = Evaluator {
        residual_fn: &mut residual_fn,
        evaluations: 0,
        max_evaluations: opts.max_evaluations,
        deadline: opts.deadline,
    };

    let n = initial.len();
    let mut params = initial;
    let mut residuals = eval.call(&params)?;
    if n == 0 || residuals.is_empty() {
        return Err(LmError::Degenerate("empty parameter or residual vector".to_string()));
    }
    if residuals.iter().any(|r| !r.is_finite()) {
        return Err(LmError::Degenerate("non-finite residuals at the starting point".to_string()));
    }

    let initial_sse = residuals.norm_squared();
    let mut sse = initial_sse;
    let mut lambda = opts.initial_lambda;
    let mut radius = opts.step_bound * params.norm().max(1.0);
    let mut iterations = 0usize;

    let termination = 'search: loop {
        if sse <= opts.sse_floor {
            break Termination::ExactFit;
        }
        iterations += 1;

        let jac = eval.jacobian(&params, &residuals, opts.fd_step, true)?;
        let gradient = jac.transpose() * &residuals;
        let column_norms = DVector::from_iterator(n, jac.column_iter().map(|c| c.norm().max(1e-300)));
        let scale = DVector::from_element(n, column_norms.max());

        let scaled_gradient = gradient
            .iter()
            .zip(column_norms.iter())
            .map(|(g, d)| g.abs() / (d * sse.sqrt()))
            .fold(0.0_f64, f64::max);
        if scaled_gradient <= opts.gtol {
            break Termination::Gradient;
        }

        // Residual error of the latest rejected trial, if it failed outright.
        let mut trial_failure: Option<E> = None;
        loop {
            let Some(mut step) = damped_step(&jac, &residuals, &scale, lambda) else {
                lambda *= 10.0;
                if lambda > 1e16 {
                    break 'search Termination::StepSize;
                }
                continue;
            };

            let mut step_norm = step.norm();
            if step_norm > radius {
                step *= radius / step_norm;
                step_norm = radius;
            }

            if step_norm <= opts.xtol * (params.norm() + opts.xtol) {
                break 'search Termination::StepSize;
            }

            let candidate = &params + &step;
            let candidate_residuals = match eval.call(&candidate) {
                Ok(r) => {
                    trial_failure = None;
                    Some(r)
                }
                Err(LmError::Residual(e)) => {
                    trial_failure = Some(e);
                    None
                }
                Err(e) => return Err(e),
            };

            if let Some(candidate_residuals) = candidate_residuals {
                let candidate_sse = candidate_residuals.norm_squared();
                if candidate_sse.is_finite() && candidate_sse < sse {
                    let reduction = (sse - candidate_sse) / sse;
                    params = candidate;
                    residuals = candidate_residuals;
                    sse = candidate_sse;
                    lambda = (lambda / 10.0).max(1e-12);
                    if step_norm >= radius * (1.0 - 1e-9) {
                        radius *= 2.0;
                    }

                    tracing::trace!(iterations, sse, lambda, radius, "accepted step");

                    if reduction <= opts.ftol {
                        break 'search Termination::RelativeReduction;
                    }
                    break;
                }
            }

            radius = 0.5 * step_norm;
            lambda *= 10.0;
            if lambda > 1e16 {
                if let Some(e) = trial_failure {
                    return Err(LmError::Residual(e));
                }
                break 'search Termination::StepSize;
            }
        }
    };

    let jacobian = eval.jacobian(&params, &residuals, opts.fd_step, false)?;

    Ok(LmReport {
        params,
        residuals,
        jacobian,
        initial_sse,
        sse,
        evaluations: eval.evaluations,
        iterations,
        termination,
    })
}
