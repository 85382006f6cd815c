//! Error types.
//!
//! `AppError` is the top-level error returned to `main`, carrying the process exit
//! code. The typed errors below describe failures of individual pipeline stages;
//! only `MalformedInputError` is fatal for a run; the others are recorded per region.

use std::time::Duration;

use thiserror::Error;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// The raw case table cannot be reshaped into region series.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed input: {0}")]
pub struct MalformedInputError(pub String);

impl MalformedInputError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<MalformedInputError> for AppError {
    fn from(err: MalformedInputError) -> Self {
        AppError::new(2, err.to_string())
    }
}

/// The trajectory integrator could not produce a solution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrationError {
    /// The per-interval step budget ran out before reaching the next output time.
    #[error("step budget of {max_steps} exhausted between t={from} and t={to}")]
    StepBudget { from: f64, to: f64, max_steps: usize },
    /// The controller shrank the step below the representable resolution at `t`.
    #[error("step size underflow at t={t}")]
    StepUnderflow { t: f64 },
    /// The right-hand side or the state became non-finite.
    #[error("non-finite state at t={t}")]
    NonFinite { t: f64 },
    /// Output times must start at the initial time and be non-decreasing.
    #[error("output times must be finite and non-decreasing (index {index})")]
    UnorderedTimes { index: usize },
}

/// The optimizer failed to produce an optimum for a region.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvergenceError {
    #[error("no convergence within {evaluations} model evaluations")]
    BudgetExhausted { evaluations: usize },
    #[error("forward model failed: {0}")]
    ForwardModel(#[from] IntegrationError),
    #[error("degenerate problem: {0}")]
    Degenerate(String),
}

/// Why a single region could not be fit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("insufficient data: {usable} usable observation(s), at least 2 required")]
    InsufficientData { usable: usize },
    #[error(transparent)]
    Convergence(#[from] ConvergenceError),
    #[error("abandoned after exceeding the {budget:?} fit budget")]
    Timeout { budget: Duration },
}

impl FitError {
    /// Short machine-friendly label used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            FitError::InsufficientData { .. } => "insufficient-data",
            FitError::Convergence(_) => "convergence",
            FitError::Timeout { .. } => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_input_maps_to_exit_code_two() {
        let err: AppError = MalformedInputError::new("no date columns").into();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("no date columns"));
    }

    #[test]
    fn integration_failure_surfaces_through_convergence() {
        let err: FitError = ConvergenceError::from(IntegrationError::NonFinite { t: 1.5 }).into();
        assert_eq!(err.kind(), "convergence");
        assert!(err.to_string().contains("t=1.5"));
    }
}
