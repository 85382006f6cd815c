//! Closed-population SIR model.
//!
//! ```text
//! dS/dt = -beta * S * I / N0
//! dI/dt =  beta * S * I / N0 - gamma * I
//! dR/dt =  gamma * I
//! ```
//!
//! The three rates sum to zero, so `S + I + R` stays at its initial value.

use crate::domain::{ModelParameters, ModelState};
use crate::error::IntegrationError;
use crate::math::{IntegratorOptions, solve};

/// Instantaneous rates of change `(dS/dt, dI/dt, dR/dt)`.
pub fn derivatives(state: &[f64; 3], params: &ModelParameters, population: f64) -> [f64; 3] {
    let [s, i, _r] = *state;
    let infection = params.beta * s * i / population;
    let recovery = params.gamma * i;
    [-infection, infection - recovery, recovery]
}

/// Simulate the full state at each time point (day offsets, starting at `times[0]`).
pub fn simulate(
    initial: ModelState,
    params: &ModelParameters,
    population: f64,
    times: &[f64],
    opts: &IntegratorOptions,
) -> Result<Vec<ModelState>, IntegrationError> {
    let rhs = |_t: f64, y: &[f64; 3]| derivatives(y, params, population);
    let states = solve(rhs, initial.to_array(), times, opts)?;
    Ok(states.into_iter().map(ModelState::from_array).collect())
}

/// Simulate and keep only the infected compartment.
pub fn infected_trajectory(
    initial: ModelState,
    params: &ModelParameters,
    population: f64,
    times: &[f64],
    opts: &IntegratorOptions,
) -> Result<Vec<f64>, IntegrationError> {
    Ok(simulate(initial, params, population, times, opts)?
        .into_iter()
        .map(|s| s.infected)
        .collect())
}
