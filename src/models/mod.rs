//! Compartmental epidemic model.
//!
//! The model is a pure rate function; trajectories are produced by the integrator
//! in `math::ode`.

pub mod sir;

pub use sir::*;
