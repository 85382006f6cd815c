//! Numerical kernels: ODE integration, least-squares linear algebra and the
//! Levenberg–Marquardt optimizer.

pub mod lm;
pub mod lstsq;
pub mod ode;

pub use lm::*;
pub use lstsq::*;
pub use ode::*;
