//! Parameter estimation.
//!
//! - single-region SIR fit (`estimator`)
//! - bounded parallel batch over all regions (`batch`)

pub mod batch;
pub mod estimator;

pub use batch::*;
pub use estimator::*;
