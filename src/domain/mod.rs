//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the raw input table and per-region series (`RawCaseTable`, `RegionSeries`)
//! - model state and parameters (`ModelState`, `ModelParameters`)
//! - fit outputs (`FitResult`, `RegionOutcome`, `OutputTable`)

pub mod types;

pub use types::*;
