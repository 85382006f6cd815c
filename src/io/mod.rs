//! Input/output helpers.
//!
//! - raw case table ingest (`ingest`)
//! - series / output table CSV exports (`export`)
//! - parameter report JSON read/write (`params`)

pub mod export;
pub mod ingest;
pub mod params;

pub use export::*;
pub use ingest::*;
pub use params::*;
