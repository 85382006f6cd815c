//! Region/date pivot of the raw case table.

pub mod reshape;

pub use reshape::*;
