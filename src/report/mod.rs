//! Reporting: output table assembly and terminal summaries.

pub mod assemble;
pub mod format;

pub use assemble::*;
pub use format::*;
