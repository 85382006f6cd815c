//! `sir-fit` library crate.
//!
//! The binary (`sirfit`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the estimation pipeline can be driven from other tools

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
pub mod series;
