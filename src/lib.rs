//! `tcsf-fit` library crate.
//!
//! Fits temporal contrast sensitivity models to psychophysical threshold data
//! measured at several retinal locations, then picks the best-supported model
//! among a nested family of global variants.
//!
//! The binary (`tcsf`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - modules are reusable (notebooks, batch scripts, etc.)

pub mod app;
pub mod cli;
pub mod data;
pub mod debug;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
