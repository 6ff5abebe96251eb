//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - threshold observations and retinal locations (`Observation`, `Location`)
//! - the 13-slot local model and the catalog of global variants (`LocalModel`, `Variant`)
//! - fit outputs and warnings (`FitRecord`, `LocalFit`, `FitWarning`)
//! - the validated, location-grouped dataset the fitters work on (`Dataset`)

pub mod dataset;
pub mod types;

pub use dataset::*;
pub use types::*;
