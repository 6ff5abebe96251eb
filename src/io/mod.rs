//! Input/output helpers.
//!
//! - CSV ingest + validation, observation CSV writer (`ingest`)
//! - per-location and residual CSV exports (`export`)
//! - result JSON and quick-fit resume cache (`results`)

pub mod export;
pub mod ingest;
pub mod results;

pub use export::*;
pub use ingest::*;
pub use results::*;
