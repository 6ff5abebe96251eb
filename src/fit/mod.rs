//! Fitting pipeline.
//!
//! Responsibilities:
//!
//! - bounded Levenberg–Marquardt minimisation of residual models (`optimizer`)
//! - per-observation residuals and error sums (`objective`)
//! - multi-start per-location quick fits and cross-location refinement
//! - 1-D seed shapes and regression seeds for positional laws (`seed`)
//! - fitting one variant from one initial guess (`model_test`)
//! - the convergence loop, tilted fits, nesting checks and BIC selection (`selection`)

pub mod objective;
pub mod optimizer;
pub mod quick;
pub mod refine;
pub mod seed;
pub mod selection;

pub use model_test::{BestFits, FitContext, SelectionState, test_model};
pub use objective::{global_error, location_error, location_errors};
pub use optimizer::{Minimum, OptimizerConfig, Termination, minimize_bounded};
pub use quick::{QuickFits, quick_fit_all};
pub use refine::{RefineReport, refine};
pub use selection::*;
