//! Error type shared by the library and the `tcsf` binary.
//!
//! Every fatal condition maps to a process exit code:
//!
//! - `2`: bad input, configuration or I/O
//! - `3`: the dataset cannot support the positional-law models
//! - `4`: an internal invariant was violated during fitting

use thiserror::Error;

use crate::domain::{Location, Variant};

#[derive(Debug, Clone, Error)]
pub enum FitError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Io(String),

    #[error("Need at least {required} distinct retinal locations, found {found}.")]
    TooFewLocations { found: usize, required: usize },

    #[error(
        "The {} retinal locations are collinear; positional-law models are unidentifiable.",
        locations.len()
    )]
    CollinearLocations { locations: Vec<Location> },

    #[error(
        "Variant {variant}: global error {global:.12e} differs from the per-location sum {local_sum:.12e} (params: {params:?})."
    )]
    ErrorSumMismatch {
        variant: Variant,
        global: f64,
        local_sum: f64,
        params: Vec<f64>,
    },

    #[error(
        "Variant {richer} fits worse than nested variant {nested} ({richer_error:.9e} > {nested_error:.9e}).\n  {richer} params: {richer_params:?}\n  {nested} params: {nested_params:?}"
    )]
    NestingViolation {
        richer: Variant,
        nested: Variant,
        richer_error: f64,
        nested_error: f64,
        richer_params: Vec<f64>,
        nested_params: Vec<f64>,
    },
}

impl FitError {
    pub fn exit_code(&self) -> u8 {
        match self {
            FitError::InvalidInput(_) | FitError::Config(_) | FitError::Io(_) => 2,
            FitError::TooFewLocations { .. } | FitError::CollinearLocations { .. } => 3,
            FitError::ErrorSumMismatch { .. } | FitError::NestingViolation { .. } => 4,
        }
    }

    /// True for the conditions that indicate a defect in fitting rather than in the data.
    pub fn is_invariant_violation(&self) -> bool {
        self.exit_code() == 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_fitting_defects_are_invariant_violations() {
        let mismatch = FitError::ErrorSumMismatch {
            variant: Variant::RampyTrough,
            global: 1.0,
            local_sum: 2.0,
            params: vec![0.5],
        };
        assert!(mismatch.is_invariant_violation());
        assert_eq!(mismatch.exit_code(), 4);

        let data = FitError::TooFewLocations { found: 2, required: 3 };
        assert!(!data.is_invariant_violation());
        assert!(!FitError::InvalidInput("empty".into()).is_invariant_violation());
    }
}
