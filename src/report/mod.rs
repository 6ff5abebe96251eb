//! Reporting utilities: per-observation residuals and worst misfits.

pub mod format;

pub use format::*;

use serde::Serialize;

use crate::domain::{Location, Variant};
use crate::error::FitError;
use crate::fit::objective::residual;
use crate::fit::selection::ModelSelection;
use crate::models::Response;

/// One observation under a fitted variant.
#[derive(Debug, Clone, Serialize)]
pub struct ObservationResidual {
    pub location: Location,
    pub tf: f64,
    /// Stimulus direction in the LM plane (radians).
    pub color_angle: f64,
    pub oog: bool,
    pub measured: f64,
    pub predicted: f64,
    /// `log10(measured) − log10(predicted)`, zero on the safe side of out-of-gamut rows.
    pub residual: f64,
}

/// Residuals of every kept observation under `variant`'s best record.
pub fn compute_residuals(selection: &ModelSelection, variant: Variant) -> Result<Vec<ObservationResidual>, FitError> {
    let record = selection
        .record(variant)
        .ok_or_else(|| FitError::InvalidInput(format!("No fit recorded for variant {variant}.")))?;

    let mut out = Vec::with_capacity(selection.n_observations);
    for ((location, observations), model) in selection
        .locations
        .iter()
        .zip(&selection.observations_by_location)
        .zip(&record.locals)
    {
        let response = Response::new(model);
        for obs in observations {
            let predicted = response.threshold(obs.color_angle(), obs.tf);
            out.push(ObservationResidual {
                location: *location,
                tf: obs.tf,
                color_angle: obs.color_angle(),
                oog: obs.oog,
                measured: obs.radius(),
                predicted,
                residual: residual(&response, obs),
            });
        }
    }
    Ok(out)
}

/// The `top_n` residuals with the largest magnitude, worst first.
pub fn worst_misfits(residuals: &[ObservationResidual], top_n: usize) -> Vec<ObservationResidual> {
    let mut sorted = residuals.to_vec();
    sorted.sort_by(|a, b| b.residual.abs().total_cmp(&a.residual.abs()));
    sorted.truncate(top_n);
    sorted
}

/// Root-mean-square log10 residual.
pub fn rms(residuals: &[ObservationResidual]) -> f64 {
    if residuals.is_empty() {
        return 0.0;
    }
    let ss: f64 = residuals.iter().map(|r| r.residual * r.residual).sum();
    (ss / residuals.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn residual_at(x: f64, value: f64) -> ObservationResidual {
        ObservationResidual {
            location: Location { x, y: 0.0 },
            tf: 4.0,
            color_angle: 0.0,
            oog: false,
            measured: 0.01,
            predicted: 0.01,
            residual: value,
        }
    }

    #[test]
    fn worst_misfits_rank_by_magnitude() {
        let rows = vec![residual_at(1.0, 0.02), residual_at(2.0, -0.3), residual_at(3.0, 0.1)];
        let worst = worst_misfits(&rows, 2);
        assert_eq!(worst.len(), 2);
        assert_eq!(worst[0].location.x, 2.0);
        assert_eq!(worst[1].location.x, 3.0);
    }

    #[test]
    fn rms_of_residuals() {
        let rows = vec![residual_at(1.0, 0.3), residual_at(2.0, -0.4)];
        assert!((rms(&rows) - (0.125f64).sqrt()).abs() < 1e-12);
        assert_eq!(rms(&[]), 0.0);
    }
}
