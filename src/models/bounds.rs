//! Parameter bounds for local models and for each global variant.
//!
//! Local bounds encode the physical constraints of the filter model:
//! gain in `[1, 500]`, transience in `[0, 1]`, stage counts `n1 ∈ [1, 10]`,
//! `Δn ∈ [0, 6]`, `log10 τ1 ∈ [-3, -1]`, `Δlog τ ∈ [log10(1.00001), 0.5]` and
//! mechanism angle in `[0, π/2]`.

use std::f64::consts::FRAC_PI_2;

use crate::domain::{LocalModel, MechanismParams};

/// Fraction of the box width used to pull a start off a bound.
const NUDGE_FRACTION: f64 = 1e-3;

/// Gain range of either mechanism.
pub const GAIN_MIN: f64 = 1.0;
pub const GAIN_MAX: f64 = 500.0;

/// Inclusive box constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Self {
        debug_assert_eq!(lower.len(), upper.len());
        Self { lower, upper }
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn contains(&self, params: &[f64]) -> bool {
        params.len() == self.len()
            && params
                .iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(&p, (&lo, &hi))| p >= lo && p <= hi)
    }

    /// Project onto the box. NaN coordinates go to the box midpoint.
    pub fn clamp(&self, params: &[f64]) -> Vec<f64> {
        params
            .iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .map(|(&p, (&lo, &hi))| {
                if p.is_nan() {
                    0.5 * (lo + hi)
                } else {
                    p.clamp(lo, hi)
                }
            })
            .collect()
    }

    /// Move every coordinate at or past a bound strictly inside by 0.1% of the width.
    pub fn nudge_inside(&self, params: &[f64]) -> Vec<f64> {
        params
            .iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .map(|(&p, (&lo, &hi))| {
                let margin = NUDGE_FRACTION * (hi - lo);
                if p.is_nan() {
                    0.5 * (lo + hi)
                } else if p <= lo {
                    lo + margin
                } else if p >= hi {
                    hi - margin
                } else {
                    p
                }
            })
            .collect()
    }

    /// Concatenate two boxes.
    pub fn extend(mut self, other: &Bounds) -> Self {
        self.lower.extend_from_slice(&other.lower);
        self.upper.extend_from_slice(&other.upper);
        self
    }
}

/// Bounds of one mechanism's six parameters.
pub fn mechanism_bounds() -> Bounds {
    let lower = MechanismParams {
        xi: GAIN_MIN,
        zeta: 0.0,
        n1: 1.0,
        delta_n: 0.0,
        log_tau1: -3.0,
        delta_log_tau: 1.00001_f64.log10(),
    };
    let upper = MechanismParams {
        xi: GAIN_MAX,
        zeta: 1.0,
        n1: 10.0,
        delta_n: 6.0,
        log_tau1: -1.0,
        delta_log_tau: 0.5,
    };
    Bounds::new(lower.to_array().to_vec(), upper.to_array().to_vec())
}

/// Bounds of the 13-slot local model.
pub fn local_bounds() -> Bounds {
    let mech = mechanism_bounds();
    let lower = LocalModel::from_parts(
        MechanismParams::from_slice(&mech.lower),
        MechanismParams::from_slice(&mech.lower),
        0.0,
    );
    let upper = LocalModel::from_parts(
        MechanismParams::from_slice(&mech.upper),
        MechanismParams::from_slice(&mech.upper),
        FRAC_PI_2,
    );
    Bounds::new(lower.0.to_vec(), upper.0.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::slot;

    #[test]
    fn local_bounds_match_physical_constraints() {
        let b = local_bounds();
        assert_eq!(b.len(), LocalModel::LEN);
        assert_eq!(b.lower[slot::XI_RG], 1.0);
        assert_eq!(b.upper[slot::XI_LUM], 500.0);
        assert_eq!(b.upper[slot::N1_RG], 10.0);
        assert_eq!(b.upper[slot::THETA], FRAC_PI_2);
        assert!(b.lower[slot::DELTA_LOG_TAU_LUM] > 0.0);
    }

    #[test]
    fn nudge_moves_boundary_points_inside() {
        let b = Bounds::new(vec![0.0, 0.0, 0.0], vec![10.0, 10.0, 10.0]);
        let nudged = b.nudge_inside(&[0.0, 12.0, 5.0]);
        assert!((nudged[0] - 0.01).abs() < 1e-15);
        assert!((nudged[1] - 9.99).abs() < 1e-12);
        assert_eq!(nudged[2], 5.0);
        assert!(b.contains(&nudged));
    }
}
