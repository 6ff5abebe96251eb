//! Positional laws: how log10 gain varies with eccentricity and polar angle.
//!
//! Every law is linear in its coefficients:
//!
//! ```text
//! log10 ξ_LUM = b0 + b1·r + b2·r·cos2φ [+ b3·r·sin2φ]
//! log10 ξ_RG  = a0 + a1·r + a2·r·cos2φ [+ a3·r·sin2φ]
//! ```
//!
//! Variants store only the coefficients they free. Conversions go through the
//! full form `[b0, b1, b2, b3, a0, a1, a2, a3]`: absent tilts are zero, and the
//! yoked variant's single tilt is `b3 = a3`.

use crate::domain::{Mechanism, Polar, Variant};
use crate::math::dot;
use crate::models::bounds::{Bounds, GAIN_MAX, GAIN_MIN};

/// Length of the full coefficient form.
pub const FULL_LEN: usize = 8;

const SLOPE_BOUNDS: (f64, f64) = (-2.0, 2.0);

/// Number of law coefficients stored by a variant (0 for free-gain variants).
pub fn n_coefficients(variant: Variant) -> usize {
    coefficient_names(variant).len()
}

pub fn coefficient_names(variant: Variant) -> &'static [&'static str] {
    match variant {
        Variant::RampyTrough => &["b0", "b1", "b2", "a0", "a1", "a2"],
        Variant::TiltedTrough | Variant::YokedTilted => &["b0", "b1", "b2", "b3", "a0", "a1", "a2"],
        Variant::DoubleTilted => &["b0", "b1", "b2", "b3", "a0", "a1", "a2", "a3"],
        _ => &[],
    }
}

/// Expand a variant's coefficients to the full 8-coefficient form.
pub fn to_full(variant: Variant, c: &[f64]) -> [f64; FULL_LEN] {
    let mut full = [0.0; FULL_LEN];
    match variant {
        Variant::RampyTrough => {
            full[0..3].copy_from_slice(&c[0..3]);
            full[4..7].copy_from_slice(&c[3..6]);
        }
        Variant::TiltedTrough => {
            full[0..7].copy_from_slice(&c[0..7]);
        }
        Variant::YokedTilted => {
            full[0..7].copy_from_slice(&c[0..7]);
            full[7] = c[3];
        }
        Variant::DoubleTilted => full.copy_from_slice(&c[0..8]),
        _ => {}
    }
    full
}

/// Restrict the full form to what a variant stores.
pub fn from_full(variant: Variant, full: &[f64; FULL_LEN]) -> Vec<f64> {
    match variant {
        Variant::RampyTrough => vec![full[0], full[1], full[2], full[4], full[5], full[6]],
        Variant::TiltedTrough | Variant::YokedTilted => full[0..7].to_vec(),
        Variant::DoubleTilted => full.to_vec(),
        _ => Vec::new(),
    }
}

/// Re-express coefficients of one positional variant in another's layout.
pub fn convert(from: Variant, c: &[f64], to: Variant) -> Vec<f64> {
    from_full(to, &to_full(from, c))
}

/// Regressors of one mechanism's log10 gain at a location.
pub fn design_row(variant: Variant, mech: Mechanism, polar: Polar) -> Vec<f64> {
    let r = polar.r;
    let rc = r * (2.0 * polar.phi).cos();
    let rs = r * (2.0 * polar.phi).sin();
    match (variant, mech) {
        (Variant::RampyTrough, Mechanism::Lum) => vec![1.0, r, rc, 0.0, 0.0, 0.0],
        (Variant::RampyTrough, Mechanism::Rg) => vec![0.0, 0.0, 0.0, 1.0, r, rc],
        (Variant::TiltedTrough, Mechanism::Lum) | (Variant::YokedTilted, Mechanism::Lum) => {
            vec![1.0, r, rc, rs, 0.0, 0.0, 0.0]
        }
        (Variant::TiltedTrough, Mechanism::Rg) => vec![0.0, 0.0, 0.0, 0.0, 1.0, r, rc],
        (Variant::YokedTilted, Mechanism::Rg) => vec![0.0, 0.0, 0.0, rs, 1.0, r, rc],
        (Variant::DoubleTilted, Mechanism::Lum) => vec![1.0, r, rc, rs, 0.0, 0.0, 0.0, 0.0],
        (Variant::DoubleTilted, Mechanism::Rg) => vec![0.0, 0.0, 0.0, 0.0, 1.0, r, rc, rs],
        _ => Vec::new(),
    }
}

pub fn log10_gain(variant: Variant, mech: Mechanism, polar: Polar, coefficients: &[f64]) -> f64 {
    dot(&design_row(variant, mech, polar), coefficients)
}

/// Gain of `mech` at `polar`, held inside `[GAIN_MIN, GAIN_MAX]`.
///
/// Slopes can push the linear law past the local gain range at large
/// eccentricities; clamping keeps every expanded local model a valid point of
/// the free-gain variants.
pub fn gain(variant: Variant, mech: Mechanism, polar: Polar, coefficients: &[f64]) -> f64 {
    10f64
        .powf(log10_gain(variant, mech, polar, coefficients))
        .clamp(GAIN_MIN, GAIN_MAX)
}

/// Coefficient bounds: intercepts in `[0, log10 500]`, everything else in `[-2, 2]`.
pub fn law_bounds(variant: Variant) -> Bounds {
    let intercept = (GAIN_MIN.log10(), GAIN_MAX.log10());
    let names = coefficient_names(variant);
    let (lower, upper) = names
        .iter()
        .map(|name| {
            if name.ends_with('0') {
                intercept
            } else {
                SLOPE_BOUNDS
            }
        })
        .unzip();
    Bounds::new(lower, upper)
}
