//! Temporal frequency response and predicted thresholds.
//!
//! Each mechanism is a difference of two cascaded low-pass filters:
//!
//! ```text
//! s(ω) = ξ · | (1 + i·2π·τ1·ω)^(-n1) − ζ·(1 + i·2π·τ2·ω)^(-n2) |
//! ```
//!
//! Numerical notes:
//! - The stage powers are evaluated in the log domain,
//!   `ln(1 + ix) = ½·ln1p(x²) + i·atan(x)`, so large `n` underflows smoothly to 0
//!   instead of producing NaN.
//! - Sensitivity is floored at `SENSITIVITY_FLOOR` so thresholds stay finite when
//!   the two stages cancel (e.g. `ζ = 1` at `ω = 0`).

use std::f64::consts::PI;

use nalgebra::Complex;

use crate::domain::{LocalModel, MechanismParams};

pub const SENSITIVITY_FLOOR: f64 = 1e-12;

/// `(1 + i·2π·τ·ω)^(-n)`.
fn low_pass(tau: f64, n: f64, omega: f64) -> Complex<f64> {
    let x = 2.0 * PI * tau * omega;
    let log_mag = -0.5 * n * (x * x).ln_1p();
    Complex::from_polar(log_mag.exp(), -n * x.atan())
}

/// A mechanism with its time constants resolved, ready for repeated evaluation.
#[derive(Debug, Clone, Copy)]
pub struct Filter {
    xi: f64,
    zeta: f64,
    n1: f64,
    n2: f64,
    tau1: f64,
    tau2: f64,
}

impl Filter {
    pub fn new(p: &MechanismParams) -> Self {
        let tau1 = 10f64.powf(p.log_tau1);
        Self {
            xi: p.xi,
            zeta: p.zeta,
            n1: p.n1,
            n2: p.n1 + p.delta_n,
            tau1,
            tau2: tau1 * 10f64.powf(p.delta_log_tau),
        }
    }

    pub fn sensitivity(&self, omega: f64) -> f64 {
        let h = low_pass(self.tau1, self.n1, omega) - low_pass(self.tau2, self.n2, omega) * self.zeta;
        (self.xi * h.norm()).max(SENSITIVITY_FLOOR)
    }
}

/// Both mechanisms and the mechanism angle of a location.
#[derive(Debug, Clone, Copy)]
pub struct Response {
    lum: Filter,
    rg: Filter,
    theta: f64,
}

impl Response {
    pub fn new(model: &LocalModel) -> Self {
        Self {
            lum: Filter::new(&model.lum()),
            rg: Filter::new(&model.rg()),
            theta: model.theta(),
        }
    }

    /// log10 of the predicted threshold (cone-contrast vector length).
    ///
    /// LUM points along `theta`, RG along `theta - π/2`; the two combine as an ellipse.
    pub fn log10_threshold(&self, color_angle: f64, omega: f64) -> f64 {
        let d = color_angle - self.theta;
        let a = self.lum.sensitivity(omega) * d.cos();
        let b = self.rg.sensitivity(omega) * d.sin();
        -a.hypot(b).log10()
    }

    pub fn threshold(&self, color_angle: f64, omega: f64) -> f64 {
        10f64.powf(self.log10_threshold(color_angle, omega))
    }
}

/// Sensitivity of a single mechanism at temporal frequency `omega` (Hz).
pub fn sensitivity(params: &MechanismParams, omega: f64) -> f64 {
    Filter::new(params).sensitivity(omega)
}

/// Predicted detection threshold for a stimulus direction and frequency.
pub fn predicted_threshold(model: &LocalModel, color_angle: f64, omega: f64) -> f64 {
    Response::new(model).threshold(color_angle, omega)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_4;

    fn mech(xi: f64, zeta: f64, n1: f64) -> MechanismParams {
        MechanismParams {
            xi,
            zeta,
            n1,
            delta_n: 1.0,
            log_tau1: -2.0,
            delta_log_tau: 0.2,
        }
    }

    #[test]
    fn dc_response_is_gain_times_one_minus_zeta() {
        let s = sensitivity(&mech(50.0, 0.4, 3.0), 0.0);
        assert!((s - 30.0).abs() < 1e-9, "got {s}");
    }

    #[test]
    fn matches_direct_complex_power_for_small_n() {
        let p = mech(20.0, 0.6, 2.0);
        let omega = 7.0;
        let tau1 = 10f64.powf(p.log_tau1);
        let tau2 = tau1 * 10f64.powf(p.delta_log_tau);
        let one = Complex::new(1.0, 0.0);
        let h1 = (one + Complex::new(0.0, 2.0 * PI * tau1 * omega)).powf(-p.n1);
        let h2 = (one + Complex::new(0.0, 2.0 * PI * tau2 * omega)).powf(-(p.n1 + p.delta_n));
        let direct = p.xi * (h1 - h2 * p.zeta).norm();
        assert!((sensitivity(&p, omega) - direct).abs() < 1e-9);
    }

    #[test]
    fn large_stage_counts_stay_finite() {
        let mut p = mech(500.0, 1.0, 10.0);
        p.delta_n = 6.0;
        p.log_tau1 = -1.0;
        for &omega in &[0.0, 1e-9, 1.0, 60.0, 1e6] {
            let s = sensitivity(&p, omega);
            assert!(s.is_finite() && s >= SENSITIVITY_FLOOR, "omega={omega} s={s}");
        }
    }

    #[test]
    fn threshold_along_mechanism_axis_is_reciprocal_sensitivity() {
        let lum = mech(40.0, 0.5, 3.0);
        let rg = mech(80.0, 0.1, 5.0);
        let model = LocalModel::from_parts(lum, rg, FRAC_PI_4);

        let t_lum = predicted_threshold(&model, FRAC_PI_4, 5.0);
        assert!((t_lum - 1.0 / sensitivity(&lum, 5.0)).abs() < 1e-12);

        let t_rg = predicted_threshold(&model, -FRAC_PI_4, 5.0);
        assert!((t_rg - 1.0 / sensitivity(&rg, 5.0)).abs() < 1e-12);
    }
}
