//! Synthetic threshold data generated from a known global model.
//!
//! Thresholds are predicted by the model at every (location, frequency, colour
//! direction), perturbed by log-normal noise and clipped to the display gamut.
//! Clipped rows are flagged out-of-gamut and carry the gamut limit as their
//! (lower-bound) contrast.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, FRAC_PI_8};

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{LocalModel, Location, MechanismParams, Observation, Variant};
use crate::error::FitError;
use crate::models::{Layout, law, predicted_threshold};

/// Everything needed to generate one synthetic dataset.
#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    pub variant: Variant,
    /// Global parameter vector in `variant`'s layout for `locations`.
    pub params: Vec<f64>,
    pub locations: Vec<Location>,
    pub frequencies: Vec<f64>,
    /// Stimulus directions in the LM plane (radians).
    pub color_angles: Vec<f64>,
    /// Standard deviation of the log10 threshold noise.
    pub noise_sd: f64,
    /// Largest displayable cone-contrast vector length.
    pub gamut_limit: f64,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        let locations = reference_locations();
        let params = reference_params(Variant::YokedTilted, &locations);
        Self {
            variant: Variant::YokedTilted,
            params,
            locations,
            frequencies: vec![1.0, 3.0, 8.0, 15.0, 25.0],
            color_angles: vec![
                FRAC_PI_4,
                -FRAC_PI_4,
                0.0,
                FRAC_PI_2,
                FRAC_PI_8,
                -3.0 * FRAC_PI_8,
            ],
            noise_sd: 0.01,
            gamut_limit: 0.5,
            seed: 0,
        }
    }
}

/// Five non-collinear locations (tenths of a degree).
pub fn reference_locations() -> Vec<Location> {
    [(50.0, 0.0), (0.0, 60.0), (40.0, 40.0), (80.0, -20.0), (30.0, -70.0)]
        .iter()
        .map(|&(x, y)| Location { x, y })
        .collect()
}

/// Reference shape: sustained, band-pass LUM and low-pass RG (gains come from the law).
pub fn reference_shape() -> LocalModel {
    let lum = MechanismParams {
        xi: 1.0,
        zeta: 0.7,
        n1: 4.0,
        delta_n: 1.5,
        log_tau1: -2.2,
        delta_log_tau: 0.25,
    };
    let rg = MechanismParams {
        xi: 1.0,
        zeta: 0.2,
        n1: 6.0,
        delta_n: 1.0,
        log_tau1: -2.0,
        delta_log_tau: 0.2,
    };
    LocalModel::from_parts(lum, rg, 0.8)
}

/// Yoked-tilt law `[b0, b1, b2, b3, a0, a1, a2]`.
pub const REFERENCE_LAW: [f64; 7] = [1.8, -0.05, 0.01, 0.02, 2.2, -0.08, 0.015];

/// Reference model in `variant`'s layout (the 18-parameter yoked-tilt model by default).
///
/// Free-gain variants get the law's gains evaluated at each location.
pub fn reference_params(variant: Variant, locations: &[Location]) -> Vec<f64> {
    let positional = Layout::new(Variant::YokedTilted, locations.len());
    let params = positional.project(&vec![reference_shape(); locations.len()], &REFERENCE_LAW);
    let locals: Vec<LocalModel> = locations
        .iter()
        .enumerate()
        .map(|(i, loc)| positional.expand(&params, i, loc.polar()))
        .collect();
    let coefficients = law::convert(Variant::YokedTilted, &REFERENCE_LAW, variant);
    Layout::new(variant, locations.len()).project(&locals, &coefficients)
}

#[derive(Debug, Clone)]
pub struct SampleData {
    pub observations: Vec<Observation>,
    /// Ground-truth local model per location, in `SyntheticSpec::locations` order.
    pub truth: Vec<(Location, LocalModel)>,
}

pub fn generate_sample(spec: &SyntheticSpec) -> Result<SampleData, FitError> {
    if spec.locations.is_empty() {
        return Err(FitError::Config("Synthetic data needs at least one location.".into()));
    }
    if spec.frequencies.iter().any(|f| !(f.is_finite() && *f >= 0.0)) || spec.frequencies.is_empty() {
        return Err(FitError::Config("Synthetic frequencies must be finite and >= 0.".into()));
    }
    if spec.color_angles.is_empty() || spec.color_angles.iter().any(|a| !a.is_finite()) {
        return Err(FitError::Config("Synthetic colour angles must be finite.".into()));
    }
    if !(spec.gamut_limit.is_finite() && spec.gamut_limit > 0.0) {
        return Err(FitError::Config("Gamut limit must be finite and > 0.".into()));
    }

    let layout = Layout::new(spec.variant, spec.locations.len());
    if spec.params.len() != layout.len() {
        return Err(FitError::Config(format!(
            "Variant {} at {} locations needs {} parameters, got {}.",
            spec.variant,
            spec.locations.len(),
            layout.len(),
            spec.params.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(spec.seed);
    let normal = Normal::new(0.0, spec.noise_sd)
        .map_err(|e| FitError::Config(format!("Noise distribution error: {e}")))?;

    let truth: Vec<(Location, LocalModel)> = spec
        .locations
        .iter()
        .enumerate()
        .map(|(i, loc)| (*loc, layout.expand(&spec.params, i, loc.polar())))
        .collect();

    let mut observations = Vec::with_capacity(truth.len() * spec.frequencies.len() * spec.color_angles.len());
    for (loc, model) in &truth {
        for &tf in &spec.frequencies {
            for &angle in &spec.color_angles {
                let predicted = predicted_threshold(model, angle, tf);
                let noisy = predicted * 10f64.powf(normal.sample(&mut rng));
                let oog = !(noisy < spec.gamut_limit);
                let radius = if oog { spec.gamut_limit } else { noisy };
                observations.push(Observation {
                    l: radius * angle.cos(),
                    m: radius * angle.sin(),
                    tf,
                    oog,
                    x: loc.x,
                    y: loc.y,
                    session: None,
                });
            }
        }
    }

    Ok(SampleData {
        observations,
        truth,
    })
}
