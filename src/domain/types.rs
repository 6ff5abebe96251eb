//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - reloaded later (e.g. quick fits reused as a resume cache)

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FitError;
use crate::fit::optimizer::{OptimizerConfig, Termination};

/// Canonical slot indices of a 13-parameter local model.
pub mod slot {
    pub const XI_LUM: usize = 0;
    pub const ZETA_LUM: usize = 1;
    pub const N1_LUM: usize = 2;
    pub const DELTA_N_LUM: usize = 3;
    pub const LOG_TAU_LUM: usize = 4;
    pub const DELTA_LOG_TAU_LUM: usize = 5;
    pub const XI_RG: usize = 6;
    pub const ZETA_RG: usize = 7;
    pub const N1_RG: usize = 8;
    pub const DELTA_N_RG: usize = 9;
    pub const LOG_TAU_RG: usize = 10;
    pub const DELTA_LOG_TAU_RG: usize = 11;
    pub const THETA: usize = 12;
}

/// One psychophysical threshold measurement.
///
/// `x` and `y` are in tenths of a degree of visual angle. When `oog` is set the
/// display could not reach threshold, so `(l, m)` is only a lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub l: f64,
    pub m: f64,
    pub tf: f64,
    pub oog: bool,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<u32>,
}

impl Observation {
    /// Vector length of the cone contrast (the measured threshold).
    pub fn radius(&self) -> f64 {
        self.l.hypot(self.m)
    }

    /// Direction of the stimulus in the LM plane (radians).
    pub fn color_angle(&self) -> f64 {
        self.m.atan2(self.l)
    }

    pub fn location(&self) -> Location {
        Location {
            x: self.x,
            y: self.y,
        }
    }
}

/// A tested retinal location, in tenths of a degree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

impl Location {
    /// Polar coordinates in degrees, with `x` mirrored into the right hemifield.
    ///
    /// Left/right symmetry of the visual field is a modeling assumption.
    pub fn polar(&self) -> Polar {
        let x = self.x.abs() / 10.0;
        let y = self.y / 10.0;
        Polar {
            r: x.hypot(y),
            phi: y.atan2(x),
        }
    }

    pub fn same_as(&self, other: &Location) -> bool {
        self.x.to_bits() == other.x.to_bits() && self.y.to_bits() == other.y.to_bits()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Eccentricity `r` (degrees) and polar angle `phi` (radians) of a location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Polar {
    pub r: f64,
    pub phi: f64,
}

/// Detection mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mechanism {
    /// Non-opponent, luminance (L+M).
    Lum,
    /// Opponent, red-green (L-M).
    Rg,
}

impl Mechanism {
    pub const ALL: [Mechanism; 2] = [Mechanism::Lum, Mechanism::Rg];

    /// Offset of this mechanism's first slot in a local model.
    pub fn offset(self) -> usize {
        match self {
            Mechanism::Lum => slot::XI_LUM,
            Mechanism::Rg => slot::XI_RG,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Mechanism::Lum => "LUM",
            Mechanism::Rg => "RG",
        }
    }
}

/// The six parameters of one mechanism's temporal filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MechanismParams {
    /// Gain.
    pub xi: f64,
    /// Transience (weight of the second stage).
    pub zeta: f64,
    /// Low-pass stage count of the first stage.
    pub n1: f64,
    /// Extra stages in the second stage (`n2 = n1 + delta_n`).
    pub delta_n: f64,
    /// log10 of the first time constant (seconds).
    pub log_tau1: f64,
    /// `log10(tau2 / tau1)`.
    pub delta_log_tau: f64,
}

impl MechanismParams {
    pub const LEN: usize = 6;

    pub fn from_slice(values: &[f64]) -> Self {
        Self {
            xi: values[0],
            zeta: values[1],
            n1: values[2],
            delta_n: values[3],
            log_tau1: values[4],
            delta_log_tau: values[5],
        }
    }

    pub fn to_array(self) -> [f64; 6] {
        [
            self.xi,
            self.zeta,
            self.n1,
            self.delta_n,
            self.log_tau1,
            self.delta_log_tau,
        ]
    }
}

/// Location-local model: LUM and RG filters plus the shared mechanism angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalModel(pub [f64; 13]);

impl LocalModel {
    pub const LEN: usize = 13;

    pub fn from_parts(lum: MechanismParams, rg: MechanismParams, theta: f64) -> Self {
        let mut values = [0.0; 13];
        values[slot::XI_LUM..slot::XI_LUM + 6].copy_from_slice(&lum.to_array());
        values[slot::XI_RG..slot::XI_RG + 6].copy_from_slice(&rg.to_array());
        values[slot::THETA] = theta;
        Self(values)
    }

    pub fn mechanism(&self, mech: Mechanism) -> MechanismParams {
        let o = mech.offset();
        MechanismParams::from_slice(&self.0[o..o + MechanismParams::LEN])
    }

    pub fn set_mechanism(&mut self, mech: Mechanism, params: MechanismParams) {
        let o = mech.offset();
        self.0[o..o + MechanismParams::LEN].copy_from_slice(&params.to_array());
    }

    pub fn lum(&self) -> MechanismParams {
        self.mechanism(Mechanism::Lum)
    }

    pub fn rg(&self) -> MechanismParams {
        self.mechanism(Mechanism::Rg)
    }

    pub fn theta(&self) -> f64 {
        self.0[slot::THETA]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// The fixed catalog of global model variants.
///
/// Declaration order is the reporting order (`0, 1, 1.1, 1.2, 2, 3, 4, 5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// 0: shared shape and angle, free gains per location.
    SharedTheta,
    /// 1: shared shape, free gains and angle per location.
    FreeTheta,
    /// 1.1: as 0, plus a free LUM stage count per location.
    FreeLumOrder,
    /// 1.2: as 0, plus a free RG stage count per location.
    FreeRgOrder,
    /// 2: gains follow a rampy trough in eccentricity and polar angle.
    RampyTrough,
    /// 3: as 2, with a LUM tilt term.
    TiltedTrough,
    /// 4: as 2, with independent LUM and RG tilt terms.
    DoubleTilted,
    /// 5: as 2, with one tilt coefficient shared by LUM and RG.
    YokedTilted,
}

impl Variant {
    pub const ALL: [Variant; 8] = [
        Variant::SharedTheta,
        Variant::FreeTheta,
        Variant::FreeLumOrder,
        Variant::FreeRgOrder,
        Variant::RampyTrough,
        Variant::TiltedTrough,
        Variant::DoubleTilted,
        Variant::YokedTilted,
    ];

    /// Short label used in reports (`"1.1"`, `"4"`, ...).
    pub fn label(self) -> &'static str {
        match self {
            Variant::SharedTheta => "0",
            Variant::FreeTheta => "1",
            Variant::FreeLumOrder => "1.1",
            Variant::FreeRgOrder => "1.2",
            Variant::RampyTrough => "2",
            Variant::TiltedTrough => "3",
            Variant::DoubleTilted => "4",
            Variant::YokedTilted => "5",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Variant::SharedTheta => "shared shape, fixed angle",
            Variant::FreeTheta => "shared shape, free angle",
            Variant::FreeLumOrder => "free LUM stage count",
            Variant::FreeRgOrder => "free RG stage count",
            Variant::RampyTrough => "rampy trough",
            Variant::TiltedTrough => "tilted rampy trough",
            Variant::DoubleTilted => "double tilted",
            Variant::YokedTilted => "yoked tilted",
        }
    }

    /// Gains follow a positional law instead of being free per location.
    pub fn is_positional(self) -> bool {
        matches!(
            self,
            Variant::RampyTrough | Variant::TiltedTrough | Variant::DoubleTilted | Variant::YokedTilted
        )
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of fitting one location's 13-parameter model on its own data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalFit {
    pub location: Location,
    pub model: LocalModel,
    pub error: f64,
    pub n_observations: usize,
    pub converged: bool,
}

/// Previously computed quick fits, reused to skip the multi-start search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuickFitCache {
    pub fits: Vec<LocalFit>,
}

impl QuickFitCache {
    pub fn lookup(&self, location: &Location) -> Option<&LocalFit> {
        self.fits.iter().find(|f| f.location.same_as(location))
    }
}

/// Best fit recorded for one variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitRecord {
    pub variant: Variant,
    /// Global parameter vector in the variant's layout.
    pub params: Vec<f64>,
    /// Expanded local model per location (dataset order).
    pub locals: Vec<LocalModel>,
    /// Per-location error (dataset order).
    pub errors: Vec<f64>,
    pub total_error: f64,
    /// Which initial-guess strategy produced this record.
    pub strategy: String,
    /// `None` when the record is an un-optimized trial point.
    pub termination: Option<Termination>,
}

/// One optimizer attempt, kept when diagnostics are enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitAttempt {
    pub variant: Variant,
    pub strategy: String,
    pub start_error: f64,
    pub final_error: f64,
    pub iterations: usize,
    pub termination: Termination,
    pub improved: bool,
}

/// Recoverable conditions reported alongside the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitWarning {
    DegenerateLocation {
        location: Location,
        n_observations: usize,
    },
    NonConvergence {
        variant: Option<Variant>,
        location: Option<Location>,
        strategy: String,
        termination: Termination,
        iterations: usize,
    },
    RefinementCap {
        sweeps: usize,
    },
    LoopRefit {
        iteration: usize,
        nested: Variant,
        richer: Variant,
        nested_error: f64,
        richer_error: f64,
    },
    LoopCap {
        iterations: usize,
    },
}

impl fmt::Display for FitWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitWarning::DegenerateLocation {
                location,
                n_observations,
            } => write!(
                f,
                "Location {location} dropped: degenerate quick fit ({n_observations} observations)."
            ),
            FitWarning::NonConvergence {
                variant,
                location,
                strategy,
                termination,
                iterations,
            } => {
                let target = match (variant, location) {
                    (Some(v), _) => format!("variant {v}"),
                    (None, Some(loc)) => format!("location {loc}"),
                    (None, None) => "fit".to_string(),
                };
                write!(
                    f,
                    "Optimizer did not converge for {target} ({strategy}): {termination:?} after {iterations} iterations."
                )
            }
            FitWarning::RefinementCap { sweeps } => write!(
                f,
                "Cross-location refinement stopped after {sweeps} sweeps without reaching a fixed point."
            ),
            FitWarning::LoopRefit {
                iteration,
                nested,
                richer,
                nested_error,
                richer_error,
            } => write!(
                f,
                "Pass {iteration}: variant {nested} ({nested_error:.6}) fits better than variant {richer} ({richer_error:.6}); refitting."
            ),
            FitWarning::LoopCap { iterations } => write!(
                f,
                "Model-selection loop reached its cap of {iterations} passes; returning best fits found."
            ),
        }
    }
}

/// Bounding box of the tested locations (tenths of a degree) and frequencies (Hz).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub tf_min: f64,
    pub tf_max: f64,
}

/// A full run's fitting configuration.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    /// Random starts per location in the quick fit (in addition to the default start).
    pub quick_fit_starts: usize,
    /// Seed for random starts. Each location derives its own stream from it.
    pub seed: u64,
    pub max_refine_sweeps: usize,
    pub max_selection_loops: usize,
    /// Allowed |global - sum(per-location)| error difference.
    pub error_sum_tolerance: f64,
    /// Relative slack when comparing errors of nested variants.
    pub ordering_tolerance: f64,
    /// Huber IRLS iterations for robust regression seeds.
    pub robust_iters: usize,
    /// Huber tuning constant.
    pub robust_k: f64,
    /// Frequency grid size for the 1-D seed fits.
    pub seed_grid_steps: usize,
    /// Fit independent locations / refinement pairs on the rayon pool.
    pub parallel: bool,
    /// Keep a log of every optimizer attempt in the result.
    pub diagnostics: bool,
    pub optimizer: OptimizerConfig,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            quick_fit_starts: 4,
            seed: 0,
            max_refine_sweeps: 25,
            max_selection_loops: 6,
            error_sum_tolerance: 1e-8,
            ordering_tolerance: 1e-9,
            robust_iters: 5,
            robust_k: 1.345,
            seed_grid_steps: 24,
            parallel: true,
            diagnostics: false,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<(), FitError> {
        if self.max_selection_loops == 0 {
            return Err(FitError::Config("max_selection_loops must be >= 1.".into()));
        }
        if !(self.error_sum_tolerance.is_finite() && self.error_sum_tolerance > 0.0) {
            return Err(FitError::Config("error_sum_tolerance must be finite and > 0.".into()));
        }
        if !(self.ordering_tolerance.is_finite() && self.ordering_tolerance >= 0.0) {
            return Err(FitError::Config("ordering_tolerance must be finite and >= 0.".into()));
        }
        if !(self.robust_k.is_finite() && self.robust_k > 0.0) {
            return Err(FitError::Config("robust_k must be finite and > 0.".into()));
        }
        if self.seed_grid_steps < 2 {
            return Err(FitError::Config("seed_grid_steps must be >= 2.".into()));
        }
        self.optimizer.validate()
    }
}
