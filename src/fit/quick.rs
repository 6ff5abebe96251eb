//! Per-location quick fits.
//!
//! Every location is fitted on its own data with the full 13-parameter local
//! model: once from a physiologically plausible default start and once from each
//! of `quick_fit_starts` random starts, keeping the lowest error.
//!
//! Locations whose best error is not finite (or that have no observations) are
//! degenerate: they are reported and dropped before any global fitting.

use std::f64::consts::FRAC_PI_4;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{
    FitConfig, FitWarning, LocalFit, LocalModel, Location, MechanismParams, Observation, QuickFitCache, slot,
};
use crate::fit::objective::LocationProblem;
use crate::fit::optimizer::{Minimum, minimize_bounded};
use crate::models::local_bounds;

pub const QUICK_FIT_STRATEGY: &str = "quick fit";

/// Output of the quick-fit stage.
#[derive(Debug, Clone, Default)]
pub struct QuickFits {
    /// Kept locations with their observations, in input order.
    pub groups: Vec<(Location, Vec<Observation>)>,
    /// Fit per kept location (same order as `groups`).
    pub fits: Vec<LocalFit>,
    pub warnings: Vec<FitWarning>,
}

/// Default start: a sustained LUM mechanism and a low-pass RG mechanism at 45°.
pub fn default_start() -> LocalModel {
    let lum = MechanismParams {
        xi: 100.0,
        zeta: 0.7,
        n1: 4.0,
        delta_n: 1.0,
        log_tau1: -2.2,
        delta_log_tau: 0.2,
    };
    let rg = MechanismParams {
        xi: 200.0,
        zeta: 0.2,
        n1: 6.0,
        delta_n: 1.0,
        log_tau1: -2.0,
        delta_log_tau: 0.2,
    };
    LocalModel::from_parts(lum, rg, FRAC_PI_4)
}

/// Random start: gains log-uniform, everything else uniform within the local bounds.
pub fn random_start(rng: &mut StdRng) -> LocalModel {
    let bounds = local_bounds();
    let mut values = [0.0; LocalModel::LEN];
    for (s, value) in values.iter_mut().enumerate() {
        let (lo, hi) = (bounds.lower[s], bounds.upper[s]);
        *value = if s == slot::XI_LUM || s == slot::XI_RG {
            10f64.powf(rng.gen_range(lo.log10()..=hi.log10()))
        } else {
            rng.gen_range(lo..=hi)
        };
    }
    LocalModel(values)
}

/// Per-location RNG seed, so results do not depend on processing order.
pub fn location_seed(seed: u64, location: &Location) -> u64 {
    let mut z = seed ^ location.x.to_bits().rotate_left(17) ^ location.y.to_bits().rotate_left(41);
    // splitmix64 finalizer
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Starting points for one location: the cached model alone when resuming, else default plus random.
pub fn starts_for(location: &Location, resume: Option<&QuickFitCache>, config: &FitConfig) -> Vec<LocalModel> {
    if let Some(cached) = resume.and_then(|cache| cache.lookup(location)) {
        return vec![cached.model];
    }
    let mut rng = StdRng::seed_from_u64(location_seed(config.seed, location));
    let mut starts = vec![default_start()];
    starts.extend((0..config.quick_fit_starts).map(|_| random_start(&mut rng)));
    starts
}

/// Fit one location from each start and keep the best (first wins ties).
pub fn fit_location(observations: &[Observation], starts: &[LocalModel], config: &FitConfig) -> Option<Minimum> {
    let problem = LocationProblem { observations };
    let bounds = local_bounds();
    let mut best: Option<Minimum> = None;
    for start in starts {
        let min = minimize_bounded(&problem, start.as_slice(), &bounds, &config.optimizer);
        if best.as_ref().is_none_or(|b| min.cost < b.cost) {
            best = Some(min);
        }
    }
    best
}

enum Outcome {
    Fitted(LocalFit, Option<FitWarning>),
    Degenerate(FitWarning),
}

fn fit_group(
    location: Location,
    observations: &[Observation],
    resume: Option<&QuickFitCache>,
    config: &FitConfig,
) -> Outcome {
    let degenerate = || {
        Outcome::Degenerate(FitWarning::DegenerateLocation {
            location,
            n_observations: observations.len(),
        })
    };
    if observations.is_empty() {
        return degenerate();
    }

    let starts = starts_for(&location, resume, config);
    let Some(min) = fit_location(observations, &starts, config) else {
        return degenerate();
    };
    if !min.cost.is_finite() {
        return degenerate();
    }

    debug!(
        location = %location,
        error = min.cost,
        iterations = min.iterations,
        "quick fit"
    );

    let mut values = [0.0; LocalModel::LEN];
    values.copy_from_slice(&min.params);
    let warning = (!min.termination.converged()).then(|| FitWarning::NonConvergence {
        variant: None,
        location: Some(location),
        strategy: QUICK_FIT_STRATEGY.to_string(),
        termination: min.termination,
        iterations: min.iterations,
    });
    Outcome::Fitted(
        LocalFit {
            location,
            model: LocalModel(values),
            error: min.cost,
            n_observations: observations.len(),
            converged: min.termination.converged(),
        },
        warning,
    )
}

/// Quick-fit every location group; degenerate locations are dropped with a warning.
pub fn quick_fit_all(
    groups: Vec<(Location, Vec<Observation>)>,
    resume: Option<&QuickFitCache>,
    config: &FitConfig,
) -> QuickFits {
    let fit_one = |(location, obs): &(Location, Vec<Observation>)| fit_group(*location, obs, resume, config);
    let outcomes: Vec<Outcome> = if config.parallel {
        groups.par_iter().map(fit_one).collect()
    } else {
        groups.iter().map(fit_one).collect()
    };

    let mut out = QuickFits::default();
    for (group, outcome) in groups.into_iter().zip(outcomes) {
        match outcome {
            Outcome::Fitted(fit, warning) => {
                out.fits.push(fit);
                out.groups.push(group);
                out.warnings.extend(warning);
            }
            Outcome::Degenerate(warning) => {
                warn!("{warning}");
                out.warnings.push(warning);
            }
        }
    }

    info!(
        kept = out.fits.len(),
        resumed = resume.is_some(),
        "quick fits complete"
    );
    out
}
