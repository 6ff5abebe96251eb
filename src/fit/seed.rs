//! Initial guesses.
//!
//! Two kinds of seeds feed the global fits:
//!
//! - **Shape seeds** (1-D): each mechanism's refined local responses are averaged
//!   (weighted by observation count) in log10 sensitivity over a log-spaced
//!   frequency grid, and a single 6-parameter mechanism is fitted to that curve.
//!   Per-location gains are then rescaled so each location keeps its mean level.
//! - **Regression seeds**: log10 gains of a free-gain fit are regressed on the
//!   positional-law design (OLS, count-weighted WLS, or Huber IRLS).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Dataset, FitConfig, LocalModel, Mechanism, MechanismParams, Variant};
use crate::error::FitError;
use crate::fit::objective::{SeedProblem, seed_error};
use crate::fit::optimizer::minimize_bounded;
use crate::math::{log_space, solve_huber, solve_weighted};
use crate::models::law::{design_row, law_bounds, n_coefficients};
use crate::models::{Filter, mechanism_bounds};

/// Target log10 sensitivity curves, one per mechanism.
#[derive(Debug, Clone)]
pub struct SeedCurves {
    pub frequencies: Vec<f64>,
    pub lum: Vec<f64>,
    pub rg: Vec<f64>,
}

impl SeedCurves {
    pub fn target(&self, mech: Mechanism) -> &[f64] {
        match mech {
            Mechanism::Lum => &self.lum,
            Mechanism::Rg => &self.rg,
        }
    }
}

/// Count-weighted mean log10 sensitivity of `locals` over the data's frequency range.
pub fn seed_curves(dataset: &Dataset, locals: &[LocalModel], config: &FitConfig) -> Result<SeedCurves, FitError> {
    let domain = dataset.domain();
    let lo = domain.tf_min.max(0.1);
    let hi = domain.tf_max.max(lo * 2.0);
    let frequencies = log_space(lo, hi, config.seed_grid_steps)?;

    let counts = dataset.counts();
    let total: f64 = counts.iter().map(|&c| c as f64).sum();
    let curve = |mech: Mechanism| -> Vec<f64> {
        let filters: Vec<Filter> = locals.iter().map(|m| Filter::new(&m.mechanism(mech))).collect();
        frequencies
            .iter()
            .map(|&omega| {
                filters
                    .iter()
                    .zip(&counts)
                    .map(|(f, &c)| c as f64 * f.sensitivity(omega).log10())
                    .sum::<f64>()
                    / total
            })
            .collect()
    };

    Ok(SeedCurves {
        lum: curve(Mechanism::Lum),
        rg: curve(Mechanism::Rg),
        frequencies,
    })
}

/// Fit one mechanism to its target curve, starting from each candidate; keep the best.
pub fn fit_seed_mechanism(
    curves: &SeedCurves,
    mech: Mechanism,
    candidates: &[MechanismParams],
    config: &FitConfig,
) -> Option<MechanismParams> {
    let problem = SeedProblem {
        frequencies: &curves.frequencies,
        target_log10: curves.target(mech),
    };
    let bounds = mechanism_bounds();

    let mut best: Option<(MechanismParams, f64)> = None;
    for candidate in candidates {
        let min = minimize_bounded(&problem, &candidate.to_array(), &bounds, &config.optimizer);
        let params = MechanismParams::from_slice(&min.params);
        let error = seed_error(&params, &curves.frequencies, curves.target(mech));
        if error.is_finite() && best.as_ref().is_none_or(|(_, e)| error < *e) {
            best = Some((params, error));
        }
    }
    if let Some((_, error)) = &best {
        debug!(mechanism = mech.display_name(), error, "1-D seed fit");
    }
    best.map(|(p, _)| p)
}

/// Local models sharing the 1-D seed shapes, with gains rescaled per location.
///
/// Each location keeps its own angle; its gain is chosen so the mean log10
/// sensitivity over the seed grid matches its refined local model.
pub fn seed_shape_locals(
    dataset: &Dataset,
    locals: &[LocalModel],
    config: &FitConfig,
) -> Result<Option<Vec<LocalModel>>, FitError> {
    let curves = seed_curves(dataset, locals, config)?;

    let mut shapes = Vec::with_capacity(2);
    for mech in Mechanism::ALL {
        let candidates: Vec<MechanismParams> = locals.iter().map(|m| m.mechanism(mech)).collect();
        let Some(shape) = fit_seed_mechanism(&curves, mech, &candidates, config) else {
            return Ok(None);
        };
        shapes.push(shape);
    }

    let mean_log = |filter: &Filter| {
        curves
            .frequencies
            .iter()
            .map(|&omega| filter.sensitivity(omega).log10())
            .sum::<f64>()
            / curves.frequencies.len() as f64
    };
    let bounds = mechanism_bounds();

    let seeded = locals
        .iter()
        .map(|local| {
            let mut model = *local;
            for (mech, shape) in Mechanism::ALL.into_iter().zip(&shapes) {
                let own = mean_log(&Filter::new(&local.mechanism(mech)));
                let seed = mean_log(&Filter::new(shape));
                let mut params = *shape;
                params.xi = (shape.xi * 10f64.powf(own - seed)).clamp(bounds.lower[0], bounds.upper[0]);
                model.set_mechanism(mech, params);
            }
            model
        })
        .collect();
    Ok(Some(seeded))
}

/// Regression used to turn free gains into positional-law coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionKind {
    Ols,
    /// Weighted by each location's observation count.
    Wls,
    /// Huber IRLS with MAD scale.
    Robust,
}

impl RegressionKind {
    pub const ALL: [RegressionKind; 3] = [RegressionKind::Ols, RegressionKind::Wls, RegressionKind::Robust];

    pub fn strategy(self) -> &'static str {
        match self {
            RegressionKind::Ols => "ordinary least squares",
            RegressionKind::Wls => "weighted least squares",
            RegressionKind::Robust => "robust regression",
        }
    }
}

/// Law coefficients regressing log10 gains of `locals` on the variant's design,
/// clamped into the law bounds. `None` for free-gain variants or when the solve fails.
pub fn regression_coefficients(
    variant: Variant,
    dataset: &Dataset,
    locals: &[LocalModel],
    kind: RegressionKind,
    config: &FitConfig,
) -> Option<Vec<f64>> {
    if n_coefficients(variant) == 0 {
        return None;
    }

    let counts = dataset.counts();
    let mut rows = Vec::with_capacity(2 * locals.len());
    let mut y = Vec::with_capacity(2 * locals.len());
    let mut w = Vec::with_capacity(2 * locals.len());
    for (i, local) in locals.iter().enumerate() {
        for mech in Mechanism::ALL {
            rows.push(design_row(variant, mech, dataset.polar(i)));
            y.push(local.mechanism(mech).xi.log10());
            w.push(match kind {
                RegressionKind::Ols | RegressionKind::Robust => 1.0,
                RegressionKind::Wls => counts[i].max(1) as f64,
            });
        }
    }

    let coefficients = match kind {
        RegressionKind::Ols | RegressionKind::Wls => solve_weighted(&rows, &y, &w)?,
        RegressionKind::Robust => solve_huber(&rows, &y, &w, config.robust_iters, config.robust_k)?,
    };
    Some(law_bounds(variant).clamp(&coefficients))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Observation, group_by_location};
    use crate::models::law::log10_gain;

    fn dataset(locations: &[(f64, f64)]) -> Dataset {
        let rows: Vec<Observation> = locations
            .iter()
            .enumerate()
            .flat_map(|(i, &(x, y))| {
                (0..=i).map(move |k| Observation {
                    l: 0.02,
                    m: 0.01,
                    tf: 1.0 + 4.0 * k as f64,
                    oog: false,
                    x,
                    y,
                    session: None,
                })
            })
            .collect();
        Dataset::from_groups(group_by_location(&rows)).unwrap()
    }

    fn mech(xi: f64, zeta: f64) -> MechanismParams {
        MechanismParams {
            xi,
            zeta,
            n1: 4.0,
            delta_n: 1.0,
            log_tau1: -2.1,
            delta_log_tau: 0.2,
        }
    }

    #[test]
    fn regression_recovers_an_exact_law() {
        let data = dataset(&[(50.0, 0.0), (0.0, 60.0), (-40.0, 40.0), (80.0, -20.0), (30.0, -70.0)]);
        let truth = [1.8, -0.05, 0.01, 0.02, 2.2, -0.08, 0.015];
        let locals: Vec<LocalModel> = (0..data.n_locations())
            .map(|i| {
                let p = data.polar(i);
                let lum = 10f64.powf(log10_gain(Variant::YokedTilted, Mechanism::Lum, p, &truth));
                let rg = 10f64.powf(log10_gain(Variant::YokedTilted, Mechanism::Rg, p, &truth));
                LocalModel::from_parts(mech(lum, 0.5), mech(rg, 0.1), 0.7)
            })
            .collect();

        for kind in RegressionKind::ALL {
            let c = regression_coefficients(Variant::YokedTilted, &data, &locals, kind, &FitConfig::default()).unwrap();
            for (got, want) in c.iter().zip(&truth) {
                assert!((got - want).abs() < 1e-6, "{kind:?}: {c:?}");
            }
        }
        let config = FitConfig::default();
        assert!(regression_coefficients(Variant::SharedTheta, &data, &locals, RegressionKind::Ols, &config).is_none());
    }

    #[test]
    fn seed_shapes_keep_location_levels() {
        let data = dataset(&[(50.0, 0.0), (0.0, 60.0), (-40.0, 40.0)]);
        let locals = vec![
            LocalModel::from_parts(mech(30.0, 0.5), mech(80.0, 0.1), 0.6),
            LocalModel::from_parts(mech(60.0, 0.5), mech(40.0, 0.1), 0.7),
            LocalModel::from_parts(mech(90.0, 0.5), mech(20.0, 0.1), 0.8),
        ];
        let config = FitConfig::default();
        let curves = seed_curves(&data, &locals, &config).unwrap();
        let seeded = seed_shape_locals(&data, &locals, &config).unwrap().unwrap();
        let mean_log = |p: &MechanismParams| {
            let filter = Filter::new(p);
            let total: f64 = curves.frequencies.iter().map(|&w| filter.sensitivity(w).log10()).sum();
            total / curves.frequencies.len() as f64
        };

        // The shape on a short grid is not identifiable, only its fit to the curve is.
        for mech in Mechanism::ALL {
            let candidates: Vec<MechanismParams> = locals.iter().map(|m| m.mechanism(mech)).collect();
            let shape = fit_seed_mechanism(&curves, mech, &candidates, &config).unwrap();
            let err = seed_error(&shape, &curves.frequencies, curves.target(mech));
            assert!(err < 1e-8, "{mech:?} seed error {err}");
        }

        assert_eq!(seeded.len(), 3);
        for (s, l) in seeded.iter().zip(&locals) {
            assert_eq!(s.theta(), l.theta());
            assert_eq!(s.0[1], seeded[0].0[1], "shapes are shared");
            for mech in Mechanism::ALL {
                let (own, seed) = (mean_log(&l.mechanism(mech)), mean_log(&s.mechanism(mech)));
                assert!((own - seed).abs() < 1e-6, "{mech:?} level {own} vs {seed}");
                let want = l.mechanism(mech).xi / locals[0].mechanism(mech).xi;
                let got = s.mechanism(mech).xi / seeded[0].mechanism(mech).xi;
                assert!((got / want - 1.0).abs() < 1e-9, "{mech:?} gain ratio {got} vs {want}");
            }
        }
    }
}
