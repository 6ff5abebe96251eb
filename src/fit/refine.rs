//! Cross-location refinement of the quick fits.
//!
//! Fixed-point iteration: in each sweep every location is re-fitted from the
//! current model of every *source* location (initially all locations, then only
//! the ones that changed in the previous sweep). A location adopts a candidate
//! only when its error is strictly lower, so errors never increase and the
//! iteration stops once a sweep changes nothing.
//!
//! Pair fits are independent and run on the rayon pool; adoption happens
//! serially afterwards, in location order, so results are deterministic.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{Dataset, FitConfig, FitWarning, LocalFit, LocalModel};
use crate::fit::objective::LocationProblem;
use crate::fit::optimizer::minimize_bounded;
use crate::models::local_bounds;

#[derive(Debug, Clone, Default)]
pub struct RefineReport {
    pub sweeps: usize,
    /// Number of adoptions over all sweeps.
    pub improvements: usize,
    /// Per-location errors before the first sweep and after each sweep.
    pub history: Vec<Vec<f64>>,
    pub warning: Option<FitWarning>,
}

struct Candidate {
    target: usize,
    source: usize,
    model: LocalModel,
    error: f64,
    converged: bool,
}

/// Refine `fits` (dataset order) in place.
pub fn refine(dataset: &Dataset, fits: &mut [LocalFit], config: &FitConfig) -> RefineReport {
    let n = fits.len();
    let bounds = local_bounds();
    let mut report = RefineReport {
        history: vec![fits.iter().map(|f| f.error).collect()],
        ..RefineReport::default()
    };
    let mut sources: Vec<usize> = (0..n).collect();

    while !sources.is_empty() {
        if report.sweeps == config.max_refine_sweeps {
            let warning = FitWarning::RefinementCap {
                sweeps: report.sweeps,
            };
            warn!("{warning}");
            report.warning = Some(warning);
            break;
        }
        report.sweeps += 1;

        let active = &sources;
        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(move |target| active.iter().filter(move |&&s| s != target).map(move |&s| (target, s)))
            .collect();
        let snapshot: Vec<LocalModel> = fits.iter().map(|f| f.model).collect();

        let fit_pair = |&(target, source): &(usize, usize)| {
            let problem = LocationProblem {
                observations: dataset.observations(target),
            };
            let min = minimize_bounded(&problem, snapshot[source].as_slice(), &bounds, &config.optimizer);
            let mut values = [0.0; LocalModel::LEN];
            values.copy_from_slice(&min.params);
            Candidate {
                target,
                source,
                model: LocalModel(values),
                error: min.cost,
                converged: min.termination.converged(),
            }
        };
        let candidates: Vec<Candidate> = if config.parallel {
            pairs.par_iter().map(fit_pair).collect()
        } else {
            pairs.iter().map(fit_pair).collect()
        };

        let mut changed = Vec::new();
        for candidate in candidates {
            let current = &mut fits[candidate.target];
            if candidate.error < current.error {
                debug!(
                    target = candidate.target,
                    source = candidate.source,
                    from = current.error,
                    to = candidate.error,
                    "refinement adopted"
                );
                current.model = candidate.model;
                current.error = candidate.error;
                current.converged = candidate.converged;
                report.improvements += 1;
                if changed.last() != Some(&candidate.target) {
                    changed.push(candidate.target);
                }
            }
        }

        report.history.push(fits.iter().map(|f| f.error).collect());
        sources = changed;
    }

    info!(
        sweeps = report.sweeps,
        improvements = report.improvements,
        "cross-location refinement complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Location, Observation, group_by_location};
    use crate::fit::quick::{default_start, quick_fit_all};
    use crate::models::predicted_threshold;

    fn rows_for(model: &LocalModel, location: Location) -> Vec<Observation> {
        let mut rows = Vec::new();
        for &tf in &[1.0, 3.0, 8.0, 20.0] {
            for k in 0..5 {
                let angle = -1.0 + 0.5 * k as f64;
                let t = predicted_threshold(model, angle, tf);
                rows.push(Observation {
                    l: t * angle.cos(),
                    m: t * angle.sin(),
                    tf,
                    oog: false,
                    x: location.x,
                    y: location.y,
                    session: None,
                });
            }
        }
        rows
    }

    #[test]
    fn refinement_never_increases_error_and_terminates() {
        let locations = [
            Location { x: 50.0, y: 0.0 },
            Location { x: 0.0, y: 60.0 },
            Location { x: -40.0, y: 40.0 },
            Location { x: 80.0, y: -20.0 },
        ];
        let mut rows = Vec::new();
        for (i, &loc) in locations.iter().enumerate() {
            let mut truth = default_start();
            truth.0[crate::domain::slot::XI_LUM] = 40.0 + 20.0 * i as f64;
            truth.0[crate::domain::slot::ZETA_RG] = 0.1 * i as f64;
            rows.extend(rows_for(&truth, loc));
        }

        let mut config = FitConfig {
            quick_fit_starts: 0,
            max_refine_sweeps: 10,
            ..FitConfig::default()
        };
        config.optimizer.max_iterations = 25;

        let quick = quick_fit_all(group_by_location(&rows), None, &config);
        let dataset = Dataset::from_groups(quick.groups).unwrap();
        let mut fits = quick.fits;
        let report = refine(&dataset, &mut fits, &config);

        assert!(report.sweeps <= config.max_refine_sweeps);
        for pair in report.history.windows(2) {
            for (before, after) in pair[0].iter().zip(&pair[1]) {
                assert!(after <= before, "error increased: {before} -> {after}");
            }
        }
        if report.warning.is_none() {
            // The last sweep found nothing to adopt.
            let n = report.history.len();
            assert_eq!(report.history[n - 1], report.history[n - 2]);
        }
    }
}
