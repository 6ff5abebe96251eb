//! Objective functions.
//!
//! All errors are sums of squared log10 threshold residuals. Out-of-gamut rows
//! are one-sided: the measured contrast is only a lower bound on the threshold,
//! so a prediction at or above it costs nothing.
//!
//! Three problems are exposed to the optimizer as `ResidualModel`s:
//! - `LocationProblem`: one location's 13-parameter local model
//! - `GlobalProblem`: a variant's global vector, expanded to every location
//! - `SeedProblem`: one mechanism's 6 parameters against a target sensitivity curve

use crate::domain::{Dataset, LocalModel, MechanismParams, Observation};
use crate::fit::optimizer::{ResidualModel, sum_of_squares};
use crate::models::{Filter, Layout, Response};

/// Signed log10 residual `log10(measured) − log10(predicted)`, zeroed on the safe side of OOG rows.
pub fn residual(response: &Response, obs: &Observation) -> f64 {
    let d = obs.radius().log10() - response.log10_threshold(obs.color_angle(), obs.tf);
    if obs.oog && d <= 0.0 { 0.0 } else { d }
}

fn fill_residuals(model: &LocalModel, observations: &[Observation], out: &mut [f64]) {
    let response = Response::new(model);
    for (slot, obs) in out.iter_mut().zip(observations) {
        *slot = residual(&response, obs);
    }
}

/// Error of a local model on one location's observations.
pub fn location_error(model: &LocalModel, observations: &[Observation]) -> f64 {
    let mut out = vec![0.0; observations.len()];
    fill_residuals(model, observations, &mut out);
    sum_of_squares(&out)
}

/// Per-location errors of already-expanded local models (dataset order).
pub fn location_errors(locals: &[LocalModel], dataset: &Dataset) -> Vec<f64> {
    locals
        .iter()
        .zip(dataset.groups())
        .map(|(model, obs)| location_error(model, obs))
        .collect()
}

/// Error of a global vector, computed through the same residual vector the optimizer sees.
pub fn global_error(layout: &Layout, dataset: &Dataset, params: &[f64]) -> f64 {
    let problem = GlobalProblem::new(layout, dataset);
    let mut out = vec![0.0; problem.n_residuals()];
    problem.residuals(params, &mut out);
    sum_of_squares(&out)
}

pub struct LocationProblem<'a> {
    pub observations: &'a [Observation],
}

impl ResidualModel for LocationProblem<'_> {
    fn n_residuals(&self) -> usize {
        self.observations.len()
    }

    fn residuals(&self, params: &[f64], out: &mut [f64]) {
        let mut values = [0.0; LocalModel::LEN];
        values.copy_from_slice(&params[..LocalModel::LEN]);
        fill_residuals(&LocalModel(values), self.observations, out);
    }
}

pub struct GlobalProblem<'a> {
    layout: &'a Layout,
    dataset: &'a Dataset,
    offsets: Vec<usize>,
}

impl<'a> GlobalProblem<'a> {
    pub fn new(layout: &'a Layout, dataset: &'a Dataset) -> Self {
        let mut offsets = Vec::with_capacity(dataset.n_locations() + 1);
        let mut at = 0;
        offsets.push(at);
        for group in dataset.groups() {
            at += group.len();
            offsets.push(at);
        }
        Self {
            layout,
            dataset,
            offsets,
        }
    }
}

impl ResidualModel for GlobalProblem<'_> {
    fn n_residuals(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    fn residuals(&self, params: &[f64], out: &mut [f64]) {
        for loc in 0..self.dataset.n_locations() {
            let model = self.layout.expand(params, loc, self.dataset.polar(loc));
            let span = &mut out[self.offsets[loc]..self.offsets[loc + 1]];
            fill_residuals(&model, self.dataset.observations(loc), span);
        }
    }
}

/// One mechanism fitted to a target log10 sensitivity curve.
pub struct SeedProblem<'a> {
    pub frequencies: &'a [f64],
    pub target_log10: &'a [f64],
}

impl ResidualModel for SeedProblem<'_> {
    fn n_residuals(&self) -> usize {
        self.frequencies.len()
    }

    fn residuals(&self, params: &[f64], out: &mut [f64]) {
        let filter = Filter::new(&MechanismParams::from_slice(params));
        for ((slot, &omega), &target) in out.iter_mut().zip(self.frequencies).zip(self.target_log10) {
            *slot = filter.sensitivity(omega).log10() - target;
        }
    }
}

/// 1-D seed error: squared log distance between a mechanism and a target curve.
pub fn seed_error(params: &MechanismParams, frequencies: &[f64], target_log10: &[f64]) -> f64 {
    let problem = SeedProblem {
        frequencies,
        target_log10,
    };
    let mut out = vec![0.0; frequencies.len()];
    problem.residuals(&params.to_array(), &mut out);
    sum_of_squares(&out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Location, Variant, group_by_location};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn mech(xi: f64) -> MechanismParams {
        MechanismParams {
            xi,
            zeta: 0.5,
            n1: 3.0,
            delta_n: 1.0,
            log_tau1: -2.0,
            delta_log_tau: 0.2,
        }
    }

    fn dataset() -> Dataset {
        let mut rows = Vec::new();
        let locations = [(50.0, 0.0), (0.0, 60.0), (-40.0, 40.0), (80.0, -20.0)];
        for (k, &(x, y)) in locations.iter().enumerate() {
            for (j, &tf) in [1.0, 4.0, 12.0, 30.0].iter().enumerate() {
                let angle = 0.4 * j as f64 - 0.7 + 0.1 * k as f64;
                let radius = 0.01 * (1.0 + j as f64);
                rows.push(Observation {
                    l: radius * angle.cos(),
                    m: radius * angle.sin(),
                    tf,
                    oog: j == 3,
                    x,
                    y,
                    session: None,
                });
            }
        }
        Dataset::from_groups(group_by_location(&rows)).unwrap()
    }

    #[test]
    fn global_error_equals_sum_of_location_errors() {
        let data = dataset();
        let mut rng = StdRng::seed_from_u64(7);
        for variant in Variant::ALL {
            let layout = Layout::new(variant, data.n_locations());
            let bounds = layout.bounds();
            for _ in 0..5 {
                let params: Vec<f64> = bounds
                    .lower
                    .iter()
                    .zip(&bounds.upper)
                    .map(|(&lo, &hi)| rng.gen_range(lo..=hi))
                    .collect();
                let locals = layout.expand_all(&params, &data);
                let local_sum: f64 = location_errors(&locals, &data).iter().sum();
                let global = global_error(&layout, &data, &params);
                assert!(
                    (global - local_sum).abs() <= 1e-8,
                    "variant {variant}: global={global} local_sum={local_sum}"
                );
            }
        }
    }

    #[test]
    fn out_of_gamut_rows_only_penalize_low_predictions() {
        let model = LocalModel::from_parts(mech(50.0), mech(50.0), 0.3);
        let response = Response::new(&model);
        let angle: f64 = 0.3;
        let tf = 5.0;
        let predicted = response.threshold(angle, tf);

        let at = |scale: f64| Observation {
            l: scale * predicted * angle.cos(),
            m: scale * predicted * angle.sin(),
            tf,
            oog: true,
            x: 10.0,
            y: 0.0,
            session: None,
        };

        assert_eq!(residual(&response, &at(0.5)), 0.0);
        assert_eq!(residual(&response, &at(1.0 - 1e-9)), 0.0);

        let small = residual(&response, &at(1.5));
        let large = residual(&response, &at(3.0));
        assert!(small > 0.0);
        assert!(large > small);
        assert!((small - 1.5f64.log10()).abs() < 1e-9);

        let mut exact = at(0.5);
        exact.oog = false;
        assert!(residual(&response, &exact) < 0.0);
    }

    #[test]
    fn seed_error_vanishes_on_its_own_curve() {
        let p = mech(30.0);
        let freqs = [1.0, 2.0, 5.0, 10.0, 20.0];
        let filter = Filter::new(&p);
        let target: Vec<f64> = freqs.iter().map(|&f| filter.sensitivity(f).log10()).collect();
        assert!(seed_error(&p, &freqs, &target) < 1e-24);
        assert!(seed_error(&mech(60.0), &freqs, &target) > 0.0);
    }

    #[test]
    fn location_error_counts_every_row() {
        let data = dataset();
        let model = LocalModel::from_parts(mech(40.0), mech(80.0), 0.5);
        let obs = data.observations(0);
        let response = Response::new(&model);
        let expected: f64 = obs.iter().map(|o| residual(&response, o).powi(2)).sum();
        assert!((location_error(&model, obs) - expected).abs() < 1e-12);
        assert_eq!(data.location(0), Location { x: -40.0, y: 40.0 });
    }
}
