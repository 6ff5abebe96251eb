//! Box-constrained nonlinear least squares.
//!
//! A projected Levenberg–Marquardt method over a residual vector `r(p)`,
//! minimizing `Σ r_i²` subject to `lower <= p <= upper`.
//!
//! Each iteration:
//! - builds a forward-difference Jacobian (stepping backward at an upper bound)
//! - freezes the active set: coordinates sitting on a bound whose gradient
//!   pushes further out of the box
//! - solves the Marquardt-damped normal equations on the free coordinates
//!   (Cholesky, SVD fallback) and projects the step back into the box
//! - accepts the step only if the cost strictly decreases, otherwise raises the damping

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::FitError;
use crate::math::solve_least_squares;
use crate::models::Bounds;

/// A model that produces a fixed-length residual vector for a parameter vector.
pub trait ResidualModel {
    fn n_residuals(&self) -> usize;

    /// Write residuals for `params` into `out` (length `n_residuals()`).
    fn residuals(&self, params: &[f64], out: &mut [f64]);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub max_iterations: usize,
    /// Converged when the projected gradient falls below this (max norm).
    pub gradient_tolerance: f64,
    /// Converged when an accepted step reduces the cost by less than this fraction.
    pub cost_tolerance: f64,
    /// Converged when an accepted step is this small relative to the parameters.
    pub step_tolerance: f64,
    pub initial_lambda: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
    /// Give up once the damping exceeds this.
    pub max_lambda: f64,
    /// Relative forward-difference step.
    pub jacobian_step: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 300,
            gradient_tolerance: 1e-10,
            cost_tolerance: 1e-12,
            step_tolerance: 1e-10,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
            max_lambda: 1e12,
            jacobian_step: 1e-7,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), FitError> {
        if self.max_iterations == 0 {
            return Err(FitError::Config("optimizer max_iterations must be >= 1.".into()));
        }
        let positive = [
            ("gradient_tolerance", self.gradient_tolerance),
            ("cost_tolerance", self.cost_tolerance),
            ("step_tolerance", self.step_tolerance),
            ("initial_lambda", self.initial_lambda),
            ("max_lambda", self.max_lambda),
            ("jacobian_step", self.jacobian_step),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(FitError::Config(format!("optimizer {name} must be finite and > 0.")));
            }
        }
        if !(self.lambda_up > 1.0 && self.lambda_down > 0.0 && self.lambda_down < 1.0) {
            return Err(FitError::Config(
                "optimizer damping factors need lambda_up > 1 and 0 < lambda_down < 1.".into(),
            ));
        }
        Ok(())
    }
}

/// Why the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Projected gradient below tolerance.
    Gradient,
    /// Relative cost reduction below tolerance.
    CostTolerance,
    /// Step size below tolerance.
    StepTolerance,
    MaxIterations,
    /// No descent step found before the damping overflowed (or the start was not finite).
    Stalled,
}

impl Termination {
    /// First-order conditions (or their practical proxies) were met.
    pub fn converged(self) -> bool {
        matches!(
            self,
            Termination::Gradient | Termination::CostTolerance | Termination::StepTolerance
        )
    }
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub params: Vec<f64>,
    pub cost: f64,
    pub iterations: usize,
    pub termination: Termination,
}

/// `Σ r²`, or `+∞` when any residual is not finite.
pub fn sum_of_squares(residuals: &[f64]) -> f64 {
    let mut total = 0.0;
    for &r in residuals {
        if !r.is_finite() {
            return f64::INFINITY;
        }
        total += r * r;
    }
    total
}

/// Minimize `Σ r(p)²` over the box, starting from `initial` (clamped into the box).
pub fn minimize_bounded<M: ResidualModel + ?Sized>(
    model: &M,
    initial: &[f64],
    bounds: &Bounds,
    config: &OptimizerConfig,
) -> Minimum {
    let n = initial.len();
    let m = model.n_residuals();

    let mut params = bounds.clamp(initial);
    let mut residuals = vec![0.0; m];
    model.residuals(&params, &mut residuals);
    let mut cost = sum_of_squares(&residuals);

    if !cost.is_finite() || n == 0 || m == 0 {
        let termination = if cost.is_finite() {
            Termination::Gradient
        } else {
            Termination::Stalled
        };
        return Minimum {
            params,
            cost,
            iterations: 0,
            termination,
        };
    }

    let mut lambda = config.initial_lambda;
    let mut trial = vec![0.0; n];
    let mut trial_residuals = vec![0.0; m];

    for iter in 1..=config.max_iterations {
        let jac = jacobian(model, &params, &residuals, bounds, config.jacobian_step);
        let r = DVector::from_column_slice(&residuals);
        let gradient = jac.transpose() * &r;
        let jtj = jac.transpose() * &jac;

        // Projected gradient: how far a unit gradient step would move inside the box.
        let projected = (0..n)
            .map(|i| {
                let moved = (params[i] - gradient[i]).clamp(bounds.lower[i], bounds.upper[i]);
                (moved - params[i]).abs()
            })
            .fold(0.0_f64, f64::max);
        if projected <= config.gradient_tolerance {
            return Minimum {
                params,
                cost,
                iterations: iter - 1,
                termination: Termination::Gradient,
            };
        }

        let free: Vec<usize> = (0..n)
            .filter(|&i| {
                let at_lower = params[i] <= bounds.lower[i] && gradient[i] > 0.0;
                let at_upper = params[i] >= bounds.upper[i] && gradient[i] < 0.0;
                !(at_lower || at_upper)
            })
            .collect();

        loop {
            let Some(delta) = damped_step(&jtj, &gradient, &free, lambda) else {
                lambda *= config.lambda_up;
                if lambda > config.max_lambda {
                    return Minimum {
                        params,
                        cost,
                        iterations: iter,
                        termination: Termination::Stalled,
                    };
                }
                continue;
            };

            trial.copy_from_slice(&params);
            for (k, &i) in free.iter().enumerate() {
                trial[i] = (params[i] + delta[k]).clamp(bounds.lower[i], bounds.upper[i]);
            }
            model.residuals(&trial, &mut trial_residuals);
            let trial_cost = sum_of_squares(&trial_residuals);

            if trial_cost < cost {
                let step = trial
                    .iter()
                    .zip(params.iter())
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0_f64, f64::max);
                let scale = params.iter().map(|p| p.abs()).fold(0.0_f64, f64::max);
                let reduction = cost - trial_cost;

                std::mem::swap(&mut params, &mut trial);
                std::mem::swap(&mut residuals, &mut trial_residuals);
                let previous = cost;
                cost = trial_cost;
                lambda = (lambda * config.lambda_down).max(f64::MIN_POSITIVE);

                if reduction <= config.cost_tolerance * previous {
                    return Minimum {
                        params,
                        cost,
                        iterations: iter,
                        termination: Termination::CostTolerance,
                    };
                }
                if step <= config.step_tolerance * (scale + config.step_tolerance) {
                    return Minimum {
                        params,
                        cost,
                        iterations: iter,
                        termination: Termination::StepTolerance,
                    };
                }
                break;
            }

            lambda *= config.lambda_up;
            if lambda > config.max_lambda {
                return Minimum {
                    params,
                    cost,
                    iterations: iter,
                    termination: Termination::Stalled,
                };
            }
        }
    }

    Minimum {
        params,
        cost,
        iterations: config.max_iterations,
        termination: Termination::MaxIterations,
    }
}

/// Forward-difference Jacobian (`m × n`), stepping backward where forward would leave the box.
fn jacobian<M: ResidualModel + ?Sized>(
    model: &M,
    params: &[f64],
    residuals: &[f64],
    bounds: &Bounds,
    relative_step: f64,
) -> DMatrix<f64> {
    let n = params.len();
    let m = residuals.len();
    let mut jac = DMatrix::<f64>::zeros(m, n);
    let mut shifted = params.to_vec();
    let mut out = vec![0.0; m];

    for j in 0..n {
        let mut h = relative_step * params[j].abs().max(1.0);
        if params[j] + h > bounds.upper[j] {
            h = -h;
        }
        shifted[j] = params[j] + h;
        model.residuals(&shifted, &mut out);
        for i in 0..m {
            let d = (out[i] - residuals[i]) / h;
            jac[(i, j)] = if d.is_finite() { d } else { 0.0 };
        }
        shifted[j] = params[j];
    }
    jac
}

/// Solve `(JᵀJ + λ·diag(JᵀJ)) δ = −g` on the free coordinates.
fn damped_step(jtj: &DMatrix<f64>, gradient: &DVector<f64>, free: &[usize], lambda: f64) -> Option<Vec<f64>> {
    let k = free.len();
    if k == 0 {
        return None;
    }

    let mut a = DMatrix::<f64>::zeros(k, k);
    let mut b = DVector::<f64>::zeros(k);
    for (r, &i) in free.iter().enumerate() {
        for (c, &j) in free.iter().enumerate() {
            a[(r, c)] = jtj[(i, j)];
        }
        a[(r, r)] += lambda * jtj[(i, i)].max(1e-12);
        b[r] = -gradient[i];
    }

    let delta = match a.clone().cholesky() {
        Some(chol) => chol.solve(&b),
        None => solve_least_squares(&a, &b)?,
    };
    delta.iter().all(|v| v.is_finite()).then(|| delta.iter().copied().collect())
}
