//! Weighted least squares solver and robust reweighting.
//!
//! We repeatedly solve small linear problems of the form:
//!
//! ```text
//! minimize Σ w_i (y_i - x_i^T β)^2
//! ```
//!
//! both for regression-based initial guesses of the positional laws and as the
//! fallback solve inside the optimizer.
//!
//! Implementation choices:
//! - We scale rows by `sqrt(w_i)` and solve an ordinary least squares problem.
//! - We use SVD so that tall and rank-deficient systems (e.g. a 19-coefficient
//!   law on three locations) still produce the minimum-norm solution.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve `minimize Σ w_i (y_i - row_i·β)^2` for the given design rows.
pub fn solve_weighted(rows: &[Vec<f64>], y: &[f64], w: &[f64]) -> Option<Vec<f64>> {
    let n = rows.len();
    let p = rows.first()?.len();
    if n == 0 || p == 0 || y.len() != n || w.len() != n {
        return None;
    }
    if w.iter().any(|v| !v.is_finite() || *v <= 0.0) || y.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let mut xw = DMatrix::<f64>::zeros(n, p);
    let mut yw = DVector::<f64>::zeros(n);
    for i in 0..n {
        let sw = w[i].sqrt();
        for j in 0..p {
            xw[(i, j)] = rows[i][j] * sw;
        }
        yw[i] = y[i] * sw;
    }

    solve_least_squares(&xw, &yw).map(|beta| beta.iter().copied().collect())
}

/// Huber IRLS: start from `w_base`, refit, downweight large residuals, repeat.
pub fn solve_huber(rows: &[Vec<f64>], y: &[f64], w_base: &[f64], iters: usize, k: f64) -> Option<Vec<f64>> {
    let mut w = w_base.to_vec();
    let mut beta = solve_weighted(rows, y, &w)?;
    for _ in 0..iters {
        let residuals: Vec<f64> = rows
            .iter()
            .zip(y.iter())
            .map(|(row, &yi)| yi - dot(row, &beta))
            .collect();
        w = huber_reweight(w_base, &residuals, k);
        beta = solve_weighted(rows, y, &w)?;
    }
    Some(beta)
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Huber weights with a MAD-based scale.
pub fn huber_reweight(w_base: &[f64], residuals: &[f64], k: f64) -> Vec<f64> {
    // Scale via MAD (median absolute deviation). This keeps weighting robust and
    // deterministic (no RNG).
    let mut abs: Vec<f64> = residuals.iter().map(|r| r.abs()).filter(|v| v.is_finite()).collect();
    let mad = median_mut(&mut abs).unwrap_or(0.0);
    let scale = (mad / 0.6745).max(1e-12);
    let cutoff = (k.max(1e-6)) * scale;

    let min_factor = 1e-3;
    w_base
        .iter()
        .zip(residuals.iter())
        .map(|(&w0, &r)| {
            let ar = r.abs();
            let factor = if ar <= cutoff || !ar.is_finite() { 1.0 } else { cutoff / ar };
            (w0 * factor).max(w0 * min_factor)
        })
        .collect()
}

pub fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn weighted_fit_follows_heavy_rows() {
        // Two inconsistent observations of a constant; the heavier one wins.
        let rows = vec![vec![1.0], vec![1.0]];
        let beta = solve_weighted(&rows, &[0.0, 10.0], &[1.0, 9.0]).unwrap();
        assert!((beta[0] - 9.0).abs() < 1e-10);
    }

    #[test]
    fn huber_downweights_outlier() {
        let xs: Vec<f64> = (0..10).map(f64::from).collect();
        let rows: Vec<Vec<f64>> = xs.iter().map(|&x| vec![1.0, x]).collect();
        let mut y: Vec<f64> = xs.iter().map(|&x| 1.0 + 0.5 * x).collect();
        y[9] += 50.0;
        let w = vec![1.0; rows.len()];

        let ols = solve_weighted(&rows, &y, &w).unwrap();
        let robust = solve_huber(&rows, &y, &w, 10, 1.345).unwrap();
        assert!((robust[1] - 0.5).abs() < (ols[1] - 0.5).abs());
        assert!((robust[1] - 0.5).abs() < 0.1, "robust slope {}", robust[1]);
    }

    #[test]
    fn rank_deficient_system_still_solves() {
        // More unknowns than rows.
        let rows = vec![vec![1.0, 1.0, 0.0], vec![0.0, 1.0, 1.0]];
        let beta = solve_weighted(&rows, &[2.0, 2.0], &[1.0, 1.0]).unwrap();
        assert!((dot(&rows[0], &beta) - 2.0).abs() < 1e-9);
        assert!((dot(&rows[1], &beta) - 2.0).abs() < 1e-9);
    }
}
