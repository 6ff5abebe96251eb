//! Frequency grids for the 1-D seed fits.

use crate::error::FitError;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, FitError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(FitError::InvalidInput(format!(
            "Invalid grid range: min={min}, max={max} (must be finite, >0, and max>min)."
        )));
    }
    if steps < 2 {
        return Err(FitError::Config("Grid steps must be >= 2.".into()));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_space_includes_endpoints() {
        let v = log_space(0.5, 60.0, 5).unwrap();
        assert!((v[0] - 0.5).abs() < 1e-12);
        assert!((v[v.len() - 1] - 60.0).abs() < 1e-9);
    }

    #[test]
    fn log_space_rejects_empty_range() {
        assert!(log_space(2.0, 2.0, 5).is_err());
        assert!(log_space(1.0, 2.0, 1).is_err());
    }
}
