//! Planar geometry helpers for location sets.

/// True when every point lies on one line (or there are fewer than three distinct points).
pub fn all_collinear(points: &[(f64, f64)]) -> bool {
    let Some(&(x0, y0)) = points.first() else {
        return true;
    };
    let Some(&(x1, y1)) = points.iter().find(|&&(x, y)| x != x0 || y != y0) else {
        return true;
    };

    let (dx, dy) = (x1 - x0, y1 - y0);
    let scale = points
        .iter()
        .map(|&(x, y)| (x - x0).abs().max((y - y0).abs()))
        .fold(0.0_f64, f64::max);
    let tol = 1e-12 * scale * scale;

    points.iter().all(|&(x, y)| {
        let cross = dx * (y - y0) - dy * (x - x0);
        cross.abs() <= tol
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_lines_and_triangles() {
        assert!(all_collinear(&[(0.0, 0.0), (1.0, 1.0), (3.0, 3.0)]));
        assert!(all_collinear(&[(5.0, 0.0), (5.0, 0.0), (5.0, 0.0)]));
        assert!(!all_collinear(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]));
    }
}
