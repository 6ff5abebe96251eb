//! CSV exports of a finished run.
//!
//! The exports are meant to be easy to consume in spreadsheets or downstream scripts:
//! - one row per location with its quick fit and every variant's error
//! - one row per observation with its residual under a chosen variant

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::Variant;
use crate::error::FitError;
use crate::fit::selection::ModelSelection;
use crate::report::ObservationResidual;

fn write_err(e: std::io::Error) -> FitError {
    FitError::Io(format!("Failed to write export CSV: {e}"))
}

/// Per-location table: location, observation count, quick-fit error and model, error under each variant.
pub fn write_locations_csv<W: Write>(mut out: W, selection: &ModelSelection) -> Result<(), FitError> {
    let variants: Vec<Variant> = selection.fits.keys().copied().collect();

    let mut header = vec![
        "x".to_string(),
        "y".to_string(),
        "n_observations".to_string(),
        "quick_error".to_string(),
    ];
    header.extend(crate::models::SLOT_NAMES.iter().map(|name| format!("quick_{name}")));
    header.extend(variants.iter().map(|v| format!("error_v{v}")));
    writeln!(out, "{}", header.join(",")).map_err(write_err)?;

    for (i, location) in selection.locations.iter().enumerate() {
        let mut row = vec![location.x.to_string(), location.y.to_string()];
        match selection.quick_fits.get(i) {
            Some(fit) => {
                row.push(fit.n_observations.to_string());
                row.push(format!("{:.10}", fit.error));
                row.extend(fit.model.as_slice().iter().map(|v| format!("{v:.10}")));
            }
            None => row.extend(std::iter::repeat(String::new()).take(2 + crate::domain::LocalModel::LEN)),
        }
        for variant in &variants {
            let error = selection
                .record(*variant)
                .and_then(|r| r.errors.get(i))
                .map(|e| format!("{e:.10}"))
                .unwrap_or_default();
            row.push(error);
        }
        writeln!(out, "{}", row.join(",")).map_err(write_err)?;
    }
    Ok(())
}

pub fn save_locations_csv(path: &Path, selection: &ModelSelection) -> Result<(), FitError> {
    let file = File::create(path)
        .map_err(|e| FitError::Io(format!("Failed to create export CSV '{}': {e}", path.display())))?;
    write_locations_csv(file, selection)
}

/// Per-observation residuals.
pub fn write_residuals_csv<W: Write>(
    mut out: W,
    variant: Variant,
    residuals: &[ObservationResidual],
) -> Result<(), FitError> {
    writeln!(out, "variant,x,y,tf,color_angle,oog,measured,predicted,residual").map_err(write_err)?;
    for r in residuals {
        writeln!(
            out,
            "{},{},{},{},{:.10},{},{:.10},{:.10},{:.10}",
            variant,
            r.location.x,
            r.location.y,
            r.tf,
            r.color_angle,
            u8::from(r.oog),
            r.measured,
            r.predicted,
            r.residual,
        )
        .map_err(write_err)?;
    }
    Ok(())
}

pub fn save_residuals_csv(path: &Path, variant: Variant, residuals: &[ObservationResidual]) -> Result<(), FitError> {
    let file = File::create(path)
        .map_err(|e| FitError::Io(format!("Failed to create export CSV '{}': {e}", path.display())))?;
    write_residuals_csv(file, variant, residuals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Location;

    #[test]
    fn residual_rows_follow_the_header() {
        let rows = vec![ObservationResidual {
            location: Location { x: 10.0, y: -5.0 },
            tf: 2.0,
            color_angle: 0.5,
            oog: true,
            measured: 0.2,
            predicted: 0.1,
            residual: 0.30103,
        }];
        let mut buf = Vec::new();
        write_residuals_csv(&mut buf, Variant::YokedTilted, &rows).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].split(',').count(), lines[1].split(',').count());
        assert!(lines[1].starts_with("5,10,-5,2,"));
    }
}
