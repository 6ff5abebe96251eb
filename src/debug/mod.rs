//! Debug bundle writer for inspecting a model-selection run.
//!
//! The bundle is a Markdown file holding every variant record, every optimizer
//! attempt (when diagnostics were enabled), the quick fits and all warnings.

use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::domain::FitConfig;
use crate::error::FitError;
use crate::fit::selection::ModelSelection;
use crate::models::Layout;

/// Write the bundle into `dir` and return its path.
pub fn write_debug_bundle(dir: &Path, selection: &ModelSelection, config: &FitConfig) -> Result<PathBuf, FitError> {
    create_dir_all(dir).map_err(|e| FitError::Io(format!("Failed to create debug dir: {e}")))?;

    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("tcsf_debug_seed{}_{ts}.md", config.seed));

    let mut file = File::create(&path).map_err(|e| FitError::Io(format!("Failed to create debug file: {e}")))?;
    file.write_all(render_debug_bundle(selection, config).as_bytes())
        .map_err(|e| FitError::Io(format!("Failed to write debug file: {e}")))?;
    Ok(path)
}

pub fn render_debug_bundle(selection: &ModelSelection, config: &FitConfig) -> String {
    let mut out = String::new();
    let n_locations = selection.locations.len();

    out.push_str("# tcsf debug bundle\n");
    out.push_str(&format!("- generated: {}\n", Local::now().to_rfc3339()));
    out.push_str(&format!("- observations: {}\n", selection.n_observations));
    out.push_str(&format!("- locations: {n_locations}\n"));
    out.push_str(&format!("- selected: {}\n", selection.selected));
    out.push_str(&format!(
        "- seed: {} | quick starts: {} | refine sweeps: {} | selection passes: {}\n",
        config.seed, config.quick_fit_starts, selection.refine_sweeps, selection.loop_iterations
    ));

    out.push_str("\n## Quick fits\n");
    out.push_str("| location | n | error | converged | params |\n");
    out.push_str("| - | - | - | - | - |\n");
    for fit in &selection.quick_fits {
        out.push_str(&format!(
            "| {} | {} | {:.6e} | {} | {} |\n",
            fit.location,
            fit.n_observations,
            fit.error,
            fit.converged,
            fmt_vec(fit.model.as_slice())
        ));
    }

    out.push_str("\n## Variants\n");
    for record in selection.fits.values() {
        let layout = Layout::new(record.variant, n_locations);
        out.push_str(&format!(
            "\n### Variant {} ({})\n",
            record.variant.label(),
            record.variant.display_name()
        ));
        out.push_str(&format!(
            "- total error: {:.9e}\n- strategy: {}\n- termination: {}\n",
            record.total_error,
            record.strategy,
            record
                .termination
                .map_or_else(|| "trial point".to_string(), |t| format!("{t:?}"))
        ));
        out.push_str("\n| parameter | value |\n| - | - |\n");
        for (name, value) in layout.param_names().iter().zip(&record.params) {
            out.push_str(&format!("| {name} | {value:.6} |\n"));
        }
        out.push_str("\n| location | error |\n| - | - |\n");
        for (location, error) in selection.locations.iter().zip(&record.errors) {
            out.push_str(&format!("| {location} | {error:.6e} |\n"));
        }
    }

    if !selection.attempts.is_empty() {
        out.push_str("\n## Attempts\n");
        out.push_str("| variant | strategy | start | final | iterations | termination | improved |\n");
        out.push_str("| - | - | - | - | - | - | - |\n");
        for a in &selection.attempts {
            out.push_str(&format!(
                "| {} | {} | {:.6e} | {:.6e} | {} | {:?} | {} |\n",
                a.variant, a.strategy, a.start_error, a.final_error, a.iterations, a.termination, a.improved
            ));
        }
    }

    out.push_str("\n## Warnings\n");
    if selection.warnings.is_empty() {
        out.push_str("- none\n");
    }
    for message in selection.warning_messages() {
        out.push_str(&format!("- {message}\n"));
    }

    out
}

fn fmt_vec(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{v:.4}")).collect();
    format!("[{}]", parts.join(", "))
}
