//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays clean and testable
//! - output changes are localized

use crate::domain::FitConfig;
use crate::fit::selection::ModelSelection;
use crate::models::Layout;
use crate::report::ObservationResidual;

/// Format the full run summary (dataset + per-variant diagnostics + chosen variant).
pub fn format_run_summary(selection: &ModelSelection, config: &FitConfig) -> String {
    let mut out = String::new();
    let d = &selection.domain;

    out.push_str("=== tcsf - temporal contrast sensitivity fit ===\n");
    out.push_str(&format!(
        "Observations: n={} | locations={} | x=[{}, {}] y=[{}, {}] | tf=[{}, {}] Hz\n",
        selection.n_observations,
        selection.locations.len(),
        d.x_min,
        d.x_max,
        d.y_min,
        d.y_max,
        d.tf_min,
        d.tf_max,
    ));
    out.push_str(&format!(
        "Refinement sweeps: {} | selection passes: {} (cap {})\n",
        selection.refine_sweeps, selection.loop_iterations, config.max_selection_loops
    ));

    out.push_str("\nVariant diagnostics:\n");
    for score in &selection.scores {
        let chosen = if score.variant == selection.selected { "*" } else { " " };
        let strategy = selection
            .record(score.variant)
            .map(|r| r.strategy.as_str())
            .unwrap_or("");
        out.push_str(
            format!(
                "{chosen} {:<4} {:<26} k={:<3} SSE={:.6} BIC={:.3} ({strategy})\n",
                score.variant.label(),
                score.variant.display_name(),
                score.n_params,
                score.total_error,
                score.bic,
            )
            .as_str(),
        );
    }

    if let Some(record) = selection.selected_record() {
        let layout = Layout::new(record.variant, selection.locations.len());
        out.push_str("\nChosen variant:\n");
        out.push_str(&format!(
            "- {} ({})\n",
            record.variant.label(),
            record.variant.display_name()
        ));
        if record.variant.is_positional() {
            for (name, value) in layout.param_names().iter().zip(&record.params) {
                out.push_str(&format!("- {name:<14} {value:.6}\n"));
            }
        } else {
            out.push_str(&format!("- params: {}\n", fmt_vec(&record.params)));
        }
    }

    if !selection.warnings.is_empty() {
        out.push_str(&format!("\nWarnings ({}):\n", selection.warnings.len()));
        for message in selection.warning_messages() {
            out.push_str(&format!("- {message}\n"));
        }
    }
    out.push('\n');

    out
}

/// Format the worst-misfit table.
pub fn format_misfits(rows: &[ObservationResidual]) -> String {
    let mut out = String::new();
    out.push_str("Worst misfits (log10 residual):\n");
    out.push_str(
        format!(
            "{:<16} {:>8} {:>9} {:>4} {:>10} {:>10} {:>9}\n",
            "location", "tf", "angle", "oog", "measured", "predicted", "residual"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<16} {:-<8} {:-<9} {:-<4} {:-<10} {:-<10} {:-<9}\n",
            "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for r in rows {
        out.push_str(
            format!(
                "{:<16} {:>8.2} {:>9.3} {:>4} {:>10.5} {:>10.5} {:>9.4}\n",
                r.location.to_string(),
                r.tf,
                r.color_angle,
                if r.oog { "y" } else { "" },
                r.measured,
                r.predicted,
                r.residual,
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.6}")).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Location;

    #[test]
    fn misfit_table_has_one_line_per_row() {
        let rows = vec![ObservationResidual {
            location: Location { x: 40.0, y: -10.0 },
            tf: 8.0,
            color_angle: 0.785,
            oog: true,
            measured: 0.5,
            predicted: 0.25,
            residual: 0.30103,
        }];
        let text = format_misfits(&rows);
        assert_eq!(text.lines().count(), 4);
        assert!(text.contains("(40, -10)"));
        assert!(text.lines().last().unwrap().ends_with("0.3010"));
    }

    #[test]
    fn fmt_vec_basic() {
        assert_eq!(fmt_vec(&[1.0, -0.5]), "[1.000000, -0.500000]");
    }
}
