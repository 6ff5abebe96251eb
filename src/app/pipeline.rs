//! Shared "fit pipeline" logic.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! CSV ingest -> optional resume cache -> fit/selection -> residuals -> worst misfits
//!
//! The front-end can then focus on presentation and exports.

use std::path::Path;

use tracing::{info, warn};

use crate::domain::FitConfig;
use crate::error::FitError;
use crate::fit::selection::{ModelSelection, fit_and_select};
use crate::io::ingest::{IngestedData, load_observations};
use crate::io::results::read_quick_fit_cache;
use crate::report::{ObservationResidual, compute_residuals, worst_misfits};

/// All computed outputs of a single `tcsf fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub ingest: IngestedData,
    pub selection: ModelSelection,
    /// Residuals of the selected variant.
    pub residuals: Vec<ObservationResidual>,
    pub worst: Vec<ObservationResidual>,
}

/// Execute the full fitting pipeline and return the computed outputs.
pub fn run_fit(csv: &Path, resume: Option<&Path>, config: &FitConfig, top_n: usize) -> Result<RunOutput, FitError> {
    let ingest = load_observations(csv)?;
    info!(
        rows_read = ingest.rows_read,
        rows_used = ingest.rows_used(),
        "ingest complete"
    );
    for e in &ingest.row_errors {
        warn!(line = e.line, "skipped row: {}", e.message);
    }

    let cache = resume.map(read_quick_fit_cache).transpose()?;
    let selection = fit_and_select(&ingest.observations, cache.as_ref(), config)?;

    let residuals = compute_residuals(&selection, selection.selected)?;
    let worst = worst_misfits(&residuals, top_n);

    Ok(RunOutput {
        ingest,
        selection,
        residuals,
        worst,
    })
}
