//! Read/write result JSON files.
//!
//! Two documents are written:
//! - the full `ModelSelection` (every variant record, scores, warnings)
//! - a quick-fit cache, which a later run can pass back to skip the multi-start search

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::QuickFitCache;
use crate::error::FitError;
use crate::fit::selection::ModelSelection;

/// Write any serializable value as pretty JSON.
fn write_json<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<(), FitError> {
    let file = File::create(path)
        .map_err(|e| FitError::Io(format!("Failed to create {what} '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .map_err(|e| FitError::Io(format!("Failed to write {what}: {e}")))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path, what: &str) -> Result<T, FitError> {
    let file = File::open(path)
        .map_err(|e| FitError::Io(format!("Failed to open {what} '{}': {e}", path.display())))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| FitError::InvalidInput(format!("Invalid {what}: {e}")))
}

pub fn write_selection_json(path: &Path, selection: &ModelSelection) -> Result<(), FitError> {
    write_json(path, selection, "result JSON")
}

pub fn write_quick_fit_cache(path: &Path, cache: &QuickFitCache) -> Result<(), FitError> {
    write_json(path, cache, "quick-fit cache")
}

/// Read a quick-fit cache. Both a bare cache and a full result JSON are accepted.
pub fn read_quick_fit_cache(path: &Path) -> Result<QuickFitCache, FitError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CacheSource {
        Cache(QuickFitCache),
        Selection { quick_fits: Vec<crate::domain::LocalFit> },
    }

    match read_json::<CacheSource>(path, "quick-fit cache")? {
        CacheSource::Cache(cache) => Ok(cache),
        CacheSource::Selection { quick_fits } => Ok(QuickFitCache { fits: quick_fits }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LocalFit, Location};
    use crate::fit::quick::default_start;

    #[test]
    fn quick_fit_cache_survives_a_file_round_trip() {
        let cache = QuickFitCache {
            fits: vec![LocalFit {
                location: Location { x: -30.0, y: 45.0 },
                model: default_start(),
                error: 0.0125,
                n_observations: 30,
                converged: true,
            }],
        };
        let path = std::env::temp_dir().join(format!("tcsf_cache_{}.json", std::process::id()));
        write_quick_fit_cache(&path, &cache).unwrap();
        let back = read_quick_fit_cache(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(back.fits.len(), 1);
        assert_eq!(back.fits[0].model, default_start());
        assert!(back.lookup(&Location { x: -30.0, y: 45.0 }).is_some());
    }

    #[test]
    fn quick_fits_are_read_from_a_result_json() {
        let fit = LocalFit {
            location: Location { x: 50.0, y: 0.0 },
            model: default_start(),
            error: 0.5,
            n_observations: 12,
            converged: false,
        };
        let doc = serde_json::json!({ "quick_fits": [fit], "fits": {}, "selected": "rampy_trough" });
        let path = std::env::temp_dir().join(format!("tcsf_result_{}.json", std::process::id()));
        std::fs::write(&path, doc.to_string()).unwrap();
        let cache = read_quick_fit_cache(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(cache.fits.len(), 1);
        assert!(!cache.fits[0].converged);
    }

    #[test]
    fn missing_cache_is_an_io_error() {
        let err = read_quick_fit_cache(Path::new("/nonexistent/tcsf_cache.json")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
