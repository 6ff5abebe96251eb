//! Location-grouped observations.
//!
//! The fitters never look at the raw observation list: they work on a
//! `Dataset`, which guarantees that
//!
//! - locations are unique and in a deterministic order (sorted by `x`, then `y`)
//! - there are at least `MIN_LOCATIONS` of them
//! - they are not collinear (raw or mirrored), so positional laws are identifiable

use std::cmp::Ordering;

use crate::domain::{Domain, Location, Observation, Polar};
use crate::error::FitError;
use crate::math::all_collinear;

/// Minimum number of distinct locations for the positional-law models.
pub const MIN_LOCATIONS: usize = 3;

#[derive(Debug, Clone)]
pub struct Dataset {
    locations: Vec<Location>,
    polar: Vec<Polar>,
    groups: Vec<Vec<Observation>>,
}

impl Dataset {
    /// Build a dataset from `(location, observations)` groups.
    pub fn from_groups(groups: Vec<(Location, Vec<Observation>)>) -> Result<Self, FitError> {
        let locations: Vec<Location> = groups.iter().map(|(loc, _)| *loc).collect();
        validate_locations(&locations)?;

        let polar = locations.iter().map(Location::polar).collect();
        let groups = groups.into_iter().map(|(_, obs)| obs).collect();
        Ok(Self {
            locations,
            polar,
            groups,
        })
    }

    pub fn n_locations(&self) -> usize {
        self.locations.len()
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn location(&self, idx: usize) -> Location {
        self.locations[idx]
    }

    pub fn polar(&self, idx: usize) -> Polar {
        self.polar[idx]
    }

    pub fn observations(&self, idx: usize) -> &[Observation] {
        &self.groups[idx]
    }

    pub fn groups(&self) -> &[Vec<Observation>] {
        &self.groups
    }

    pub fn n_observations(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Observation count per location (dataset order).
    pub fn counts(&self) -> Vec<usize> {
        self.groups.iter().map(Vec::len).collect()
    }

    pub fn domain(&self) -> Domain {
        let mut d = Domain {
            x_min: f64::INFINITY,
            x_max: f64::NEG_INFINITY,
            y_min: f64::INFINITY,
            y_max: f64::NEG_INFINITY,
            tf_min: f64::INFINITY,
            tf_max: f64::NEG_INFINITY,
        };
        for loc in &self.locations {
            d.x_min = d.x_min.min(loc.x);
            d.x_max = d.x_max.max(loc.x);
            d.y_min = d.y_min.min(loc.y);
            d.y_max = d.y_max.max(loc.y);
        }
        for obs in self.groups.iter().flatten() {
            if obs.tf.is_finite() {
                d.tf_min = d.tf_min.min(obs.tf);
                d.tf_max = d.tf_max.max(obs.tf);
            }
        }
        d
    }
}

/// Partition observations by location, ordered by `(x, y)`.
///
/// Observation order within a location is preserved.
pub fn group_by_location(observations: &[Observation]) -> Vec<(Location, Vec<Observation>)> {
    let mut groups: Vec<(Location, Vec<Observation>)> = Vec::new();
    for obs in observations {
        let loc = obs.location();
        match groups.iter_mut().find(|(l, _)| l.same_as(&loc)) {
            Some((_, members)) => members.push(*obs),
            None => groups.push((loc, vec![*obs])),
        }
    }
    groups.sort_by(|a, b| match a.0.x.total_cmp(&b.0.x) {
        Ordering::Equal => a.0.y.total_cmp(&b.0.y),
        other => other,
    });
    groups
}

/// Reject rows no model can be evaluated on.
///
/// A zero-contrast row has an infinite log threshold unless it is out of gamut,
/// where only its lower bound counts.
pub fn validate_observations(observations: &[Observation]) -> Result<(), FitError> {
    if observations.is_empty() {
        return Err(FitError::InvalidInput("No observations.".into()));
    }
    for (i, obs) in observations.iter().enumerate() {
        let finite = [obs.l, obs.m, obs.tf, obs.x, obs.y].iter().all(|v| v.is_finite());
        if !finite || obs.tf < 0.0 {
            return Err(FitError::InvalidInput(format!(
                "Observation {i} has a non-finite value or negative frequency: {obs:?}."
            )));
        }
        if obs.radius() == 0.0 && !obs.oog {
            return Err(FitError::InvalidInput(format!(
                "Observation {i} has zero contrast but is not out of gamut: {obs:?}."
            )));
        }
    }
    Ok(())
}

/// Reject location sets the positional-law models cannot identify.
pub fn validate_locations(locations: &[Location]) -> Result<(), FitError> {
    if locations.iter().any(|l| !(l.x.is_finite() && l.y.is_finite())) {
        return Err(FitError::InvalidInput("Non-finite location coordinate.".into()));
    }
    if locations.len() < MIN_LOCATIONS {
        return Err(FitError::TooFewLocations {
            found: locations.len(),
            required: MIN_LOCATIONS,
        });
    }

    let raw: Vec<(f64, f64)> = locations.iter().map(|l| (l.x, l.y)).collect();
    let mirrored: Vec<(f64, f64)> = locations.iter().map(|l| (l.x.abs(), l.y)).collect();
    if all_collinear(&raw) || all_collinear(&mirrored) {
        return Err(FitError::CollinearLocations {
            locations: locations.to_vec(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs_at(x: f64, y: f64) -> Observation {
        Observation {
            l: 0.05,
            m: 0.05,
            tf: 2.0,
            oog: false,
            x,
            y,
            session: None,
        }
    }

    #[test]
    fn grouping_sorts_locations_and_keeps_row_order() {
        let mut rows = vec![obs_at(50.0, 0.0), obs_at(-20.0, 30.0), obs_at(50.0, 0.0)];
        rows[2].tf = 9.0;
        let groups = group_by_location(&rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.x, -20.0);
        assert_eq!(groups[1].1.len(), 2);
        assert_eq!(groups[1].1[1].tf, 9.0);
    }

    #[test]
    fn two_locations_fail_fast() {
        let rows = vec![obs_at(50.0, 0.0), obs_at(0.0, 50.0)];
        let err = Dataset::from_groups(group_by_location(&rows)).unwrap_err();
        assert!(matches!(err, FitError::TooFewLocations { found: 2, .. }));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn collinear_locations_fail_fast() {
        let rows = vec![obs_at(20.0, 10.0), obs_at(40.0, 20.0), obs_at(60.0, 30.0)];
        let err = Dataset::from_groups(group_by_location(&rows)).unwrap_err();
        assert!(matches!(err, FitError::CollinearLocations { .. }));
    }

    #[test]
    fn mirrored_collinear_locations_fail() {
        // Not collinear as given, but collinear once x is mirrored.
        let rows = vec![obs_at(-20.0, 20.0), obs_at(0.0, 0.0), obs_at(40.0, 40.0)];
        let err = Dataset::from_groups(group_by_location(&rows)).unwrap_err();
        assert!(matches!(err, FitError::CollinearLocations { .. }));
    }

    #[test]
    fn rejects_non_finite_rows() {
        let mut rows = vec![obs_at(50.0, 0.0)];
        assert!(validate_observations(&rows).is_ok());
        rows[0].tf = f64::NAN;
        assert!(matches!(validate_observations(&rows), Err(FitError::InvalidInput(_))));
        assert!(validate_observations(&[]).is_err());
    }

    #[test]
    fn zero_contrast_is_only_accepted_out_of_gamut() {
        let mut rows: Vec<Observation> = (0..30).map(|_| obs_at(40.0, 0.0)).collect();
        rows.push(Observation {
            l: 0.0,
            m: 0.0,
            ..obs_at(40.0, 0.0)
        });
        let err = validate_observations(&rows).unwrap_err();
        assert!(matches!(err, FitError::InvalidInput(ref msg) if msg.starts_with("Observation 30 ")));
        assert_eq!(err.exit_code(), 2);

        rows[30].oog = true;
        assert!(validate_observations(&rows).is_ok());
    }

    #[test]
    fn domain_spans_locations_and_frequencies() {
        let mut rows = vec![obs_at(50.0, 0.0), obs_at(0.0, 60.0), obs_at(-30.0, -40.0)];
        rows[1].tf = 25.0;
        let data = Dataset::from_groups(group_by_location(&rows)).unwrap();
        let d = data.domain();
        assert_eq!((d.x_min, d.x_max), (-30.0, 50.0));
        assert_eq!((d.y_min, d.y_max), (-40.0, 60.0));
        assert_eq!((d.tf_min, d.tf_max), (2.0, 25.0));
        assert_eq!(data.n_observations(), 3);
    }
}
