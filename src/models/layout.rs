//! Global parameter layouts and the global-to-local expander.
//!
//! A global vector is laid out as:
//!
//! ```text
//! [ shared slots (canonical order) | location 0 block | location 1 block | ... | law coefficients ]
//! ```
//!
//! Responsibilities:
//! - map every canonical local slot to where its value comes from (`SlotSource`)
//! - build the variant's bound box
//! - expand a global vector into one `LocalModel` per location
//! - project local models back into a variant's layout (the re-parameterization
//!   used to seed one variant from another)

use crate::domain::{Dataset, LocalModel, Mechanism, Polar, Variant, slot};
use crate::models::bounds::{Bounds, local_bounds};
use crate::models::law;

/// Short names of the canonical slots, used in reports.
pub const SLOT_NAMES: [&str; LocalModel::LEN] = [
    "xi_lum",
    "zeta_lum",
    "n1_lum",
    "dn_lum",
    "logtau_lum",
    "dlogtau_lum",
    "xi_rg",
    "zeta_rg",
    "n1_rg",
    "dn_rg",
    "logtau_rg",
    "dlogtau_rg",
    "theta",
];

/// Where a canonical slot's value comes from in a given variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotSource {
    /// Index into the shared block.
    Shared(usize),
    /// Index into each location's block.
    PerLocation(usize),
    /// Gain computed from the positional law.
    Law(Mechanism),
}

/// Canonical slots that vary per location in a free-gain variant.
fn per_location_slots(variant: Variant) -> &'static [usize] {
    match variant {
        Variant::SharedTheta => &[slot::XI_LUM, slot::XI_RG],
        Variant::FreeTheta => &[slot::XI_LUM, slot::XI_RG, slot::THETA],
        Variant::FreeLumOrder => &[slot::XI_LUM, slot::N1_LUM, slot::XI_RG],
        Variant::FreeRgOrder => &[slot::XI_LUM, slot::XI_RG, slot::N1_RG],
        _ => &[],
    }
}

#[derive(Debug, Clone)]
pub struct Layout {
    variant: Variant,
    n_locations: usize,
    sources: [SlotSource; LocalModel::LEN],
    shared: Vec<usize>,
    per_location: Vec<usize>,
    n_law: usize,
}

impl Layout {
    pub fn new(variant: Variant, n_locations: usize) -> Self {
        let per_location = per_location_slots(variant).to_vec();
        let mut shared = Vec::new();
        let mut sources = [SlotSource::Shared(0); LocalModel::LEN];

        for (s, source) in sources.iter_mut().enumerate() {
            *source = if variant.is_positional() && s == slot::XI_LUM {
                SlotSource::Law(Mechanism::Lum)
            } else if variant.is_positional() && s == slot::XI_RG {
                SlotSource::Law(Mechanism::Rg)
            } else if let Some(k) = per_location.iter().position(|&p| p == s) {
                SlotSource::PerLocation(k)
            } else {
                shared.push(s);
                SlotSource::Shared(shared.len() - 1)
            };
        }

        Self {
            variant,
            n_locations,
            sources,
            shared,
            per_location,
            n_law: law::n_coefficients(variant),
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn n_locations(&self) -> usize {
        self.n_locations
    }

    pub fn len(&self) -> usize {
        self.law_offset() + self.n_law
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn block_offset(&self, loc: usize) -> usize {
        self.shared.len() + loc * self.per_location.len()
    }

    fn law_offset(&self) -> usize {
        self.block_offset(self.n_locations)
    }

    pub fn law_coefficients<'a>(&self, params: &'a [f64]) -> &'a [f64] {
        &params[self.law_offset()..]
    }

    pub fn bounds(&self) -> Bounds {
        let local = local_bounds();
        let pick = |slots: &[usize]| {
            Bounds::new(
                slots.iter().map(|&s| local.lower[s]).collect(),
                slots.iter().map(|&s| local.upper[s]).collect(),
            )
        };

        let mut bounds = pick(&self.shared);
        let block = pick(&self.per_location);
        for _ in 0..self.n_locations {
            bounds = bounds.extend(&block);
        }
        bounds.extend(&law::law_bounds(self.variant))
    }

    /// Expand `params` into the local model of location `loc` at `polar`.
    pub fn expand(&self, params: &[f64], loc: usize, polar: Polar) -> LocalModel {
        let block = self.block_offset(loc);
        let coefficients = self.law_coefficients(params);
        let mut values = [0.0; LocalModel::LEN];
        for (s, value) in values.iter_mut().enumerate() {
            *value = match self.sources[s] {
                SlotSource::Shared(i) => params[i],
                SlotSource::PerLocation(k) => params[block + k],
                SlotSource::Law(mech) => law::gain(self.variant, mech, polar, coefficients),
            };
        }
        LocalModel(values)
    }

    /// Local models for every location of `dataset`, in dataset order.
    pub fn expand_all(&self, params: &[f64], dataset: &Dataset) -> Vec<LocalModel> {
        (0..self.n_locations)
            .map(|i| self.expand(params, i, dataset.polar(i)))
            .collect()
    }

    /// Re-express local models in this layout.
    ///
    /// Shared slots take the cross-location mean (or the common value when all
    /// locations agree exactly), per-location slots are copied, and the law
    /// block is taken from `coefficients` (empty for free-gain variants).
    pub fn project(&self, locals: &[LocalModel], coefficients: &[f64]) -> Vec<f64> {
        debug_assert_eq!(locals.len(), self.n_locations);
        debug_assert_eq!(coefficients.len(), self.n_law);

        let mut params = Vec::with_capacity(self.len());
        for &s in &self.shared {
            params.push(common_or_mean(locals.iter().map(|m| m.0[s])));
        }
        for model in locals {
            for &s in &self.per_location {
                params.push(model.0[s]);
            }
        }
        params.extend_from_slice(coefficients);
        params
    }

    /// Human-readable name of every global parameter.
    pub fn param_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.iter().map(|&s| SLOT_NAMES[s].to_string()).collect();
        for loc in 0..self.n_locations {
            for &s in &self.per_location {
                names.push(format!("{}[{loc}]", SLOT_NAMES[s]));
            }
        }
        names.extend(law::coefficient_names(self.variant).iter().map(|n| n.to_string()));
        names
    }
}

fn common_or_mean(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    match values.first() {
        None => f64::NAN,
        Some(&first) if values.iter().all(|v| v.to_bits() == first.to_bits()) => first,
        Some(_) => values.iter().sum::<f64>() / values.len() as f64,
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::domain::{Location, MechanismParams};

    fn shape(xi: f64) -> MechanismParams {
        MechanismParams {
            xi,
            zeta: 0.6,
            n1: 4.0,
            delta_n: 1.5,
            log_tau1: -2.1,
            delta_log_tau: 0.25,
        }
    }

    fn polars() -> Vec<Polar> {
        [(50.0, 0.0), (0.0, 60.0), (-40.0, 40.0), (30.0, -70.0)]
            .iter()
            .map(|&(x, y)| Location { x, y }.polar())
            .collect()
    }

    #[test]
    fn layout_lengths_match_catalog() {
        let n = 5;
        let expected = [
            (Variant::SharedTheta, 11 + 2 * n),
            (Variant::FreeTheta, 10 + 3 * n),
            (Variant::FreeLumOrder, 10 + 3 * n),
            (Variant::FreeRgOrder, 10 + 3 * n),
            (Variant::RampyTrough, 17),
            (Variant::TiltedTrough, 18),
            (Variant::DoubleTilted, 19),
            (Variant::YokedTilted, 18),
        ];
        for (v, len) in expected {
            let layout = Layout::new(v, n);
            assert_eq!(layout.len(), len, "variant {v}");
            assert_eq!(layout.bounds().len(), len, "variant {v}");
            assert_eq!(layout.param_names().len(), len, "variant {v}");
        }
    }

    #[test]
    fn rampy_trough_without_slopes_is_uniform() {
        let polars = polars();
        let layout = Layout::new(Variant::RampyTrough, polars.len());
        let base = LocalModel::from_parts(shape(1.0), shape(1.0), 0.7);
        let (b0, a0) = (1.7, 2.3);

        let mut params = layout.project(&vec![base; polars.len()], &[b0, 0.0, 0.0, a0, 0.0, 0.0]);
        for (i, &p) in polars.iter().enumerate() {
            let m = layout.expand(&params, i, p);
            assert_eq!(m.0[slot::XI_LUM], 10f64.powf(b0));
            assert_eq!(m.0[slot::XI_RG], 10f64.powf(a0));
            for s in (0..LocalModel::LEN).filter(|&s| s != slot::XI_LUM && s != slot::XI_RG) {
                assert_eq!(m.0[s].to_bits(), base.0[s].to_bits(), "slot {s} at location {i}");
            }
        }

        params[11] = 0.0;
        params[14] = 0.0;
        let m = layout.expand(&params, 0, polars[0]);
        assert_eq!(m.0[slot::XI_LUM], 1.0);
        assert_eq!(m.0[slot::XI_RG], 1.0);
    }

    #[test]
    fn free_gain_round_trip_through_projection() {
        let polars = polars();
        let layout = Layout::new(Variant::FreeTheta, polars.len());
        let locals: Vec<LocalModel> = (0..polars.len())
            .map(|i| LocalModel::from_parts(shape(20.0 + i as f64), shape(90.0 - i as f64), 0.2 * i as f64))
            .collect();

        let params = layout.project(&locals, &[]);
        for (i, &p) in polars.iter().enumerate() {
            assert_eq!(layout.expand(&params, i, p), locals[i]);
        }
    }

    #[test]
    fn shared_slots_take_the_mean_when_locations_disagree() {
        let mut a = LocalModel::from_parts(shape(10.0), shape(10.0), 0.2);
        let mut b = a;
        a.0[slot::ZETA_LUM] = 0.2;
        b.0[slot::ZETA_LUM] = 0.6;
        b.0[slot::THETA] = 0.4;

        let layout = Layout::new(Variant::SharedTheta, 2);
        let params = layout.project(&[a, b], &[]);
        let m = layout.expand(&params, 0, Polar { r: 1.0, phi: 0.0 });
        assert!((m.0[slot::ZETA_LUM] - 0.4).abs() < 1e-15);
        assert!((m.theta() - 0.3).abs() < 1e-15);
        assert_eq!(m.0[slot::XI_LUM], 10.0);
    }

    #[test]
    fn positional_gain_follows_the_law() {
        let polars = polars();
        let layout = Layout::new(Variant::YokedTilted, polars.len());
        let coeffs = [1.8, -0.05, 0.01, 0.02, 2.2, -0.08, 0.015];
        let base = LocalModel::from_parts(shape(1.0), shape(1.0), 0.8);
        let params = layout.project(&vec![base; polars.len()], &coeffs);

        for (i, &p) in polars.iter().enumerate() {
            let m = layout.expand(&params, i, p);
            let c2 = (2.0 * p.phi).cos();
            let s2 = (2.0 * p.phi).sin();
            let lum = 1.8 - 0.05 * p.r + 0.01 * p.r * c2 + 0.02 * p.r * s2;
            let rg = 2.2 - 0.08 * p.r + 0.015 * p.r * c2 + 0.02 * p.r * s2;
            assert!((m.0[slot::XI_LUM].log10() - lum).abs() < 1e-12);
            assert!((m.0[slot::XI_RG].log10() - rg).abs() < 1e-12);
        }
    }

    #[test]
    fn positional_locals_stay_inside_the_local_box() {
        let polars: Vec<Polar> = [(0.0, 0.0), (90.0, 0.0), (0.0, -90.0), (-70.0, 70.0), (20.0, 10.0)]
            .iter()
            .map(|&(x, y)| Location { x, y }.polar())
            .collect();
        let local = local_bounds();
        let mut rng = StdRng::seed_from_u64(11);

        for variant in [
            Variant::RampyTrough,
            Variant::TiltedTrough,
            Variant::DoubleTilted,
            Variant::YokedTilted,
        ] {
            let layout = Layout::new(variant, polars.len());
            let bounds = layout.bounds();
            let free = Layout::new(Variant::SharedTheta, polars.len());
            for _ in 0..200 {
                let params: Vec<f64> = bounds
                    .lower
                    .iter()
                    .zip(&bounds.upper)
                    .map(|(&lo, &hi)| rng.gen_range(lo..=hi))
                    .collect();
                let locals: Vec<LocalModel> = (0..polars.len())
                    .map(|i| layout.expand(&params, i, polars[i]))
                    .collect();
                for (i, m) in locals.iter().enumerate() {
                    assert!(local.contains(m.as_slice()), "variant {variant} location {i}: {m:?}");
                }
                assert!(free.bounds().contains(&free.project(&locals, &[])), "variant {variant}");
            }
        }
    }
}
