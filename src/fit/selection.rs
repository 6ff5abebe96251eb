//! Model-selection orchestrator.
//!
//! Stages:
//! 1. Quick-fit every location and drop degenerate ones.
//! 2. Refine the quick fits across locations.
//! 3. Convergence loop over the free-gain variants and the rampy trough:
//!    `1 → 1.1 → 1.2 → 0 → 1 → 1.1 → 1.2 → 2`, re-run while a nested variant
//!    fits better than the variant containing it (`2` beating `0`, or `0`
//!    beating `1`), up to `max_selection_loops` passes.
//! 4. Tilted variants `3`, `5`, `4`, each from several initial guesses.
//! 5. Nesting check: `4 ≤ 3 ≤ 2`, `5 ≤ 2` and `4 ≤ 5` in total error.
//! 6. Score every variant with BIC and pick the best-supported one.
//!
//! Every derived start is also offered as a trial point, so a richer variant
//! seeded from a nested one can never end up worse than it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{
    Dataset, Domain, FitAttempt, FitConfig, FitRecord, FitWarning, LocalFit, LocalModel, Location, Observation,
    QuickFitCache, Variant, group_by_location, validate_locations, validate_observations,
};
use crate::error::FitError;
use crate::fit::model_test::{BestFits, FitContext, SelectionState, test_model};
use crate::fit::quick::quick_fit_all;
use crate::fit::refine::refine;
use crate::fit::seed::{RegressionKind, regression_coefficients, seed_shape_locals};
use crate::models::law;

/// Nested pairs `(richer, nested)` checked after the tilted fits.
pub const NESTED_PAIRS: [(Variant, Variant); 4] = [
    (Variant::TiltedTrough, Variant::RampyTrough),
    (Variant::DoubleTilted, Variant::TiltedTrough),
    (Variant::YokedTilted, Variant::RampyTrough),
    (Variant::DoubleTilted, Variant::YokedTilted),
];

/// Nested pairs `(richer, nested)` whose inconsistency re-runs the loop.
const LOOP_PAIRS: [(Variant, Variant); 2] = [
    (Variant::SharedTheta, Variant::RampyTrough),
    (Variant::FreeTheta, Variant::SharedTheta),
];

/// Information-criterion score of one variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantScore {
    pub variant: Variant,
    pub n_params: usize,
    pub total_error: f64,
    pub bic: f64,
}

/// Output of a full run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSelection {
    /// Refined per-location quick fits (dataset order).
    pub quick_fits: Vec<LocalFit>,
    pub locations: Vec<Location>,
    pub observations_by_location: Vec<Vec<Observation>>,
    pub domain: Domain,
    pub fits: BTreeMap<Variant, FitRecord>,
    pub scores: Vec<VariantScore>,
    pub selected: Variant,
    pub n_observations: usize,
    pub refine_sweeps: usize,
    pub loop_iterations: usize,
    pub warnings: Vec<FitWarning>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<FitAttempt>,
}

impl ModelSelection {
    pub fn record(&self, variant: Variant) -> Option<&FitRecord> {
        self.fits.get(&variant)
    }

    pub fn selected_record(&self) -> Option<&FitRecord> {
        self.record(self.selected)
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }

    /// The quick fits in the form accepted as a resume cache.
    pub fn quick_fit_cache(&self) -> QuickFitCache {
        QuickFitCache {
            fits: self.quick_fits.clone(),
        }
    }
}

/// Fit every variant to `observations` and select the best-supported one.
///
/// `resume` skips the multi-start quick fit for locations it covers.
pub fn fit_and_select(
    observations: &[Observation],
    resume: Option<&QuickFitCache>,
    config: &FitConfig,
) -> Result<ModelSelection, FitError> {
    config.validate()?;
    validate_observations(observations)?;

    let groups = group_by_location(observations);
    let all_locations: Vec<Location> = groups.iter().map(|(loc, _)| *loc).collect();
    validate_locations(&all_locations)?;
    info!(
        observations = observations.len(),
        locations = all_locations.len(),
        "fitting started"
    );

    let quick = quick_fit_all(groups, resume, config);
    let dataset = Dataset::from_groups(quick.groups)?;
    let mut quick_fits = quick.fits;
    let report = refine(&dataset, &mut quick_fits, config);

    let mut state = SelectionState {
        warnings: quick.warnings,
        ..SelectionState::default()
    };
    state.warnings.extend(report.warning);

    let ctx = FitContext {
        dataset: &dataset,
        config,
    };
    let quick_locals: Vec<LocalModel> = quick_fits.iter().map(|f| f.model).collect();
    let loop_iterations = run_selection_loop(&ctx, &mut state, &quick_locals)?;
    fit_tilted_variants(&ctx, &mut state)?;
    check_nesting(&state.best, config)?;

    let scores = bic_scores(&state.best, &dataset);
    let selected = select_by_bic(&scores)
        .ok_or_else(|| FitError::InvalidInput("No variant produced a finite fit.".into()))?;
    info!(selected = %selected, loop_iterations, "model selection complete");

    Ok(ModelSelection {
        quick_fits,
        locations: dataset.locations().to_vec(),
        observations_by_location: dataset.groups().to_vec(),
        domain: dataset.domain(),
        fits: state.best.into_records(),
        scores,
        selected,
        n_observations: dataset.n_observations(),
        refine_sweeps: report.sweeps,
        loop_iterations,
        warnings: state.warnings,
        attempts: state.attempts,
    })
}

/// Run loop passes until the free-gain and rampy-trough fits are consistent.
///
/// Returns the number of passes run.
pub fn run_selection_loop(
    ctx: &FitContext<'_>,
    state: &mut SelectionState,
    quick_locals: &[LocalModel],
) -> Result<usize, FitError> {
    let max = ctx.config.max_selection_loops;
    for pass in 1..=max {
        info!(pass, "selection loop pass");
        run_pass(ctx, state, quick_locals, pass)?;

        let Some((richer, nested)) = loop_inconsistency(&state.best, ctx.config.ordering_tolerance) else {
            return Ok(pass);
        };
        if pass == max {
            state.warn(FitWarning::LoopCap { iterations: max });
            return Ok(pass);
        }
        let nested_error = state.best.total_error(nested);
        let richer_error = state.best.total_error(richer);
        state.warn(FitWarning::LoopRefit {
            iteration: pass,
            nested,
            richer,
            nested_error,
            richer_error,
        });
    }
    Ok(max)
}

fn run_pass(
    ctx: &FitContext<'_>,
    state: &mut SelectionState,
    quick_locals: &[LocalModel],
    pass: usize,
) -> Result<(), FitError> {
    // Variant 1 from the quick fits (first pass) and from every related record.
    let v1 = ctx.layout(Variant::FreeTheta);
    let mut starts = Vec::new();
    if pass == 1 {
        starts.push(("quick fits".to_string(), v1.project(quick_locals, &[])));
        if let Some(seeded) = seed_shape_locals(ctx.dataset, quick_locals, ctx.config)? {
            starts.push(("1-D seed shapes".to_string(), v1.project(&seeded, &[])));
        }
    }
    starts.extend(derived_starts(
        ctx,
        &state.best,
        Variant::FreeTheta,
        &[Variant::SharedTheta, Variant::RampyTrough],
    ));
    run_starts(ctx, state, Variant::FreeTheta, starts)?;

    fit_derived(ctx, state, Variant::FreeLumOrder, &[Variant::FreeTheta, Variant::SharedTheta])?;
    fit_derived(ctx, state, Variant::FreeRgOrder, &[Variant::FreeTheta, Variant::SharedTheta])?;
    fit_derived(
        ctx,
        state,
        Variant::SharedTheta,
        &[Variant::FreeTheta, Variant::FreeLumOrder, Variant::FreeRgOrder, Variant::RampyTrough],
    )?;

    fit_derived(ctx, state, Variant::FreeTheta, &[Variant::SharedTheta])?;
    fit_derived(ctx, state, Variant::FreeLumOrder, &[Variant::SharedTheta, Variant::FreeTheta])?;
    fit_derived(ctx, state, Variant::FreeRgOrder, &[Variant::SharedTheta, Variant::FreeTheta])?;

    fit_positional(ctx, state, Variant::RampyTrough, Vec::new())
}

/// Fit the tilted variants after the loop has settled.
pub fn fit_tilted_variants(ctx: &FitContext<'_>, state: &mut SelectionState) -> Result<(), FitError> {
    let v3_starts = converted_starts(
        &state.best,
        Variant::TiltedTrough,
        &[(Variant::RampyTrough, "variant 2, zero tilt")],
    );
    fit_positional(ctx, state, Variant::TiltedTrough, v3_starts)?;

    let v5_starts = converted_starts(
        &state.best,
        Variant::YokedTilted,
        &[
            (Variant::TiltedTrough, "variant 3, yoked tilt"),
            (Variant::RampyTrough, "variant 2, zero tilt"),
        ],
    );
    fit_positional(ctx, state, Variant::YokedTilted, v5_starts)?;

    let v4_starts = converted_starts(
        &state.best,
        Variant::DoubleTilted,
        &[
            (Variant::TiltedTrough, "variant 3, zero RG tilt"),
            (Variant::YokedTilted, "variant 5, unyoked"),
        ],
    );
    fit_positional(ctx, state, Variant::DoubleTilted, v4_starts)
}

fn run_starts(
    ctx: &FitContext<'_>,
    state: &mut SelectionState,
    variant: Variant,
    starts: Vec<(String, Vec<f64>)>,
) -> Result<(), FitError> {
    for (strategy, params) in starts {
        test_model(ctx, state, variant, &params, &strategy)?;
    }
    Ok(())
}

/// Free-gain starts projected from the best records of `sources`.
fn derived_starts(
    ctx: &FitContext<'_>,
    best: &BestFits,
    target: Variant,
    sources: &[Variant],
) -> Vec<(String, Vec<f64>)> {
    let layout = ctx.layout(target);
    sources
        .iter()
        .filter_map(|&source| {
            let record = best.get(source)?;
            Some((format!("from variant {source}"), layout.project(&record.locals, &[])))
        })
        .collect()
}

fn fit_derived(
    ctx: &FitContext<'_>,
    state: &mut SelectionState,
    target: Variant,
    sources: &[Variant],
) -> Result<(), FitError> {
    let starts = derived_starts(ctx, &state.best, target, sources);
    run_starts(ctx, state, target, starts)
}

/// Positional starts converted exactly from other positional records.
///
/// All positional layouts share the same 11 leading slots, so only the law
/// block needs converting.
fn converted_starts(best: &BestFits, target: Variant, sources: &[(Variant, &str)]) -> Vec<(String, Vec<f64>)> {
    sources
        .iter()
        .filter_map(|&(source, strategy)| {
            let record = best.get(source)?;
            let n_law = law::n_coefficients(source);
            let split = record.params.len().checked_sub(n_law)?;
            let mut params = record.params[..split].to_vec();
            params.extend(law::convert(source, &record.params[split..], target));
            Some((strategy.to_string(), params))
        })
        .collect()
}

/// Fit a positional variant from `extra` starts plus the three regression seeds on variant 0.
fn fit_positional(
    ctx: &FitContext<'_>,
    state: &mut SelectionState,
    variant: Variant,
    extra: Vec<(String, Vec<f64>)>,
) -> Result<(), FitError> {
    let mut starts = extra;
    if let Some(base) = state.best.get(Variant::SharedTheta) {
        let layout = ctx.layout(variant);
        for kind in RegressionKind::ALL {
            if let Some(coefficients) = regression_coefficients(variant, ctx.dataset, &base.locals, kind, ctx.config) {
                starts.push((kind.strategy().to_string(), layout.project(&base.locals, &coefficients)));
            }
        }
    }
    run_starts(ctx, state, variant, starts)
}

/// `worse` exceeds `better` by more than the relative tolerance.
fn exceeds(worse: f64, better: f64, tolerance: f64) -> bool {
    worse.is_finite() && better.is_finite() && worse - better > tolerance * worse.abs().max(better.abs())
}

/// First `(richer, nested)` loop pair where the nested variant fits better.
///
/// Ties (within the tolerance) count as consistent.
pub fn loop_inconsistency(best: &BestFits, tolerance: f64) -> Option<(Variant, Variant)> {
    LOOP_PAIRS
        .into_iter()
        .find(|&(richer, nested)| exceeds(best.total_error(richer), best.total_error(nested), tolerance))
}

/// Fail when a richer variant fits worse than a variant nested in it.
pub fn check_nesting(best: &BestFits, config: &FitConfig) -> Result<(), FitError> {
    for (richer, nested) in NESTED_PAIRS {
        let (Some(r), Some(n)) = (best.get(richer), best.get(nested)) else {
            continue;
        };
        if exceeds(r.total_error, n.total_error, config.ordering_tolerance) {
            return Err(FitError::NestingViolation {
                richer,
                nested,
                richer_error: r.total_error,
                nested_error: n.total_error,
                richer_params: r.params.clone(),
                nested_params: n.params.clone(),
            });
        }
    }
    Ok(())
}

pub fn bic(n: usize, sse: f64, k: usize) -> f64 {
    let n_f = n as f64;
    let sse_per = (sse / n_f).max(1e-12);
    n_f * sse_per.ln() + (k as f64) * n_f.ln()
}

pub fn bic_scores(best: &BestFits, dataset: &Dataset) -> Vec<VariantScore> {
    let n = dataset.n_observations();
    best.records()
        .values()
        .map(|record| {
            let k = record.params.len();
            VariantScore {
                variant: record.variant,
                n_params: k,
                total_error: record.total_error,
                bic: bic(n, record.total_error, k),
            }
        })
        .collect()
}

/// Lowest BIC, except that the simplest variant within 2 BIC points of it is preferred.
pub fn select_by_bic(scores: &[VariantScore]) -> Option<Variant> {
    let best_bic = scores.iter().map(|s| s.bic).filter(|b| b.is_finite()).reduce(f64::min)?;

    let mut by_complexity: Vec<&VariantScore> = scores.iter().filter(|s| s.bic.is_finite()).collect();
    by_complexity.sort_by_key(|s| (s.n_params, s.variant));
    by_complexity
        .into_iter()
        .find(|s| s.bic <= best_bic + 2.0)
        .map(|s| s.variant)
}
