//! Periodic ensemble rebuild and daily forecast runs.
//!
//! The rebuild is a from-scratch batch: rank every candidate against the
//! target, weight the survivors, derive the magnitude table from history
//! and swap the result into the store. Interrupting it leaves the previous
//! ensemble in place, and re-running it with the same data reproduces the
//! same ensemble.
//!
//! A forecast run fetches a short recent window for each ensemble member,
//! notes stale stations, scores the horizon and wraps the result in a
//! `ForecastRun`.

use crate::analysis::{PredictorRanker, RankingReport};
use crate::config::SnowlagConfig;
use crate::ensemble::{ClimatologyBuilder, EnsembleStore, EnsembleWeightBuilder};
use crate::forecast::{ForecastRun, ForecastScorer, RecentObservations, RegionInput, score_regions};
use crate::freshness;
use crate::logging::{self, Component};
use crate::model::{Ensemble, ObservationSeries, Quantity, SnowlagError};
use crate::provider::SeriesProvider;
use crate::stations::LocationRegistry;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// What a rebuild produced: the installed ensemble and the full ranking,
/// including diagnostic-only and excluded candidates.
#[derive(Debug, Clone)]
pub struct RebuildOutcome {
    pub ensemble: Arc<Ensemble>,
    pub report: RankingReport,
}

// ---------------------------------------------------------------------------
// Ensemble rebuild
// ---------------------------------------------------------------------------

/// Ranks every registered location against `target_id` over
/// `history_start..=history_end`, builds the ensemble and installs it.
pub fn rebuild_ensemble<P: SeriesProvider>(
    provider: &P,
    registry: &LocationRegistry,
    config: &SnowlagConfig,
    store: &EnsembleStore,
    target_id: &str,
    predictor_quantity: Quantity,
    history_end: NaiveDate,
    built_at: DateTime<Utc>,
) -> Result<RebuildOutcome, SnowlagError> {
    config.validate()?;
    let target = registry
        .find(target_id)
        .ok_or_else(|| SnowlagError::Configuration(format!("unknown target location {}", target_id)))?;
    let history_start = config.analysis.history_start;

    logging::info(
        Component::Analysis,
        Some(target_id),
        &format!(
            "ranking {} candidates on {} ({} to {})",
            registry.len().saturating_sub(1),
            predictor_quantity,
            history_start,
            history_end
        ),
    );
    let ranker = PredictorRanker::new(&config.analysis);
    let candidates = registry.candidates_for(target_id);
    let report = ranker.rank(provider, &candidates, target, predictor_quantity, history_start, history_end)?;

    for lagging in &report.diagnostic {
        logging::debug(
            Component::Analysis,
            Some(&lagging.predictor_id),
            &format!(
                "diagnostic only: follows {} by {} day(s), r = {:.3}",
                target_id, -lagging.lag_days, lagging.correlation
            ),
        );
    }

    let mut ensemble = EnsembleWeightBuilder::from_config(config).build(target, registry, &report, built_at)?;

    if !ensemble.is_empty() {
        let target_series = provider.get_series(target_id, Quantity::Snowfall, history_start, history_end)?;
        let members: Vec<(String, ObservationSeries)> = ensemble
            .weights
            .par_iter()
            .filter_map(|w| {
                match provider.get_series(&w.predictor_id, w.quantity, history_start, history_end) {
                    Ok(series) => Some((w.predictor_id.clone(), series)),
                    Err(e) => {
                        logging::log_provider_failure(&w.predictor_id, "climatology fetch", &e);
                        None
                    }
                }
            })
            .collect();
        let history: HashMap<String, ObservationSeries> = members.into_iter().collect();

        ensemble.climatology =
            ClimatologyBuilder::from_config(&config.forecast).build(&ensemble.weights, &history, &target_series)?;
        ensemble.source_fingerprint = combined_fingerprint(
            &target_series,
            ensemble.weights.iter().filter_map(|w| history.get(&w.predictor_id)),
        );
    }

    store.replace(ensemble)?;
    let ensemble = store
        .get(target_id)
        .ok_or_else(|| SnowlagError::Persistence(format!("ensemble for {} vanished after install", target_id)))?;
    Ok(RebuildOutcome { ensemble, report })
}

/// Rebuilds several targets one after another; each ranking is itself
/// parallel. A failed target is logged and does not stop the others.
pub fn rebuild_all<P: SeriesProvider>(
    provider: &P,
    registry: &LocationRegistry,
    config: &SnowlagConfig,
    store: &EnsembleStore,
    target_ids: &[&str],
    predictor_quantity: Quantity,
    history_end: NaiveDate,
    built_at: DateTime<Utc>,
) -> Vec<Result<RebuildOutcome, SnowlagError>> {
    let results: Vec<_> = target_ids
        .iter()
        .map(|id| {
            rebuild_ensemble(provider, registry, config, store, id, predictor_quantity, history_end, built_at)
                .inspect_err(|e| logging::error(Component::Ensemble, Some(*id), &format!("rebuild failed: {}", e)))
        })
        .collect();
    let failed = results.iter().filter(|r| r.is_err()).count();
    logging::log_batch_summary(
        Component::Ensemble,
        "ensemble rebuild",
        results.len(),
        results.len() - failed,
        failed,
    );
    results
}

/// FNV-style fold of the target and member series fingerprints.
fn combined_fingerprint<'a>(target: &ObservationSeries, members: impl Iterator<Item = &'a ObservationSeries>) -> u64 {
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    members.fold(target.fingerprint(), |acc, s| (acc ^ s.fingerprint()).wrapping_mul(PRIME))
}

// ---------------------------------------------------------------------------
// Forecast runs
// ---------------------------------------------------------------------------

/// Fetches the recent window every ensemble member needs for a run issued
/// on `today`. Failed fetches are logged and leave that member inactive.
pub fn gather_recent<P: SeriesProvider>(
    provider: &P,
    ensemble: &Ensemble,
    config: &SnowlagConfig,
    today: NaiveDate,
) -> RecentObservations {
    let max_age = config.forecast.max_observation_age_days.max(0);
    let max_lag = ensemble.weights.iter().map(|w| i64::from(w.lag_days)).max().unwrap_or(0).max(0);
    let start = today - Duration::days(max_lag + max_age);

    let wanted: BTreeSet<(&str, Quantity)> = ensemble
        .weights
        .iter()
        .map(|w| (w.predictor_id.as_str(), w.quantity))
        .collect();

    let mut recent = RecentObservations::new(today);
    for (id, quantity) in wanted {
        match provider.get_series(id, quantity, start, today) {
            Ok(series) => {
                if freshness::is_stale_at(&series, max_age, today) {
                    let age = freshness::observation_age_days(&series, today)
                        .map(|d| format!("{} day(s) old", d))
                        .unwrap_or_else(|| "no recent values".to_string());
                    logging::warn(Component::Forecast, Some(id), &format!("stale {} observations: {}", quantity, age));
                }
                recent.insert(series);
            }
            Err(e) => logging::log_provider_failure(id, "recent fetch", &e),
        }
    }
    recent
}

/// Scores one region's ensemble for the horizon after `today`.
pub fn run_forecast<P: SeriesProvider>(
    provider: &P,
    ensemble: &Ensemble,
    config: &SnowlagConfig,
    today: NaiveDate,
    generated_at: DateTime<Utc>,
) -> Result<ForecastRun, SnowlagError> {
    let recent = gather_recent(provider, ensemble, config, today);
    let scored = ForecastScorer::from_config(config).score(ensemble, &recent, config.forecast.horizon_days);
    let run = ForecastRun::from_scoring(ensemble, today, generated_at, scored)?;
    if run.is_available() {
        logging::info(
            Component::Forecast,
            Some(&run.target_id),
            &format!(
                "forecast issued for {}: peak {:.0}% over {} day(s)",
                today,
                run.days().iter().map(|d| d.probability).fold(0.0, f64::max),
                run.days().len()
            ),
        );
    }
    Ok(run)
}

/// Forecasts every target in `target_ids` from the store's current
/// ensembles. Regions are gathered and scored in parallel; a target with
/// no ensemble yields a "no forecast available" run.
pub fn run_forecasts<P: SeriesProvider>(
    provider: &P,
    store: &EnsembleStore,
    config: &SnowlagConfig,
    target_ids: &[&str],
    today: NaiveDate,
    generated_at: DateTime<Utc>,
) -> Vec<Result<ForecastRun, SnowlagError>> {
    let regions: Vec<RegionInput> = target_ids
        .par_iter()
        .map(|id| {
            let ensemble = store
                .get(id)
                .unwrap_or_else(|| Arc::new(Ensemble::empty(*id, generated_at)));
            let recent = gather_recent(provider, &ensemble, config, today);
            RegionInput { ensemble, recent }
        })
        .collect();
    let scorer = ForecastScorer::from_config(config);
    score_regions(&scorer, &regions, config.forecast.horizon_days, generated_at)
}
