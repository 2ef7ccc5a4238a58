/// Integration tests for the rebuild → forecast → backtest pipeline
///
/// Tests verify:
/// 1. Ranking, weighting and tagging over the default location network
/// 2. Ensemble persistence and atomic replacement through the store
/// 3. Forecast runs from the installed ensemble, including JSON output
/// 4. The same results from CSV exports as from in-memory series
/// 5. Backtesting a built ensemble with replayed forecasts
///
/// All data is synthetic and deterministic; no database is needed.
///
/// Run with: cargo test --test pipeline_integration

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use snowlag_service::analysis::ExclusionReason;
use snowlag_service::config::SnowlagConfig;
use snowlag_service::ensemble::EnsembleStore;
use snowlag_service::forecast::ForecastRun;
use snowlag_service::model::{ConfidenceTier, Mechanism, ObservationSeries, Quantity, SignalStatus};
use snowlag_service::pipeline::{rebuild_ensemble, run_forecast, run_forecasts};
use snowlag_service::provider::InMemoryProvider;
use snowlag_service::provider::csv::CsvDirectoryProvider;
use snowlag_service::stations::LocationRegistry;
use snowlag_service::verify::{BacktestOptions, backtest};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const DAYS: usize = 730;

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn first_day() -> NaiveDate {
    day("2022-01-01")
}

fn last_day() -> NaiveDate {
    first_day() + Duration::days(DAYS as i64 - 1)
}

fn noise(n: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            ((state >> 33) % 400) as f64 / 10.0
        })
        .collect()
}

/// Synthetic snowfall for the target and three candidates:
/// - duluth_mn tracks the target one day ahead (strong, lake shore)
/// - sapporo_japan tracks it six days ahead (weaker, remote)
/// - denver_co follows the target by two days (lags, diagnostic only)
///
/// The last days are pinned so both leaders are active for forecast day 1.
fn synthetic_history() -> Vec<(&'static str, Vec<f64>)> {
    let target = noise(DAYS, 101);
    let mut duluth = noise(DAYS, 202);
    let mut sapporo = noise(DAYS, 303);
    let mut denver = noise(DAYS, 404);
    for i in 0..DAYS {
        if i + 1 < DAYS {
            duluth[i] = 0.8 * target[i + 1] + 0.2 * duluth[i];
        }
        if i + 6 < DAYS {
            sapporo[i] = 0.4 * target[i + 6] + 0.6 * sapporo[i];
        }
        if i >= 2 {
            denver[i] = 0.9 * target[i - 2] + 0.1 * denver[i];
        }
    }
    duluth[DAYS - 1] = 60.0;
    sapporo[DAYS - 6] = 60.0;
    vec![
        ("phelps_wi", target),
        ("duluth_mn", duluth),
        ("sapporo_japan", sapporo),
        ("denver_co", denver),
    ]
}

fn in_memory_provider() -> InMemoryProvider {
    let mut provider = InMemoryProvider::new();
    for (id, values) in synthetic_history() {
        let values: Vec<Option<f64>> = values.into_iter().map(Some).collect();
        provider.insert(ObservationSeries::from_daily(id, Quantity::Snowfall, first_day(), &values));
    }
    provider
}

fn config() -> SnowlagConfig {
    let mut config = SnowlagConfig::default();
    config.analysis.history_start = first_day();
    config
}

fn built_at() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap()
}

// ---------------------------------------------------------------------------
// Rebuild
// ---------------------------------------------------------------------------

#[test]
fn test_rebuild_ranks_weights_and_tags_predictors() {
    let provider = in_memory_provider();
    let registry = LocationRegistry::default_network();
    let store = EnsembleStore::new();

    let outcome = rebuild_ensemble(
        &provider,
        &registry,
        &config(),
        &store,
        "phelps_wi",
        Quantity::Snowfall,
        last_day(),
        built_at(),
    )
    .expect("rebuild succeeds with partial data");

    let ranked: Vec<(&str, i32)> = outcome
        .report
        .ranked
        .iter()
        .map(|r| (r.predictor_id.as_str(), r.lag_days))
        .collect();
    assert_eq!(ranked, vec![("duluth_mn", 1), ("sapporo_japan", 6)]);

    assert_eq!(outcome.report.diagnostic.len(), 1);
    assert_eq!(outcome.report.diagnostic[0].predictor_id, "denver_co");
    assert_eq!(outcome.report.diagnostic[0].lag_days, -2);

    // Every other registered location has no data and is reported, not fatal.
    assert_eq!(outcome.report.excluded.len(), registry.len() - 4);
    assert!(
        outcome
            .report
            .excluded
            .iter()
            .all(|x| matches!(x.reason, ExclusionReason::ProviderUnavailable { .. }))
    );

    let ensemble = &outcome.ensemble;
    assert_eq!(ensemble.weights.len(), 2);
    assert!((ensemble.weight_sum() - 1.0).abs() < 1e-9);
    assert!((ensemble.weights[0].normalized_weight - 0.5).abs() < 1e-12, "dominant member is capped");
    assert_eq!(ensemble.weights[0].mechanism_tag, Mechanism::LakeEnhanced);
    assert_eq!(ensemble.weights[1].mechanism_tag, Mechanism::RemotePattern);
    assert!(!ensemble.climatology.buckets.is_empty());
    assert_ne!(ensemble.source_fingerprint, 0);

    assert_eq!(store.get("phelps_wi").as_deref(), Some(ensemble.as_ref()));
}

#[test]
fn test_rebuild_is_idempotent() {
    let provider = in_memory_provider();
    let registry = LocationRegistry::default_network();
    let store = EnsembleStore::new();
    let rebuild = || {
        rebuild_ensemble(&provider, &registry, &config(), &store, "phelps_wi", Quantity::Snowfall, last_day(), built_at())
            .unwrap()
    };
    let first = rebuild();
    let second = rebuild();
    assert_eq!(first.report, second.report);
    assert_eq!(*first.ensemble, *second.ensemble);
}

#[test]
fn test_rebuild_without_target_data_fails() {
    let mut provider = InMemoryProvider::new();
    for (id, values) in synthetic_history().into_iter().filter(|(id, _)| *id != "phelps_wi") {
        let values: Vec<Option<f64>> = values.into_iter().map(Some).collect();
        provider.insert(ObservationSeries::from_daily(id, Quantity::Snowfall, first_day(), &values));
    }
    let result = rebuild_ensemble(
        &provider,
        &LocationRegistry::default_network(),
        &config(),
        &EnsembleStore::new(),
        "phelps_wi",
        Quantity::Snowfall,
        last_day(),
        built_at(),
    );
    assert!(result.is_err());
}

// ---------------------------------------------------------------------------
// Persistence and forecasting
// ---------------------------------------------------------------------------

#[test]
fn test_forecast_from_persisted_ensemble() {
    let dir = tempfile::tempdir().unwrap();
    let provider = in_memory_provider();
    let registry = LocationRegistry::default_network();
    let config = config();

    {
        let store = EnsembleStore::with_directory(dir.path().join("ensembles")).unwrap();
        rebuild_ensemble(&provider, &registry, &config, &store, "phelps_wi", Quantity::Snowfall, last_day(), built_at())
            .unwrap();
    }

    let store = EnsembleStore::open(dir.path().join("ensembles")).unwrap();
    let ensemble = store.get("phelps_wi").expect("ensemble reloaded from disk");
    let generated_at = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
    let run = run_forecast(&provider, &ensemble, &config, last_day(), generated_at).unwrap();

    assert!(run.is_available());
    let days = run.days();
    assert_eq!(days.len(), 7);
    assert_eq!(days[0].date, last_day() + Duration::days(1));

    // Day 1: both leaders pinned at 60 mm → 2 × 0.5 × 55/70.
    assert!((days[0].probability - 100.0 * 55.0 / 70.0).abs() < 1e-9);
    assert_eq!(days[0].mechanism_label, Mechanism::Mixed);
    assert_eq!(days[0].confidence_tier, ConfidenceTier::High);
    assert!(days[0].magnitude_range.high_mm >= days[0].magnitude_range.low_mm);

    // Day 7 would need observations from after the issue date for both members.
    assert_eq!(days[6].signal, SignalStatus::InsufficientSignal);
    assert_eq!(days[6].probability, 0.0);
    assert_eq!(days[6].confidence_tier, ConfidenceTier::Low);

    for d in days {
        assert!((0.0..=100.0).contains(&d.probability));
        assert_eq!(d.contributing_predictors.len(), 2);
    }

    let path = run.save(dir.path()).unwrap();
    let reloaded = ForecastRun::from_json(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(reloaded, run);
}

#[test]
fn test_multi_region_forecast_reports_missing_ensembles() {
    let provider = in_memory_provider();
    let registry = LocationRegistry::default_network();
    let config = config();
    let store = EnsembleStore::new();
    rebuild_ensemble(&provider, &registry, &config, &store, "phelps_wi", Quantity::Snowfall, last_day(), built_at())
        .unwrap();

    let runs = run_forecasts(
        &provider,
        &store,
        &config,
        &["phelps_wi", "eagle_river_wi"],
        last_day(),
        Utc::now(),
    );
    assert_eq!(runs.len(), 2);
    assert!(runs[0].as_ref().unwrap().is_available());
    assert!(!runs[1].as_ref().unwrap().is_available());
}

// ---------------------------------------------------------------------------
// CSV exports
// ---------------------------------------------------------------------------

#[test]
fn test_csv_exports_rank_like_in_memory_series() {
    let dir = tempfile::tempdir().unwrap();
    for (id, values) in synthetic_history() {
        let mut csv = String::from("date,snowfall_mm,temp_mean_c\n");
        for (i, v) in values.iter().enumerate() {
            let date = first_day() + Duration::days(i as i64);
            // Sprinkle in missing temperature and a few missing snow days.
            if i % 97 == 13 {
                csv.push_str(&format!("{},null,\n", date));
            } else {
                csv.push_str(&format!("{},{},NA\n", date, v));
            }
        }
        std::fs::write(dir.path().join(format!("{}.csv", id)), csv).unwrap();
    }

    let provider = CsvDirectoryProvider::new(dir.path());
    let outcome = rebuild_ensemble(
        &provider,
        &LocationRegistry::default_network(),
        &config(),
        &EnsembleStore::new(),
        "phelps_wi",
        Quantity::Snowfall,
        last_day(),
        built_at(),
    )
    .unwrap();

    let ranked: Vec<&str> = outcome.report.ranked.iter().map(|r| r.predictor_id.as_str()).collect();
    assert_eq!(ranked, vec!["duluth_mn", "sapporo_japan"]);
    assert!(outcome.report.ranked[0].sample_size < DAYS - 1, "missing days are not paired");
}

// ---------------------------------------------------------------------------
// Backtesting
// ---------------------------------------------------------------------------

#[test]
fn test_backtest_of_built_ensemble() {
    let provider = in_memory_provider();
    let registry = LocationRegistry::default_network();
    let config = config();
    let store = EnsembleStore::new();
    let outcome =
        rebuild_ensemble(&provider, &registry, &config, &store, "phelps_wi", Quantity::Snowfall, last_day(), built_at())
            .unwrap();

    let options = BacktestOptions { lead_days: 1, quiet_day_stride: 1, false_alarm_probability: 50.0 };
    let report = backtest(
        &provider,
        &outcome.ensemble,
        &config,
        day("2023-10-01"),
        day("2023-12-31"),
        &options,
    )
    .unwrap();

    assert_eq!(report.days.len(), 92);
    assert_eq!(report.insufficient_signal_days, 0);
    assert!(report.hit_rate().is_some());
    let r = report.probability_correlation.expect("probabilities vary");
    assert!(r > 0.5, "1-day-ahead lake signal should track snowfall, r = {:.3}", r);
}
