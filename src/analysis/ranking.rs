//! Ranks candidate predictor locations against a target.
//!
//! Each candidate is fetched and analysed independently on the rayon pool;
//! one candidate's provider failure or thin record is reported and skipped,
//! never fatal to the batch. Results are merged and then sorted with a
//! total order so the ranking never depends on completion order.

use super::lag::LagCorrelationAnalyzer;
use super::significance::SignificanceTester;
use crate::config::AnalysisConfig;
use crate::logging::{self, Component};
use crate::model::{LagResult, Location, ObservationSeries, Quantity, SnowlagError};
use crate::provider::SeriesProvider;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Why a candidate produced no lag result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionReason {
    SelfCorrelation,
    InsufficientData { available: usize, required: usize },
    DegenerateSeries,
    ProviderUnavailable { reason: String },
    InvalidSeries { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedCandidate {
    pub predictor_id: String,
    pub reason: ExclusionReason,
}

/// Where one candidate ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateOutcome {
    /// Significant and leads (or coincides with) the target.
    Ranked(LagResult),
    /// Best lag below the floor: the candidate follows the target.
    DiagnosticOnly(LagResult),
    NotSignificant(LagResult),
    Excluded(ExcludedCandidate),
}

/// Full result of one ranking pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingReport {
    pub target_id: String,
    pub predictor_quantity: Quantity,
    pub lag_window: (i32, i32),
    /// Survivors in rank order; the only input to ensemble building.
    pub ranked: Vec<LagResult>,
    /// Predictors that lag the target; reported, never weighted.
    pub diagnostic: Vec<LagResult>,
    pub not_significant: Vec<LagResult>,
    pub excluded: Vec<ExcludedCandidate>,
}

impl RankingReport {
    pub fn candidate_count(&self) -> usize {
        self.ranked.len() + self.diagnostic.len() + self.not_significant.len() + self.excluded.len()
    }
}

#[derive(Debug, Clone)]
pub struct PredictorRanker {
    analyzer: LagCorrelationAnalyzer,
    tester: SignificanceTester,
    diagnostic_lag_floor: i32,
    tie_epsilon: f64,
}

impl PredictorRanker {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            analyzer: LagCorrelationAnalyzer::from_config(config),
            tester: SignificanceTester::from_config(config),
            diagnostic_lag_floor: config.diagnostic_lag_floor,
            tie_epsilon: config.tie_epsilon,
        }
    }

    pub fn lag_window(&self) -> (i32, i32) {
        self.analyzer.lag_window()
    }

    /// Fetches the target once and every candidate in parallel, then ranks.
    ///
    /// Only systemic failures propagate: an empty candidate list, the target
    /// series itself being unavailable, every candidate being unavailable,
    /// or a candidate fetch failing with an error that is not
    /// `SnowlagError::is_local`.
    pub fn rank<P: SeriesProvider>(
        &self,
        provider: &P,
        candidates: &[Location],
        target: &Location,
        predictor_quantity: Quantity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RankingReport, SnowlagError> {
        if candidates.is_empty() {
            return Err(SnowlagError::NoCandidates { target_id: target.id.clone() });
        }
        let target_series = provider
            .get_series(&target.id, Quantity::Snowfall, start, end)
            .inspect_err(|e| logging::log_provider_failure(&target.id, "target fetch", e))?;

        let outcomes: Vec<CandidateOutcome> = candidates
            .par_iter()
            .map(|candidate| {
                if candidate.id == target.id {
                    return Ok(self_exclusion(&candidate.id));
                }
                match provider.get_series(&candidate.id, predictor_quantity, start, end) {
                    Ok(series) => Ok(self.evaluate(&series, &target_series)),
                    Err(e) if e.is_local() => {
                        logging::log_provider_failure(&candidate.id, "predictor fetch", &e);
                        Ok(excluded(&candidate.id, &e))
                    }
                    Err(e) => Err(e),
                }
            })
            .collect::<Result<_, _>>()?;

        let unavailable = outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o,
                    CandidateOutcome::Excluded(ExcludedCandidate {
                        reason: ExclusionReason::ProviderUnavailable { .. },
                        ..
                    })
                )
            })
            .count();
        let non_self = candidates.iter().filter(|c| c.id != target.id).count();
        if non_self > 0 && unavailable == non_self {
            return Err(SnowlagError::ProviderUnavailable {
                location_id: "*".to_string(),
                reason: format!("all {} candidate series unavailable for {}", non_self, target.id),
            });
        }

        let report = self.merge(&target.id, predictor_quantity, outcomes);
        logging::log_batch_summary(
            Component::Analysis,
            &format!("ranking for {}", target.id),
            report.candidate_count(),
            report.candidate_count() - report.excluded.len(),
            report.excluded.len(),
        );
        Ok(report)
    }

    /// Ranks already-loaded series. Pure; no provider involved.
    pub fn rank_series(
        &self,
        target_series: &ObservationSeries,
        candidates: &[ObservationSeries],
    ) -> RankingReport {
        let outcomes: Vec<CandidateOutcome> = candidates
            .par_iter()
            .map(|series| {
                if series.location_id() == target_series.location_id() {
                    self_exclusion(series.location_id())
                } else {
                    self.evaluate(series, target_series)
                }
            })
            .collect();
        let quantity = candidates
            .first()
            .map(|s| s.quantity())
            .unwrap_or(Quantity::Snowfall);
        self.merge(target_series.location_id(), quantity, outcomes)
    }

    /// Analyses and tests a single pair.
    pub fn evaluate(&self, predictor: &ObservationSeries, target: &ObservationSeries) -> CandidateOutcome {
        let predictor_id = predictor.location_id();
        let lag = match self.analyzer.analyze(predictor, target) {
            Ok(lag) => lag,
            Err(e) => {
                logging::debug(Component::Analysis, Some(predictor_id), &e.to_string());
                return excluded(predictor_id, &e);
            }
        };
        let significance = match self.tester.test(lag.correlation, lag.valid_days) {
            Ok(s) => s,
            Err(e) => return excluded(predictor_id, &e),
        };

        let result = LagResult {
            predictor_id: predictor_id.to_string(),
            target_id: target.location_id().to_string(),
            lag_days: lag.best_lag,
            correlation: lag.correlation,
            p_value: significance.p_value,
            sample_size: lag.valid_days,
            significant: significance.significant,
        };

        if result.lag_days < self.diagnostic_lag_floor {
            CandidateOutcome::DiagnosticOnly(result)
        } else if result.significant {
            CandidateOutcome::Ranked(result)
        } else {
            CandidateOutcome::NotSignificant(result)
        }
    }

    fn merge(&self, target_id: &str, quantity: Quantity, outcomes: Vec<CandidateOutcome>) -> RankingReport {
        let mut report = RankingReport {
            target_id: target_id.to_string(),
            predictor_quantity: quantity,
            lag_window: self.lag_window(),
            ranked: Vec::new(),
            diagnostic: Vec::new(),
            not_significant: Vec::new(),
            excluded: Vec::new(),
        };
        for outcome in outcomes {
            match outcome {
                CandidateOutcome::Ranked(r) => report.ranked.push(r),
                CandidateOutcome::DiagnosticOnly(r) => report.diagnostic.push(r),
                CandidateOutcome::NotSignificant(r) => report.not_significant.push(r),
                CandidateOutcome::Excluded(x) => report.excluded.push(x),
            }
        }
        let eps = self.tie_epsilon;
        report.ranked.sort_by(|a, b| rank_order(a, b, eps));
        report.diagnostic.sort_by(|a, b| rank_order(a, b, eps));
        report.not_significant.sort_by(|a, b| rank_order(a, b, eps));
        report.excluded.sort_by(|a, b| a.predictor_id.cmp(&b.predictor_id));
        report
    }
}

/// Descending |r|, then larger sample, then smaller lead lag, then id.
///
/// |r| ties are bucket-based: `|r| / eps` is rounded to an integer and
/// equal buckets tie. Two coefficients closer than `eps` usually share a
/// bucket, but a pair straddling a bucket edge orders by |r| instead.
/// Comparing `|a - b| <= eps` directly would not be transitive, and the
/// sort needs a total order to stay deterministic.
pub fn rank_order(a: &LagResult, b: &LagResult, eps: f64) -> Ordering {
    let bucket = |r: &LagResult| -> i64 {
        if eps > 0.0 {
            (r.correlation.abs() / eps).round() as i64
        } else {
            r.correlation.abs().to_bits() as i64
        }
    };
    bucket(b)
        .cmp(&bucket(a))
        .then_with(|| b.sample_size.cmp(&a.sample_size))
        .then_with(|| a.lag_days.cmp(&b.lag_days))
        .then_with(|| a.predictor_id.cmp(&b.predictor_id))
}

fn self_exclusion(id: &str) -> CandidateOutcome {
    CandidateOutcome::Excluded(ExcludedCandidate {
        predictor_id: id.to_string(),
        reason: ExclusionReason::SelfCorrelation,
    })
}

fn excluded(id: &str, err: &SnowlagError) -> CandidateOutcome {
    let reason = match err {
        SnowlagError::DataInsufficient { available, required, .. } => ExclusionReason::InsufficientData {
            available: *available,
            required: *required,
        },
        SnowlagError::DegenerateSeries { .. } => ExclusionReason::DegenerateSeries,
        SnowlagError::InvalidSeries(reason) => ExclusionReason::InvalidSeries { reason: reason.clone() },
        other => ExclusionReason::ProviderUnavailable { reason: other.to_string() },
    };
    CandidateOutcome::Excluded(ExcludedCandidate {
        predictor_id: id.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InMemoryProvider;
    use crate::stations::LocationRegistry;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn noise(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
                ((state >> 33) % 300) as f64 / 10.0
            })
            .collect()
    }

    fn series(id: &str, values: &[f64]) -> ObservationSeries {
        let values: Vec<Option<f64>> = values.iter().map(|v| Some(*v)).collect();
        ObservationSeries::from_daily(id, Quantity::Snowfall, day("2020-01-01"), &values)
    }

    /// Target plus three predictors: strong same-day, weaker 4-day lead,
    /// and one that follows the target by 2 days.
    fn fixture() -> (ObservationSeries, Vec<ObservationSeries>) {
        let n = 600;
        let target = noise(n, 1);
        let mut same_day = noise(n, 2);
        let mut leads = noise(n, 3);
        let mut follows = noise(n, 4);
        for i in 0..n {
            same_day[i] = 0.8 * target[i] + 0.2 * same_day[i];
            if i + 4 < n {
                leads[i] = 0.5 * target[i + 4] + 0.5 * leads[i];
            }
            if i >= 2 {
                follows[i] = 0.9 * target[i - 2] + 0.1 * follows[i];
            }
        }
        let candidates = vec![
            series("thunder_bay_on", &same_day),
            series("sapporo_japan", &leads),
            series("denver_co", &follows),
            series("phelps_wi", &target),
        ];
        (series("phelps_wi", &target), candidates)
    }

    #[test]
    fn test_rank_orders_by_strength_and_separates_diagnostics() {
        let (target, candidates) = fixture();
        let ranker = PredictorRanker::new(&AnalysisConfig::default());
        let report = ranker.rank_series(&target, &candidates);

        let ranked: Vec<&str> = report.ranked.iter().map(|r| r.predictor_id.as_str()).collect();
        assert_eq!(ranked, vec!["thunder_bay_on", "sapporo_japan"]);
        assert_eq!(report.ranked[0].lag_days, 0);
        assert_eq!(report.ranked[1].lag_days, 4);

        assert_eq!(report.diagnostic.len(), 1);
        assert_eq!(report.diagnostic[0].predictor_id, "denver_co");
        assert_eq!(report.diagnostic[0].lag_days, -2);

        assert_eq!(
            report.excluded,
            vec![ExcludedCandidate {
                predictor_id: "phelps_wi".to_string(),
                reason: ExclusionReason::SelfCorrelation,
            }]
        );
    }

    #[test]
    fn test_rank_is_idempotent() {
        let (target, candidates) = fixture();
        let ranker = PredictorRanker::new(&AnalysisConfig::default());
        let first = ranker.rank_series(&target, &candidates);
        let mut reversed = candidates.clone();
        reversed.reverse();
        let second = ranker.rank_series(&target, &reversed);
        assert_eq!(first, second, "input order must not change the ranking");
    }

    #[test]
    fn test_ties_break_on_sample_size_then_lag() {
        let base = LagResult {
            predictor_id: "a".to_string(),
            target_id: "t".to_string(),
            lag_days: 5,
            correlation: 0.3,
            p_value: 0.0,
            sample_size: 1000,
            significant: true,
        };
        let bigger_sample = LagResult { predictor_id: "b".to_string(), sample_size: 2000, ..base.clone() };
        let shorter_lead = LagResult { predictor_id: "c".to_string(), lag_days: 1, ..base.clone() };
        let nearly_equal_r = LagResult { correlation: -0.3 + 1e-12, ..bigger_sample.clone() };

        assert_eq!(rank_order(&bigger_sample, &base, 1e-9), Ordering::Less);
        assert_eq!(rank_order(&shorter_lead, &base, 1e-9), Ordering::Less);
        assert_eq!(rank_order(&nearly_equal_r, &base, 1e-9), Ordering::Less);
    }

    #[test]
    fn test_tie_buckets_are_rounded_multiples_of_epsilon() {
        let at = |correlation: f64, id: &str| LagResult {
            predictor_id: id.to_string(),
            target_id: "t".to_string(),
            lag_days: 2,
            correlation,
            p_value: 0.0,
            sample_size: 500,
            significant: true,
        };
        let eps = 1e-3;
        // Same bucket (0.3004 and 0.3001 both round to 300): falls through to id.
        assert_eq!(rank_order(&at(0.3001, "b"), &at(0.3004, "a"), eps), Ordering::Greater);
        // Across the 300.5 edge the stronger one wins even though they are only 2e-4 apart.
        assert_eq!(rank_order(&at(0.3006, "b"), &at(0.3004, "a"), eps), Ordering::Less);
        // Sorting stays deterministic under any input order.
        let mut forward = vec![at(0.3004, "a"), at(0.3001, "b"), at(0.3006, "c")];
        let mut backward: Vec<LagResult> = forward.iter().rev().cloned().collect();
        forward.sort_by(|a, b| rank_order(a, b, eps));
        backward.sort_by(|a, b| rank_order(a, b, eps));
        assert_eq!(forward, backward);
        assert_eq!(forward[0].predictor_id, "c");
    }

    #[test]
    fn test_unavailable_candidate_is_skipped_not_fatal() {
        let (target, candidates) = fixture();
        let mut provider = InMemoryProvider::new().with(target);
        for c in candidates.into_iter().filter(|c| c.location_id() != "sapporo_japan") {
            provider.insert(c);
        }
        let registry = LocationRegistry::default_network();
        let locations: Vec<Location> = ["thunder_bay_on", "sapporo_japan", "denver_co"]
            .iter()
            .map(|id| registry.find(id).unwrap().clone())
            .collect();
        let target = registry.find("phelps_wi").unwrap();

        let ranker = PredictorRanker::new(&AnalysisConfig::default());
        let report = ranker
            .rank(&provider, &locations, target, Quantity::Snowfall, day("2020-01-01"), day("2021-12-31"))
            .expect("one missing candidate must not abort the run");
        assert_eq!(report.ranked.len(), 1);
        assert_eq!(report.excluded.len(), 1);
        assert_eq!(report.excluded[0].predictor_id, "sapporo_japan");
        assert!(matches!(report.excluded[0].reason, ExclusionReason::ProviderUnavailable { .. }));
    }

    /// Serves the wrapped provider but fails one location with a given error.
    struct FailingFor {
        inner: InMemoryProvider,
        location_id: &'static str,
        error: fn(&str) -> SnowlagError,
    }

    impl SeriesProvider for FailingFor {
        fn get_series(
            &self,
            location_id: &str,
            quantity: Quantity,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<ObservationSeries, SnowlagError> {
            if location_id == self.location_id {
                return Err((self.error)(location_id));
            }
            self.inner.get_series(location_id, quantity, start, end)
        }
    }

    fn rank_with_failing(error: fn(&str) -> SnowlagError) -> Result<RankingReport, SnowlagError> {
        let (target, candidates) = fixture();
        let mut inner = InMemoryProvider::new().with(target);
        for c in candidates {
            inner.insert(c);
        }
        let provider = FailingFor { inner, location_id: "denver_co", error };
        let registry = LocationRegistry::default_network();
        let locations: Vec<Location> = ["thunder_bay_on", "sapporo_japan", "denver_co"]
            .iter()
            .map(|id| registry.find(id).unwrap().clone())
            .collect();
        let target = registry.find("phelps_wi").unwrap();
        PredictorRanker::new(&AnalysisConfig::default()).rank(
            &provider,
            &locations,
            target,
            Quantity::Snowfall,
            day("2020-01-01"),
            day("2021-12-31"),
        )
    }

    #[test]
    fn test_local_candidate_error_is_excluded() {
        let report = rank_with_failing(|id| SnowlagError::InvalidSeries(format!("{}: bad row", id))).unwrap();
        assert_eq!(report.excluded.len(), 1);
        assert_eq!(report.excluded[0].predictor_id, "denver_co");
        assert_eq!(report.ranked.len() + report.diagnostic.len(), 2);
    }

    #[test]
    fn test_systemic_candidate_error_aborts_ranking() {
        let err = rank_with_failing(|_| SnowlagError::Configuration("provider misconfigured".into())).unwrap_err();
        assert!(matches!(err, SnowlagError::Configuration(_)));

        let err = rank_with_failing(|_| SnowlagError::Persistence("cache unreadable".into())).unwrap_err();
        assert!(matches!(err, SnowlagError::Persistence(_)));
    }

    #[test]
    fn test_empty_candidate_set_is_systemic() {
        let registry = LocationRegistry::default_network();
        let target = registry.find("phelps_wi").unwrap();
        let ranker = PredictorRanker::new(&AnalysisConfig::default());
        let err = ranker
            .rank(&InMemoryProvider::new(), &[], target, Quantity::Snowfall, day("2020-01-01"), day("2020-12-31"))
            .unwrap_err();
        assert!(matches!(err, SnowlagError::NoCandidates { .. }));
    }

    #[test]
    fn test_missing_target_is_systemic() {
        let registry = LocationRegistry::default_network();
        let target = registry.find("phelps_wi").unwrap();
        let candidates = registry.candidates_for("phelps_wi");
        let ranker = PredictorRanker::new(&AnalysisConfig::default());
        let err = ranker
            .rank(&InMemoryProvider::new(), &candidates, target, Quantity::Snowfall, day("2020-01-01"), day("2020-12-31"))
            .unwrap_err();
        assert!(matches!(err, SnowlagError::ProviderUnavailable { .. }));
    }
}
