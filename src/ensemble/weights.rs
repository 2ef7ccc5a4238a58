//! Ranked survivors → normalised, capped ensemble weights.
//!
//! Raw weight is |r|. Shares are capped with water-filling: any member
//! whose proportional share would exceed the ceiling is pinned at the
//! ceiling and the remainder is redistributed over the others in
//! proportion to their raw weight, repeating until nothing exceeds it.
//! The result is non-negative, sums to 1, never exceeds the ceiling, and
//! a member's weight never falls when its |r| rises.

use crate::analysis::RankingReport;
use crate::config::{ClassifierConfig, EnsembleConfig, SnowlagConfig};
use crate::forecast::EventClassifier;
use crate::logging::{self, Component};
use crate::model::{Ensemble, LagResult, Location, PredictorWeight, SnowlagError};
use crate::stations::{LocationRegistry, distance_km};
use chrono::{DateTime, Utc};

const SUM_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct EnsembleWeightBuilder {
    max_predictors: usize,
    ceiling: f64,
    classifier: EventClassifier,
}

impl EnsembleWeightBuilder {
    pub fn new(ensemble: &EnsembleConfig, classifier: &ClassifierConfig) -> Self {
        Self {
            max_predictors: ensemble.max_predictors,
            ceiling: ensemble.single_predictor_weight_ceiling,
            classifier: EventClassifier::new(classifier.clone()),
        }
    }

    pub fn from_config(config: &SnowlagConfig) -> Self {
        Self::new(&config.ensemble, &config.classifier)
    }

    /// Normalised weights for the top `max_predictors` of `ranked`, keyed by
    /// predictor id in rank order.
    pub fn weights(&self, ranked: &[LagResult]) -> Result<Vec<(String, f64)>, SnowlagError> {
        let selected = &ranked[..ranked.len().min(self.max_predictors)];
        let raw: Vec<f64> = selected.iter().map(|r| r.correlation.abs()).collect();
        let shares = cap_shares(&raw, self.ceiling)?;
        Ok(selected
            .iter()
            .zip(shares)
            .map(|(r, w)| (r.predictor_id.clone(), w))
            .collect())
    }

    /// Builds the ensemble for `target` from a ranking report.
    ///
    /// Zero survivors give an empty ensemble, which scoring turns into "no
    /// forecast available". The climatology is left empty for the caller
    /// to fill from history.
    pub fn build(
        &self,
        target: &Location,
        registry: &LocationRegistry,
        report: &RankingReport,
        built_at: DateTime<Utc>,
    ) -> Result<Ensemble, SnowlagError> {
        let mut ensemble = Ensemble::empty(&target.id, built_at);
        ensemble.lag_window = report.lag_window;
        ensemble.weight_ceiling = self.ceiling;

        if report.ranked.is_empty() {
            logging::warn(
                Component::Ensemble,
                Some(&target.id),
                "no significant predictors; ensemble is empty",
            );
            return Ok(ensemble);
        }

        let weights = self.weights(&report.ranked)?;
        ensemble.weights = report
            .ranked
            .iter()
            .zip(weights)
            .map(|(result, (_, normalized_weight))| {
                let location = registry.find(&result.predictor_id);
                if location.is_none() {
                    logging::warn(
                        Component::Ensemble,
                        Some(&result.predictor_id),
                        "predictor not in registry; tagged as remote",
                    );
                }
                let mechanism_tag = self.classifier.tag(
                    result.lag_days,
                    location.map(|l| distance_km(l, target)),
                    location.is_some_and(|l| l.lake_adjacent),
                );
                PredictorWeight {
                    predictor_id: result.predictor_id.clone(),
                    quantity: report.predictor_quantity,
                    lag_days: result.lag_days,
                    correlation: result.correlation,
                    normalized_weight,
                    mechanism_tag,
                }
            })
            .collect();

        logging::info(
            Component::Ensemble,
            Some(&target.id),
            &format!(
                "built ensemble: {} predictors (of {} significant), weight sum {:.12}",
                ensemble.weights.len(),
                report.ranked.len(),
                ensemble.weight_sum()
            ),
        );
        Ok(ensemble)
    }
}

/// Water-filling cap of `raw` to shares summing to 1, none above `ceiling`.
///
/// Fails with a configuration error when `raw.len() * ceiling < 1`, since
/// no weight vector can then satisfy both constraints.
pub fn cap_shares(raw: &[f64], ceiling: f64) -> Result<Vec<f64>, SnowlagError> {
    let n = raw.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    if (n as f64) * ceiling < 1.0 - SUM_TOLERANCE {
        return Err(SnowlagError::Configuration(format!(
            "weight ceiling {} cannot be honoured with {} predictor(s): shares must sum to 1",
            ceiling, n
        )));
    }

    let mut pinned = vec![false; n];
    let mut shares = vec![0.0; n];
    loop {
        let pinned_count = pinned.iter().filter(|p| **p).count();
        let remaining = 1.0 - pinned_count as f64 * ceiling;
        let free: Vec<usize> = (0..n).filter(|&i| !pinned[i]).collect();
        let free_raw: f64 = free.iter().map(|&i| raw[i].max(0.0)).sum();

        let mut newly_pinned = false;
        for &i in &free {
            let share = if free_raw > 0.0 {
                remaining * raw[i].max(0.0) / free_raw
            } else {
                remaining / free.len() as f64
            };
            if share > ceiling + SUM_TOLERANCE {
                pinned[i] = true;
                newly_pinned = true;
            } else {
                shares[i] = share;
            }
        }
        if !newly_pinned {
            break;
        }
    }
    for (share, _) in shares.iter_mut().zip(&pinned).filter(|(_, p)| **p) {
        *share = ceiling;
    }
    Ok(shares)
}
