//! Historical magnitude table: total ensemble contribution → snowfall range.
//!
//! Every historical target day with an observation is scored with the same
//! contribution arithmetic the forecast uses, reading each predictor at
//! `day - lag`. Target snowfall on those days is grouped into contribution
//! buckets and summarised by two percentiles.

use crate::config::{ActivityRule, ForecastConfig};
use crate::model::{
    MagnitudeBucket, MagnitudeClimatology, MagnitudeRange, ObservationSeries, PredictorWeight, Quantity,
    SnowlagError,
};
use crate::thresholds::predictor_signal;
use chrono::Duration;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
pub struct ClimatologyBuilder {
    bucket_width: f64,
    percentiles: (f64, f64),
    rules: BTreeMap<Quantity, ActivityRule>,
}

impl ClimatologyBuilder {
    pub fn from_config(config: &ForecastConfig) -> Self {
        Self {
            bucket_width: config.magnitude_bucket_width,
            percentiles: config.magnitude_percentiles,
            rules: config.activity.clone(),
        }
    }

    /// Builds the table from `target` history and the predictors' histories.
    ///
    /// A predictor without history simply contributes nothing; a day on
    /// which no predictor had a value is skipped.
    pub fn build(
        &self,
        weights: &[PredictorWeight],
        predictor_history: &HashMap<String, ObservationSeries>,
        target: &ObservationSeries,
    ) -> Result<MagnitudeClimatology, SnowlagError> {
        let mut rules = Vec::with_capacity(weights.len());
        for w in weights {
            let rule = self.rules.get(&w.quantity).copied().ok_or_else(|| {
                SnowlagError::Configuration(format!("no activity threshold configured for {}", w.quantity))
            })?;
            rules.push(rule);
        }

        let mut samples: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
        for (date, snow) in target.present() {
            let mut total = 0.0;
            let mut any_present = false;
            for (w, rule) in weights.iter().zip(&rules) {
                let value = predictor_history
                    .get(&w.predictor_id)
                    .and_then(|s| s.value_on(date - Duration::days(i64::from(w.lag_days))));
                any_present |= value.is_some();
                let (activity, _) = predictor_signal(value, rule);
                total += w.normalized_weight * activity * w.direction();
            }
            if !any_present {
                continue;
            }
            samples.entry(self.bucket_index(total)).or_default().push(snow);
        }

        let buckets = samples
            .into_iter()
            .map(|(index, mut values)| {
                values.sort_by(f64::total_cmp);
                MagnitudeBucket {
                    contribution_floor: index as f64 * self.bucket_width,
                    sample_days: values.len(),
                    range: MagnitudeRange {
                        low_mm: percentile(&values, self.percentiles.0),
                        high_mm: percentile(&values, self.percentiles.1),
                    },
                }
            })
            .collect();

        Ok(MagnitudeClimatology { bucket_width: self.bucket_width, buckets })
    }

    fn bucket_index(&self, contribution: f64) -> usize {
        let last = (1.0 / self.bucket_width).ceil() as usize - 1;
        ((contribution.clamp(0.0, 1.0) / self.bucket_width).floor() as usize).min(last)
    }
}

impl MagnitudeClimatology {
    /// Range of the non-empty bucket whose centre is nearest `contribution`.
    /// Equidistant buckets resolve to the lower one. `None` for an empty table.
    pub fn lookup(&self, contribution: f64) -> Option<MagnitudeRange> {
        let half = self.bucket_width / 2.0;
        let contribution = contribution.clamp(0.0, 1.0);
        self.buckets
            .iter()
            .filter(|b| b.sample_days > 0)
            .min_by(|a, b| {
                let da = (a.contribution_floor + half - contribution).abs();
                let db = (b.contribution_floor + half - contribution).abs();
                da.total_cmp(&db)
                    .then_with(|| a.contribution_floor.total_cmp(&b.contribution_floor))
            })
            .map(|b| b.range)
    }
}

/// Linear-interpolated percentile of sorted, non-empty `values`.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (pct / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}
