//! Lag correlation between a predictor series and a target series.
//!
//! Series are aligned by calendar date, never by index. At lag `L` the
//! predictor's value on `date - L` is paired with the target's value on
//! `date`, so a positive lag means the predictor leads the target.

use crate::config::AnalysisConfig;
use crate::model::{ObservationSeries, SnowlagError};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Correlation at one lag. `correlation` is `None` when the lag had too
/// few pairs or zero variance on either side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagPoint {
    pub lag_days: i32,
    pub pairs: usize,
    pub correlation: Option<f64>,
}

/// Best lag found for a pair of series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagCorrelation {
    pub best_lag: i32,
    pub correlation: f64,
    /// Paired observations at the best lag.
    pub valid_days: usize,
    /// Every lag in the window, in ascending lag order.
    pub profile: Vec<LagPoint>,
}

#[derive(Debug, Clone)]
pub struct LagCorrelationAnalyzer {
    lag_window: (i32, i32),
    min_overlap_days: usize,
    tie_epsilon: f64,
}

impl LagCorrelationAnalyzer {
    pub fn new(lag_window: (i32, i32), min_overlap_days: usize) -> Self {
        Self {
            lag_window,
            min_overlap_days,
            tie_epsilon: 1e-12,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.lag_window, config.min_overlap_days)
    }

    pub fn lag_window(&self) -> (i32, i32) {
        self.lag_window
    }

    /// Finds the lag in the window that maximises |r|.
    ///
    /// Ties within a tiny epsilon go to the smaller |lag|, then to the lag
    /// with more pairs, then to the positive lag. Swapping predictor and
    /// target negates the best lag except on an exact `±L` tie with equal
    /// pair counts, where both orientations report `+L`; |r| is the same
    /// either way. Returns `DataInsufficient` when no lag reaches the
    /// minimum overlap and `DegenerateSeries` when every lag that did had
    /// zero variance.
    pub fn analyze(
        &self,
        predictor: &ObservationSeries,
        target: &ObservationSeries,
    ) -> Result<LagCorrelation, SnowlagError> {
        let context = || format!("{} -> {}", predictor.location_id(), target.location_id());
        let predictor_by_date: HashMap<NaiveDate, f64> = predictor.present().collect();
        let target_present: Vec<(NaiveDate, f64)> = target.present().collect();

        let (lo, hi) = self.lag_window;
        let mut profile = Vec::with_capacity((hi - lo + 1).max(0) as usize);
        let mut xs = Vec::with_capacity(target_present.len());
        let mut ys = Vec::with_capacity(target_present.len());
        let mut max_pairs = 0usize;
        let mut any_overlap = false;

        for lag in lo..=hi {
            xs.clear();
            ys.clear();
            let shift = Duration::days(i64::from(lag));
            for &(date, y) in &target_present {
                if let Some(&x) = predictor_by_date.get(&(date - shift)) {
                    xs.push(x);
                    ys.push(y);
                }
            }
            let pairs = xs.len();
            max_pairs = max_pairs.max(pairs);

            let correlation = if pairs >= self.min_overlap_days {
                any_overlap = true;
                pearson(&xs, &ys)
            } else {
                None
            };
            profile.push(LagPoint { lag_days: lag, pairs, correlation });
        }

        if !any_overlap {
            return Err(SnowlagError::DataInsufficient {
                context: context(),
                available: max_pairs,
                required: self.min_overlap_days,
            });
        }

        let mut best: Option<&LagPoint> = None;
        for point in &profile {
            let Some(r) = point.correlation else { continue };
            best = match best {
                None => Some(point),
                Some(current) => {
                    let current_r = current.correlation.unwrap_or(0.0).abs();
                    if r.abs() > current_r + self.tie_epsilon {
                        Some(point)
                    } else if (r.abs() - current_r).abs() <= self.tie_epsilon && prefers_tied(point, current) {
                        Some(point)
                    } else {
                        Some(current)
                    }
                }
            };
        }

        match best {
            Some(point) => Ok(LagCorrelation {
                best_lag: point.lag_days,
                correlation: point.correlation.unwrap_or(0.0),
                valid_days: point.pairs,
                profile: profile.clone(),
            }),
            None => Err(SnowlagError::DegenerateSeries { context: context() }),
        }
    }
}

/// Tie rule: smaller |lag|, then more pairs, then the positive (leading) lag.
fn prefers_tied(candidate: &LagPoint, current: &LagPoint) -> bool {
    candidate
        .lag_days
        .abs()
        .cmp(&current.lag_days.abs())
        .then_with(|| current.pairs.cmp(&candidate.pairs))
        .then_with(|| current.lag_days.cmp(&candidate.lag_days))
        == std::cmp::Ordering::Less
}

/// Pearson correlation, `None` for fewer than two pairs or zero variance.
///
/// Two-pass and symmetric in its arguments, so swapping `xs` and `ys`
/// gives a bit-identical result.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    if xs.iter().all(|&x| x == xs[0]) || ys.iter().all(|&y| y == ys[0]) {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (&x, &y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}
