//! Backtesting
//!
//! Replays forecasts for historical days and scores them against what the
//! target actually recorded. Every snow day at or above the trace
//! threshold is evaluated, plus every `quiet_day_stride`-th quiet day. The
//! forecast for each day is issued `lead_days` earlier through a
//! `ReplayProvider`, so no observation after the issue date is visible.
//!
//! The ensemble itself is taken as given; when it was built from a history
//! that includes the evaluated period the scores are in-sample.

use crate::analysis::lag::pearson;
use crate::config::SnowlagConfig;
use crate::forecast::ForecastScorer;
use crate::logging::{self, Component};
use crate::model::{Ensemble, Quantity, SignalStatus, SnowlagError};
use crate::pipeline::gather_recent;
use crate::provider::SeriesProvider;
use crate::replay::ReplayMode;
use crate::thresholds::{SnowfallCategory, categorize_snowfall};
use chrono::{Duration, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Options and results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestOptions {
    /// Days between issue and the evaluated day; must be within the horizon.
    pub lead_days: u32,
    /// Evaluate every n-th quiet day.
    pub quiet_day_stride: usize,
    /// Forecast probability (%) on a quiet day that counts as a false alarm.
    pub false_alarm_probability: f64,
}

impl Default for BacktestOptions {
    fn default() -> Self {
        Self {
            lead_days: 3,
            quiet_day_stride: 7,
            false_alarm_probability: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub events: usize,
    pub hits: usize,
}

impl CategoryScore {
    pub fn hit_rate(&self) -> Option<f64> {
        (self.events > 0).then(|| self.hits as f64 / self.events as f64)
    }
}

/// One evaluated day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestDay {
    pub date: NaiveDate,
    pub observed_mm: f64,
    pub category: SnowfallCategory,
    pub probability: f64,
    pub signal: SignalStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub target_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub lead_days: u32,
    pub categories: BTreeMap<SnowfallCategory, CategoryScore>,
    pub quiet_days: usize,
    pub false_alarms: usize,
    /// Evaluated days on which no ensemble member had data.
    pub insufficient_signal_days: usize,
    /// Pearson r between forecast probability and observed snowfall.
    pub probability_correlation: Option<f64>,
    pub days: Vec<BacktestDay>,
}

impl BacktestReport {
    /// Hits over all snow events, any category.
    pub fn hit_rate(&self) -> Option<f64> {
        let (events, hits) = self
            .categories
            .values()
            .fold((0, 0), |(e, h), c| (e + c.events, h + c.hits));
        (events > 0).then(|| hits as f64 / events as f64)
    }

    pub fn false_alarm_rate(&self) -> Option<f64> {
        (self.quiet_days > 0).then(|| self.false_alarms as f64 / self.quiet_days as f64)
    }
}

// ============================================================================
// Backtest
// ============================================================================

/// Replays `ensemble` over target days in `start..=end`.
pub fn backtest<P: SeriesProvider>(
    provider: &P,
    ensemble: &Ensemble,
    config: &SnowlagConfig,
    start: NaiveDate,
    end: NaiveDate,
    options: &BacktestOptions,
) -> Result<BacktestReport, SnowlagError> {
    if options.lead_days == 0 || options.lead_days > config.forecast.horizon_days {
        return Err(SnowlagError::Configuration(format!(
            "backtest lead of {} day(s) is outside the 1..={} forecast horizon",
            options.lead_days, config.forecast.horizon_days
        )));
    }
    if ensemble.is_empty() {
        return Err(SnowlagError::EmptyEnsemble { target_id: ensemble.target_id.clone() });
    }
    let stride = options.quiet_day_stride.max(1);
    let target = provider.get_series(&ensemble.target_id, Quantity::Snowfall, start, end)?;

    let mut quiet_seen = 0usize;
    let sampled: Vec<(NaiveDate, f64, SnowfallCategory)> = target
        .present()
        .filter_map(|(date, mm)| {
            let category = categorize_snowfall(mm, &config.events);
            if category == SnowfallCategory::None {
                quiet_seen += 1;
                if (quiet_seen - 1) % stride != 0 {
                    return None;
                }
            }
            Some((date, mm, category))
        })
        .collect();

    logging::info(
        Component::Backtest,
        Some(&ensemble.target_id),
        &format!(
            "replaying {} day(s) from {} to {} at {}-day lead",
            sampled.len(),
            start,
            end,
            options.lead_days
        ),
    );

    let scorer = ForecastScorer::from_config(config);
    let days: Vec<BacktestDay> = sampled
        .par_iter()
        .map(|&(date, observed_mm, category)| -> Result<BacktestDay, SnowlagError> {
            let issued = date - Duration::days(i64::from(options.lead_days));
            let replay = ReplayMode::new(issued).wrap(provider);
            let recent = gather_recent(&replay, ensemble, config, issued);
            let forecast = scorer.score(ensemble, &recent, options.lead_days)?;
            let day = forecast.last().ok_or_else(|| {
                SnowlagError::Configuration("forecast horizon produced no days".to_string())
            })?;
            Ok(BacktestDay {
                date,
                observed_mm,
                category,
                probability: day.probability,
                signal: day.signal,
            })
        })
        .collect::<Result<_, _>>()?;

    let report = summarize(&ensemble.target_id, start, end, options, days);
    logging::info(
        Component::Backtest,
        Some(&ensemble.target_id),
        &format!(
            "hit rate {}, false alarm rate {}, r = {}",
            percent(report.hit_rate()),
            percent(report.false_alarm_rate()),
            report
                .probability_correlation
                .map(|r| format!("{:.3}", r))
                .unwrap_or_else(|| "n/a".to_string())
        ),
    );
    Ok(report)
}

fn summarize(
    target_id: &str,
    start: NaiveDate,
    end: NaiveDate,
    options: &BacktestOptions,
    days: Vec<BacktestDay>,
) -> BacktestReport {
    let mut categories: BTreeMap<SnowfallCategory, CategoryScore> = BTreeMap::new();
    let mut quiet_days = 0;
    let mut false_alarms = 0;
    let mut insufficient_signal_days = 0;

    for d in &days {
        if d.signal == SignalStatus::InsufficientSignal {
            insufficient_signal_days += 1;
        }
        match d.category.hit_probability() {
            Some(required) => {
                let score = categories.entry(d.category).or_default();
                score.events += 1;
                if d.probability >= required {
                    score.hits += 1;
                }
            }
            None => {
                quiet_days += 1;
                if d.probability >= options.false_alarm_probability {
                    false_alarms += 1;
                }
            }
        }
    }

    let probabilities: Vec<f64> = days.iter().map(|d| d.probability).collect();
    let observed: Vec<f64> = days.iter().map(|d| d.observed_mm).collect();

    BacktestReport {
        target_id: target_id.to_string(),
        start,
        end,
        lead_days: options.lead_days,
        categories,
        quiet_days,
        false_alarms,
        insufficient_signal_days,
        probability_correlation: pearson(&probabilities, &observed),
        days,
    }
}

fn percent(rate: Option<f64>) -> String {
    rate.map(|r| format!("{:.1}%", r * 100.0)).unwrap_or_else(|| "n/a".to_string())
}

/// Boxed plain-text summary, one line per category.
impl fmt::Display for BacktestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "═".repeat(59);
        writeln!(f, "{}", rule)?;
        writeln!(
            f,
            "BACKTEST SUMMARY: {} ({} to {}, {}-day lead)",
            self.target_id, self.start, self.end, self.lead_days
        )?;
        writeln!(f, "{}", rule)?;
        for (category, score) in &self.categories {
            writeln!(
                f,
                "  {:<12} {:>4}/{:<4} hit  ({})",
                format!("{:?}", category),
                score.hits,
                score.events,
                percent(score.hit_rate())
            )?;
        }
        writeln!(f, "  Overall hit rate:   {}", percent(self.hit_rate()))?;
        writeln!(
            f,
            "  False alarms:       {}/{} quiet days ({})",
            self.false_alarms,
            self.quiet_days,
            percent(self.false_alarm_rate())
        )?;
        if self.insufficient_signal_days > 0 {
            writeln!(f, "  Insufficient signal on {} day(s)", self.insufficient_signal_days)?;
        }
        match self.probability_correlation {
            Some(r) => writeln!(f, "  Probability vs observed snowfall: r = {:.3}", r)?,
            None => writeln!(f, "  Probability vs observed snowfall: undefined")?,
        }
        write!(f, "{}", rule)
    }
}
