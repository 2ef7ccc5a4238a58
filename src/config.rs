//! Configuration for the teleconnection analysis and forecast pipeline.
//!
//! Every tunable threshold lives here so it can be tested and changed
//! without touching control flow. Values come from a TOML file (path in
//! `SNOWLAG_CONFIG`, default `./snowlag.toml`); any field left out of the
//! file takes its default. `.env` is loaded first so the path and
//! `DATABASE_URL` can be set there.

use crate::model::{Quantity, SnowlagError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "./snowlag.toml";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Closed lag window searched, in days. Positive = predictor leads.
    pub lag_window: (i32, i32),
    pub min_overlap_days: usize,
    pub significance_alpha: f64,
    /// Minimum sample size for a result to count as significant.
    pub min_sample_size: usize,
    /// Best lags below this are diagnostic only and never enter an ensemble.
    pub diagnostic_lag_floor: i32,
    /// Width of the |r| buckets that rank as ties (`round(|r| / tie_epsilon)`).
    pub tie_epsilon: f64,
    /// First day of the history window used for ranking.
    pub history_start: chrono::NaiveDate,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            lag_window: (-10, 10),
            min_overlap_days: 30,
            significance_alpha: 0.05,
            min_sample_size: 30,
            diagnostic_lag_floor: 0,
            tie_epsilon: 1e-9,
            history_start: chrono::NaiveDate::from_ymd_opt(1940, 1, 1).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub max_predictors: usize,
    pub single_predictor_weight_ceiling: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            max_predictors: 20,
            single_predictor_weight_ceiling: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// |lag| at or below this counts as near-zero.
    pub near_zero_lag_days: i32,
    /// Lags at or above this are remote-pattern signals.
    pub remote_min_lag_days: i32,
    /// Predictors within this distance of the target are regional.
    pub regional_radius_km: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            near_zero_lag_days: 1,
            remote_min_lag_days: 3,
            regional_radius_km: 800.0,
        }
    }
}

/// How a predictor's observation turns into activity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivityRule {
    /// The value must strictly exceed this (or fall below it when inverted).
    pub threshold: f64,
    /// Excess at which the saturating transform reaches one half.
    pub half_saturation: f64,
    #[serde(default)]
    pub inverted: bool,
}

impl ActivityRule {
    /// Excess past the threshold, or `None` when the value is not active.
    pub fn excess(&self, value: f64) -> Option<f64> {
        let excess = if self.inverted {
            self.threshold - value
        } else {
            value - self.threshold
        };
        (excess > 0.0).then_some(excess)
    }
}

/// One step of the confidence ladder: both bounds must be met.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceStep {
    pub min_probability: f64,
    pub min_active: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub horizon_days: u32,
    pub activity: BTreeMap<Quantity, ActivityRule>,
    /// Any step satisfied gives HIGH.
    pub high_confidence: Vec<ConfidenceStep>,
    /// Any step satisfied gives MODERATE (when not HIGH).
    pub moderate_confidence: Vec<ConfidenceStep>,
    /// Width of a contribution bucket in the magnitude table.
    pub magnitude_bucket_width: f64,
    /// Percentiles (0..=100) bounding the magnitude range.
    pub magnitude_percentiles: (f64, f64),
    /// Observations older than this (days) mark a predictor stale.
    pub max_observation_age_days: i64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        let mut activity = BTreeMap::new();
        activity.insert(
            Quantity::Snowfall,
            ActivityRule { threshold: 5.0, half_saturation: 15.0, inverted: false },
        );
        activity.insert(
            Quantity::SnowDepth,
            ActivityRule { threshold: 50.0, half_saturation: 150.0, inverted: false },
        );
        activity.insert(
            Quantity::Precipitation,
            ActivityRule { threshold: 5.0, half_saturation: 15.0, inverted: false },
        );
        activity.insert(
            Quantity::TemperatureMean,
            ActivityRule { threshold: -5.0, half_saturation: 10.0, inverted: true },
        );
        Self {
            horizon_days: 7,
            activity,
            high_confidence: vec![
                ConfidenceStep { min_probability: 50.0, min_active: 3 },
                ConfidenceStep { min_probability: 70.0, min_active: 2 },
            ],
            moderate_confidence: vec![
                ConfidenceStep { min_probability: 30.0, min_active: 2 },
                ConfidenceStep { min_probability: 50.0, min_active: 1 },
            ],
            magnitude_bucket_width: 0.1,
            magnitude_percentiles: (25.0, 75.0),
            max_observation_age_days: 2,
        }
    }
}

/// Snowfall amounts (mm) that delimit event categories.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventThresholds {
    pub trace_mm: f64,
    pub significant_mm: f64,
    pub major_mm: f64,
    pub extreme_mm: f64,
}

impl Default for EventThresholds {
    fn default() -> Self {
        Self {
            trace_mm: 5.0,
            significant_mm: 20.0,
            major_mm: 50.0,
            extreme_mm: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// "debug", "info", "warn" or "error".
    pub level: String,
    pub file: Option<String>,
    pub console_timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            console_timestamps: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnowlagConfig {
    pub analysis: AnalysisConfig,
    pub ensemble: EnsembleConfig,
    pub classifier: ClassifierConfig,
    pub forecast: ForecastConfig,
    pub events: EventThresholds,
    pub logging: LoggingConfig,
}

impl SnowlagConfig {
    /// Parses TOML text and validates it.
    pub fn from_toml_str(text: &str) -> Result<Self, SnowlagError> {
        let config: SnowlagConfig = toml::from_str(text)
            .map_err(|e| SnowlagError::Configuration(format!("TOML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnowlagError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SnowlagError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Loads `.env`, then the file named by `SNOWLAG_CONFIG` (or the default
    /// path). A missing file yields the validated defaults.
    pub fn from_env() -> Result<Self, SnowlagError> {
        dotenv::dotenv().ok();
        let path = std::env::var("SNOWLAG_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        if Path::new(&path).exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Rejects settings that would make a later stage impossible.
    pub fn validate(&self) -> Result<(), SnowlagError> {
        let bad = |msg: String| Err(SnowlagError::Configuration(msg));

        let (lo, hi) = self.analysis.lag_window;
        if lo > hi {
            return bad(format!("lag_window ({}, {}) is inverted", lo, hi));
        }
        if self.analysis.min_overlap_days < 3 {
            return bad(format!(
                "min_overlap_days must be at least 3, got {}",
                self.analysis.min_overlap_days
            ));
        }
        let alpha = self.analysis.significance_alpha;
        if !(alpha > 0.0 && alpha < 1.0) {
            return bad(format!("significance_alpha must be in (0, 1), got {}", alpha));
        }
        if self.analysis.tie_epsilon < 0.0 {
            return bad("tie_epsilon must not be negative".to_string());
        }

        if self.ensemble.max_predictors == 0 {
            return bad("max_predictors must be at least 1".to_string());
        }
        let ceiling = self.ensemble.single_predictor_weight_ceiling;
        if !(ceiling > 0.0 && ceiling <= 1.0) {
            return bad(format!(
                "single_predictor_weight_ceiling must be in (0, 1], got {}",
                ceiling
            ));
        }
        if (self.ensemble.max_predictors as f64) * ceiling < 1.0 - 1e-12 {
            return bad(format!(
                "ceiling {} with at most {} predictors cannot sum to 1",
                ceiling, self.ensemble.max_predictors
            ));
        }

        if self.classifier.near_zero_lag_days < 0
            || self.classifier.remote_min_lag_days <= self.classifier.near_zero_lag_days
        {
            return bad(format!(
                "classifier lags must satisfy 0 <= near_zero ({}) < remote_min ({})",
                self.classifier.near_zero_lag_days, self.classifier.remote_min_lag_days
            ));
        }
        if self.classifier.regional_radius_km <= 0.0 {
            return bad("regional_radius_km must be positive".to_string());
        }

        if self.forecast.horizon_days == 0 {
            return bad("horizon_days must be at least 1".to_string());
        }
        for (quantity, rule) in &self.forecast.activity {
            if rule.half_saturation <= 0.0 {
                return bad(format!("activity.{}: half_saturation must be positive", quantity));
            }
        }
        let width = self.forecast.magnitude_bucket_width;
        if !(width > 0.0 && width <= 1.0) {
            return bad(format!("magnitude_bucket_width must be in (0, 1], got {}", width));
        }
        let (p_lo, p_hi) = self.forecast.magnitude_percentiles;
        if !(0.0..=100.0).contains(&p_lo) || !(0.0..=100.0).contains(&p_hi) || p_lo > p_hi {
            return bad(format!("magnitude_percentiles ({}, {}) are invalid", p_lo, p_hi));
        }

        let e = &self.events;
        if !(e.trace_mm < e.significant_mm && e.significant_mm < e.major_mm && e.major_mm < e.extreme_mm) {
            return bad("event thresholds must be strictly ascending".to_string());
        }
        Ok(())
    }

    /// Activity rule for `quantity`, or a configuration error if none is set.
    pub fn activity_rule(&self, quantity: Quantity) -> Result<ActivityRule, SnowlagError> {
        self.forecast.activity.get(&quantity).copied().ok_or_else(|| {
            SnowlagError::Configuration(format!("no activity threshold configured for {}", quantity))
        })
    }
}
