//! Snowfall event categories and predictor activity.
//!
//! Categories grade an observed target-day snowfall for backtesting; the
//! activity transform turns a predictor observation into a bounded signal.

use crate::config::{ActivityRule, EventThresholds};
use crate::model::PredictorState;
use serde::{Deserialize, Serialize};

/// Snowfall event categories, in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnowfallCategory {
    None,
    Trace,
    Significant,
    Major,
    Extreme,
}

impl SnowfallCategory {
    /// Minimum forecast probability (percent) that counts as having
    /// anticipated an event of this category. `None` has no requirement.
    pub fn hit_probability(&self) -> Option<f64> {
        match self {
            SnowfallCategory::None => None,
            SnowfallCategory::Trace => Some(10.0),
            SnowfallCategory::Significant => Some(30.0),
            SnowfallCategory::Major | SnowfallCategory::Extreme => Some(50.0),
        }
    }
}

/// Grades a day's snowfall. Boundaries are inclusive.
pub fn categorize_snowfall(snow_mm: f64, thresholds: &EventThresholds) -> SnowfallCategory {
    if snow_mm >= thresholds.extreme_mm {
        SnowfallCategory::Extreme
    } else if snow_mm >= thresholds.major_mm {
        SnowfallCategory::Major
    } else if snow_mm >= thresholds.significant_mm {
        SnowfallCategory::Significant
    } else if snow_mm >= thresholds.trace_mm {
        SnowfallCategory::Trace
    } else {
        SnowfallCategory::None
    }
}

/// Saturating activity in [0, 1) for an observed value.
///
/// Zero unless the value strictly exceeds the rule's threshold; then
/// `excess / (excess + half_saturation)`, so no single observation can
/// reach full activity.
pub fn activity_level(value: f64, rule: &ActivityRule) -> f64 {
    match rule.excess(value) {
        Some(excess) => excess / (excess + rule.half_saturation),
        None => 0.0,
    }
}

/// Activity and state for a possibly missing observation. A missing value
/// is `Inactive`, a present one that does not clear the rule is `Below`.
pub fn predictor_signal(value: Option<f64>, rule: &ActivityRule) -> (f64, PredictorState) {
    match value {
        None => (0.0, PredictorState::Inactive),
        Some(v) => {
            let activity = activity_level(v, rule);
            if activity > 0.0 {
                (activity, PredictorState::Active)
            } else {
                (0.0, PredictorState::Below)
            }
        }
    }
}
