//! Mechanism labels for predictors and forecast days.
//!
//! Each ensemble member is tagged once, when the ensemble is built, from
//! its lag, its distance to the target and whether it sits on a lake
//! shore. A forecast day's label is then a pure function of which tags are
//! active that day.

use crate::config::ClassifierConfig;
use crate::model::{Mechanism, PredictorWeight};

#[derive(Debug, Clone, Default)]
pub struct EventClassifier {
    config: ClassifierConfig,
}

impl EventClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// True when |lag| is within the near-zero band.
    pub fn is_near_zero(&self, lag_days: i32) -> bool {
        lag_days.abs() <= self.config.near_zero_lag_days
    }

    /// Tag for one predictor. `distance_km` is `None` when the predictor's
    /// location is unknown, which is treated as far away.
    ///
    /// Lags of `remote_min_lag_days` or more are remote regardless of
    /// distance. Shorter lags are lake-enhanced or regional inside the
    /// regional radius, and remote outside it.
    pub fn tag(&self, lag_days: i32, distance_km: Option<f64>, lake_adjacent: bool) -> Mechanism {
        if lag_days >= self.config.remote_min_lag_days {
            return Mechanism::RemotePattern;
        }
        let regional = distance_km.is_some_and(|d| d <= self.config.regional_radius_km);
        match (regional, lake_adjacent) {
            (true, true) => Mechanism::LakeEnhanced,
            (true, false) => Mechanism::RegionalFastSystem,
            (false, _) => Mechanism::RemotePattern,
        }
    }

    /// Label for a set of active predictors.
    ///
    /// Nothing active is QUIET. Regional and lake-enhanced together, or
    /// either of them alongside a remote pattern, is MIXED. Otherwise the
    /// single active tag is the label.
    pub fn classify(&self, active: &[&PredictorWeight]) -> Mechanism {
        let has = |m: Mechanism| active.iter().any(|w| w.mechanism_tag == m);
        let regional = has(Mechanism::RegionalFastSystem);
        let lake = has(Mechanism::LakeEnhanced);
        let remote = has(Mechanism::RemotePattern);

        match (regional, lake, remote) {
            (false, false, false) => Mechanism::Quiet,
            (true, true, _) => Mechanism::Mixed,
            (true, false, true) | (false, true, true) => Mechanism::Mixed,
            (true, false, false) => Mechanism::RegionalFastSystem,
            (false, true, false) => Mechanism::LakeEnhanced,
            (false, false, true) => Mechanism::RemotePattern,
        }
    }
}
