//! One forecast run per target region, as a single versioned record.
//!
//! A run carries the generation timestamp, the issue date, the exact
//! ensemble it was scored against and either the ordered forecast days or
//! an explicit "no forecast available" outcome.

use super::scorer::{ForecastScorer, RecentObservations};
use crate::ensemble::write_json_atomic;
use crate::logging::{self, Component};
use crate::model::{Ensemble, ForecastDay, SnowlagError};
use chrono::{DateTime, NaiveDate, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Bumped when the serialized layout of `ForecastRun` changes.
pub const FORECAST_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForecastOutcome {
    Forecast { days: Vec<ForecastDay> },
    NoForecastAvailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRun {
    pub format_version: u32,
    pub generated_at: DateTime<Utc>,
    /// "Today" for the run: the last day whose observations were used.
    pub issued_for: NaiveDate,
    pub target_id: String,
    pub ensemble: Ensemble,
    pub outcome: ForecastOutcome,
}

impl ForecastRun {
    /// Wraps a scoring result. An empty ensemble becomes an explicit
    /// "no forecast available" run; any other error is returned.
    pub fn from_scoring(
        ensemble: &Ensemble,
        issued_for: NaiveDate,
        generated_at: DateTime<Utc>,
        scored: Result<Vec<ForecastDay>, SnowlagError>,
    ) -> Result<Self, SnowlagError> {
        let outcome = match scored {
            Ok(days) => ForecastOutcome::Forecast { days },
            Err(e @ SnowlagError::EmptyEnsemble { .. }) => {
                logging::warn(Component::Forecast, Some(&ensemble.target_id), &e.to_string());
                ForecastOutcome::NoForecastAvailable { reason: e.to_string() }
            }
            Err(e) => return Err(e),
        };
        Ok(Self {
            format_version: FORECAST_FORMAT_VERSION,
            generated_at,
            issued_for,
            target_id: ensemble.target_id.clone(),
            ensemble: ensemble.clone(),
            outcome,
        })
    }

    /// Forecast days, empty when no forecast was available.
    pub fn days(&self) -> &[ForecastDay] {
        match &self.outcome {
            ForecastOutcome::Forecast { days } => days,
            ForecastOutcome::NoForecastAvailable { .. } => &[],
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.outcome, ForecastOutcome::Forecast { .. })
    }

    pub fn day(&self, date: NaiveDate) -> Option<&ForecastDay> {
        self.days().iter().find(|d| d.date == date)
    }

    pub fn to_json(&self) -> Result<String, SnowlagError> {
        serde_json::to_string_pretty(self).map_err(|e| SnowlagError::Persistence(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, SnowlagError> {
        let run: ForecastRun =
            serde_json::from_str(text).map_err(|e| SnowlagError::Persistence(e.to_string()))?;
        if run.format_version != FORECAST_FORMAT_VERSION {
            return Err(SnowlagError::Persistence(format!(
                "forecast format version {} is not supported (expected {})",
                run.format_version, FORECAST_FORMAT_VERSION
            )));
        }
        Ok(run)
    }

    /// Writes the run to `<dir>/<target>_<issued_for>_<generated_at>.json`.
    /// Runs are never overwritten in place; a later run gets its own file.
    pub fn save(&self, directory: &Path) -> Result<PathBuf, SnowlagError> {
        let name = format!(
            "{}_{}_{}.json",
            self.target_id,
            self.issued_for.format("%Y%m%d"),
            self.generated_at.format("%Y%m%dT%H%M%SZ")
        );
        let path = directory.join(name);
        write_json_atomic(self, &path)?;
        Ok(path)
    }
}

/// Inputs for one region in a multi-region run.
#[derive(Debug, Clone)]
pub struct RegionInput {
    pub ensemble: Arc<Ensemble>,
    pub recent: RecentObservations,
}

/// Scores every region in parallel. Regions share nothing, so one
/// region's failure leaves the others' runs intact; results keep input
/// order.
pub fn score_regions(
    scorer: &ForecastScorer,
    regions: &[RegionInput],
    horizon_days: u32,
    generated_at: DateTime<Utc>,
) -> Vec<Result<ForecastRun, SnowlagError>> {
    let runs: Vec<Result<ForecastRun, SnowlagError>> = regions
        .par_iter()
        .map(|region| {
            let scored = scorer.score(&region.ensemble, &region.recent, horizon_days);
            ForecastRun::from_scoring(&region.ensemble, region.recent.today(), generated_at, scored)
        })
        .collect();

    let failed = runs.iter().filter(|r| r.is_err()).count();
    logging::log_batch_summary(
        Component::Forecast,
        "multi-region scoring",
        runs.len(),
        runs.len() - failed,
        failed,
    );
    runs
}
