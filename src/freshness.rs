/// Observation freshness detection.
///
/// Predictor stations report once a day under normal conditions. When a
/// station stops reporting, its forecast contribution silently turns
/// "inactive"; this module flags the gap so the run log says why.
///
/// # Clock injection
/// All functions accept a `today: NaiveDate` parameter rather than calling
/// `Utc::now()` internally. This keeps freshness purely deterministic in
/// tests and in replayed runs.

use crate::model::ObservationSeries;
use chrono::NaiveDate;

// ---------------------------------------------------------------------------
// Staleness check
// ---------------------------------------------------------------------------

/// Age in days of the latest present value, `None` if the series has no
/// values at all.
pub fn observation_age_days(series: &ObservationSeries, today: NaiveDate) -> Option<i64> {
    series
        .latest_present_date()
        .map(|latest| (today - latest).num_days())
}

/// Returns `true` if the series' latest present value is older than
/// `max_age_days` relative to `today`.
///
/// Staleness is strictly greater than the threshold:
///   age > max_age_days  →  stale
///   age == max_age_days →  not stale
///
/// A series with no present values is stale.
pub fn is_stale_at(series: &ObservationSeries, max_age_days: i64, today: NaiveDate) -> bool {
    match observation_age_days(series, today) {
        Some(age) => age > max_age_days,
        None => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
