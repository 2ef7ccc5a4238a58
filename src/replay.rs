/// Replay utilities for working with historical data
///
/// Produces forecasts as if "today" were a past date: every series request
/// is clamped to the as-of date, so nothing observed afterwards can leak
/// into a retroactive forecast. Used by backtesting and for rerunning a
/// past day's forecast.

use crate::model::{ObservationSeries, Quantity, SnowlagError};
use crate::provider::SeriesProvider;
use chrono::{Duration, NaiveDate};

/// Configuration for an as-of replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayMode {
    /// Last day whose observations are visible
    pub as_of: NaiveDate,
}

impl ReplayMode {
    pub fn new(as_of: NaiveDate) -> Self {
        Self { as_of }
    }

    /// Replay `days_offset` days before `today`
    pub fn days_before(today: NaiveDate, days_offset: i64) -> Self {
        Self { as_of: today - Duration::days(days_offset) }
    }

    /// Wraps a provider so no request can see past `as_of`
    pub fn wrap<P: SeriesProvider>(&self, inner: P) -> ReplayProvider<P> {
        ReplayProvider { inner, as_of: self.as_of }
    }
}

/// Provider view that hides every observation after `as_of`.
pub struct ReplayProvider<P> {
    inner: P,
    as_of: NaiveDate,
}

impl<P: SeriesProvider> SeriesProvider for ReplayProvider<P> {
    fn get_series(
        &self,
        location_id: &str,
        quantity: Quantity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ObservationSeries, SnowlagError> {
        let end = end.min(self.as_of);
        if start > end {
            return ObservationSeries::new(location_id, quantity, Vec::new());
        }
        let series = self.inner.get_series(location_id, quantity, start, end)?;
        // Guard against providers that ignore the requested bounds.
        Ok(series.slice(start, end))
    }
}
