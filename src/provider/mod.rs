//! Series providers.
//!
//! The analysis core never talks to a store directly. It asks a
//! `SeriesProvider` for a date-bounded series once and works on the
//! returned value. Providers may be slow or fail per location; callers
//! isolate those failures.
//!
//! Submodules:
//! - `csv`: one CSV file per location in a directory.
//! - `postgres`: the `snowfall_daily` table in PostgreSQL.

pub mod csv;
pub mod postgres;

use crate::model::{ObservationSeries, Quantity, SnowlagError};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Source of daily observation series.
///
/// Implementations return points ordered by date, without duplicates,
/// bounded to `start..=end`. Days without an observation may be omitted
/// or flagged missing.
pub trait SeriesProvider: Sync {
    fn get_series(
        &self,
        location_id: &str,
        quantity: Quantity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ObservationSeries, SnowlagError>;
}

impl<P: SeriesProvider + ?Sized> SeriesProvider for &P {
    fn get_series(
        &self,
        location_id: &str,
        quantity: Quantity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ObservationSeries, SnowlagError> {
        (**self).get_series(location_id, quantity, start, end)
    }
}

/// Series held in memory, keyed by location and quantity.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    series: HashMap<(String, Quantity), ObservationSeries>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a series.
    pub fn insert(&mut self, series: ObservationSeries) {
        let key = (series.location_id().to_string(), series.quantity());
        self.series.insert(key, series);
    }

    pub fn with(mut self, series: ObservationSeries) -> Self {
        self.insert(series);
        self
    }
}

impl SeriesProvider for InMemoryProvider {
    fn get_series(
        &self,
        location_id: &str,
        quantity: Quantity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ObservationSeries, SnowlagError> {
        self.series
            .get(&(location_id.to_string(), quantity))
            .map(|s| s.slice(start, end))
            .ok_or_else(|| SnowlagError::ProviderUnavailable {
                location_id: location_id.to_string(),
                reason: format!("{} series not found", quantity),
            })
    }
}
