/// PostgreSQL series provider
///
/// Reads the curated `snowfall_daily` table populated by the collectors:
///
/// ```sql
/// CREATE TABLE snowfall_daily (
///     station_id        TEXT NOT NULL,
///     date              DATE NOT NULL,
///     snowfall_mm       DOUBLE PRECISION,
///     snow_depth_mm     DOUBLE PRECISION,
///     temp_mean_c       DOUBLE PRECISION,
///     precipitation_mm  DOUBLE PRECISION,
///     PRIMARY KEY (station_id, date)
/// );
/// ```
///
/// The blocking client needs `&mut`, so it sits behind a mutex; ranking
/// workers serialise on it while the correlation work stays parallel.

use super::SeriesProvider;
use crate::model::{DailyValue, ObservationSeries, Quantity, SnowlagError};
use chrono::NaiveDate;
use postgres::{Client, NoTls};
use std::sync::Mutex;

pub struct PostgresProvider {
    client: Mutex<Client>,
}

impl PostgresProvider {
    pub fn new(client: Client) -> Self {
        Self { client: Mutex::new(client) }
    }

    /// Connects using `DATABASE_URL` (read from `.env` if present).
    pub fn from_env() -> Result<Self, SnowlagError> {
        dotenv::dotenv().ok();
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| SnowlagError::Configuration("DATABASE_URL must be set".to_string()))?;
        let client = Client::connect(&url, NoTls).map_err(|e| SnowlagError::ProviderUnavailable {
            location_id: "*".to_string(),
            reason: format!("connection failed: {}", e),
        })?;
        Ok(Self::new(client))
    }

    /// Query for one quantity. The column name comes from a closed enum,
    /// never from caller input.
    fn query_for(quantity: Quantity) -> String {
        format!(
            "SELECT date, {} FROM snowfall_daily \
             WHERE station_id = $1 AND date >= $2 AND date <= $3 \
             ORDER BY date",
            quantity.column()
        )
    }
}

impl SeriesProvider for PostgresProvider {
    fn get_series(
        &self,
        location_id: &str,
        quantity: Quantity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ObservationSeries, SnowlagError> {
        let unavailable = |reason: String| SnowlagError::ProviderUnavailable {
            location_id: location_id.to_string(),
            reason,
        };

        let mut client = self
            .client
            .lock()
            .map_err(|_| unavailable("database client lock poisoned".to_string()))?;
        let rows = client
            .query(Self::query_for(quantity).as_str(), &[&location_id, &start, &end])
            .map_err(|e| unavailable(format!("query failed: {}", e)))?;

        if rows.is_empty() {
            return Err(unavailable(format!("no rows for {} in {}..={}", quantity, start, end)));
        }

        let points = rows
            .iter()
            .map(|row| DailyValue {
                date: row.get::<_, NaiveDate>(0),
                value: row.get::<_, Option<f64>>(1),
            })
            .collect();

        ObservationSeries::new(location_id, quantity, points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_uses_quantity_column() {
        let q = PostgresProvider::query_for(Quantity::SnowDepth);
        assert!(q.contains("snow_depth_mm"));
        assert!(q.contains("ORDER BY date"));
    }
}
