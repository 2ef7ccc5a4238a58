/// CSV directory provider
///
/// Reads daily series exported one file per location:
/// `<dir>/<location_id>.csv` with a header row naming the columns
/// (`date` plus any of `snowfall_mm`, `snow_depth_mm`, `temp_mean_c`,
/// `precipitation_mm`). Values of `null`, `NA` or empty are missing.

use super::SeriesProvider;
use crate::model::{DailyValue, ObservationSeries, Quantity, SnowlagError};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CsvDirectoryProvider {
    root: PathBuf,
}

impl CsvDirectoryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, location_id: &str) -> PathBuf {
        self.root.join(format!("{}.csv", location_id))
    }
}

impl SeriesProvider for CsvDirectoryProvider {
    fn get_series(
        &self,
        location_id: &str,
        quantity: Quantity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ObservationSeries, SnowlagError> {
        let path = self.path_for(location_id);
        let text = std::fs::read_to_string(&path).map_err(|e| SnowlagError::ProviderUnavailable {
            location_id: location_id.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        let series = parse_daily_csv(&text, location_id, quantity, &path)?;
        Ok(series.slice(start, end))
    }
}

/// Parses one location's CSV export into a series for `quantity`.
pub fn parse_daily_csv(
    csv: &str,
    location_id: &str,
    quantity: Quantity,
    source: &Path,
) -> Result<ObservationSeries, SnowlagError> {
    let unavailable = |reason: String| SnowlagError::ProviderUnavailable {
        location_id: location_id.to_string(),
        reason,
    };

    let mut lines = csv.lines().filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| unavailable(format!("{}: empty file", source.display())))?;
    // Spreadsheet exports often prefix the file with a UTF-8 byte order mark.
    let header = header.trim_start_matches('\u{feff}');
    let columns: Vec<&str> = header.split(',').map(|c| c.trim()).collect();
    let date_idx = columns
        .iter()
        .position(|c| *c == "date")
        .ok_or_else(|| unavailable(format!("{}: no date column", source.display())))?;
    let value_idx = columns
        .iter()
        .position(|c| *c == quantity.column())
        .ok_or_else(|| unavailable(format!("{}: {} column not found", source.display(), quantity)))?;

    // Helper to parse values that might be "null"
    let parse_field = |s: &str| -> Result<Option<f64>, String> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("null") || s.eq_ignore_ascii_case("na") {
            Ok(None)
        } else {
            s.parse::<f64>().map(Some).map_err(|e| format!("'{}': {}", s, e))
        }
    };

    let mut points = Vec::new();
    for (i, line) in lines.enumerate() {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() <= date_idx.max(value_idx) {
            continue; // Skip incomplete rows
        }
        let date = NaiveDate::parse_from_str(fields[date_idx].trim(), "%Y-%m-%d").map_err(|e| {
            unavailable(format!("{} row {}: parse error in date: {}", source.display(), i + 2, e))
        })?;
        let value = parse_field(fields[value_idx]).map_err(|e| {
            unavailable(format!("{} row {}: parse error in {}: {}", source.display(), i + 2, quantity, e))
        })?;
        points.push(DailyValue { date, value });
    }

    ObservationSeries::new(location_id, quantity, points)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
date,snowfall_mm,snow_depth_mm,temp_mean_c,precipitation_mm
2024-01-01,12.5,300,-8.1,1.2
2024-01-02,null,310,-9.0,
2024-01-03,0,305,NA,0.0
";

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_selects_requested_column() {
        let s = parse_daily_csv(SAMPLE, "phelps_wi", Quantity::Snowfall, Path::new("phelps_wi.csv")).unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(s.value_on(day("2024-01-01")), Some(12.5));
        assert_eq!(s.value_on(day("2024-01-02")), None, "null is missing");
        assert_eq!(s.value_on(day("2024-01-03")), Some(0.0), "zero stays zero");

        let t = parse_daily_csv(SAMPLE, "phelps_wi", Quantity::TemperatureMean, Path::new("x")).unwrap();
        assert_eq!(t.value_on(day("2024-01-03")), None);
    }

    #[test]
    fn test_header_with_byte_order_mark_is_read() {
        let csv = format!("\u{feff}{}", SAMPLE);
        let s = parse_daily_csv(&csv, "phelps_wi", Quantity::Snowfall, Path::new("phelps_wi.csv")).unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(s.value_on(day("2024-01-01")), Some(12.5));
    }

    #[test]
    fn test_missing_column_is_unavailable() {
        let csv = "date,snowfall_mm\n2024-01-01,1.0\n";
        let err = parse_daily_csv(csv, "x", Quantity::SnowDepth, Path::new("x.csv")).unwrap_err();
        assert!(matches!(err, SnowlagError::ProviderUnavailable { .. }));
    }

    #[test]
    fn test_bad_number_is_reported() {
        let csv = "date,snowfall_mm\n2024-01-01,deep\n";
        assert!(parse_daily_csv(csv, "x", Quantity::Snowfall, Path::new("x.csv")).is_err());
    }

    #[test]
    fn test_duplicate_dates_are_rejected() {
        let csv = "date,snowfall_mm\n2024-01-01,1.0\n2024-01-01,2.0\n";
        let err = parse_daily_csv(csv, "x", Quantity::Snowfall, Path::new("x.csv")).unwrap_err();
        assert!(matches!(err, SnowlagError::InvalidSeries(_)));
    }
}
