/// Core data types for the snowfall teleconnection service.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no I/O, only types and the small amount of logic needed to
/// keep a series well-formed (ordered, de-duplicated, missing values flagged).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Quantities
// ---------------------------------------------------------------------------

/// Daily observed quantity at a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    /// Daily new snowfall, millimetres.
    Snowfall,
    /// Snow on the ground, millimetres.
    SnowDepth,
    /// Daily mean air temperature, degrees Celsius.
    TemperatureMean,
    /// Daily liquid-equivalent precipitation, millimetres.
    Precipitation,
}

impl Quantity {
    /// Column name used by the CSV and PostgreSQL providers.
    pub fn column(&self) -> &'static str {
        match self {
            Quantity::Snowfall => "snowfall_mm",
            Quantity::SnowDepth => "snow_depth_mm",
            Quantity::TemperatureMean => "temp_mean_c",
            Quantity::Precipitation => "precipitation_mm",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// An observing location. Registered once, referenced by `id` everywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Coarse region tag, e.g. "northern_wisconsin", "japan".
    pub region: String,
    pub elevation_m: f64,
    /// Sits on a Great Lakes shore (lake-effect snow belt).
    #[serde(default)]
    pub lake_adjacent: bool,
}

// ---------------------------------------------------------------------------
// Observation series
// ---------------------------------------------------------------------------

/// One day of a series. `value` is `None` when the provider had no
/// observation; missing values are never coerced to zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyValue {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

/// Ordered daily values for one location and quantity.
///
/// Dates are strictly increasing. Non-finite values are stored as missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSeries {
    location_id: String,
    quantity: Quantity,
    points: Vec<DailyValue>,
}

impl ObservationSeries {
    /// Builds a series, rejecting duplicate or out-of-order dates.
    pub fn new(
        location_id: impl Into<String>,
        quantity: Quantity,
        points: Vec<DailyValue>,
    ) -> Result<Self, SnowlagError> {
        let location_id = location_id.into();
        for pair in points.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(SnowlagError::InvalidSeries(format!(
                    "{} {}: date {} does not follow {}",
                    location_id, quantity, pair[1].date, pair[0].date
                )));
            }
        }
        let points = points
            .into_iter()
            .map(|p| DailyValue {
                date: p.date,
                value: p.value.filter(|v| v.is_finite()),
            })
            .collect();
        Ok(Self { location_id, quantity, points })
    }

    /// Convenience constructor for consecutive days starting at `start`.
    pub fn from_daily(
        location_id: impl Into<String>,
        quantity: Quantity,
        start: NaiveDate,
        values: &[Option<f64>],
    ) -> Self {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, v)| DailyValue {
                date: start + chrono::Duration::days(i as i64),
                value: v.filter(|x| x.is_finite()),
            })
            .collect();
        Self { location_id: location_id.into(), quantity, points }
    }

    pub fn location_id(&self) -> &str {
        &self.location_id
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn points(&self) -> &[DailyValue] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Value on `date`, `None` if the day is absent or flagged missing.
    pub fn value_on(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .and_then(|i| self.points[i].value)
    }

    /// Iterator over days that carry a value.
    pub fn present(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.points.iter().filter_map(|p| p.value.map(|v| (p.date, v)))
    }

    pub fn present_count(&self) -> usize {
        self.points.iter().filter(|p| p.value.is_some()).count()
    }

    pub fn latest_present_date(&self) -> Option<NaiveDate> {
        self.points.iter().rev().find(|p| p.value.is_some()).map(|p| p.date)
    }

    /// Copy restricted to `start..=end`.
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> Self {
        let points = self
            .points
            .iter()
            .filter(|p| p.date >= start && p.date <= end)
            .copied()
            .collect();
        Self {
            location_id: self.location_id.clone(),
            quantity: self.quantity,
            points,
        }
    }

    /// Stable fingerprint of the data range and contents (FNV-1a), used to
    /// tag ensembles with the exact inputs they were derived from.
    pub fn fingerprint(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        let mut hash = OFFSET;
        let mut feed = |bytes: &[u8]| {
            for b in bytes {
                hash ^= u64::from(*b);
                hash = hash.wrapping_mul(PRIME);
            }
        };
        feed(self.location_id.as_bytes());
        feed(self.quantity.column().as_bytes());
        for p in &self.points {
            feed(p.date.to_string().as_bytes());
            match p.value {
                Some(v) => feed(&v.to_bits().to_le_bytes()),
                None => feed(b"-"),
            }
        }
        hash
    }
}

// ---------------------------------------------------------------------------
// Lag correlation results
// ---------------------------------------------------------------------------

/// Outcome of analysing one (predictor, target) pair. Recomputed fresh on
/// every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagResult {
    pub predictor_id: String,
    pub target_id: String,
    /// Positive: predictor leads the target by this many days.
    pub lag_days: i32,
    pub correlation: f64,
    pub p_value: f64,
    pub sample_size: usize,
    pub significant: bool,
}

// ---------------------------------------------------------------------------
// Ensemble types
// ---------------------------------------------------------------------------

/// Coarse physical explanation for a predictor or a forecast day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mechanism {
    RegionalFastSystem,
    LakeEnhanced,
    RemotePattern,
    Mixed,
    Quiet,
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Mechanism::RegionalFastSystem => "REGIONAL_FAST_SYSTEM",
            Mechanism::LakeEnhanced => "LAKE_ENHANCED",
            Mechanism::RemotePattern => "REMOTE_PATTERN",
            Mechanism::Mixed => "MIXED",
            Mechanism::Quiet => "QUIET",
        };
        f.write_str(label)
    }
}

/// One member of an ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorWeight {
    pub predictor_id: String,
    pub quantity: Quantity,
    pub lag_days: i32,
    /// Signed coefficient the weight was derived from.
    pub correlation: f64,
    pub normalized_weight: f64,
    pub mechanism_tag: Mechanism,
}

impl PredictorWeight {
    /// +1.0 when predictor activity raises the target's odds, -1.0 otherwise.
    pub fn direction(&self) -> f64 {
        if self.correlation < 0.0 { -1.0 } else { 1.0 }
    }
}

/// Lower/upper snowfall expectation for a forecast day, millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MagnitudeRange {
    pub low_mm: f64,
    pub high_mm: f64,
}

/// Historical target snowfall grouped by total ensemble contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagnitudeBucket {
    /// Lower edge of the contribution bucket, in [0, 1].
    pub contribution_floor: f64,
    pub sample_days: usize,
    pub range: MagnitudeRange,
}

/// Nearest-bucket lookup table from total contribution to snowfall range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MagnitudeClimatology {
    pub bucket_width: f64,
    pub buckets: Vec<MagnitudeBucket>,
}

/// The weighted predictor set for one target region. Replaced as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ensemble {
    pub target_id: String,
    pub built_at: DateTime<Utc>,
    /// Lag window searched when the ensemble was ranked.
    pub lag_window: (i32, i32),
    pub weight_ceiling: f64,
    pub weights: Vec<PredictorWeight>,
    pub climatology: MagnitudeClimatology,
    /// Fingerprint of every input series the ensemble was derived from.
    pub source_fingerprint: u64,
}

impl Ensemble {
    /// An ensemble with no survivors. Scoring it yields "no forecast".
    pub fn empty(target_id: impl Into<String>, built_at: DateTime<Utc>) -> Self {
        Self {
            target_id: target_id.into(),
            built_at,
            lag_window: (0, 0),
            weight_ceiling: 0.0,
            weights: Vec::new(),
            climatology: MagnitudeClimatology::default(),
            source_fingerprint: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weight_sum(&self) -> f64 {
        self.weights.iter().map(|w| w.normalized_weight).sum()
    }
}

// ---------------------------------------------------------------------------
// Forecast types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceTier {
    Low,
    Moderate,
    High,
}

/// Whether a forecast day had any predictor data behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    /// At least one predictor reported a value for this day's offset.
    Sufficient,
    /// Every predictor was missing data; the probability carries no information.
    InsufficientSignal,
}

/// How a single predictor fared on a forecast day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorState {
    /// Observation exceeded the activity threshold.
    Active,
    /// Observation present but below the activity threshold.
    Below,
    /// No observation at the required offset (not yet observed or missing).
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorContribution {
    pub predictor_id: String,
    pub lag_days: i32,
    pub observed_on: NaiveDate,
    pub observed_value: Option<f64>,
    pub contribution: f64,
    pub state: PredictorState,
    pub mechanism_tag: Mechanism,
}

/// One forecast day. Immutable; superseded by later runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: NaiveDate,
    /// Days ahead of the issue date, starting at 1.
    pub lead_days: u32,
    /// Percent, 0..=100.
    pub probability: f64,
    pub magnitude_range: MagnitudeRange,
    pub confidence_tier: ConfidenceTier,
    pub mechanism_label: Mechanism,
    pub signal: SignalStatus,
    pub contributing_predictors: Vec<PredictorContribution>,
}

impl ForecastDay {
    pub fn active_count(&self) -> usize {
        self.contributing_predictors
            .iter()
            .filter(|c| c.state == PredictorState::Active)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by the analysis, ensemble and forecast pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnowlagError {
    /// Not enough paired observations (at every lag, or for a significance test).
    #[error("insufficient data for {context}: {available} paired observations, {required} required")]
    DataInsufficient {
        context: String,
        available: usize,
        required: usize,
    },
    /// Every eligible lag had zero variance on one side.
    #[error("degenerate series for {context}: zero variance at every eligible lag")]
    DegenerateSeries { context: String },
    /// One location's source failed.
    #[error("provider unavailable for {location_id}: {reason}")]
    ProviderUnavailable { location_id: String, reason: String },
    /// Nothing survived significance filtering for the target.
    #[error("no forecast available for {target_id}: ensemble is empty")]
    EmptyEnsemble { target_id: String },
    /// No candidates to analyse against the target.
    #[error("no candidate predictors for {target_id}")]
    NoCandidates { target_id: String },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid series: {0}")]
    InvalidSeries(String),
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl SnowlagError {
    /// Failures that only affect one predictor and must not abort a batch.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            SnowlagError::DataInsufficient { .. }
                | SnowlagError::DegenerateSeries { .. }
                | SnowlagError::ProviderUnavailable { .. }
                | SnowlagError::InvalidSeries(_)
        )
    }
}
