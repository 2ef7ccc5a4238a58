/// Daily forecasting from a built ensemble.
///
/// Submodules:
/// - `classifier`: mechanism tags for predictors and labels for forecast days.
/// - `scorer`: lag-shifted, weighted scoring of recent observations.
/// - `run`: versioned forecast run records and multi-region scoring.

pub mod classifier;
pub mod run;
pub mod scorer;

pub use classifier::EventClassifier;
pub use run::{ForecastOutcome, ForecastRun, RegionInput, score_regions};
pub use scorer::{ForecastScorer, RecentObservations};
