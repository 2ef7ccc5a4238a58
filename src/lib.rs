//! Snowfall teleconnection analysis and forecasting.
//!
//! Finds remote locations whose snow events statistically precede snowfall
//! at a target region, turns the significant ones into a capped, weighted
//! ensemble, and scores recent observations at those locations into a
//! lead-time-aware daily forecast with a mechanism label.
//!
//! Typical flow:
//! - `pipeline::rebuild_ensemble` (periodic): rank → weights → climatology → store
//! - `pipeline::run_forecast` / `run_forecasts` (daily): recent window → score → `ForecastRun`
//! - `verify::backtest`: replayed forecasts scored against recorded events

pub mod analysis;
pub mod config;
pub mod ensemble;
pub mod forecast;
pub mod freshness;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod replay;
pub mod stations;
pub mod thresholds;
pub mod verify;
