/// Weighted predictor ensembles.
///
/// Submodules:
/// - `weights`: capped normalisation of ranked survivors and mechanism tagging.
/// - `climatology`: contribution → snowfall range table used for magnitudes.
/// - `store`: current ensemble per region, swapped atomically and persisted as JSON.

pub mod climatology;
pub mod store;
pub mod weights;

pub use climatology::ClimatologyBuilder;
pub use store::{EnsembleStore, load_ensemble, save_ensemble, write_json_atomic};
pub use weights::{EnsembleWeightBuilder, cap_shares};
