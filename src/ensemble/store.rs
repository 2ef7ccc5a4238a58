//! Current ensemble per target region.
//!
//! Ensembles are immutable once built. The store hands out `Arc`s and
//! replaces a region's ensemble by swapping the pointer under a write
//! lock, so a forecast that already holds an `Arc` keeps scoring against
//! the complete ensemble it started with.
//!
//! With a directory attached, every replacement is first written to
//! `<dir>/<target_id>.json` through a temporary file and a rename.

use crate::logging::{self, Component};
use crate::model::{Ensemble, SnowlagError};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
pub struct EnsembleStore {
    current: RwLock<HashMap<String, Arc<Ensemble>>>,
    directory: Option<PathBuf>,
}

impl EnsembleStore {
    /// In-memory only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Persists every replacement under `directory` (created if missing).
    pub fn with_directory(directory: impl Into<PathBuf>) -> Result<Self, SnowlagError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| {
            SnowlagError::Persistence(format!("cannot create {}: {}", directory.display(), e))
        })?;
        Ok(Self { current: RwLock::default(), directory: Some(directory) })
    }

    /// Opens a directory store and loads every `*.json` ensemble in it.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, SnowlagError> {
        let store = Self::with_directory(directory)?;
        let Some(dir) = store.directory.as_deref() else {
            return Ok(store);
        };
        let entries = fs::read_dir(dir)
            .map_err(|e| SnowlagError::Persistence(format!("cannot list {}: {}", dir.display(), e)))?;

        let mut loaded = HashMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_ensemble(&path) {
                Ok(ensemble) => {
                    loaded.insert(ensemble.target_id.clone(), Arc::new(ensemble));
                }
                Err(e) => logging::warn(Component::Ensemble, None, &format!("skipping {}: {}", path.display(), e)),
            }
        }
        logging::info(
            Component::Ensemble,
            None,
            &format!("loaded {} ensemble(s) from {}", loaded.len(), dir.display()),
        );
        *store.write_guard() = loaded;
        Ok(store)
    }

    pub fn get(&self, target_id: &str) -> Option<Arc<Ensemble>> {
        self.read_guard().get(target_id).cloned()
    }

    /// Target ids with a current ensemble, sorted.
    pub fn targets(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read_guard().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Installs `ensemble` as the region's current one, returning the
    /// previous. When persistence fails nothing is swapped.
    pub fn replace(&self, ensemble: Ensemble) -> Result<Option<Arc<Ensemble>>, SnowlagError> {
        if let Some(dir) = &self.directory {
            save_ensemble(&ensemble, &ensemble_path(dir, &ensemble.target_id))?;
        }
        let id = ensemble.target_id.clone();
        let previous = self.write_guard().insert(id.clone(), Arc::new(ensemble));
        logging::debug(Component::Ensemble, Some(&id), "current ensemble replaced");
        Ok(previous)
    }

    fn read_guard(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Ensemble>>> {
        self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_guard(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Ensemble>>> {
        self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn ensemble_path(directory: &Path, target_id: &str) -> PathBuf {
    directory.join(format!("{}.json", target_id))
}

pub fn save_ensemble(ensemble: &Ensemble, path: &Path) -> Result<(), SnowlagError> {
    write_json_atomic(ensemble, path)
}

/// Writes pretty JSON to a sibling temp file, syncs it, then renames over
/// `path`. Readers see the old file or the new one, never a partial one.
pub fn write_json_atomic<T: Serialize>(value: &T, path: &Path) -> Result<(), SnowlagError> {
    let persist = |e: &dyn std::fmt::Display| SnowlagError::Persistence(format!("{}: {}", path.display(), e));

    let json = serde_json::to_string_pretty(value).map_err(|e| persist(&e))?;
    let tmp = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp).map_err(|e| persist(&e))?;
    file.write_all(json.as_bytes()).map_err(|e| persist(&e))?;
    file.sync_all().map_err(|e| persist(&e))?;
    drop(file);
    fs::rename(&tmp, path).map_err(|e| persist(&e))?;
    Ok(())
}

pub fn load_ensemble(path: &Path) -> Result<Ensemble, SnowlagError> {
    let text = fs::read_to_string(path)
        .map_err(|e| SnowlagError::Persistence(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&text).map_err(|e| SnowlagError::Persistence(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mechanism, PredictorWeight, Quantity};
    use chrono::{TimeZone, Utc};

    fn ensemble(target: &str, weights: &[(&str, f64)]) -> Ensemble {
        let built_at = Utc.with_ymd_and_hms(2025, 11, 1, 6, 0, 0).unwrap();
        let mut e = Ensemble::empty(target, built_at);
        e.weight_ceiling = 0.5;
        e.weights = weights
            .iter()
            .map(|(id, w)| PredictorWeight {
                predictor_id: id.to_string(),
                quantity: Quantity::Snowfall,
                lag_days: 2,
                correlation: 0.3,
                normalized_weight: *w,
                mechanism_tag: Mechanism::RegionalFastSystem,
            })
            .collect();
        e
    }

    #[test]
    fn test_replace_swaps_whole_ensemble() {
        let store = EnsembleStore::new();
        assert!(store.get("phelps_wi").is_none());

        store.replace(ensemble("phelps_wi", &[("a", 0.5), ("b", 0.5)])).unwrap();
        let held = store.get("phelps_wi").unwrap();

        let previous = store
            .replace(ensemble("phelps_wi", &[("c", 0.4), ("d", 0.3), ("e", 0.3)]))
            .unwrap()
            .unwrap();
        assert_eq!(previous.weights.len(), 2);
        assert_eq!(held.weights.len(), 2, "a held Arc never changes underneath its owner");
        assert_eq!(store.get("phelps_wi").unwrap().weights.len(), 3);
    }

    #[test]
    fn test_persisted_store_reopens() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = EnsembleStore::with_directory(dir.path()).unwrap();
            store.replace(ensemble("phelps_wi", &[("a", 0.5), ("b", 0.5)])).unwrap();
            store.replace(ensemble("eagle_river_wi", &[("a", 1.0)])).unwrap();
        }
        let reopened = EnsembleStore::open(dir.path()).unwrap();
        assert_eq!(reopened.targets(), vec!["eagle_river_wi".to_string(), "phelps_wi".to_string()]);
        assert_eq!(*reopened.get("phelps_wi").unwrap(), ensemble("phelps_wi", &[("a", 0.5), ("b", 0.5)]));
        assert!(!dir.path().join("phelps_wi.json.tmp").exists());
    }

    #[test]
    fn test_reopened_weights_are_bit_identical() {
        // Capped shares of uneven |r| values land on long, non-dyadic decimals.
        let raw: Vec<f64> = (1..=40).map(|i| 0.05 + (i as f64 * 0.618_033_988_749_895) % 0.6).collect();
        let shares = crate::ensemble::cap_shares(&raw, 0.2).unwrap();
        let ids: Vec<String> = (0..raw.len()).map(|i| format!("station_{:02}", i)).collect();
        let members: Vec<(&str, f64)> = ids.iter().map(|id| id.as_str()).zip(shares).collect();
        let mut built = ensemble("phelps_wi", &members);
        for (w, r) in built.weights.iter_mut().zip(&raw) {
            w.correlation = *r / 1.7;
        }
        built.weight_ceiling = 0.2;

        let dir = tempfile::tempdir().unwrap();
        EnsembleStore::with_directory(dir.path()).unwrap().replace(built.clone()).unwrap();
        let reloaded = EnsembleStore::open(dir.path()).unwrap().get("phelps_wi").unwrap();

        for (a, b) in built.weights.iter().zip(&reloaded.weights) {
            assert_eq!(a.normalized_weight.to_bits(), b.normalized_weight.to_bits(), "{}", a.predictor_id);
            assert_eq!(a.correlation.to_bits(), b.correlation.to_bits(), "{}", a.predictor_id);
        }
        assert_eq!(*reloaded, built);
    }

    #[test]
    fn test_corrupt_file_is_skipped_on_open() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        let store = EnsembleStore::open(dir.path()).unwrap();
        assert!(store.targets().is_empty());
    }

    #[test]
    fn test_load_missing_file_is_persistence_error() {
        let err = load_ensemble(Path::new("/nonexistent/ensemble.json")).unwrap_err();
        assert!(matches!(err, SnowlagError::Persistence(_)));
    }
}
