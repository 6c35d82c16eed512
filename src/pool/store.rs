//! Filter result store
//!
//! Maps a workload key to the ordered list of proxy indices that passed
//! its verification sweep, plus a rotation cursor scoped to that subset
//! and the time the sweep completed. Each key persists to its own JSON
//! file so results survive process restarts.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PoolError, Result};

const FILE_PREFIX: &str = "filter_";
const FILE_EXT: &str = ".json";

/// Verified outcome for one workload key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResult {
    /// Unix time the sweep that produced this result completed
    pub update_time: i64,
    /// Registry indices that passed, in sweep completion order
    pub passing: Vec<usize>,
    /// Rotation cursor into `passing`
    pub cursor: usize,
}

impl FilterResult {
    fn empty() -> Self {
        Self {
            update_time: 0,
            passing: Vec::new(),
            cursor: 0,
        }
    }
}

pub struct FilterResultStore {
    dir: PathBuf,
    inner: Mutex<HashMap<String, FilterResult>>,
}

impl FilterResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Reload every persisted result from the cache directory
    ///
    /// An absent directory means no key has ever been verified. A present
    /// but unreadable or malformed file is fatal: the store cannot guess
    /// at a workload's health.
    pub fn load_all(&self) -> Result<usize> {
        if !self.dir.is_dir() {
            debug!("Filter cache directory {:?} absent, nothing to load", self.dir);
            return Ok(0);
        }

        let mut loaded = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let key = match key_from_path(&path) {
                Some(key) => key,
                None => continue,
            };

            let raw = fs::read_to_string(&path)?;
            let result: FilterResult =
                serde_json::from_str(&raw).map_err(|source| PoolError::CorruptCache {
                    path: path.display().to_string(),
                    source,
                })?;

            debug!(
                "Loaded filter result '{}': {} passing, verified at {}",
                key,
                result.passing.len(),
                result.update_time
            );
            self.inner.lock().insert(key, result);
            loaded += 1;
        }

        info!("Loaded {} persisted filter result(s) from {:?}", loaded, self.dir);
        Ok(loaded)
    }

    /// Passing indices for a key, if it has an entry
    pub fn get(&self, key: &str) -> Option<Vec<usize>> {
        self.inner.lock().get(key).map(|r| r.passing.clone())
    }

    /// Whether a key has a result fresh enough (and useful enough) to
    /// skip re-verification
    pub fn is_fresh(&self, key: &str, ttl_secs: i64, now: i64) -> bool {
        let inner = self.inner.lock();
        match inner.get(key) {
            Some(result) => !result.passing.is_empty() && now - result.update_time < ttl_secs,
            None => false,
        }
    }

    /// Round-robin the next passing index for a key
    pub fn rotate_next(&self, key: &str) -> Result<usize> {
        let mut inner = self.inner.lock();
        let result = inner.get_mut(key).ok_or_else(|| PoolError::KeyNotFound {
            key: key.to_string(),
        })?;
        if result.passing.is_empty() {
            return Err(PoolError::EmptyFilterResult {
                key: key.to_string(),
            });
        }

        if result.cursor >= result.passing.len() {
            result.cursor = 0;
        }
        let index = result.passing[result.cursor];
        result.cursor += 1;
        if result.cursor >= result.passing.len() {
            result.cursor = 0;
        }
        Ok(index)
    }

    /// Replace the key's entry with a fresh, empty one for a new sweep
    pub fn begin_sweep(&self, key: &str) {
        self.inner.lock().insert(key.to_string(), FilterResult::empty());
    }

    /// Append one passing node; the lock is held only for the append
    pub fn record_pass(&self, key: &str, index: usize) {
        let mut inner = self.inner.lock();
        if let Some(result) = inner.get_mut(key) {
            result.passing.push(index);
        }
    }

    /// Stamp the sweep complete, reset the cursor, persist
    pub fn commit(&self, key: &str) -> Result<usize> {
        let snapshot = {
            let mut inner = self.inner.lock();
            let result = inner.get_mut(key).ok_or_else(|| PoolError::KeyNotFound {
                key: key.to_string(),
            })?;
            result.update_time = Utc::now().timestamp();
            result.cursor = 0;
            result.clone()
        };
        let count = snapshot.passing.len();
        self.save_result(key, &snapshot)?;
        Ok(count)
    }

    /// Persist the key's current entry to its cache file
    pub fn save(&self, key: &str) -> Result<()> {
        let snapshot = {
            let inner = self.inner.lock();
            inner
                .get(key)
                .cloned()
                .ok_or_else(|| PoolError::KeyNotFound {
                    key: key.to_string(),
                })?
        };
        self.save_result(key, &snapshot)
    }

    fn save_result(&self, key: &str, result: &FilterResult) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        fs::write(&path, serde_json::to_string_pretty(result)?)?;
        debug!("Persisted filter result '{}' to {:?}", key, path);
        Ok(())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}{}", FILE_PREFIX, key, FILE_EXT))
    }
}

fn key_from_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_EXT)?;
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populated_store(dir: &Path) -> FilterResultStore {
        let store = FilterResultStore::new(dir);
        store.begin_sweep("imdb");
        store.record_pass("imdb", 0);
        store.record_pass("imdb", 2);
        store.record_pass("imdb", 5);
        store
    }

    #[test]
    fn test_missing_directory_is_empty_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let store = FilterResultStore::new(tmp.path().join("never_created"));
        assert_eq!(store.load_all().unwrap(), 0);
        assert!(store.get("imdb").is_none());
    }

    #[test]
    fn test_round_trip_preserves_list_and_timestamp() {
        let tmp = TempDir::new().unwrap();
        let store = populated_store(tmp.path());
        store.commit("imdb").unwrap();
        let verified_at = {
            // Advance the cursor so reload proves it also round-trips.
            store.rotate_next("imdb").unwrap();
            store.save("imdb").unwrap();
            Utc::now().timestamp()
        };

        let reloaded = FilterResultStore::new(tmp.path());
        assert_eq!(reloaded.load_all().unwrap(), 1);
        assert_eq!(reloaded.get("imdb").unwrap(), vec![0, 2, 5]);

        let inner = reloaded.inner.lock();
        let result = inner.get("imdb").unwrap();
        assert!(verified_at - result.update_time <= 1);
        assert_eq!(result.cursor, 1);
    }

    #[test]
    fn test_malformed_file_is_fatal() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("filter_broken.json"), "{ not json").unwrap();

        let store = FilterResultStore::new(tmp.path());
        let err = store.load_all().unwrap_err();
        assert!(matches!(err, PoolError::CorruptCache { .. }));
    }

    #[test]
    fn test_unrelated_files_are_ignored() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("notes.txt"), "not a cache file").unwrap();
        fs::write(tmp.path().join("filter_.json"), "{}").unwrap();

        let store = FilterResultStore::new(tmp.path());
        assert_eq!(store.load_all().unwrap(), 0);
    }

    #[test]
    fn test_rotate_next_wraps_within_subset() {
        let tmp = TempDir::new().unwrap();
        let store = populated_store(tmp.path());

        assert_eq!(store.rotate_next("imdb").unwrap(), 0);
        assert_eq!(store.rotate_next("imdb").unwrap(), 2);
        assert_eq!(store.rotate_next("imdb").unwrap(), 5);
        assert_eq!(store.rotate_next("imdb").unwrap(), 0);
    }

    #[test]
    fn test_rotate_next_errors() {
        let tmp = TempDir::new().unwrap();
        let store = FilterResultStore::new(tmp.path());

        assert!(matches!(
            store.rotate_next("unknown"),
            Err(PoolError::KeyNotFound { .. })
        ));

        store.begin_sweep("empty");
        assert!(matches!(
            store.rotate_next("empty"),
            Err(PoolError::EmptyFilterResult { .. })
        ));
    }

    #[test]
    fn test_begin_sweep_replaces_wholesale() {
        let tmp = TempDir::new().unwrap();
        let store = populated_store(tmp.path());
        store.commit("imdb").unwrap();

        store.begin_sweep("imdb");
        assert_eq!(store.get("imdb").unwrap(), Vec::<usize>::new());
        store.record_pass("imdb", 7);
        assert_eq!(store.get("imdb").unwrap(), vec![7]);
    }

    #[test]
    fn test_freshness_requires_recent_and_nonempty() {
        let tmp = TempDir::new().unwrap();
        let store = populated_store(tmp.path());
        let now = Utc::now().timestamp();

        // Not committed yet: update_time is 0, so it is stale.
        assert!(!store.is_fresh("imdb", 86400, now));

        store.commit("imdb").unwrap();
        assert!(store.is_fresh("imdb", 86400, now));
        assert!(!store.is_fresh("imdb", 0, now));
        assert!(!store.is_fresh("unknown", 86400, now));

        // A committed but empty result never short-circuits a sweep.
        store.begin_sweep("empty");
        store.commit("empty").unwrap();
        assert!(!store.is_fresh("empty", 86400, now));
    }
}
