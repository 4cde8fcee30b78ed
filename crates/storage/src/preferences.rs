//! Preferences-backed storage
//!
//! Durable key-value persistence grouped into suites, in the spirit of a
//! platform preferences domain. A suite is one JSON file mapping persistence
//! keys to serialized [`StoreDocument`] blobs, so every (scope, storage kind)
//! pair owns exactly one blob.
//!
//! Several backends share a suite. [`PreferencesSuite`] serializes their
//! read-modify-write cycles with a mutex and writes the file atomically.

use crate::backend::{write_atomic, StorageBackend, StoreDocument};
use indexmap::IndexMap;
use parking_lot::Mutex;
use statekit_core::StoreResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Suite name used when none is given
pub const DEFAULT_SUITE: &str = "default";

type Blobs = IndexMap<String, String>;

/// One preferences file shared by many backends
pub struct PreferencesSuite {
    name: String,
    path: PathBuf,
    lock: Mutex<()>,
}

impl PreferencesSuite {
    /// Suite stored at `<dir>/<name>.json`
    pub fn open(dir: &Path, name: Option<&str>) -> Self {
        let name = name.unwrap_or(DEFAULT_SUITE).to_string();
        let path = dir.join(format!("{}.json", name));
        PreferencesSuite {
            name,
            path,
            lock: Mutex::new(()),
        }
    }

    /// Suite name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blob stored under `key`
    pub fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock();
        self.read_blobs().remove(key)
    }

    /// Store a blob under `key`
    pub fn set(&self, key: &str, blob: String) -> StoreResult<()> {
        let _guard = self.lock.lock();
        let mut blobs = self.read_blobs();
        blobs.insert(key.to_string(), blob);
        self.write_blobs(&blobs)
    }

    /// Delete the blob under `key`
    pub fn remove(&self, key: &str) -> StoreResult<()> {
        let _guard = self.lock.lock();
        let mut blobs = self.read_blobs();
        if blobs.shift_remove(key).is_some() {
            self.write_blobs(&blobs)?;
        }
        Ok(())
    }

    /// All keys currently stored in the suite
    pub fn keys(&self) -> Vec<String> {
        let _guard = self.lock.lock();
        self.read_blobs().keys().cloned().collect()
    }

    fn read_blobs(&self) -> Blobs {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(_) => return Blobs::new(),
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!(target: "statekit::storage", suite = %self.name, error = %e, "Corrupt preferences suite ignored");
            Blobs::new()
        })
    }

    fn write_blobs(&self, blobs: &Blobs) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(blobs)
            .map_err(|e| statekit_core::StoreError::EncodeFailed(e.to_string()))?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }
}

/// One store's slot inside a preferences suite
pub struct PreferencesBackend {
    identifier: String,
    key: String,
    suite: Arc<PreferencesSuite>,
}

impl PreferencesBackend {
    /// Create a backend storing its document under `key`
    pub fn new(identifier: impl Into<String>, key: impl Into<String>, suite: Arc<PreferencesSuite>) -> Self {
        PreferencesBackend {
            identifier: identifier.into(),
            key: key.into(),
            suite,
        }
    }

    /// Persistence key inside the suite
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl StorageBackend for PreferencesBackend {
    fn load(&self) -> Option<StoreDocument> {
        let blob = self.suite.get(&self.key)?;
        match StoreDocument::from_bytes(blob.as_bytes()) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(target: "statekit::storage", key = %self.key, error = %e, "Corrupt preferences entry ignored");
                None
            }
        }
    }

    fn save(&self, document: &StoreDocument) -> StoreResult<()> {
        let bytes = document.to_bytes()?;
        let blob = String::from_utf8(bytes)
            .map_err(|e| statekit_core::StoreError::EncodeFailed(e.to_string()))?;
        self.suite.set(&self.key, blob)
    }

    fn clear(&self) -> StoreResult<()> {
        self.suite.remove(&self.key)
    }

    fn is_available(&self) -> bool {
        true
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
