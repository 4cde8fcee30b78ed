//! Storage backend contract
//!
//! This trait is the seam between the store engine and persistence. The
//! engine never knows which implementation it talks to: memory, a file,
//! a preferences suite or a remote mirror all look the same.
//!
//! Each backend persists exactly one [`StoreDocument`] per (scope, storage
//! kind) pair: the full flattened key path → value map plus the schema
//! version that wrote it. Partial document updates are not defined.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use statekit_core::{KeyPath, StoreResult, Value};
use std::io::{self, Write};
use std::path::Path;

/// Flattened key path → value map, insertion ordered
pub type Snapshot = IndexMap<KeyPath, Value>;

/// The persisted layout of one store
///
/// ```json
/// { "version": "1.2.0", "values": { "cart.total": { "type": "integer", "value": 10 } } }
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoreDocument {
    /// Schema version of the writer, absent for documents from unversioned stores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Stored values
    #[serde(default)]
    pub values: Snapshot,
}

impl StoreDocument {
    /// Create a document
    pub fn new(version: Option<String>, values: Snapshot) -> Self {
        StoreDocument { version, values }
    }

    /// An empty document stamped with a version
    pub fn empty(version: impl Into<String>) -> Self {
        StoreDocument {
            version: Some(version.into()),
            values: Snapshot::new(),
        }
    }

    /// Encode as JSON bytes
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| statekit_core::StoreError::EncodeFailed(e.to_string()))
    }

    /// Decode from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            statekit_core::StoreError::decode_failed(String::from_utf8_lossy(bytes), e.to_string())
        })
    }
}

/// Pluggable persistence
///
/// Thread safety: all methods may be called from any thread (Send + Sync).
///
/// # Contract
///
/// - `load` returns `None` when nothing is stored *or* the stored document
///   is corrupt; "not found" is never an error.
/// - `save` replaces the whole document.
/// - `clear` deletes the document; clearing an empty backend succeeds.
/// - `is_available` reports readiness. Callers tolerate `false` by keeping
///   their in-memory state and retrying later.
pub trait StorageBackend: Send + Sync {
    /// Load the persisted document, if any
    fn load(&self) -> Option<StoreDocument>;

    /// Persist a full document
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` or `Io` when the write fails.
    fn save(&self, document: &StoreDocument) -> StoreResult<()>;

    /// Delete the persisted document
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` or `Io` when the delete fails.
    fn clear(&self) -> StoreResult<()>;

    /// Whether the backend can currently serve load/save
    fn is_available(&self) -> bool;

    /// Storage identifier this backend was built for
    fn identifier(&self) -> &str;
}

/// Write bytes to a file atomically (temp + fsync + rename)
///
/// Either the old or the new full content is present after a crash,
/// never a partial write.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    let tmp_path = dir.join(format!(".{}.tmp", file_name));
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Remove a file, treating "not found" as success
pub(crate) fn remove_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
