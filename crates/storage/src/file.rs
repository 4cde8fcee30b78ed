//! File-backed storage
//!
//! Loads by reading and decoding a JSON document. Saves by encoding into a
//! temporary file in the same directory, fsyncing it and renaming it over
//! the target, so a crash leaves either the old or the new full snapshot.

use crate::backend::{remove_if_exists, write_atomic, StorageBackend, StoreDocument};
use statekit_core::StoreResult;
use std::path::{Path, PathBuf};
use tracing::warn;

/// JSON document on local disk
pub struct FileBackend {
    identifier: String,
    path: PathBuf,
}

impl FileBackend {
    /// Create a backend persisting to `path`
    pub fn new(identifier: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        FileBackend {
            identifier: identifier.into(),
            path: path.into(),
        }
    }

    /// Target file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn load(&self) -> Option<StoreDocument> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(target: "statekit::storage", path = %self.path.display(), error = %e, "Failed to read store file");
                return None;
            }
        };
        match StoreDocument::from_bytes(&bytes) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(target: "statekit::storage", path = %self.path.display(), error = %e, "Corrupt store file ignored");
                None
            }
        }
    }

    fn save(&self, document: &StoreDocument) -> StoreResult<()> {
        let bytes = document.to_bytes()?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        remove_if_exists(&self.path)?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
