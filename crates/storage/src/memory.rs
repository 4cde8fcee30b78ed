//! In-memory backend
//!
//! Always available; data is lost when the owning process or scope ends.
//! Also backs `ScenarioSession` storage, whose data is cleared at teardown.

use crate::backend::{StorageBackend, StoreDocument};
use parking_lot::Mutex;
use statekit_core::StoreResult;

/// Mutex-guarded document held in process memory
pub struct MemoryBackend {
    identifier: String,
    document: Mutex<Option<StoreDocument>>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new(identifier: impl Into<String>) -> Self {
        MemoryBackend {
            identifier: identifier.into(),
            document: Mutex::new(None),
        }
    }

    /// Create a backend pre-seeded with a document
    pub fn with_document(identifier: impl Into<String>, document: StoreDocument) -> Self {
        MemoryBackend {
            identifier: identifier.into(),
            document: Mutex::new(Some(document)),
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self) -> Option<StoreDocument> {
        self.document.lock().clone()
    }

    fn save(&self, document: &StoreDocument) -> StoreResult<()> {
        *self.document.lock() = Some(document.clone());
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        *self.document.lock() = None;
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
