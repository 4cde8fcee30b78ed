//! Remote, namespaced storage
//!
//! The remote backend is a best-effort mirror, never a source of truth.
//! Network transport is outside this crate: a [`RemoteTransport`] moves
//! opaque document bytes for a namespace, and [`LoopbackTransport`] is an
//! in-process implementation for tests and offline use.
//!
//! When no transport is attached or the transport reports itself
//! disconnected, the backend is unavailable: `load` yields `None` and
//! `save`/`clear` fail with `StorageUnavailable`. The store keeps its
//! in-memory snapshot and retries on the next flush.

use crate::backend::{StorageBackend, StoreDocument};
use parking_lot::Mutex;
use statekit_core::{StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Byte transport for one or more namespaces
pub trait RemoteTransport: Send + Sync {
    /// Whether the transport can currently reach its peer
    fn is_connected(&self) -> bool;

    /// Fetch the stored bytes for a namespace
    fn fetch(&self, namespace: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Replace the stored bytes for a namespace
    fn push(&self, namespace: &str, bytes: Vec<u8>) -> StoreResult<()>;

    /// Delete the stored bytes for a namespace
    fn delete(&self, namespace: &str) -> StoreResult<()>;
}

/// In-process transport with a connectivity switch
pub struct LoopbackTransport {
    connected: AtomicBool,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl LoopbackTransport {
    /// A connected, empty transport
    pub fn new() -> Self {
        LoopbackTransport {
            connected: AtomicBool::new(true),
            blobs: Mutex::new(HashMap::new()),
        }
    }

    /// Toggle connectivity
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn ensure_connected(&self) -> StoreResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(StoreError::unavailable("loopback transport disconnected"))
        }
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteTransport for LoopbackTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn fetch(&self, namespace: &str) -> StoreResult<Option<Vec<u8>>> {
        self.ensure_connected()?;
        Ok(self.blobs.lock().get(namespace).cloned())
    }

    fn push(&self, namespace: &str, bytes: Vec<u8>) -> StoreResult<()> {
        self.ensure_connected()?;
        self.blobs.lock().insert(namespace.to_string(), bytes);
        Ok(())
    }

    fn delete(&self, namespace: &str) -> StoreResult<()> {
        self.ensure_connected()?;
        self.blobs.lock().remove(namespace);
        Ok(())
    }
}

/// Namespaced mirror over an optional transport
pub struct RemoteBackend {
    identifier: String,
    namespace: String,
    transport: Option<Arc<dyn RemoteTransport>>,
}

impl RemoteBackend {
    /// Create a backend; `None` leaves it permanently unavailable
    pub fn new(
        identifier: impl Into<String>,
        namespace: impl Into<String>,
        transport: Option<Arc<dyn RemoteTransport>>,
    ) -> Self {
        RemoteBackend {
            identifier: identifier.into(),
            namespace: namespace.into(),
            transport,
        }
    }

    /// Remote namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn connected(&self) -> StoreResult<&Arc<dyn RemoteTransport>> {
        match &self.transport {
            Some(t) if t.is_connected() => Ok(t),
            Some(_) => Err(StoreError::unavailable(format!(
                "remote namespace '{}' is disconnected",
                self.namespace
            ))),
            None => Err(StoreError::unavailable(format!(
                "remote namespace '{}' has no transport",
                self.namespace
            ))),
        }
    }
}

impl StorageBackend for RemoteBackend {
    fn load(&self) -> Option<StoreDocument> {
        let transport = self.connected().ok()?;
        let bytes = match transport.fetch(&self.namespace) {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(target: "statekit::storage", namespace = %self.namespace, error = %e, "Remote fetch failed");
                return None;
            }
        };
        match StoreDocument::from_bytes(&bytes) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(target: "statekit::storage", namespace = %self.namespace, error = %e, "Corrupt remote document ignored");
                None
            }
        }
    }

    fn save(&self, document: &StoreDocument) -> StoreResult<()> {
        let transport = self.connected()?;
        transport.push(&self.namespace, document.to_bytes()?)
    }

    fn clear(&self) -> StoreResult<()> {
        self.connected()?.delete(&self.namespace)
    }

    fn is_available(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_connected())
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
