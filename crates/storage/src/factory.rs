//! Backend selection
//!
//! [`BackendFactory`] maps a (scope, storage kind) pair onto a concrete
//! [`StorageBackend`], resolving on-disk locations under one data directory.
//! Backends are cached per (scope, kind) pair, so two stores opened for the
//! same pair share one backend and preferences suites are shared by every
//! backend that names them. File locations and suite names must stay inside
//! the data directory.
//!
//! | Kind | Backend | Location |
//! |------|---------|----------|
//! | `Memory`, `ScenarioSession` | [`MemoryBackend`] | process memory |
//! | `UserPrefs(suite)` | [`PreferencesBackend`] | `<data_dir>/preferences/<suite>.json` |
//! | `File(location)` | [`FileBackend`] | `<data_dir>/<location>` (app) or `<data_dir>/scenarios/<escaped id>/<location>` |
//! | `Backend(namespace)` | [`RemoteBackend`] | transport namespace `<scopeKey>.backend_<namespace>` |

use crate::backend::StorageBackend;
use crate::file::FileBackend;
use crate::memory::MemoryBackend;
use crate::preferences::{PreferencesSuite, PreferencesBackend, DEFAULT_SUITE};
use crate::remote::{RemoteBackend, RemoteTransport};
use parking_lot::Mutex;
use statekit_core::{escape, persistence_key, Scope, StorageKind, StoreError, StoreResult};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Builds and caches storage backends
pub struct BackendFactory {
    data_dir: PathBuf,
    transport: Option<Arc<dyn RemoteTransport>>,
    backends: Mutex<HashMap<(Scope, StorageKind), Arc<dyn StorageBackend>>>,
    suites: Mutex<HashMap<String, Arc<PreferencesSuite>>>,
}

impl BackendFactory {
    /// Factory rooted at `data_dir`, without a remote transport
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        BackendFactory {
            data_dir: data_dir.into(),
            transport: None,
            backends: Mutex::new(HashMap::new()),
            suites: Mutex::new(HashMap::new()),
        }
    }

    /// Attach the transport used by `Backend(namespace)` storage (builder pattern)
    pub fn with_transport(mut self, transport: Arc<dyn RemoteTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Root directory of durable backends
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Backend for a (scope, kind) pair, built on first use
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for an empty remote namespace, and for
    /// a file location or suite name that is empty or would leave the data
    /// directory.
    pub fn backend(&self, scope: &Scope, kind: &StorageKind) -> StoreResult<Arc<dyn StorageBackend>> {
        let cache_key = (scope.clone(), kind.clone());
        let mut backends = self.backends.lock();
        if let Some(existing) = backends.get(&cache_key) {
            return Ok(existing.clone());
        }

        let key = persistence_key(scope, kind);
        let backend = self.build(scope, kind, &key)?;
        debug!(target: "statekit::storage", key = %key, "Created storage backend");
        backends.insert(cache_key, backend.clone());
        Ok(backend)
    }

    /// Drop cached backends of a scope
    ///
    /// Durable data stays on disk; memory-only data of the scope is gone
    /// once the last store holding the backend is dropped.
    pub fn release_scope(&self, scope: &Scope) {
        self.backends.lock().retain(|(s, _), _| s != scope);
    }

    /// On-disk location of a file-backed store
    pub fn file_path(&self, scope: &Scope, location: &str) -> PathBuf {
        match scope {
            Scope::App => self.data_dir.join(location),
            Scope::Scenario(id) => self
                .data_dir
                .join("scenarios")
                .join(escape(id))
                .join(location),
        }
    }

    fn build(&self, scope: &Scope, kind: &StorageKind, key: &str) -> StoreResult<Arc<dyn StorageBackend>> {
        let identifier = kind.identifier();
        let backend: Arc<dyn StorageBackend> = match kind {
            StorageKind::Memory | StorageKind::ScenarioSession => Arc::new(MemoryBackend::new(identifier)),
            StorageKind::UserPrefs(suite) => {
                let name = suite.as_deref().unwrap_or(DEFAULT_SUITE);
                if !is_contained(name) || name.contains(|c: char| c == '/' || c == '\\') {
                    return Err(StoreError::InvalidConfiguration(format!(
                        "invalid preferences suite '{}'",
                        name
                    )));
                }
                Arc::new(PreferencesBackend::new(identifier, key, self.suite(name)))
            }
            StorageKind::File(location) => {
                if location.trim().is_empty() {
                    return Err(StoreError::InvalidConfiguration(
                        "file storage needs a location".to_string(),
                    ));
                }
                if !is_contained(location) {
                    return Err(StoreError::InvalidConfiguration(format!(
                        "file location '{}' leaves the data directory",
                        location
                    )));
                }
                Arc::new(FileBackend::new(identifier, self.file_path(scope, location)))
            }
            StorageKind::Backend(namespace) => {
                if namespace.is_empty() {
                    return Err(StoreError::InvalidConfiguration(
                        "remote storage needs a namespace".to_string(),
                    ));
                }
                Arc::new(RemoteBackend::new(identifier, key, self.transport.clone()))
            }
        };
        Ok(backend)
    }

    fn suite(&self, name: &str) -> Arc<PreferencesSuite> {
        self.suites
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(PreferencesSuite::open(
                    &self.data_dir.join("preferences"),
                    Some(name),
                ))
            })
            .clone()
    }
}

/// True for a relative path that names something below its base
fn is_contained(raw: &str) -> bool {
    let path = Path::new(raw);
    path.components().any(|c| matches!(c, Component::Normal(_)))
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
