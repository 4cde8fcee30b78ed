//! Store registry
//!
//! Owns one [`Store`] per (scope, storage kind), opened lazily on first use
//! through a shared [`BackendFactory`]. Every store opened here starts with
//! the configured schema version and validation mode.

use crate::config::{StoreConfig, CONFIG_FILE_NAME};
use crate::store::Store;
use crate::validation::{ValidationMode, ValidationOptions};
use parking_lot::Mutex;
use statekit_core::{Action, Change, Scope, SemanticVersion, StorageKind, StoreError, StoreResult};
use statekit_storage::BackendFactory;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Every open store of a process
pub struct StoreRegistry {
    config: StoreConfig,
    version: SemanticVersion,
    mode: ValidationMode,
    factory: Arc<BackendFactory>,
    stores: Mutex<HashMap<(Scope, StorageKind), Arc<Store>>>,
}

impl StoreRegistry {
    /// Create a registry with backends under `config.data_dir`
    ///
    /// # Errors
    ///
    /// `InvalidVersionFormat` or `InvalidConfiguration` for a bad config.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let factory = Arc::new(BackendFactory::new(config.data_dir.clone()));
        Self::with_factory(config, factory)
    }

    /// Create a registry over an existing factory (for example one with a
    /// remote transport attached)
    pub fn with_factory(config: StoreConfig, factory: Arc<BackendFactory>) -> StoreResult<Self> {
        let version = config.version()?;
        let mode = config.mode()?;
        Ok(StoreRegistry {
            config,
            version,
            mode,
            factory,
            stores: Mutex::new(HashMap::new()),
        })
    }

    /// Open the registry rooted at `dir`
    ///
    /// Reads `dir/statekit.toml`, writing the default file first if none
    /// exists. A relative `data_dir` is resolved against `dir`.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        StoreConfig::write_default_if_missing(&config_path)?;
        let mut config = StoreConfig::from_file(&config_path)?;
        if config.data_dir.is_relative() {
            config.data_dir = dir.join(&config.data_dir);
        }
        info!(
            target: "statekit::registry",
            data_dir = %config.data_dir.display(),
            schema_version = %config.schema_version,
            "Opened store registry"
        );
        Self::new(config)
    }

    /// Active configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Backend factory shared by every store
    pub fn factory(&self) -> &Arc<BackendFactory> {
        &self.factory
    }

    /// The store for (scope, kind), opening it on first use
    pub fn store(&self, scope: &Scope, kind: &StorageKind) -> StoreResult<Arc<Store>> {
        let mut stores = self.stores.lock();
        let key = (scope.clone(), kind.clone());
        if let Some(store) = stores.get(&key) {
            return Ok(Arc::clone(store));
        }

        let backend = self.factory.backend(scope, kind)?;
        let store = Store::open(scope.clone(), kind.clone(), backend, self.version)?;
        store.configure_validation(ValidationOptions::new(self.mode))?;
        let store = Arc::new(store);
        stores.insert(key, Arc::clone(&store));
        Ok(store)
    }

    /// Number of open stores
    pub fn len(&self) -> usize {
        self.stores.lock().len()
    }

    /// True when no store is open
    pub fn is_empty(&self) -> bool {
        self.stores.lock().is_empty()
    }

    /// Replay an action on the store it targets within `scope`
    ///
    /// The action's storage identifier must belong to a store that is
    /// already open in that scope.
    pub fn dispatch(&self, scope: &Scope, action: &Action) -> StoreResult<Change> {
        let store = {
            let stores = self.stores.lock();
            stores
                .iter()
                .find(|((s, k), _)| s == scope && k.identifier() == action.storage)
                .map(|(_, store)| Arc::clone(store))
        };
        match store {
            Some(store) => store.apply_action(action),
            None => Err(StoreError::InvalidConfiguration(format!(
                "no open store for {} in {}",
                action.storage, scope
            ))),
        }
    }

    /// End a scenario: tear down all of its stores
    ///
    /// `ScenarioSession` data is discarded; other kinds keep what they
    /// persisted. Every store is torn down even if one fails; the first
    /// failure is returned.
    pub fn end_scenario(&self, scenario_id: &str) -> StoreResult<()> {
        let scope = Scope::scenario(scenario_id);
        let ended: Vec<Arc<Store>> = {
            let mut stores = self.stores.lock();
            let keys: Vec<_> = stores.keys().filter(|(s, _)| *s == scope).cloned().collect();
            keys.iter().filter_map(|key| stores.remove(key)).collect()
        };

        let mut first_error = None;
        for store in &ended {
            if let Err(e) = store.teardown() {
                warn!(target: "statekit::registry", scope = %scope, storage = %store.storage_kind(), error = %e, "Teardown failed");
                first_error.get_or_insert(e);
            }
        }
        self.factory.release_scope(&scope);
        info!(target: "statekit::registry", scenario = scenario_id, stores = ended.len(), "Ended scenario");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("data_dir", &self.config.data_dir)
            .field("version", &self.version)
            .field("stores", &self.stores.lock().len())
            .finish()
    }
}
