//! Transaction view
//!
//! A [`Transaction`] is the handle passed to `Store::transaction` closures.
//! Every operation is applied to a staged copy of the store state, so reads
//! inside the closure see earlier writes of the same transaction while the
//! outside world sees nothing until the whole change commits.

use crate::live::LiveRegistry;
use crate::state::StoreState;
use crate::validation::ValidationOptions;
use statekit_core::{KeyPath, Patch, StoreError, StoreResult, Value};

/// Staged mutations of one change
pub struct Transaction<'a> {
    state: &'a mut StoreState,
    live: &'a LiveRegistry,
    validation: &'a ValidationOptions,
    patches: Vec<Patch>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(
        state: &'a mut StoreState,
        live: &'a LiveRegistry,
        validation: &'a ValidationOptions,
    ) -> Self {
        Transaction {
            state,
            live,
            validation,
            patches: Vec::new(),
        }
    }

    pub(crate) fn into_patches(self) -> Vec<Patch> {
        self.patches
    }

    /// Value at a key path as staged so far, falling back to the rule default
    pub fn get(&self, key_path: &str) -> Option<Value> {
        let path = KeyPath::parse(key_path).ok()?;
        self.state
            .get(&path)
            .or_else(|| self.validation.default_for(&path).cloned())
    }

    /// Whether a value is staged at a key path
    pub fn exists(&self, key_path: &str) -> bool {
        KeyPath::parse(key_path)
            .map(|p| self.state.get(&p).is_some())
            .unwrap_or(false)
    }

    /// Stage a set
    pub fn set(&mut self, key_path: &str, value: impl Into<Value>) -> StoreResult<()> {
        let path = self.writable(key_path)?;
        self.set_path(path, value.into())
    }

    /// Stage a removal; removing an absent value is a no-op
    pub fn remove(&mut self, key_path: &str) -> StoreResult<()> {
        let path = self.writable(key_path)?;
        self.remove_path(path);
        Ok(())
    }

    /// Stage a shallow merge of object members
    ///
    /// # Errors
    ///
    /// `ValidationFailed` when `value` is not an object, or the current
    /// value is neither absent nor an object.
    pub fn merge(&mut self, key_path: &str, value: impl Into<Value>) -> StoreResult<()> {
        let path = self.writable(key_path)?;
        self.merge_path(path, value.into())
    }

    pub(crate) fn set_path(&mut self, path: KeyPath, value: Value) -> StoreResult<()> {
        let old = self.state.set(&path, value.clone())?;
        self.patches.push(Patch::set(path, old, value));
        Ok(())
    }

    pub(crate) fn remove_path(&mut self, path: KeyPath) {
        if let Some(old) = self.state.remove(&path) {
            self.patches.push(Patch::remove(path, Some(old)));
        }
    }

    pub(crate) fn merge_path(&mut self, path: KeyPath, value: Value) -> StoreResult<()> {
        let members = match value {
            Value::Object(members) => members,
            other => {
                return Err(StoreError::validation(format!(
                    "merge at '{}' needs an object, got {}",
                    path,
                    other.tag()
                )))
            }
        };
        let (old, merged) = self.state.merge(&path, members)?;
        self.patches.push(Patch::merge(path, old, merged));
        Ok(())
    }

    /// Parse a caller-supplied path and reject engine-owned ones
    pub(crate) fn writable(&self, key_path: &str) -> StoreResult<KeyPath> {
        let path = KeyPath::parse(key_path)?;
        check_writable(&path, self.live)?;
        Ok(path)
    }
}

pub(crate) fn check_writable(path: &KeyPath, live: &LiveRegistry) -> StoreResult<()> {
    if path.is_root() {
        return Err(StoreError::invalid_key_path("", "the root path cannot be written"));
    }
    if let Some(owner) = live.owner_of(path) {
        return Err(StoreError::ComputedKeyPath(format!(
            "{} (owned by '{}')",
            path,
            owner.id()
        )));
    }
    Ok(())
}
