//! Action builder
//!
//! The authoring-side mirror of a store: the same mutation surface, but each
//! call produces a serializable [`Action`] instead of changing state. Actions
//! are recorded into the ambient collection frame (see
//! [`collect_actions`](crate::collect_actions)) and returned to the caller.

use crate::collect::{record, Frame};
use statekit_core::{
    Action, ActionType, KeyPath, Scope, ScopeTag, StorageKind, StoreError, StoreResult, Value,
};
use tracing::trace;

/// Builds actions for one (scope, storage kind)
#[derive(Debug, Clone)]
pub struct ActionBuilder {
    scope: Scope,
    kind: StorageKind,
}

impl ActionBuilder {
    /// Create a builder targeting (scope, kind)
    pub fn new(scope: Scope, kind: StorageKind) -> Self {
        ActionBuilder { scope, kind }
    }

    /// Target scope
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Target storage kind
    pub fn storage_kind(&self) -> &StorageKind {
        &self.kind
    }

    /// Describe setting a value
    ///
    /// # Errors
    ///
    /// `InvalidKeyPath` for malformed or root paths, `EncodeFailed` for
    /// values without a wire form (non-finite numbers).
    pub fn set(&self, key_path: &str, value: impl Into<Value>) -> StoreResult<Action> {
        let path = target_path(key_path)?;
        let value = encodable(value.into())?;
        Ok(self.emit(ActionType::StoreSet, &path, Some(value)))
    }

    /// Describe removing a value
    pub fn remove(&self, key_path: &str) -> StoreResult<Action> {
        let path = target_path(key_path)?;
        Ok(self.emit(ActionType::StoreRemove, &path, None))
    }

    /// Describe merging object members
    ///
    /// # Errors
    ///
    /// `ValidationFailed` when `value` is not an object.
    pub fn merge(&self, key_path: &str, value: impl Into<Value>) -> StoreResult<Action> {
        let path = target_path(key_path)?;
        let value = value.into();
        if !value.is_object() {
            return Err(StoreError::validation(format!(
                "merge at '{}' needs an object, got {}",
                path,
                value.tag()
            )));
        }
        let value = encodable(value)?;
        Ok(self.emit(ActionType::StoreMerge, &path, Some(value)))
    }

    /// Describe a group of actions applied atomically
    ///
    /// Actions built while `f` runs are nested into the transaction, in call
    /// order, instead of the surrounding collection. When `f` fails nothing
    /// is recorded.
    ///
    /// # Errors
    ///
    /// `f`'s error, or `InvalidConfiguration` when a nested action targets
    /// another scope or storage kind.
    pub fn transaction<F>(&self, f: F) -> StoreResult<Action>
    where
        F: FnOnce(&ActionBuilder) -> StoreResult<()>,
    {
        let frame = Frame::open();
        f(self)?;
        let nested = frame.close();

        let scope = ScopeTag::from(&self.scope);
        let storage = self.kind.identifier();
        if let Some(foreign) = nested
            .iter()
            .find(|a| a.scope != scope || a.storage != storage)
        {
            return Err(StoreError::InvalidConfiguration(format!(
                "action '{}' cannot join a transaction on {}",
                foreign.id, storage
            )));
        }

        let action = Action::transaction(&self.scope, &self.kind, nested);
        trace!(target: "statekit::actions", id = %action.id, "Built transaction action");
        record(&action);
        Ok(action)
    }

    /// Reads need a live store
    ///
    /// # Errors
    ///
    /// Always `RuntimeOnlyOperation`.
    pub fn get(&self, _key_path: &str) -> StoreResult<Value> {
        Err(StoreError::RuntimeOnlyOperation("get"))
    }

    fn emit(&self, action_type: ActionType, path: &KeyPath, value: Option<Value>) -> Action {
        let action = Action::mutation(action_type, &self.scope, &self.kind, path.to_string(), value);
        trace!(target: "statekit::actions", id = %action.id, "Built action");
        record(&action);
        action
    }
}

fn target_path(key_path: &str) -> StoreResult<KeyPath> {
    let path = KeyPath::parse(key_path)?;
    if path.is_root() {
        return Err(StoreError::invalid_key_path(key_path, "the root path cannot be written"));
    }
    Ok(path)
}

fn encodable(value: Value) -> StoreResult<Value> {
    value.encode()?;
    Ok(value)
}
