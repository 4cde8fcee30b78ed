//! In-memory store state
//!
//! Values live in a flat, insertion-ordered map of key path → value. No
//! stored key is ever an ancestor of another stored key:
//!
//! - a write below a stored key lands inside that key's value
//! - any other write stores its own key and drops stored descendants
//!
//! Reads resolve the exact key first, then a stored ancestor, then assemble
//! stored descendants into an object or array.

use statekit_core::{KeyPath, ObjectMap, PathComponent, StoreError, StoreResult, Value};
use statekit_storage::Snapshot;
use tracing::warn;

/// Flat key path → value map
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct StoreState {
    values: Snapshot,
}

impl StoreState {
    /// Rebuild state from a persisted snapshot, restoring the no-ancestor invariant
    pub(crate) fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut state = StoreState::default();
        for (path, value) in snapshot {
            if let Err(e) = state.set(&path, value) {
                warn!(target: "statekit::store", key_path = %path, error = %e, "Dropped unplaceable stored value");
            }
        }
        state
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        self.values.clone()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at a path, `None` when nothing is stored there
    pub(crate) fn get(&self, path: &KeyPath) -> Option<Value> {
        if let Some(value) = self.values.get(path) {
            return Some(value.clone());
        }
        if let Some((ancestor, value)) = self.stored_ancestor(path) {
            let rest = &path.components()[ancestor.len()..];
            return value.get_at(rest).cloned();
        }
        self.assemble(path)
    }

    /// Set a value, returning the previous one
    pub(crate) fn set(&mut self, path: &KeyPath, value: Value) -> StoreResult<Option<Value>> {
        if path.is_root() {
            return Err(StoreError::invalid_key_path("", "the root path cannot be written"));
        }
        if let Some(ancestor) = self.stored_ancestor(path).map(|(a, _)| a.clone()) {
            let rest = &path.components()[ancestor.len()..];
            let container = self
                .values
                .get_mut(&ancestor)
                .ok_or_else(|| StoreError::key_path_not_found(ancestor.to_string()))?;
            let old = container.get_at(rest).cloned();
            container
                .set_at(rest, value)
                .map_err(|reason| StoreError::invalid_key_path(path.to_string(), reason))?;
            return Ok(old);
        }

        let old = self.get(path);
        self.values.retain(|k, _| !path.is_strict_prefix_of(k));
        self.values.insert(path.clone(), value);
        Ok(old)
    }

    /// Remove a value, returning it if something was stored
    pub(crate) fn remove(&mut self, path: &KeyPath) -> Option<Value> {
        if let Some(ancestor) = self.stored_ancestor(path).map(|(a, _)| a.clone()) {
            let rest = &path.components()[ancestor.len()..];
            return self.values.get_mut(&ancestor)?.remove_at(rest);
        }

        let old = self.get(path);
        self.values.shift_remove(path);
        self.values.retain(|k, _| !path.is_strict_prefix_of(k));
        old
    }

    /// Shallow-merge object members, returning the previous and merged values
    pub(crate) fn merge(&mut self, path: &KeyPath, members: ObjectMap) -> StoreResult<(Option<Value>, Value)> {
        let old = self.get(path);
        let merged = match old.clone() {
            Some(Value::Object(mut current)) => {
                current.extend(members);
                Value::Object(current)
            }
            None | Some(Value::Null) => Value::Object(members),
            Some(other) => {
                return Err(StoreError::validation(format!(
                    "cannot merge into {} at '{}'",
                    other.tag(),
                    path
                )))
            }
        };
        self.set(path, merged.clone())?;
        Ok((old, merged))
    }

    fn stored_ancestor(&self, path: &KeyPath) -> Option<(&KeyPath, &Value)> {
        path.ancestors()
            .into_iter()
            .find_map(|ancestor| self.values.get_key_value(&ancestor))
    }

    fn assemble(&self, path: &KeyPath) -> Option<Value> {
        let mut out: Option<Value> = None;
        for (key, value) in &self.values {
            if !path.is_strict_prefix_of(key) {
                continue;
            }
            let rest = &key.components()[path.len()..];
            place(out.get_or_insert(Value::Null), rest, value.clone());
        }
        out
    }
}

/// Like `Value::set_at`, but pads arrays with nulls so flat entries can be
/// placed in any order
fn place(target: &mut Value, path: &[PathComponent], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        *target = value;
        return;
    };
    if target.is_null() {
        *target = match first {
            PathComponent::Property(_) => Value::empty_object(),
            PathComponent::Index(_) => Value::Array(Vec::new()),
        };
    }
    match (first, target) {
        (PathComponent::Property(name), Value::Object(members)) => {
            place(members.entry(name.clone()).or_insert(Value::Null), rest, value)
        }
        (PathComponent::Index(idx), Value::Array(items)) => {
            if items.len() <= *idx {
                items.resize(*idx + 1, Value::Null);
            }
            place(&mut items[*idx], rest, value)
        }
        // Mixed property/index siblings cannot both be represented
        _ => {}
    }
}
