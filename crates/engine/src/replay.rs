//! Action replay
//!
//! Applies wire [`Action`]s produced by the action builder (possibly on
//! another device) to a runtime store. A `StoreTransaction` action replays
//! its nested actions, in order, inside one store transaction, so the whole
//! group commits as one Change or not at all.

use crate::store::Store;
use crate::transaction::Transaction;
use statekit_core::{Action, ActionType, Change, ScopeTag, StoreError, StoreResult, Value};
use tracing::debug;

impl Store {
    /// Replay an action against this store
    ///
    /// # Errors
    ///
    /// - `InvalidConfiguration` when the action (or a nested one) targets
    ///   another scope or storage kind
    /// - `TransactionFailed` when a nested action of a transaction fails
    ///   for a reason other than validation
    /// - any error the equivalent direct operation would return
    pub fn apply_action(&self, action: &Action) -> StoreResult<Change> {
        check_target(self, action)?;
        debug!(
            target: "statekit::replay",
            id = %action.id,
            kind = ?action.action_type,
            "Replaying action"
        );
        self.transaction(|tx| replay(tx, action))
    }
}

fn check_target(store: &Store, action: &Action) -> StoreResult<()> {
    let scope = ScopeTag::from(store.scope());
    let storage = store.storage_kind().identifier();
    if action.scope != scope || action.storage != storage {
        return Err(StoreError::InvalidConfiguration(format!(
            "action '{}' targets {:?}/{} but this store is {:?}/{}",
            action.id, action.scope, action.storage, scope, storage
        )));
    }
    action
        .actions
        .iter()
        .flatten()
        .try_for_each(|nested| check_target(store, nested))
}

fn replay(tx: &mut Transaction<'_>, action: &Action) -> StoreResult<()> {
    match action.action_type {
        ActionType::StoreSet => tx.set(&action.key_path, required_value(action)?),
        ActionType::StoreRemove => tx.remove(&action.key_path),
        ActionType::StoreMerge => tx.merge(&action.key_path, required_value(action)?),
        ActionType::StoreTransaction => {
            for nested in action.actions.iter().flatten() {
                replay(tx, nested).map_err(|e| match e {
                    e @ StoreError::ValidationFailed(_) => e,
                    e @ StoreError::TransactionFailed(_) => e,
                    other => StoreError::TransactionFailed(format!("{}: {}", nested.id, other)),
                })?;
            }
            Ok(())
        }
    }
}

fn required_value(action: &Action) -> StoreResult<Value> {
    action.value.clone().ok_or_else(|| {
        StoreError::decode_failed(action.id.clone(), "set/merge action without a value")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use statekit_core::{Scope, StorageKind};

    fn set(key_path: &str, value: impl Into<Value>) -> Action {
        Action::mutation(
            ActionType::StoreSet,
            &Scope::App,
            &StorageKind::Memory,
            key_path,
            Some(value.into()),
        )
    }

    #[test]
    fn test_single_actions() {
        let store = Store::in_memory(Scope::App);
        store.apply_action(&set("cart.total", 10)).unwrap();
        assert_eq!(store.get("cart.total"), Some(Value::Integer(10)));

        let remove = Action::mutation(
            ActionType::StoreRemove,
            &Scope::App,
            &StorageKind::Memory,
            "cart.total",
            None,
        );
        let change = store.apply_action(&remove).unwrap();
        assert_eq!(change.patches.len(), 1);
        assert!(!store.exists("cart.total"));
    }

    #[test]
    fn test_transaction_action_commits_one_change() {
        let store = Store::in_memory(Scope::App);
        let action = Action::transaction(
            &Scope::App,
            &StorageKind::Memory,
            vec![set("user.first", "Ada"), set("user.last", "Lovelace")],
        );
        let change = store.apply_action(&action).unwrap();
        assert_eq!(change.patches.len(), 2);
        assert_eq!(store.get("user.last"), Some(Value::from("Lovelace")));
    }

    #[test]
    fn test_failed_nested_action_applies_nothing() {
        let store = Store::in_memory(Scope::App);
        let action = Action::transaction(
            &Scope::App,
            &StorageKind::Memory,
            vec![set("a", 1), set("items[x]", 2)],
        );
        let err = store.apply_action(&action).unwrap_err();
        assert!(matches!(err, StoreError::TransactionFailed(_)));
        assert!(!store.exists("a"));
    }

    #[test]
    fn test_foreign_target_is_rejected() {
        let store = Store::in_memory(Scope::App);
        let scenario = Action::mutation(
            ActionType::StoreSet,
            &Scope::scenario("s1"),
            &StorageKind::Memory,
            "a",
            Some(Value::Integer(1)),
        );
        assert!(matches!(
            store.apply_action(&scenario),
            Err(StoreError::InvalidConfiguration(_))
        ));

        let file = Action::mutation(
            ActionType::StoreSet,
            &Scope::App,
            &StorageKind::File("cart.json".into()),
            "a",
            Some(Value::Integer(1)),
        );
        let wrapped = Action::transaction(&Scope::App, &StorageKind::Memory, vec![file]);
        assert!(matches!(
            store.apply_action(&wrapped),
            Err(StoreError::InvalidConfiguration(_))
        ));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_wire_round_trip_replays() {
        let store = Store::in_memory(Scope::App);
        let raw = set("prefs.theme", "dark").to_json().unwrap();
        store.apply_action(&Action::from_json(&raw).unwrap()).unwrap();
        assert_eq!(store.get("prefs.theme"), Some(Value::from("dark")));
    }
}
