//! Serializable store actions
//!
//! An [`Action`] is an authoring-time description of an intended store
//! mutation. The builder produces them, tooling logs and diffs them, and a
//! runtime store replays them verbatim.
//!
//! ```text
//! Action = {
//!   id: string,
//!   type: "StoreSet" | "StoreRemove" | "StoreMerge" | "StoreTransaction",
//!   scope: "app" | "scenario",
//!   storage: string,
//!   keyPath: string,          // "" for StoreTransaction
//!   value?: ValueDescriptor,  // absent for StoreRemove / StoreTransaction
//!   actions?: [Action]        // StoreTransaction only, in execution order
//! }
//! ```

use crate::error::{StoreError, StoreResult};
use crate::scope::{sanitize, Scope, StorageKind};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Action discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    /// Set a value
    StoreSet,
    /// Remove a value
    StoreRemove,
    /// Merge object members
    StoreMerge,
    /// Ordered group applied atomically
    StoreTransaction,
}

impl ActionType {
    /// Operation name used in action ids
    pub fn op_name(&self) -> &'static str {
        match self {
            ActionType::StoreSet => "set",
            ActionType::StoreRemove => "remove",
            ActionType::StoreMerge => "merge",
            ActionType::StoreTransaction => "transaction",
        }
    }
}

/// Wire scope tag; the scenario id is not carried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeTag {
    /// `"app"`
    App,
    /// `"scenario"`
    Scenario,
}

impl From<&Scope> for ScopeTag {
    fn from(scope: &Scope) -> Self {
        match scope {
            Scope::App => ScopeTag::App,
            Scope::Scenario(_) => ScopeTag::Scenario,
        }
    }
}

/// A serializable store mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Deterministic id, see [`action_id`]
    pub id: String,
    /// Discriminator
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Scope tag
    pub scope: ScopeTag,
    /// Storage identifier, e.g. `"memory"`
    pub storage: String,
    /// Target key path, `""` for transactions
    pub key_path: String,
    /// Encoded value for set/merge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Nested actions for transactions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<Action>>,
}

impl Action {
    /// Build a single-path action
    pub fn mutation(
        action_type: ActionType,
        scope: &Scope,
        storage: &StorageKind,
        key_path: impl Into<String>,
        value: Option<Value>,
    ) -> Self {
        let key_path = key_path.into();
        let storage = storage.identifier();
        Action {
            id: action_id(&storage, action_type, &key_path),
            action_type,
            scope: ScopeTag::from(scope),
            storage,
            key_path,
            value,
            actions: None,
        }
    }

    /// Build a transaction action around nested actions
    pub fn transaction(scope: &Scope, storage: &StorageKind, actions: Vec<Action>) -> Self {
        let storage = storage.identifier();
        Action {
            id: action_id(&storage, ActionType::StoreTransaction, ""),
            action_type: ActionType::StoreTransaction,
            scope: ScopeTag::from(scope),
            storage,
            key_path: String::new(),
            value: None,
            actions: Some(actions),
        }
    }

    /// Encode to the JSON wire format
    pub fn to_json(&self) -> StoreResult<String> {
        serde_json::to_string(self).map_err(|e| StoreError::EncodeFailed(e.to_string()))
    }

    /// Decode from the JSON wire format
    pub fn from_json(raw: &str) -> StoreResult<Self> {
        let action: Action =
            serde_json::from_str(raw).map_err(|e| StoreError::decode_failed(raw, e.to_string()))?;
        action.check_shape(raw)?;
        Ok(action)
    }

    /// Every action in execution order, transactions flattened
    pub fn flatten(&self) -> Vec<&Action> {
        match &self.actions {
            Some(nested) => nested.iter().flat_map(|a| a.flatten()).collect(),
            None => vec![self],
        }
    }

    fn check_shape(&self, raw: &str) -> StoreResult<()> {
        let bad = |reason: &str| Err(StoreError::decode_failed(raw, reason));
        match self.action_type {
            ActionType::StoreSet | ActionType::StoreMerge if self.value.is_none() => {
                bad("set/merge action without a value")
            }
            ActionType::StoreRemove if self.value.is_some() => bad("remove action with a value"),
            ActionType::StoreTransaction => match &self.actions {
                None => bad("transaction action without nested actions"),
                Some(nested) => nested.iter().try_for_each(|a| a.check_shape(raw)),
            },
            _ if self.actions.is_some() => bad("nested actions outside a transaction"),
            _ => Ok(()),
        }
    }
}

/// `"{storage}_{op}_{sanitizedKeyPath}"`
///
/// Identical mutations authored twice produce identical ids.
pub fn action_id(storage_identifier: &str, action_type: ActionType, key_path: &str) -> String {
    format!(
        "{}_{}_{}",
        storage_identifier,
        action_type.op_name(),
        sanitize(key_path)
    )
}
