//! Patches and changes
//!
//! A [`Patch`] is one atomic mutation at a key path. A [`Change`] groups the
//! patches of one committed transaction and is the unit of persistence and
//! notification: consumers never observe a partial Change.

use crate::key_path::KeyPath;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Kind of mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Replace or create the value at a path
    Set,
    /// Delete the value at a path
    Remove,
    /// Shallow-merge object members into the value at a path
    Merge,
}

impl PatchOp {
    /// Lowercase name used in action identifiers and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchOp::Set => "set",
            PatchOp::Remove => "remove",
            PatchOp::Merge => "merge",
        }
    }
}

/// One atomic mutation
///
/// `old_value` is captured for audit even though undo is not offered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    /// Mutation kind
    pub op: PatchOp,
    /// Target path
    pub key_path: KeyPath,
    /// Value before the mutation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    /// Value after the mutation (`None` for removals)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

impl Patch {
    /// Create a Set patch
    pub fn set(key_path: KeyPath, old_value: Option<Value>, new_value: Value) -> Self {
        Patch {
            op: PatchOp::Set,
            key_path,
            old_value,
            new_value: Some(new_value),
        }
    }

    /// Create a Remove patch
    pub fn remove(key_path: KeyPath, old_value: Option<Value>) -> Self {
        Patch {
            op: PatchOp::Remove,
            key_path,
            old_value,
            new_value: None,
        }
    }

    /// Create a Merge patch; `new_value` is the merged result
    pub fn merge(key_path: KeyPath, old_value: Option<Value>, new_value: Value) -> Self {
        Patch {
            op: PatchOp::Merge,
            key_path,
            old_value,
            new_value: Some(new_value),
        }
    }

    /// Two patches touch overlapping regions
    pub fn overlaps(&self, other: &Patch) -> bool {
        self.key_path.is_related_to(&other.key_path)
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.new_value {
            Some(v) => write!(f, "{} {} = {}", self.op.as_str().to_uppercase(), self.key_path, v),
            None => write!(f, "{} {}", self.op.as_str().to_uppercase(), self.key_path),
        }
    }
}

/// An atomically committed group of patches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    /// Patches in application order
    pub patches: Vec<Patch>,
    /// Unique id of the committing transaction
    pub transaction_id: Uuid,
}

impl Change {
    /// Wrap patches under a fresh transaction id
    pub fn new(patches: Vec<Patch>) -> Self {
        Change {
            patches,
            transaction_id: Uuid::new_v4(),
        }
    }

    /// True when no patch was produced
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Every patch path plus every strict ancestor of each
    ///
    /// A subscriber on `cart` is therefore notified when `cart.total` changes.
    pub fn affected_key_paths(&self) -> BTreeSet<KeyPath> {
        affected_key_paths(self.patches.iter().map(|p| &p.key_path))
    }

    /// Whether a subscriber on `path` is notified of this change
    ///
    /// True when any of [`Change::affected_key_paths`] relates to `path`, so
    /// a change at `user.first` also affects `user.last` through `user`.
    pub fn affects(&self, path: &KeyPath) -> bool {
        self.affected_key_paths().iter().any(|p| p.is_related_to(path))
    }
}

/// Expand paths with all of their strict ancestors
pub fn affected_key_paths<'a>(paths: impl IntoIterator<Item = &'a KeyPath>) -> BTreeSet<KeyPath> {
    let mut out = BTreeSet::new();
    for path in paths {
        out.extend(path.ancestors());
        out.insert(path.clone());
    }
    out
}
