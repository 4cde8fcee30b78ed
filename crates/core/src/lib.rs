//! Core types for statekit
//!
//! This crate defines the foundational types shared by the store engine,
//! the storage backends and the action builder:
//! - KeyPath: dotted/bracketed addressing with prefix relations
//! - Value: closed tagged union with a deterministic wire codec
//! - Patch / Change: atomic mutations and committed groups of them
//! - Scope / StorageKind: data partitions and persistence strategies
//! - SemanticVersion: schema versions stamped on persisted data
//! - Action: the serializable action protocol
//! - StoreError: error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod action;
pub mod error;
pub mod key_path;
pub mod patch;
pub mod scope;
pub mod value;
pub mod version;

pub use action::{action_id, Action, ActionType, ScopeTag};
pub use error::{StoreError, StoreResult};
pub use key_path::{are_related, is_prefix, KeyPath, PathComponent};
pub use patch::{affected_key_paths, Change, Patch, PatchOp};
pub use scope::{escape, persistence_key, sanitize, Scope, StorageKind};
pub use value::{ObjectMap, Value, ValueTag};
pub use version::SemanticVersion;
