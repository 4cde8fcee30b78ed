//! Statekit - reactive key-path stores with pluggable persistence
//!
//! Statekit keeps application state in stores addressed by key paths such
//! as `"cart.items[0].sku"`. Each store belongs to a scope (app-wide or one
//! running scenario) and a storage kind (memory, user preferences, a file,
//! a remote namespace or a scenario session).
//!
//! # Quick Start
//!
//! ```
//! use statekit::{Scope, Store, Value};
//!
//! let store = Store::in_memory(Scope::App);
//! let mut total = store.subscribe("cart.total")?;
//! assert_eq!(total.try_next(), Some(None));
//!
//! store.set("cart.total", 10)?;
//! assert_eq!(total.try_next(), Some(Some(Value::Integer(10))));
//! # Ok::<(), statekit::StoreError>(())
//! ```
//!
//! # Architecture
//!
//! - `statekit-core`: key paths, values, patches, actions, errors
//! - `statekit-storage`: the backend trait and its implementations
//! - `statekit-engine`: stores, validation, live expressions, subscriptions
//! - `statekit-actions`: the authoring-side action builder
//!
//! Actions built with [`ActionBuilder`] serialize to JSON and replay on any
//! runtime store through [`Store::apply_action`].

pub use statekit_actions::{collect_actions, ActionBuilder};
pub use statekit_core::{
    Action, ActionType, Change, KeyPath, Patch, PatchOp, Scope, SemanticVersion, StorageKind,
    StoreError, StoreResult, Value,
};
pub use statekit_engine::{
    Inputs, LiveExpression, MultiSubscription, RuleKind, Store, StoreConfig, StoreRegistry,
    Subscription, Transaction, ValidationMode, ValidationOptions, ValidationRule, Violation,
};
pub use statekit_storage::{BackendFactory, LoopbackTransport, RemoteTransport, StorageBackend};
