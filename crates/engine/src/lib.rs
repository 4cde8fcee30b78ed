//! Reactive store engine for statekit
//!
//! This crate orchestrates the lower layers:
//! - Store: state, validation, live expressions and subscriptions of one
//!   (scope, storage kind), committed one Change at a time
//! - Transaction: staged view handed to transaction closures
//! - Validation: typed rules, strict and lenient modes
//! - Live expressions: derived values recomputed in dependency order
//! - Observation: per-path subscriptions fed from committed changes
//! - Replay: applying wire actions to a runtime store
//! - StoreRegistry: one store per (scope, storage kind) from `statekit.toml`
//!
//! The engine is the only component that knows about:
//! - The commit protocol (validate, apply, recompute, persist, notify)
//! - Schema version checks on open
//! - Scenario teardown

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod live;
pub mod observe;
pub mod registry;
mod replay;
mod state;
pub mod store;
pub mod transaction;
pub mod validation;

pub use config::{StoreConfig, CONFIG_FILE_NAME};
pub use live::{Inputs, LiveExpression};
pub use observe::{Feed, MultiSubscription, Subscription, ValueMap};
pub use registry::StoreRegistry;
pub use store::Store;
pub use transaction::Transaction;
pub use validation::{validate, RuleKind, ValidationMode, ValidationOptions, ValidationRule, Violation};
