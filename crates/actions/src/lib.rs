//! Authoring-side actions for statekit
//!
//! An [`ActionBuilder`] mirrors a store's mutation surface but produces
//! serializable [`Action`](statekit_core::Action)s. Tools author a flow with
//! builders inside [`collect_actions`], ship the resulting JSON, and a
//! runtime store replays it with `Store::apply_action`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod collect;

pub use builder::ActionBuilder;
pub use collect::{collect_actions, is_collecting};
