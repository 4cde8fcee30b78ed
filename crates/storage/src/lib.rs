//! Storage backends for statekit
//!
//! This crate implements the persistence seam of the store engine:
//! - StorageBackend: load/save/clear/is_available contract over one document
//! - MemoryBackend: mutex-guarded, process lifetime
//! - FileBackend: JSON document with atomic temp + rename writes
//! - PreferencesBackend: one blob per persistence key inside a shared suite file
//! - RemoteBackend: namespaced mirror over a pluggable transport
//! - BackendFactory: selects and caches a backend per (scope, storage kind)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod factory;
pub mod file;
pub mod memory;
pub mod preferences;
pub mod remote;

pub use backend::{Snapshot, StorageBackend, StoreDocument};
pub use factory::BackendFactory;
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use preferences::{PreferencesBackend, PreferencesSuite};
pub use remote::{LoopbackTransport, RemoteBackend, RemoteTransport};
