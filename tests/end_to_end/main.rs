//! End-to-End Test Suite
//!
//! Exercises the whole stack through the `statekit` facade: actions
//! authored with a builder, shipped as JSON and replayed on runtime stores
//! opened through a registry over real backends.
//!
//! ## Running Tests
//!
//! ```bash
//! # Run the whole suite
//! cargo test --test end_to_end
//!
//! # Run replay tests only
//! cargo test --test end_to_end replay::
//! ```

use statekit::{StoreConfig, StoreRegistry};
use std::sync::Once;
use tempfile::TempDir;

pub mod persistence;
pub mod replay;
pub mod scenarios;

// =============================================================================
// SHARED TEST UTILITIES
// =============================================================================

static INIT_TRACING: Once = Once::new();

/// Route tracing output through the test harness
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// Registry rooted in a fresh temp dir; keep the dir alive for the test
pub fn temp_registry() -> (TempDir, StoreRegistry) {
    init_tracing();
    let dir = TempDir::new().expect("Failed to create temp dir");
    let registry = StoreRegistry::open(dir.path()).expect("Failed to open registry");
    (dir, registry)
}

/// Registry with an explicit config
pub fn registry_with(dir: &TempDir, configure: impl FnOnce(&mut StoreConfig)) -> StoreRegistry {
    init_tracing();
    let mut config = StoreConfig::with_data_dir(dir.path().join("data"));
    configure(&mut config);
    StoreRegistry::new(config).expect("Failed to create registry")
}
