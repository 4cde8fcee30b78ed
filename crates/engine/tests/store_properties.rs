//! Integration tests for the store commit protocol
//!
//! These tests verify the end-to-end behavior of a store:
//! - Transaction atomicity under strict validation
//! - Subscription initial value + deltas
//! - Live expression recompute and chaining
//! - Schema version reset on open
//! - Persistence across reopen, failing or unavailable backends and flush
//! - Concurrent writers on one store

use statekit_core::{KeyPath, Scope, SemanticVersion, StorageKind, StoreError, Value};
use statekit_engine::{
    LiveExpression, RuleKind, Store, ValidationMode, ValidationOptions, ValidationRule,
};
use statekit_storage::{
    FileBackend, LoopbackTransport, MemoryBackend, RemoteBackend, RemoteTransport, Snapshot,
    StorageBackend, StoreDocument,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn kp(s: &str) -> KeyPath {
    KeyPath::parse(s).unwrap()
}

fn full_name() -> LiveExpression {
    LiveExpression::new(
        "fullName",
        kp("user.fullName"),
        vec![kp("user.first"), kp("user.last")],
        |inputs| Value::from(format!("{} {}", inputs.text("user.first"), inputs.text("user.last"))),
    )
}

fn seeded(version: &str, entries: &[(&str, Value)]) -> Arc<MemoryBackend> {
    let mut values = Snapshot::new();
    for (path, value) in entries {
        values.insert(kp(path), value.clone());
    }
    Arc::new(MemoryBackend::with_document(
        StorageKind::Memory.identifier(),
        StoreDocument::new(Some(version.to_string()), values),
    ))
}

// ============================================================================
// Atomicity
// ============================================================================

#[test]
fn test_strict_transaction_is_all_or_nothing() {
    init_tracing();
    let store = Store::in_memory(Scope::App);
    store
        .configure_validation(
            ValidationOptions::new(ValidationMode::Strict)
                .rule(kp("age"), ValidationRule::new(RuleKind::Integer).with_range(Some(0.0), Some(150.0)))
                .rule(kp("email"), ValidationRule::new(RuleKind::String).with_pattern(r"[^@\s]+@[^@\s]+\.[a-z]+")),
        )
        .unwrap();
    let before = store.snapshot();

    let err = store
        .transaction(|tx| {
            tx.set("age", 25)?;
            tx.set("email", "not-an-email")
        })
        .unwrap_err();

    assert!(err.is_validation());
    assert!(!store.exists("age"));
    assert!(!store.exists("email"));
    assert_eq!(store.snapshot(), before);
}

#[test]
fn test_removing_required_value_is_rejected() {
    let store = Store::in_memory(Scope::App);
    store
        .configure_validation(
            ValidationOptions::default().rule(kp("user.id"), ValidationRule::new(RuleKind::String).required()),
        )
        .unwrap();
    store.set("user.id", "u-1").unwrap();

    assert!(store.remove("user.id").unwrap_err().is_validation());
    assert!(store.remove("user").unwrap_err().is_validation());
    assert_eq!(store.get("user.id"), Some(Value::from("u-1")));
}

#[test]
fn test_nested_rules_apply_to_parent_writes() {
    let store = Store::in_memory(Scope::App);
    store
        .configure_validation(
            ValidationOptions::default()
                .rule(kp("user.age"), ValidationRule::new(RuleKind::Integer).with_range(Some(0.0), None)),
        )
        .unwrap();

    let bad = Value::object([("age", Value::Integer(-1))]);
    assert!(store.set("user", bad).unwrap_err().is_validation());

    let good = Value::object([("age", Value::Integer(30))]);
    store.set("user", good).unwrap();
    assert_eq!(store.get("user.age"), Some(Value::Integer(30)));
}

#[test]
fn test_handled_write_error_leaves_no_stray_structure() {
    let store = Store::in_memory(Scope::App);
    store.set("user", Value::empty_object()).unwrap();
    let mut sub = store.subscribe("user").unwrap();
    sub.try_next();

    let change = store
        .transaction(|tx| {
            assert!(tx.set("user.a.b[3]", 1).is_err());
            tx.set("other", 1)
        })
        .unwrap();

    let paths: Vec<String> = change.patches.iter().map(|p| p.key_path.to_string()).collect();
    assert_eq!(paths, vec!["other"]);
    assert_eq!(store.get("user"), Some(Value::empty_object()));
    assert!(sub.drain().is_empty());
}

// ============================================================================
// Subscriptions
// ============================================================================

#[test]
fn test_subscription_initial_value_then_delta() {
    let store = Store::in_memory(Scope::App);
    store.set("user.name", "Alice").unwrap();

    let mut sub = store.subscribe("user.name").unwrap();
    assert_eq!(sub.try_next(), Some(Some(Value::from("Alice"))));

    store.set("user.name", "Bob").unwrap();
    assert_eq!(sub.drain(), vec![Some(Value::from("Bob"))]);

    store.set("cart.total", 10).unwrap();
    assert!(sub.drain().is_empty());
}

#[test]
fn test_parent_subscription_sees_child_changes() {
    let store = Store::in_memory(Scope::App);
    let mut cart = store.subscribe("cart").unwrap();
    assert_eq!(cart.try_next(), Some(None));

    store.set("cart.total", 10).unwrap();
    let seen = cart.try_next().unwrap().unwrap();
    assert_eq!(seen, Value::object([("total", Value::Integer(10))]));
}

#[test]
fn test_multi_subscription_and_unsubscribe() {
    let store = Store::in_memory(Scope::App);
    let mut sub = store.subscribe_many(&["user.first", "user.last", "user.first"]).unwrap();
    assert_eq!(store.subscriber_count(), 1);
    assert_eq!(sub.try_next().unwrap().len(), 2);

    store.set("user.last", "Lovelace").unwrap();
    let map = sub.try_next().unwrap();
    assert_eq!(map[&kp("user.first")], None);
    assert_eq!(map[&kp("user.last")], Some(Value::from("Lovelace")));

    sub.cancel();
    assert_eq!(store.subscriber_count(), 0);
    store.set("user.last", "Byron").unwrap();
}

#[test]
fn test_rejected_change_notifies_nobody() {
    let store = Store::in_memory(Scope::App);
    store
        .configure_validation(
            ValidationOptions::default().rule(kp("age"), ValidationRule::new(RuleKind::Integer)),
        )
        .unwrap();
    let mut sub = store.subscribe("age").unwrap();
    sub.try_next();

    assert!(store.set("age", "old").is_err());
    assert_eq!(sub.try_next(), None);
}

#[test]
fn test_subscriber_on_another_thread_sees_commit_order() {
    let store = Arc::new(Store::in_memory(Scope::App));
    let mut sub = store.subscribe("counter").unwrap();

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 1..=50 {
                store.set("counter", i).unwrap();
            }
        })
    };
    writer.join().unwrap();

    let seen: Vec<Option<Value>> = sub.drain();
    assert_eq!(seen.len(), 51);
    assert_eq!(seen[0], None);
    for (i, value) in seen.iter().enumerate().skip(1) {
        assert_eq!(value, &Some(Value::Integer(i as i64)));
    }
}

// ============================================================================
// Live expressions
// ============================================================================

#[test]
fn test_live_expression_tracks_latest_inputs() {
    let store = Store::in_memory(Scope::App);
    let change = store.register_live_expression(full_name()).unwrap();
    assert_eq!(change.patches.len(), 1);
    assert_eq!(store.get("user.fullName"), Some(Value::from(" ")));

    store.set("user.first", "A").unwrap();
    assert_eq!(store.get("user.fullName"), Some(Value::from("A ")));

    let change = store.set("user.last", "B").unwrap();
    assert_eq!(store.get("user.fullName"), Some(Value::from("A B")));
    assert_eq!(change.patches.len(), 2);
    assert_eq!(change.patches[1].key_path, kp("user.fullName"));
}

#[test]
fn test_output_path_is_engine_owned() {
    let store = Store::in_memory(Scope::App);
    store.register_live_expression(full_name()).unwrap();
    assert!(matches!(
        store.set("user.fullName", "X"),
        Err(StoreError::ComputedKeyPath(_))
    ));
    assert!(matches!(
        store.register_live_expression(full_name()),
        Err(StoreError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_chained_expressions_settle_in_one_change() {
    let store = Store::in_memory(Scope::App);
    store.register_live_expression(full_name()).unwrap();
    store
        .register_live_expression(LiveExpression::new(
            "greeting",
            kp("ui.greeting"),
            vec![kp("user.fullName")],
            |inputs| Value::from(format!("Hello,{}", inputs.text("user.fullName").trim_end())),
        ))
        .unwrap();

    let mut sub = store.subscribe("ui.greeting").unwrap();
    sub.try_next();

    let change = store
        .transaction(|tx| {
            tx.set("user.first", "Ada")?;
            tx.set("user.last", "Lovelace")
        })
        .unwrap();
    assert_eq!(change.patches.len(), 4);
    assert_eq!(store.get("ui.greeting"), Some(Value::from("Hello,Ada Lovelace")));
    assert_eq!(sub.drain(), vec![Some(Value::from("Hello,Ada Lovelace"))]);
}

#[test]
fn test_cyclic_expression_is_rejected() {
    let store = Store::in_memory(Scope::App);
    let copy = |id: &str, from: &str, to: &str| {
        let source = from.to_string();
        LiveExpression::new(id, kp(to), vec![kp(from)], move |inputs| {
            inputs.get(&source).unwrap_or(Value::Null)
        })
    };
    store.register_live_expression(copy("ab", "a", "b")).unwrap();
    assert!(matches!(
        store.register_live_expression(copy("ba", "b", "a")),
        Err(StoreError::LiveExpressionCycle(id)) if id == "ba"
    ));
    assert_eq!(store.live_expression_count(), 1);
    // The rejected expression owns nothing
    store.set("a", 1).unwrap();
    assert_eq!(store.get("b"), Some(Value::Integer(1)));
}

// ============================================================================
// Versioning
// ============================================================================

#[test]
fn test_major_bump_discards_stored_data() {
    init_tracing();
    let backend = seeded("1.2.0", &[("cart.total", Value::Integer(10))]);
    let store = Store::open(
        Scope::App,
        StorageKind::Memory,
        backend.clone(),
        SemanticVersion::new(2, 0, 0),
    )
    .unwrap();

    assert!(store.snapshot().is_empty());
    let persisted = backend.load().unwrap();
    assert_eq!(persisted.version.as_deref(), Some("2.0.0"));
    assert!(persisted.values.is_empty());
}

#[test]
fn test_minor_difference_keeps_stored_data() {
    let backend = seeded("1.9.0", &[("cart.total", Value::Integer(10))]);
    let store = Store::open(
        Scope::App,
        StorageKind::Memory,
        backend.clone(),
        SemanticVersion::new(1, 2, 0),
    )
    .unwrap();

    assert_eq!(store.get("cart.total"), Some(Value::Integer(10)));
    assert_eq!(backend.load().unwrap().version.as_deref(), Some("1.9.0"));
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_file_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let kind = StorageKind::File("cart.json".into());
    let path = dir.path().join("cart.json");
    let open = || {
        let backend = Arc::new(FileBackend::new(kind.identifier(), &path));
        Store::open(Scope::App, kind.clone(), backend, SemanticVersion::default()).unwrap()
    };

    {
        let store = open();
        store.set("cart.items[0].sku", "A-1").unwrap();
        store.set("cart.total", 12.5).unwrap();
    }

    let store = open();
    assert_eq!(store.get("cart.items[0].sku"), Some(Value::from("A-1")));
    assert_eq!(store.get("cart.total"), Some(Value::Number(12.5)));
}

#[test]
fn test_unavailable_backend_marks_dirty_until_flush() {
    init_tracing();
    let transport = Arc::new(LoopbackTransport::new());
    transport.set_connected(false);
    let kind = StorageKind::Backend("profile".into());
    let backend = Arc::new(RemoteBackend::new(
        kind.identifier(),
        "app.backend_profile",
        Some(transport.clone() as Arc<dyn RemoteTransport>),
    ));
    let store = Store::open(Scope::App, kind, backend, SemanticVersion::default()).unwrap();

    store.set("name", "Ada").unwrap();
    assert_eq!(store.get("name"), Some(Value::from("Ada")));
    assert!(store.is_dirty());
    assert!(matches!(store.flush(), Err(StoreError::StorageUnavailable(_))));

    transport.set_connected(true);
    store.flush().unwrap();
    assert!(!store.is_dirty());
    let bytes = transport.fetch("app.backend_profile").unwrap().unwrap();
    let document = StoreDocument::from_bytes(&bytes).unwrap();
    assert_eq!(document.values.get(&kp("name")), Some(&Value::from("Ada")));
}

/// Memory backend whose saves fail while `failing` is set
struct FailingSaves {
    inner: MemoryBackend,
    failing: AtomicBool,
}

impl StorageBackend for FailingSaves {
    fn load(&self) -> Option<StoreDocument> {
        self.inner.load()
    }

    fn save(&self, document: &StoreDocument) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")));
        }
        self.inner.save(document)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear()
    }

    fn is_available(&self) -> bool {
        true
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}

#[test]
fn test_failed_save_is_returned_after_state_advances() {
    init_tracing();
    let backend = Arc::new(FailingSaves {
        inner: MemoryBackend::new(StorageKind::Memory.identifier()),
        failing: AtomicBool::new(false),
    });
    let store = Store::open(Scope::App, StorageKind::Memory, backend.clone(), SemanticVersion::default()).unwrap();
    let mut sub = store.subscribe("name").unwrap();
    sub.try_next();

    backend.failing.store(true, Ordering::SeqCst);
    let err = store.set("name", "Ada").unwrap_err();
    assert!(err.is_storage());
    assert_eq!(store.get("name"), Some(Value::from("Ada")));
    assert_eq!(sub.drain(), vec![Some(Value::from("Ada"))]);
    assert!(store.is_dirty());
    assert!(store.flush().unwrap_err().is_storage());

    backend.failing.store(false, Ordering::SeqCst);
    store.flush().unwrap();
    assert!(!store.is_dirty());
    let persisted = backend.load().unwrap();
    assert_eq!(persisted.values.get(&kp("name")), Some(&Value::from("Ada")));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_writers_lose_nothing() {
    let store = Arc::new(Store::in_memory(Scope::App));
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..25 {
                    store.set(&format!("threads.t{}.n{}", t, i), i).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.snapshot().len(), 200);
}

#[test]
fn test_counter_transactions_serialize() {
    let store = Arc::new(Store::in_memory(Scope::App));
    store.set("count", 0).unwrap();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..50 {
                    store
                        .transaction(|tx| {
                            let n = tx.get("count").and_then(|v| v.as_integer()).unwrap_or(0);
                            tx.set("count", n + 1)
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.get("count"), Some(Value::Integer(200)));
}

#[test]
fn test_lenient_mode_keeps_violating_values() {
    let store = Store::in_memory(Scope::App);
    store
        .configure_validation(
            ValidationOptions::new(ValidationMode::Lenient)
                .rule(kp("email"), ValidationRule::new(RuleKind::String).with_pattern(".+@.+")),
        )
        .unwrap();
    let change = store.set("email", "nope").unwrap();
    assert!(!change.is_empty());
    assert_eq!(store.get("email"), Some(Value::from("nope")));
    assert_eq!(store.violations().len(), 1);
}
