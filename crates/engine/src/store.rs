//! Store engine
//!
//! One [`Store`] exists per (scope, storage kind). It owns the in-memory
//! state, the validation schema, the live expressions and the subscriptions
//! of that pair, and funnels every read and mutation through one mutex.
//!
//! # Commit Protocol
//!
//! ```text
//! stage     → run the operations against a copy of the state
//! validate  → check rules related to the written paths
//! reject    → strict violations return ValidationFailed, nothing changes
//! recompute → triggered live expressions write into the same change
//! apply     → the staged copy replaces the live state
//! persist   → the full snapshot goes to the backend
//! notify    → related subscriptions receive their new values
//! ```
//!
//! Persistence is best-effort relative to memory: a failed save is returned
//! to the caller after the state and the notifications have advanced, and an
//! unavailable backend only marks the store dirty until [`Store::flush`].
//!
//! Saves run under the store lock, so save N never lands after save N+1.

use crate::live::{LiveExpression, LiveRegistry};
use crate::observe::{MultiSubscription, ObserverRegistry, Subscription, ValueMap};
use crate::state::StoreState;
use crate::transaction::Transaction;
use crate::validation::{Patterns, ValidationMode, ValidationOptions, Violation};
use parking_lot::{Mutex, MutexGuard};
use statekit_core::{
    affected_key_paths, Change, KeyPath, Patch, Scope, SemanticVersion, StorageKind, StoreError,
    StoreResult, Value,
};
use statekit_storage::{MemoryBackend, Snapshot, StorageBackend, StoreDocument};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Lenient violations kept per store; older ones are dropped first
pub const MAX_RECORDED_VIOLATIONS: usize = 256;

thread_local! {
    /// Stores whose lock the current thread holds
    static HELD: RefCell<Vec<u64>> = RefCell::new(Vec::new());
}

#[derive(Default)]
struct Inner {
    state: StoreState,
    validation: ValidationOptions,
    patterns: Patterns,
    live: LiveRegistry,
    violations: Vec<Violation>,
    dirty: bool,
}

struct StoreGuard<'a> {
    id: u64,
    inner: MutexGuard<'a, Inner>,
}

impl Deref for StoreGuard<'_> {
    type Target = Inner;

    fn deref(&self) -> &Inner {
        &self.inner
    }
}

impl DerefMut for StoreGuard<'_> {
    fn deref_mut(&mut self) -> &mut Inner {
        &mut self.inner
    }
}

impl Drop for StoreGuard<'_> {
    fn drop(&mut self) {
        HELD.with(|held| held.borrow_mut().retain(|&id| id != self.id));
    }
}

/// Reactive store for one (scope, storage kind)
pub struct Store {
    id: u64,
    scope: Scope,
    kind: StorageKind,
    version: SemanticVersion,
    backend: Arc<dyn StorageBackend>,
    inner: Mutex<Inner>,
    observers: Arc<ObserverRegistry>,
}

impl Store {
    /// Open a store over a backend
    ///
    /// Loads the persisted document. A stored version that `version` is a
    /// major bump over, or one that cannot be parsed, discards the stored
    /// data and persists an empty document stamped with `version`.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` when the backend was built for another
    /// storage kind; storage errors from persisting a reset.
    pub fn open(
        scope: Scope,
        kind: StorageKind,
        backend: Arc<dyn StorageBackend>,
        version: SemanticVersion,
    ) -> StoreResult<Self> {
        let identifier = kind.identifier();
        if backend.identifier() != identifier {
            return Err(StoreError::InvalidConfiguration(format!(
                "backend '{}' cannot serve storage '{}'",
                backend.identifier(),
                identifier
            )));
        }

        let (state, reset) = match backend.load() {
            None => (StoreState::default(), false),
            Some(document) if keeps_data(document.version.as_deref(), &version) => {
                (StoreState::from_snapshot(document.values), false)
            }
            Some(document) => {
                info!(
                    target: "statekit::store",
                    scope = %scope,
                    storage = %kind,
                    stored = ?document.version,
                    current = %version,
                    "Discarding stored data after incompatible schema version"
                );
                (StoreState::default(), true)
            }
        };
        debug!(target: "statekit::store", scope = %scope, storage = %kind, empty = state.is_empty(), "Loaded stored document");

        let store = Store {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            scope,
            kind,
            version,
            backend,
            inner: Mutex::new(Inner {
                state,
                ..Inner::default()
            }),
            observers: Arc::new(ObserverRegistry::default()),
        };

        if reset {
            let mut guard = store.lock()?;
            store.persist(&mut guard)?;
        }

        info!(
            target: "statekit::store",
            scope = %store.scope,
            storage = %store.kind,
            version = %store.version,
            "Opened store"
        );
        Ok(store)
    }

    /// Fresh memory-backed store at the default schema version
    pub fn in_memory(scope: Scope) -> Self {
        Store {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            scope,
            kind: StorageKind::Memory,
            version: SemanticVersion::default(),
            backend: Arc::new(MemoryBackend::new(StorageKind::Memory.identifier())),
            inner: Mutex::new(Inner::default()),
            observers: Arc::new(ObserverRegistry::default()),
        }
    }

    /// Data partition
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Persistence strategy
    pub fn storage_kind(&self) -> &StorageKind {
        &self.kind
    }

    /// Schema version stamped on saves
    pub fn schema_version(&self) -> SemanticVersion {
        self.version
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current value, or the rule default while absent
    ///
    /// Never fails: malformed paths and missing values read as `None`.
    pub fn get(&self, key_path: &str) -> Option<Value> {
        let path = KeyPath::parse(key_path).ok()?;
        self.get_path(&path)
    }

    /// [`Store::get`] for a parsed path
    pub fn get_path(&self, path: &KeyPath) -> Option<Value> {
        let guard = self.read_lock()?;
        read(&guard, path)
    }

    /// Whether a value is stored at the path (defaults do not count)
    pub fn exists(&self, key_path: &str) -> bool {
        let Ok(path) = KeyPath::parse(key_path) else {
            return false;
        };
        self.read_lock()
            .map(|guard| guard.state.get(&path).is_some())
            .unwrap_or(false)
    }

    /// Copy of every stored key path and value
    pub fn snapshot(&self) -> Snapshot {
        self.read_lock()
            .map(|guard| guard.state.snapshot())
            .unwrap_or_default()
    }

    /// Violations recorded in lenient mode, oldest first
    ///
    /// At most [`MAX_RECORDED_VIOLATIONS`] are kept.
    pub fn violations(&self) -> Vec<Violation> {
        self.read_lock()
            .map(|guard| guard.violations.clone())
            .unwrap_or_default()
    }

    /// Drain the recorded violations, oldest first
    pub fn take_violations(&self) -> Vec<Violation> {
        self.read_lock()
            .map(|mut guard| std::mem::take(&mut guard.violations))
            .unwrap_or_default()
    }

    /// Whether the last committed state has not reached the backend
    pub fn is_dirty(&self) -> bool {
        self.read_lock().map(|guard| guard.dirty).unwrap_or(false)
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.observers.len()
    }

    /// Enforcement policy of the current validation schema
    pub fn validation_mode(&self) -> ValidationMode {
        self.read_lock()
            .map(|guard| guard.validation.mode)
            .unwrap_or_default()
    }

    /// Number of registered live expressions
    pub fn live_expression_count(&self) -> usize {
        self.read_lock().map(|guard| guard.live.len()).unwrap_or(0)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Set a value
    pub fn set(&self, key_path: &str, value: impl Into<Value>) -> StoreResult<Change> {
        let value = value.into();
        self.transaction(|tx| tx.set(key_path, value))
    }

    /// Remove a value; removing an absent value commits an empty change
    pub fn remove(&self, key_path: &str) -> StoreResult<Change> {
        self.transaction(|tx| tx.remove(key_path))
    }

    /// Shallow-merge object members into the value at a path
    pub fn merge(&self, key_path: &str, value: impl Into<Value>) -> StoreResult<Change> {
        let value = value.into();
        self.transaction(|tx| tx.merge(key_path, value))
    }

    /// Run several operations as one atomic change
    ///
    /// The closure runs under the store lock against staged state. If it
    /// returns an error, or any strict rule fails, nothing is applied,
    /// persisted or published.
    ///
    /// Calling back into this store from inside the closure fails with
    /// `ConcurrencyError`; use the [`Transaction`] handle instead.
    pub fn transaction<F>(&self, f: F) -> StoreResult<Change>
    where
        F: FnOnce(&mut Transaction<'_>) -> StoreResult<()>,
    {
        let mut guard = self.lock()?;
        let inner: &mut Inner = &mut guard;

        let mut staged = inner.state.clone();
        let patches = {
            let mut tx = Transaction::new(&mut staged, &inner.live, &inner.validation);
            f(&mut tx)?;
            tx.into_patches()
        };
        if patches.is_empty() {
            return Ok(Change::new(Vec::new()));
        }

        let written: Vec<KeyPath> = patches.iter().map(|p| p.key_path.clone()).collect();
        let violations = inner
            .validation
            .check_with(&inner.patterns, written.iter(), |p| staged.get(p));
        if !violations.is_empty() && inner.validation.mode == ValidationMode::Strict {
            let reason = violations
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            debug!(target: "statekit::store", scope = %self.scope, storage = %self.kind, reason = %reason, "Rejected change");
            return Err(StoreError::validation(reason));
        }

        let mut affected = affected_key_paths(written.iter());
        let mut patches = patches;
        patches.extend(inner.live.recompute(&mut affected, &mut staged, None)?);

        for violation in &violations {
            warn!(
                target: "statekit::store",
                scope = %self.scope,
                key_path = %violation.key_path,
                reason = %violation.reason,
                "Validation violation accepted in lenient mode"
            );
        }
        inner.violations.extend(violations);
        let overflow = inner.violations.len().saturating_sub(MAX_RECORDED_VIOLATIONS);
        inner.violations.drain(..overflow);

        self.commit(inner, staged, patches, affected)
    }

    /// Replace the validation schema and mode
    ///
    /// Already stored values are not re-checked.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` when a rule pattern is not a valid regex; the
    /// previous schema stays in place.
    pub fn configure_validation(&self, options: ValidationOptions) -> StoreResult<()> {
        let patterns = options.compile_patterns()?;
        let mut guard = self.lock()?;
        guard.validation = options;
        guard.patterns = patterns;
        Ok(())
    }

    /// Register a live expression and compute it immediately
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for duplicate ids or overlapping outputs,
    /// `LiveExpressionCycle` when the expression would close a cycle.
    pub fn register_live_expression(&self, expr: LiveExpression) -> StoreResult<Change> {
        let mut guard = self.lock()?;
        let inner: &mut Inner = &mut guard;

        let id = expr.id().to_string();
        inner.live.register(expr.clone())?;

        let mut staged = inner.state.clone();
        let mut affected = BTreeSet::new();
        let patches = match inner.live.recompute(&mut affected, &mut staged, Some(&id)) {
            Ok(patches) => patches,
            Err(e) => {
                inner.live.unregister(&id);
                return Err(e);
            }
        };

        info!(
            target: "statekit::store",
            scope = %self.scope,
            expression = %id,
            output = %expr.output(),
            "Registered live expression"
        );
        self.commit(inner, staged, patches, affected)
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Subscribe to one key path
    ///
    /// The current value is delivered immediately, then the new value once
    /// per committed change related to the path.
    pub fn subscribe(&self, key_path: &str) -> StoreResult<Subscription> {
        let path = KeyPath::parse(key_path)?;
        let guard = self.lock()?;
        let current = read(&guard, &path);
        Ok(self.observers.subscribe(path, current))
    }

    /// Subscribe to several key paths at once
    ///
    /// Every delivery carries the current value of every tracked path.
    pub fn subscribe_many(&self, key_paths: &[&str]) -> StoreResult<MultiSubscription> {
        let mut paths: Vec<KeyPath> = Vec::with_capacity(key_paths.len());
        for raw in key_paths {
            let path = KeyPath::parse(raw)?;
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        let guard = self.lock()?;
        let current: ValueMap = paths.iter().map(|p| (p.clone(), read(&guard, p))).collect();
        Ok(self.observers.subscribe_many(paths, current))
    }

    // =========================================================================
    // Persistence and lifecycle
    // =========================================================================

    /// Persist the current state now
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the backend is still unavailable, or the
    /// backend's save error.
    pub fn flush(&self) -> StoreResult<()> {
        let mut guard = self.lock()?;
        if !self.backend.is_available() {
            return Err(StoreError::unavailable(format!(
                "{} backend for {} is unavailable",
                self.kind, self.scope
            )));
        }
        self.persist(&mut guard)
    }

    /// End this store's scope
    ///
    /// Closes every subscription. `ScenarioSession` data is discarded from
    /// memory and from the backend; other kinds keep their persisted data.
    pub fn teardown(&self) -> StoreResult<()> {
        let mut guard = self.lock()?;
        self.observers.close_all();
        if self.kind == StorageKind::ScenarioSession {
            guard.state = StoreState::default();
            guard.dirty = false;
            self.backend.clear()?;
        }
        info!(target: "statekit::store", scope = %self.scope, storage = %self.kind, "Tore down store");
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lock(&self) -> StoreResult<StoreGuard<'_>> {
        if HELD.with(|held| held.borrow().contains(&self.id)) {
            return Err(StoreError::ConcurrencyError(format!(
                "re-entrant access to the {} store of {} while it is locked by this thread",
                self.kind, self.scope
            )));
        }
        let inner = self.inner.lock();
        HELD.with(|held| held.borrow_mut().push(self.id));
        Ok(StoreGuard { id: self.id, inner })
    }

    fn read_lock(&self) -> Option<StoreGuard<'_>> {
        match self.lock() {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!(target: "statekit::store", error = %e, "Read skipped");
                None
            }
        }
    }

    fn commit(
        &self,
        inner: &mut Inner,
        staged: StoreState,
        patches: Vec<Patch>,
        affected: BTreeSet<KeyPath>,
    ) -> StoreResult<Change> {
        if patches.is_empty() {
            return Ok(Change::new(patches));
        }

        inner.state = staged;
        let change = Change::new(patches);
        debug!(
            target: "statekit::store",
            scope = %self.scope,
            storage = %self.kind,
            transaction_id = %change.transaction_id,
            patches = change.patches.len(),
            "Committed change"
        );

        let persisted = self.persist(inner);
        self.observers.publish(&affected, |p| read(inner, p));
        persisted.map(|()| change)
    }

    fn persist(&self, inner: &mut Inner) -> StoreResult<()> {
        if !self.backend.is_available() {
            warn!(
                target: "statekit::store",
                scope = %self.scope,
                storage = %self.kind,
                "Backend unavailable, keeping changes in memory"
            );
            inner.dirty = true;
            return Ok(());
        }

        let document = StoreDocument::new(Some(self.version.to_string()), inner.state.snapshot());
        match self.backend.save(&document) {
            Ok(()) => {
                inner.dirty = false;
                Ok(())
            }
            Err(e) => {
                error!(
                    target: "statekit::store",
                    scope = %self.scope,
                    storage = %self.kind,
                    error = %e,
                    "Failed to persist store"
                );
                inner.dirty = true;
                Err(e)
            }
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("scope", &self.scope)
            .field("kind", &self.kind)
            .field("version", &self.version)
            .finish()
    }
}

/// Stored value, falling back to the rule default
fn read(inner: &Inner, path: &KeyPath) -> Option<Value> {
    inner
        .state
        .get(path)
        .or_else(|| inner.validation.default_for(path).cloned())
}

/// Whether stored data written at `stored` survives opening at `current`
fn keeps_data(stored: Option<&str>, current: &SemanticVersion) -> bool {
    let Some(raw) = stored else {
        return true;
    };
    match SemanticVersion::parse(raw) {
        Ok(stored) => !current.is_major_bump(&stored),
        Err(e) => {
            warn!(target: "statekit::store", error = %e, "Unreadable stored schema version");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{RuleKind, ValidationRule};
    use statekit_core::PatchOp;

    fn kp(s: &str) -> KeyPath {
        KeyPath::parse(s).unwrap()
    }

    #[test]
    fn test_set_get_remove() {
        let store = Store::in_memory(Scope::App);
        store.set("cart.total", 10).unwrap();
        assert_eq!(store.get("cart.total"), Some(Value::Integer(10)));
        assert!(store.exists("cart"));

        let change = store.remove("cart.total").unwrap();
        assert_eq!(change.patches[0].op, PatchOp::Remove);
        assert_eq!(change.patches[0].old_value, Some(Value::Integer(10)));
        assert!(!store.exists("cart.total"));
    }

    #[test]
    fn test_get_never_fails() {
        let store = Store::in_memory(Scope::App);
        assert_eq!(store.get("items["), None);
        assert_eq!(store.get("missing"), None);
        assert!(!store.exists("items["));
    }

    #[test]
    fn test_invalid_key_path_is_reported() {
        let store = Store::in_memory(Scope::App);
        match store.set("items[x]", 1) {
            Err(StoreError::InvalidKeyPath { path, .. }) => assert_eq!(path, "items[x]"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_merge_keeps_existing_members() {
        let store = Store::in_memory(Scope::App);
        store.set("prefs.theme", "dark").unwrap();
        store.merge("prefs", Value::object([("size", Value::Integer(14))])).unwrap();
        assert_eq!(store.get("prefs.theme"), Some(Value::from("dark")));
        assert_eq!(store.get("prefs.size"), Some(Value::Integer(14)));
        assert!(store.merge("prefs", "not an object").unwrap_err().is_validation());
    }

    #[test]
    fn test_empty_transaction_commits_nothing() {
        let store = Store::in_memory(Scope::App);
        let mut sub = store.subscribe("a").unwrap();
        assert_eq!(sub.try_next(), Some(None));
        let change = store.transaction(|_| Ok(())).unwrap();
        assert!(change.is_empty());
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn test_closure_error_applies_nothing() {
        let store = Store::in_memory(Scope::App);
        let err = store
            .transaction(|tx| {
                tx.set("a", 1)?;
                Err(StoreError::TransactionFailed("caller aborted".into()))
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::TransactionFailed(_)));
        assert!(!store.exists("a"));
    }

    #[test]
    fn test_defaults_fill_absent_values() {
        let store = Store::in_memory(Scope::App);
        store
            .configure_validation(
                ValidationOptions::default()
                    .rule(kp("theme"), ValidationRule::new(RuleKind::String).with_default("light")),
            )
            .unwrap();
        assert_eq!(store.get("theme"), Some(Value::from("light")));
        assert!(!store.exists("theme"));
        store.set("theme", "dark").unwrap();
        assert_eq!(store.get("theme"), Some(Value::from("dark")));
    }

    #[test]
    fn test_lenient_mode_applies_and_records() {
        let store = Store::in_memory(Scope::App);
        store
            .configure_validation(
                ValidationOptions::new(ValidationMode::Lenient)
                    .rule(kp("age"), ValidationRule::new(RuleKind::Integer).with_range(Some(0.0), None)),
            )
            .unwrap();
        let mut sub = store.subscribe("age").unwrap();
        sub.try_next();

        let change = store.set("age", -5).unwrap();
        assert_eq!(change.patches.len(), 1);
        assert_eq!(store.get("age"), Some(Value::Integer(-5)));
        assert_eq!(sub.try_next(), Some(Some(Value::Integer(-5))));

        let violations = store.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].key_path, kp("age"));
    }

    #[test]
    fn test_recorded_violations_are_bounded() {
        let store = Store::in_memory(Scope::App);
        store
            .configure_validation(
                ValidationOptions::new(ValidationMode::Lenient)
                    .rule(kp("age"), ValidationRule::new(RuleKind::Integer).with_range(Some(0.0), None)),
            )
            .unwrap();
        for i in 1..=(MAX_RECORDED_VIOLATIONS as i64 + 10) {
            store.set("age", -i).unwrap();
        }
        let kept = store.violations();
        assert_eq!(kept.len(), MAX_RECORDED_VIOLATIONS);
        assert!(kept[0].reason.starts_with("-11 "));

        assert_eq!(store.take_violations().len(), MAX_RECORDED_VIOLATIONS);
        assert!(store.violations().is_empty());
    }

    #[test]
    fn test_bad_pattern_is_rejected_at_configuration() {
        let store = Store::in_memory(Scope::App);
        store
            .configure_validation(
                ValidationOptions::default().rule(kp("code"), ValidationRule::new(RuleKind::Integer)),
            )
            .unwrap();
        let err = store
            .configure_validation(
                ValidationOptions::default()
                    .rule(kp("code"), ValidationRule::new(RuleKind::String).with_pattern("[a-")),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfiguration(_)));
        // The previous schema is still enforced
        assert!(store.set("code", "abc").unwrap_err().is_validation());
    }

    #[test]
    fn test_reentrant_access_is_a_concurrency_error() {
        let store = Arc::new(Store::in_memory(Scope::App));
        let inner = store.clone();
        let err = store
            .transaction(move |tx| {
                tx.set("a", 1)?;
                inner.set("b", 2).map(|_| ())
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::ConcurrencyError(_)));
        assert!(!store.exists("a"));
        // The lock is usable again afterwards
        store.set("c", 3).unwrap();
    }

    #[test]
    fn test_backend_for_other_kind_is_rejected() {
        let backend = Arc::new(MemoryBackend::new("file_other"));
        let err = Store::open(Scope::App, StorageKind::Memory, backend, SemanticVersion::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_unversioned_and_garbled_versions() {
        assert!(keeps_data(None, &SemanticVersion::new(3, 0, 0)));
        assert!(!keeps_data(Some("banana"), &SemanticVersion::new(1, 0, 0)));
        assert!(keeps_data(Some("1.9.0"), &SemanticVersion::new(1, 2, 0)));
        assert!(!keeps_data(Some("1.2.0"), &SemanticVersion::new(2, 0, 0)));
    }
}
