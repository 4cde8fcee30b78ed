//! Observation layer
//!
//! Subscriptions are fed from committed changes. Each one tracks one key
//! path (or a set of them) and receives a value whenever a change's affected
//! paths relate to what it tracks.
//!
//! Delivery uses unbounded channels, so publishing never waits on a slow
//! subscriber while the store lock is held. Each subscriber sees values in
//! commit order. A subscription is removed from the registry when its
//! handle is dropped or cancelled; there is no replay for late subscribers.

use indexmap::IndexMap;
use parking_lot::Mutex;
use statekit_core::{KeyPath, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

/// Current values of every tracked path
pub type ValueMap = IndexMap<KeyPath, Option<Value>>;

/// Stream of values for one key path
pub type Subscription = Feed<Option<Value>>;

/// Stream of value maps for a set of key paths
pub type MultiSubscription = Feed<ValueMap>;

enum Sink {
    Single(KeyPath, UnboundedSender<Option<Value>>),
    Many(Vec<KeyPath>, UnboundedSender<ValueMap>),
}

impl Sink {
    fn paths(&self) -> &[KeyPath] {
        match self {
            Sink::Single(path, _) => std::slice::from_ref(path),
            Sink::Many(paths, _) => paths,
        }
    }
}

/// Live subscriptions of one store
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    next_id: AtomicU64,
    sinks: Mutex<HashMap<u64, Sink>>,
}

impl ObserverRegistry {
    pub(crate) fn len(&self) -> usize {
        self.sinks.lock().len()
    }

    /// Register a single-path subscription and emit its current value
    pub(crate) fn subscribe(self: &Arc<Self>, path: KeyPath, current: Option<Value>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        // Receiver is alive, the initial send cannot fail
        let _ = tx.send(current);
        let id = self.insert(Sink::Single(path, tx));
        Feed::new(id, rx, self)
    }

    /// Register a multi-path subscription and emit its current map
    pub(crate) fn subscribe_many(self: &Arc<Self>, paths: Vec<KeyPath>, current: ValueMap) -> MultiSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(current);
        let id = self.insert(Sink::Many(paths, tx));
        Feed::new(id, rx, self)
    }

    /// Publish a committed change
    ///
    /// `read` returns the post-commit value of a path. Sinks whose receiver
    /// is gone are pruned.
    pub(crate) fn publish(&self, affected: &BTreeSet<KeyPath>, read: impl Fn(&KeyPath) -> Option<Value>) {
        let mut sinks = self.sinks.lock();
        let mut closed = Vec::new();
        for (id, sink) in sinks.iter() {
            let triggered = sink
                .paths()
                .iter()
                .any(|tracked| affected.iter().any(|p| p.is_related_to(tracked)));
            if !triggered {
                continue;
            }
            let delivered = match sink {
                Sink::Single(path, tx) => tx.send(read(path)).is_ok(),
                Sink::Many(paths, tx) => {
                    let map = paths.iter().map(|p| (p.clone(), read(p))).collect();
                    tx.send(map).is_ok()
                }
            };
            if !delivered {
                closed.push(*id);
            }
        }
        for id in closed {
            trace!(target: "statekit::observe", subscription = id, "Pruned closed subscription");
            sinks.remove(&id);
        }
    }

    /// Drop every subscription; their streams end
    pub(crate) fn close_all(&self) {
        self.sinks.lock().clear();
    }

    fn insert(&self, sink: Sink) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sinks.lock().insert(id, sink);
        id
    }

    fn remove(&self, id: u64) {
        self.sinks.lock().remove(&id);
    }
}

/// Handle to a subscription
///
/// Dropping the handle unsubscribes. The stream ends (`None`) once the
/// store is torn down or dropped.
pub struct Feed<T> {
    id: u64,
    rx: UnboundedReceiver<T>,
    registry: Weak<ObserverRegistry>,
}

impl<T> Feed<T> {
    fn new(id: u64, rx: UnboundedReceiver<T>, registry: &Arc<ObserverRegistry>) -> Self {
        Feed {
            id,
            rx,
            registry: Arc::downgrade(registry),
        }
    }

    /// Next pending value without waiting
    pub fn try_next(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next value
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Block the current thread until the next value
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_next(&mut self) -> Option<T> {
        self.rx.blocking_recv()
    }

    /// Drain every pending value
    pub fn drain(&mut self) -> Vec<T> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Stop delivery and release the subscription
    pub fn cancel(self) {}
}

impl<T> Drop for Feed<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl<T> std::fmt::Debug for Feed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed").field("id", &self.id).finish()
    }
}
