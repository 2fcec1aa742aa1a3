//! Signal Primitive
//!
//! A [`Signal`] is the notification cell the rest of the runtime is built
//! on. It carries no value of its own: the data lives in the object graph,
//! and the signal is the channel through which reads are tracked and
//! changes are announced.
//!
//! # How Signals Are Used Here
//!
//! 1. A read path calls [`Signal::notify_read`]. If a [`ReadScope`] is
//!    active on the current thread, the signal is captured as a dependency
//!    of whatever computation is running.
//!
//! 2. A write path hands the signal to the runtime's batcher, which calls
//!    [`Signal::emit`] exactly once per signal per batch.
//!
//! 3. `emit` invokes every subscribed callback.
//!
//! # Thread Safety
//!
//! Signals are `Send + Sync`. The subscriber list is behind a lock, and
//! emission snapshots the callbacks before invoking them so a callback may
//! subscribe or unsubscribe without deadlocking.
//!
//! [`ReadScope`]: super::scope::ReadScope

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;

use super::scope::ReadScope;

/// Counter for generating unique signal ids.
static SIGNAL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_signal_id() -> u64 {
    SIGNAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Unique identifier for a subscriber.
///
/// Each subscriber (an effect, a UI binding, a test observer) gets a unique
/// id when created. The id is what [`Signal::unsubscribe`] keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber id.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

type Callback = Arc<dyn Fn() + Send + Sync>;

struct SignalInner {
    id: u64,
    subscribers: RwLock<Vec<(SubscriberId, Callback)>>,
}

/// A read-tracked, subscriber-notifying cell.
///
/// Cloning a `Signal` shares state: both handles refer to the same
/// subscriber list and the same id.
#[derive(Clone)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

impl Signal {
    /// Create a new signal with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: next_signal_id(),
                subscribers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Get the signal's unique id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Register this signal as a read dependency of the current
    /// computation, if a read scope is active on this thread.
    pub fn notify_read(&self) {
        if ReadScope::is_active() {
            ReadScope::track(self);
        }
    }

    /// Invoke every subscribed callback immediately.
    ///
    /// Mutation paths do not call this directly; they route emission
    /// through the runtime's batcher so repeated writes coalesce.
    pub fn emit(&self) {
        let snapshot: SmallVec<[Callback; 4]> = self
            .inner
            .subscribers
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in snapshot {
            callback();
        }
    }

    /// Register a callback invoked on every emission.
    pub fn subscribe<F>(&self, subscriber_id: SubscriberId, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner
            .subscribers
            .write()
            .push((subscriber_id, Arc::new(callback)));
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.inner
            .subscribers
            .write()
            .retain(|(id, _)| *id != subscriber_id);
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Handle to an active subscription.
///
/// Dropping the handle removes the callback. A subscription on an object
/// without event capability is inert: dropping it does nothing.
#[must_use = "dropping a Subscription immediately unsubscribes it"]
pub struct Subscription {
    signal: Option<Signal>,
    id: SubscriberId,
}

impl Subscription {
    pub(crate) fn new(signal: Signal, id: SubscriberId) -> Self {
        Self {
            signal: Some(signal),
            id,
        }
    }

    /// An inert subscription, returned when the target carries no event
    /// capability.
    pub fn none() -> Self {
        Self {
            signal: None,
            id: SubscriberId::new(),
        }
    }

    /// Whether this subscription is attached to a live signal.
    pub fn is_active(&self) -> bool {
        self.signal.is_some()
    }

    /// Explicitly remove the subscription. Equivalent to dropping it.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.take() {
            signal.unsubscribe(self.id);
        }
    }
}
