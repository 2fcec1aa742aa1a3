//! Effects
//!
//! An [`Effect`] is a side-effecting computation that re-runs whenever one
//! of the signals it read last time emits. It is the standard consumer of
//! the read-tracking machinery: UI bindings and test observers are both
//! effects.
//!
//! # How Effects Work
//!
//! 1. On creation the effect runs once, inside a [`ReadScope`], to
//!    establish its initial dependencies.
//!
//! 2. It subscribes to every captured signal.
//!
//! 3. When any of them emits, the effect unsubscribes from its old
//!    dependencies, re-runs, and re-subscribes to whatever it read this
//!    time. Dependencies therefore always reflect the most recent run.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::scope::ReadScope;
use super::signal::{Signal, SubscriberId};

struct EffectInner {
    subscriber_id: SubscriberId,
    run: Box<dyn Fn() + Send + Sync>,
    dependencies: RwLock<Vec<Signal>>,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

/// A re-running computation subscribed to the signals it reads.
///
/// Cloning an `Effect` shares state with the original.
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create a new effect and run it immediately to establish its
    /// dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self {
            inner: Arc::new(EffectInner {
                subscriber_id: SubscriberId::new(),
                run: Box::new(run),
                dependencies: RwLock::new(Vec::new()),
                disposed: AtomicBool::new(false),
                run_count: AtomicUsize::new(0),
            }),
        };
        Self::run_inner(&effect.inner);
        effect
    }

    fn run_inner(inner: &Arc<EffectInner>) {
        if inner.disposed.load(Ordering::SeqCst) {
            return;
        }

        let previous = std::mem::take(&mut *inner.dependencies.write());
        for signal in &previous {
            signal.unsubscribe(inner.subscriber_id);
        }

        let scope = ReadScope::enter();
        (inner.run)();
        let captured = ReadScope::captured();
        drop(scope);

        for signal in &captured {
            let weak: Weak<EffectInner> = Arc::downgrade(inner);
            signal.subscribe(inner.subscriber_id, move || {
                if let Some(inner) = weak.upgrade() {
                    Effect::run_inner(&inner);
                }
            });
        }
        *inner.dependencies.write() = captured;
        inner.run_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Re-run the effect unconditionally (unless disposed).
    pub fn execute(&self) {
        Self::run_inner(&self.inner);
    }

    /// Stop the effect and detach it from all dependencies.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        let dependencies = std::mem::take(&mut *self.inner.dependencies.write());
        for signal in &dependencies {
            signal.unsubscribe(self.inner.subscriber_id);
        }
    }

    /// Whether the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Number of signals the most recent run depends on.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.read().len()
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn effect_runs_on_creation() {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_when_dependency_emits() {
        let signal = Signal::new();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let signal_clone = signal.clone();

        let effect = Effect::new(move || {
            signal_clone.notify_read();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(effect.dependency_count(), 1);

        signal.emit();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        signal.emit();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn disposed_effect_stops_rerunning() {
        let signal = Signal::new();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let signal_clone = signal.clone();

        let effect = Effect::new(move || {
            signal_clone.notify_read();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        effect.dispose();
        assert!(effect.is_disposed());

        signal.emit();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn dependencies_reflect_most_recent_run() {
        let toggle = Arc::new(AtomicBool::new(false));
        let a = Signal::new();
        let b = Signal::new();

        let toggle_clone = toggle.clone();
        let (a2, b2) = (a.clone(), b.clone());
        let effect = Effect::new(move || {
            if toggle_clone.load(Ordering::SeqCst) {
                b2.notify_read();
            } else {
                a2.notify_read();
            }
        });

        assert_eq!(a.subscriber_count(), 1);
        assert_eq!(b.subscriber_count(), 0);

        toggle.store(true, Ordering::SeqCst);
        a.emit();

        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_count(), 1);
        assert_eq!(effect.dependency_count(), 1);
    }
}
