//! Read Scopes
//!
//! A read scope tracks which signals are touched while a computation runs.
//! Property reads performed inside a scope capture both the value and
//! structure signals they consult; the computation (an effect, a renderer)
//! then subscribes to exactly the signals it actually read.
//!
//! # Implementation
//!
//! A thread-local stack holds one entry per active scope, so scopes nest:
//! an inner computation captures into its own entry without polluting the
//! outer one. The guard pops its entry on drop, which keeps the stack
//! consistent across early returns and panics.

use std::cell::RefCell;

use indexmap::IndexMap;

use super::signal::Signal;

thread_local! {
    static SCOPE_STACK: RefCell<Vec<ScopeEntry>> = const { RefCell::new(Vec::new()) };
}

/// One active scope's captured dependencies, keyed by signal id so a
/// signal read many times is captured once, in first-read order.
struct ScopeEntry {
    captured: IndexMap<u64, Signal>,
}

/// Guard for an active read scope. Dropping it closes the scope.
pub struct ReadScope {
    _private: (),
}

impl ReadScope {
    /// Open a new read scope on this thread.
    ///
    /// While the scope is active, every [`Signal::notify_read`] on this
    /// thread is captured into it.
    pub fn enter() -> Self {
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().push(ScopeEntry {
                captured: IndexMap::new(),
            });
        });
        Self { _private: () }
    }

    /// Whether any read scope is active on this thread.
    pub fn is_active() -> bool {
        SCOPE_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Capture `signal` into the innermost active scope, if any.
    pub(crate) fn track(signal: &Signal) {
        SCOPE_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                entry
                    .captured
                    .entry(signal.id())
                    .or_insert_with(|| signal.clone());
            }
        });
    }

    /// The signals captured so far by the innermost active scope, in
    /// first-read order.
    pub fn captured() -> Vec<Signal> {
        SCOPE_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.captured.values().cloned().collect())
                .unwrap_or_default()
        })
    }
}

impl Drop for ReadScope {
    fn drop(&mut self) {
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}
