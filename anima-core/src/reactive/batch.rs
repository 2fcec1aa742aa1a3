//! Event Batching
//!
//! The batcher coalesces signal emissions. Inside a batch, repeated
//! emissions of the same signal are recorded once; when the outermost
//! batch closes, each pending signal fires exactly once, in the order the
//! signals were first touched.
//!
//! Batches nest by depth counter: only the outermost close flushes. This
//! is what turns N property writes inside one change scope into a single
//! emission per touched signal.

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::signal::Signal;

struct BatchState {
    depth: usize,
    pending: IndexMap<u64, Signal>,
}

/// Depth-counted emission coalescer. One per runtime.
pub(crate) struct Batcher {
    state: Mutex<BatchState>,
}

impl Batcher {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(BatchState {
                depth: 0,
                pending: IndexMap::new(),
            }),
        }
    }

    /// Run `f` inside a batch. At outermost close, flush every pending
    /// signal exactly once in first-touch order.
    pub(crate) fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.state.lock().depth += 1;
        let result = f();
        let to_flush = {
            let mut state = self.state.lock();
            state.depth -= 1;
            if state.depth == 0 {
                Some(std::mem::take(&mut state.pending))
            } else {
                None
            }
        };
        if let Some(pending) = to_flush {
            for (_, signal) in pending {
                signal.emit();
            }
        }
        result
    }

    /// Emit `signal`, deferring if a batch is open.
    pub(crate) fn emit(&self, signal: &Signal) {
        let deferred = {
            let mut state = self.state.lock();
            if state.depth > 0 {
                state
                    .pending
                    .entry(signal.id())
                    .or_insert_with(|| signal.clone());
                true
            } else {
                false
            }
        };
        if !deferred {
            signal.emit();
        }
    }
}
