//! Change Context Manager
//!
//! A change context is the cooperative single-writer token that gates
//! structural mutation. At most one target key is "currently mutable" at a
//! time, runtime-wide; re-entering with the same key nests by depth
//! counter. The manager also collects the pending-notification state for
//! the open scope: one primary slot for the key in context, plus an
//! insertion-ordered set of owner-chain targets that must be notified when
//! a nested mutation bubbles up.
//!
//! The manager itself never fails. Admission is advisory: entering with a
//! *different* key while one is active is ignored rather than rejected,
//! and write paths consult [`ChangeContext::is_active_key`] before
//! mutating, which is where the mismatch surfaces as an error.
//!
//! Entry hands back an RAII guard, so an error return (or panic) inside a
//! scope still unwinds the slot and can never leave it stuck.

use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::object::TargetKey;

struct CtxState {
    active: Option<TargetKey>,
    depth: usize,
    pending_primary: Option<TargetKey>,
    pending_owners: IndexSet<TargetKey>,
}

/// Single-slot, reentrant mutation-admission state. One per runtime.
pub(crate) struct ChangeContext {
    state: Mutex<CtxState>,
}

impl ChangeContext {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(CtxState {
                active: None,
                depth: 0,
                pending_primary: None,
                pending_owners: IndexSet::new(),
            }),
        }
    }

    /// Enter the context for `key`.
    ///
    /// If no key is active, `key` becomes active. The depth counter is
    /// incremented unconditionally; the returned guard decrements it and
    /// clears the active key when depth returns to zero.
    pub(crate) fn enter(&self, key: TargetKey) -> ContextGuard<'_> {
        let mut state = self.state.lock();
        if state.active.is_none() {
            state.active = Some(key);
        } else if state.active != Some(key) {
            // Ignored for admission; the first gated write will surface
            // the mismatch as MutationOutsideScope.
            tracing::trace!(?key, active = ?state.active, "nested enter with different key ignored");
        }
        state.depth += 1;
        ContextGuard {
            ctx: self,
            armed: true,
        }
    }

    /// Whether `key` is the currently active key.
    pub(crate) fn is_active_key(&self, key: TargetKey) -> bool {
        self.state.lock().active == Some(key)
    }

    /// Record a pending primary notification for `key`.
    ///
    /// A no-op unless `key` is the active key, so objects outside the open
    /// scope cannot queue notifications they did not earn.
    pub(crate) fn queue_notification(&self, key: TargetKey) {
        let mut state = self.state.lock();
        if state.active == Some(key) {
            state.pending_primary = Some(key);
        }
    }

    /// Add `key` to the owner-chain pending set, unless it is the active
    /// key (whose notification is the primary one).
    pub(crate) fn queue_owner_notification(&self, key: TargetKey) {
        let mut state = self.state.lock();
        if state.active != Some(key) {
            state.pending_owners.insert(key);
        }
    }

    /// Take and clear all pending notification state: the primary slot and
    /// the owner-chain keys in first-encounter order.
    pub(crate) fn take_pending(&self) -> (Option<TargetKey>, Vec<TargetKey>) {
        let mut state = self.state.lock();
        let primary = state.pending_primary.take();
        let owners = std::mem::take(&mut state.pending_owners);
        (primary, owners.into_iter().collect())
    }

    /// Decrement depth; at zero, clear the active key. Returns whether the
    /// slot was released.
    fn exit(&self) -> bool {
        let mut state = self.state.lock();
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.active = None;
            true
        } else {
            false
        }
    }
}

/// RAII token for an entered change context.
///
/// [`ContextGuard::release`] reports whether this exit released the slot
/// (outermost scope closed); plain Drop performs the same exit for unwind
/// paths.
pub(crate) struct ContextGuard<'a> {
    ctx: &'a ChangeContext,
    armed: bool,
}

impl ContextGuard<'_> {
    /// Exit the context. Returns true when this was the outermost exit.
    pub(crate) fn release(mut self) -> bool {
        self.armed = false;
        self.ctx.exit()
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.ctx.exit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> TargetKey {
        TargetKey::new()
    }

    #[test]
    fn enter_activates_and_release_clears() {
        let ctx = ChangeContext::new();
        let a = key();

        assert!(!ctx.is_active_key(a));
        let guard = ctx.enter(a);
        assert!(ctx.is_active_key(a));
        assert!(guard.release());
        assert!(!ctx.is_active_key(a));
    }

    #[test]
    fn reentrant_same_key_releases_at_outermost_exit() {
        let ctx = ChangeContext::new();
        let a = key();

        let outer = ctx.enter(a);
        let inner = ctx.enter(a);
        assert!(!inner.release());
        assert!(ctx.is_active_key(a));
        assert!(outer.release());
        assert!(!ctx.is_active_key(a));
    }

    #[test]
    fn different_key_is_ignored_for_admission() {
        let ctx = ChangeContext::new();
        let a = key();
        let b = key();

        let outer = ctx.enter(a);
        let inner = ctx.enter(b);
        assert!(ctx.is_active_key(a));
        assert!(!ctx.is_active_key(b));
        assert!(!inner.release());
        assert!(outer.release());
    }

    #[test]
    fn drop_unwinds_the_slot() {
        let ctx = ChangeContext::new();
        let a = key();
        {
            let _guard = ctx.enter(a);
            assert!(ctx.is_active_key(a));
        }
        assert!(!ctx.is_active_key(a));
    }

    #[test]
    fn queue_notification_requires_active_key() {
        let ctx = ChangeContext::new();
        let a = key();
        let b = key();

        let guard = ctx.enter(a);
        ctx.queue_notification(b); // not active, ignored
        ctx.queue_notification(a);
        guard.release();

        let (primary, owners) = ctx.take_pending();
        assert_eq!(primary, Some(a));
        assert!(owners.is_empty());
    }

    #[test]
    fn owner_queue_skips_active_key_and_keeps_order() {
        let ctx = ChangeContext::new();
        let a = key();
        let b = key();
        let c = key();

        let guard = ctx.enter(a);
        ctx.queue_owner_notification(a); // active, skipped
        ctx.queue_owner_notification(c);
        ctx.queue_owner_notification(b);
        ctx.queue_owner_notification(c); // duplicate, kept at first position
        guard.release();

        let (primary, owners) = ctx.take_pending();
        assert_eq!(primary, None);
        assert_eq!(owners, vec![c, b]);
    }

    #[test]
    fn take_pending_clears_state() {
        let ctx = ChangeContext::new();
        let a = key();

        let guard = ctx.enter(a);
        ctx.queue_notification(a);
        guard.release();

        let _ = ctx.take_pending();
        let (primary, owners) = ctx.take_pending();
        assert_eq!(primary, None);
        assert!(owners.is_empty());
    }
}
