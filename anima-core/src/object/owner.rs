//! Ownership Graph
//!
//! Every nested target carries a back-reference to the target that
//! contains it, stored in a side-table keyed by target identity — never on
//! the target itself, so ownership bookkeeping cannot leak into equality
//! or serialization and cannot keep a target alive.
//!
//! The invariants enforced here keep the live object graph a forest:
//!
//! - a plain nested target has at most one owner at any time; giving it a
//!   second one is rejected unless the previous owner is being explicitly
//!   carried over,
//! - a target carrying root identity may be re-owned freely (embedding a
//!   root moves its whole subtree with it),
//! - an assignment that would make a target reachable from itself is
//!   rejected before any mutation happens.
//!
//! A node's *root* is the nearest ancestor (or itself) carrying root
//! identity. A root stays self-rooted even while nested inside another
//! root, which is how a mutation deep inside document B embedded in
//! document A notifies both B and A exactly once each.
//!
//! All walks are cycle-safe via visited sets and additionally bounded by
//! [`MAX_OWNER_DEPTH`] as a defensive backstop against a corrupt table.

use std::collections::HashSet;

use smallvec::SmallVec;

use crate::error::{Error, Result, MAX_OWNER_DEPTH};
use crate::runtime::RuntimeState;

use super::{Obj, TargetHandle, TargetKey, Value};

/// Result of resolving a target's ultimate root.
pub(crate) enum ResolvedRoot {
    /// Nearest ancestor (or self) carrying root identity.
    Root(Obj),
    /// The owner chain ended at a target with no identity; mutation of
    /// anything beneath it is not context-gated.
    Loose(TargetKey),
}

impl ResolvedRoot {
    pub(crate) fn key(&self) -> TargetKey {
        match self {
            ResolvedRoot::Root(obj) => obj.key(),
            ResolvedRoot::Loose(key) => *key,
        }
    }
}

impl RuntimeState {
    /// The owner of `key`, if any.
    pub(crate) fn owner_of(&self, key: TargetKey) -> Option<TargetKey> {
        self.owners.get(&key).map(|entry| *entry.value())
    }

    /// Detach `key` from its owner.
    pub(crate) fn clear_owner(&self, key: TargetKey) {
        self.owners.remove(&key);
    }

    /// Upgrade a registry entry to a strong handle.
    pub(crate) fn resolve_handle(&self, key: TargetKey) -> Option<TargetHandle> {
        self.registry.get(&key).and_then(|entry| entry.value().upgrade())
    }

    /// Walk the owner chain upward until a target carrying root identity
    /// is found. A target that is itself a root resolves to itself,
    /// regardless of any owner pointer it may also have.
    pub(crate) fn resolve_root(&self, key: TargetKey) -> Result<ResolvedRoot> {
        let mut current = key;
        for _ in 0..=MAX_OWNER_DEPTH {
            if let Some(TargetHandle::Obj(obj)) = self.resolve_handle(current) {
                if obj.is_root_untracked() {
                    return Ok(ResolvedRoot::Root(obj));
                }
            }
            match self.owner_of(current) {
                Some(parent) => current = parent,
                None => return Ok(ResolvedRoot::Loose(current)),
            }
        }
        Err(Error::OwnerDepthExceeded)
    }

    /// Whether attaching `value` beneath `target` would make `target` (or
    /// the root it hangs off) reachable from its own subtree.
    ///
    /// Reference tokens are not followed: cross-root reference cycles are
    /// legal, only ownership must stay acyclic.
    pub(crate) fn would_create_cycle(&self, target: TargetKey, value: &Value) -> Result<bool> {
        let root_key = self.resolve_root(target)?.key();
        let mut visited: HashSet<TargetKey> = HashSet::new();
        let mut stack: Vec<TargetHandle> = value.as_handle().into_iter().collect();
        while let Some(handle) = stack.pop() {
            let key = handle.key();
            if !visited.insert(key) {
                continue;
            }
            if key == target || key == root_key {
                return Ok(true);
            }
            for child in handle.child_values() {
                if let Some(child_handle) = child.as_handle() {
                    stack.push(child_handle);
                }
            }
        }
        Ok(false)
    }

    /// Whether any node reachable from `value` is owned by an identified
    /// root other than `target`'s root.
    ///
    /// Such a value aliases substructure across independent roots and must
    /// be deep-copied before it can be attached. The walk does not descend
    /// through identified roots: a root carries its subtree wholesale, so
    /// only the root's own owner matters.
    pub(crate) fn has_foreign_owner(&self, value: &Value, target: TargetKey) -> Result<bool> {
        let target_root = self.resolve_root(target)?.key();
        let mut visited: HashSet<TargetKey> = HashSet::new();
        let mut stack: Vec<TargetHandle> = value.as_handle().into_iter().collect();
        while let Some(handle) = stack.pop() {
            let key = handle.key();
            if !visited.insert(key) {
                continue;
            }
            if let Some(owner) = self.owner_of(key) {
                if let ResolvedRoot::Root(root) = self.resolve_root(owner)? {
                    if root.key() != target_root {
                        tracing::debug!(?key, foreign_root = ?root.key(), "foreign-owned value rejected");
                        return Ok(true);
                    }
                }
            }
            if handle.is_identified_root() {
                continue;
            }
            for child in handle.child_values() {
                if let Some(child_handle) = child.as_handle() {
                    stack.push(child_handle);
                }
            }
        }
        Ok(false)
    }

    /// Record `owner` as the owner of `value` and of every structured node
    /// beneath it.
    ///
    /// Admission per node: targets carrying root identity are re-owned
    /// unconditionally; plain targets are admitted only when unowned,
    /// already owned by the same owner, or previously owned by the root
    /// being re-embedded at the top of this call.
    pub(crate) fn set_owner_recursive(
        &self,
        value: &Value,
        owner: TargetKey,
        path: &str,
    ) -> Result<()> {
        let allowed_previous = value
            .as_handle()
            .filter(TargetHandle::is_identified_root)
            .map(|handle| handle.key());
        let mut visited: HashSet<TargetKey> = HashSet::new();
        self.set_owner_inner(value, owner, allowed_previous, &mut visited, path)
    }

    fn set_owner_inner(
        &self,
        value: &Value,
        owner: TargetKey,
        allowed_previous: Option<TargetKey>,
        visited: &mut HashSet<TargetKey>,
        path: &str,
    ) -> Result<()> {
        let Some(handle) = value.as_handle() else {
            return Ok(());
        };
        let key = handle.key();
        if !visited.insert(key) {
            return Ok(());
        }
        if !handle.is_identified_root() {
            match self.owner_of(key) {
                None => {}
                Some(current) if current == owner => {}
                Some(current) if Some(current) == allowed_previous => {}
                Some(current) => {
                    tracing::debug!(?key, ?current, attempted = ?owner, "dual ownership rejected");
                    return Err(Error::OwnershipViolation {
                        path: path.to_string(),
                    });
                }
            }
        }
        self.owners.insert(key, owner);
        for child in handle.child_values() {
            self.set_owner_inner(&child, key, allowed_previous, visited, path)?;
        }
        Ok(())
    }

    /// Walk the owner chain upward from `key`, queueing an owner-chain
    /// notification for the root of every owner encountered.
    pub(crate) fn notify_owner_chain(&self, key: TargetKey) -> Result<()> {
        let mut hops: SmallVec<[TargetKey; 8]> = SmallVec::new();
        let mut current = key;
        loop {
            if hops.len() > MAX_OWNER_DEPTH {
                return Err(Error::OwnerDepthExceeded);
            }
            let Some(owner) = self.owner_of(current) else {
                break;
            };
            if let ResolvedRoot::Root(root) = self.resolve_root(owner)? {
                self.context.queue_owner_notification(root.key());
            }
            hops.push(owner);
            current = owner;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::object::Value;
    use crate::runtime::Runtime;
    use crate::error::Error;

    #[test]
    fn plain_nested_value_cannot_gain_second_owner() {
        let rt = Runtime::new();
        let first = rt.loose_object([("child", Value::record([("x", 1)]))]);
        let second = rt.loose_object::<&str, Value, _>([]);

        let child = first.get("child").unwrap();
        let err = second.set("stolen", child).unwrap_err();
        assert!(matches!(err, Error::OwnershipViolation { .. }));
        assert!(second.get("stolen").is_none());
    }

    #[test]
    fn reattachment_after_detach_is_allowed() {
        let rt = Runtime::new();
        let first = rt.loose_object([("child", Value::record([("x", 1)]))]);
        let second = rt.loose_object::<&str, Value, _>([]);

        let child = first.remove("child").unwrap().unwrap();
        second.set("adopted", child).unwrap();
        assert!(second.get("adopted").is_some());
    }

    #[test]
    fn self_assignment_is_a_cycle() {
        let rt = Runtime::new();
        let obj = rt.loose_object([("x", 1)]);

        let err = obj.set("me", obj.clone()).unwrap_err();
        assert!(matches!(err, Error::OwnershipCycle { .. }));
        assert!(obj.get("me").is_none());
    }

    #[test]
    fn nested_cycle_is_detected_before_mutation() {
        let rt = Runtime::new();
        let obj = rt.loose_object([("x", 1)]);

        // Wrap the object one level deep inside a plain record.
        let wrapper = Value::record([("inner", Value::Object(obj.clone()))]);
        let err = obj.set("loop", wrapper).unwrap_err();
        assert!(matches!(err, Error::OwnershipCycle { .. }));
        assert!(obj.get("loop").is_none());
    }

    #[test]
    fn same_owner_reassignment_is_permitted() {
        let rt = Runtime::new();
        let obj = rt.loose_object([("child", Value::record([("x", 1)]))]);

        // Re-assigning the same value to the same parent is not a second owner.
        let child = obj.get("child").unwrap();
        obj.set("child", child).unwrap();
        assert!(obj.get("child").is_some());
    }
}
