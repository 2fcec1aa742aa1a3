//! Live Objects
//!
//! This module holds the object layer of the runtime: the value model,
//! object identity, the reactive wrappers ([`Obj`], [`List`]) and the
//! ownership graph that binds nested targets to exactly one owning root.
//!
//! Every backing target (object or list) is identified by a [`TargetKey`],
//! a process-unique key used by the runtime's registry and the ownership
//! side-table. Keys are never reused and never exposed to callers.

mod id;
mod list;
mod obj;
pub(crate) mod owner;
mod value;

pub use id::ObjectId;
pub use list::List;
pub use obj::Obj;
pub use value::{Ref, Value};

pub(crate) use list::ListInner;
pub(crate) use obj::{ObjInner, RootIdentity};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

/// Process-unique key identifying one backing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TargetKey(u64);

impl TargetKey {
    /// Generate a new unique key.
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Weak registry entry for a target. The registry must never keep a
/// target alive; strong handles do that.
pub(crate) enum AnyTarget {
    Obj(Weak<ObjInner>),
    List(Weak<ListInner>),
}

impl AnyTarget {
    pub(crate) fn upgrade(&self) -> Option<TargetHandle> {
        match self {
            AnyTarget::Obj(weak) => weak.upgrade().map(|inner| TargetHandle::Obj(Obj::from_inner(inner))),
            AnyTarget::List(weak) => weak.upgrade().map(|inner| TargetHandle::List(List::from_inner(inner))),
        }
    }
}

/// Strong handle to either kind of target, used by graph walks.
#[derive(Clone)]
pub(crate) enum TargetHandle {
    Obj(Obj),
    List(List),
}

impl TargetHandle {
    pub(crate) fn key(&self) -> TargetKey {
        match self {
            TargetHandle::Obj(obj) => obj.key(),
            TargetHandle::List(list) => list.key(),
        }
    }

    /// Whether this target carries independent root identity.
    pub(crate) fn is_identified_root(&self) -> bool {
        match self {
            TargetHandle::Obj(obj) => obj.is_root_untracked(),
            TargetHandle::List(_) => false,
        }
    }

    /// Snapshot of the structured children of this target: property
    /// values (plus the metadata sub-object) or sequence elements.
    pub(crate) fn child_values(&self) -> Vec<Value> {
        match self {
            TargetHandle::Obj(obj) => obj.child_values_untracked(),
            TargetHandle::List(list) => list.items_snapshot(),
        }
    }
}
