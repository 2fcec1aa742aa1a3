//! Reactive Object Wrapper
//!
//! [`Obj`] is the interception layer in front of a backing record. Every
//! read and write a caller performs goes through it, never against the raw
//! storage.
//!
//! # Read path
//!
//! Reading a property registers *both* per-target signals (value and
//! structure) as read dependencies and returns the stored value. Identity
//! and metadata accessors (`id`, `type_name`, `meta`, relation endpoints)
//! are computed lookups, not raw value reads, so they register only the
//! structure signal — as does `contains_key`, which is a shape question.
//! Reads are always legal; no change scope is required.
//!
//! # Write path
//!
//! A write runs inside one batch scope and performs, in order: adoption of
//! plain composites into live targets, schema assertion against the local
//! property schema, cycle and foreign-owner checks, ownership propagation,
//! sub-schema stamping, the commit, and coalesced signal emission. Every
//! step before the commit can reject the operation, in which case nothing
//! has been written.
//!
//! Writes on a target whose ultimate root is an initialized object are
//! admitted only when that root is the active change context.

use std::fmt::Debug;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::reactive::Signal;
use crate::runtime::RuntimeState;
use crate::schema::{self, Schema};

use super::{AnyTarget, ObjectId, Ref, TargetKey, Value};

/// Identity carried by a root target.
#[derive(Debug, Clone)]
pub(crate) struct RootIdentity {
    pub(crate) id: ObjectId,
    pub(crate) type_name: Option<String>,
    pub(crate) source: Option<Ref>,
    pub(crate) target: Option<Ref>,
}

pub(crate) struct ObjInner {
    key: TargetKey,
    rt: Arc<RuntimeState>,
    props: RwLock<IndexMap<String, Value>>,
    root: RwLock<Option<RootIdentity>>,
    meta: RwLock<Option<Obj>>,
    schema: RwLock<Option<Arc<Schema>>>,
    value_signal: Signal,
    structure_signal: Signal,
    changed: Signal,
}

impl Drop for ObjInner {
    fn drop(&mut self) {
        self.rt.registry.remove(&self.key);
        self.rt.owners.remove(&self.key);
    }
}

enum WriteKind {
    Set,
    Define,
}

/// Handle to a live object target.
///
/// Cloning shares state: two handles to the same target are
/// indistinguishable, which is what gives repeated reads of a nested
/// property referential stability.
#[derive(Clone)]
pub struct Obj {
    inner: Arc<ObjInner>,
}

impl Obj {
    pub(crate) fn new_raw(rt: &Arc<RuntimeState>) -> Obj {
        let key = TargetKey::new();
        let inner = Arc::new(ObjInner {
            key,
            rt: Arc::clone(rt),
            props: RwLock::new(IndexMap::new()),
            root: RwLock::new(None),
            meta: RwLock::new(None),
            schema: RwLock::new(None),
            value_signal: Signal::new(),
            structure_signal: Signal::new(),
            changed: Signal::new(),
        });
        rt.registry.insert(key, AnyTarget::Obj(Arc::downgrade(&inner)));
        Obj { inner }
    }

    /// Build a target from plain property data, adopting nested
    /// composites. Fresh, unowned children are bound to this target;
    /// identified roots and already-owned values are left as references.
    pub(crate) fn from_map(rt: &Arc<RuntimeState>, map: IndexMap<String, Value>) -> Obj {
        let obj = Self::new_raw(rt);
        {
            let mut props = obj.inner.props.write();
            for (key, value) in map {
                let value = value.adopt(rt);
                if let Some(handle) = value.as_handle() {
                    if !handle.is_identified_root() && rt.owner_of(handle.key()).is_none() {
                        rt.owners.insert(handle.key(), obj.key());
                    }
                }
                props.insert(key, value);
            }
        }
        obj
    }

    pub(crate) fn from_inner(inner: Arc<ObjInner>) -> Obj {
        Obj { inner }
    }

    pub(crate) fn key(&self) -> TargetKey {
        self.inner.key
    }

    pub(crate) fn runtime(&self) -> &Arc<RuntimeState> {
        &self.inner.rt
    }

    /// Whether `other` is a handle to the same target.
    pub fn same(&self, other: &Obj) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Read a property, registering both signals as read dependencies.
    pub fn get(&self, prop: &str) -> Option<Value> {
        self.inner.value_signal.notify_read();
        self.inner.structure_signal.notify_read();
        self.inner.props.read().get(prop).cloned()
    }

    /// Read a property without registering dependencies.
    pub fn get_untracked(&self, prop: &str) -> Option<Value> {
        self.inner.props.read().get(prop).cloned()
    }

    /// Enumerate property names, registering both signals.
    pub fn keys(&self) -> Vec<String> {
        self.inner.value_signal.notify_read();
        self.inner.structure_signal.notify_read();
        self.inner.props.read().keys().cloned().collect()
    }

    /// Number of properties, registering both signals.
    pub fn len(&self) -> usize {
        self.inner.value_signal.notify_read();
        self.inner.structure_signal.notify_read();
        self.inner.props.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shape query: registers only the structure signal, so it is not
    /// invalidated by unrelated value writes.
    pub fn contains_key(&self, prop: &str) -> bool {
        self.inner.structure_signal.notify_read();
        self.inner.props.read().contains_key(prop)
    }

    /// The root id, if this target carries identity. Structure read.
    pub fn id(&self) -> Option<ObjectId> {
        self.inner.structure_signal.notify_read();
        self.inner.root.read().as_ref().map(|r| r.id.clone())
    }

    /// The declared type name, if any. Structure read.
    pub fn type_name(&self) -> Option<String> {
        self.inner.structure_signal.notify_read();
        self.inner.root.read().as_ref().and_then(|r| r.type_name.clone())
    }

    /// The metadata sub-object, if any. Structure read.
    pub fn meta(&self) -> Option<Obj> {
        self.inner.structure_signal.notify_read();
        self.inner.meta.read().clone()
    }

    /// Relation source endpoint, if this root is a relation. Structure read.
    pub fn relation_source(&self) -> Option<Ref> {
        self.inner.structure_signal.notify_read();
        self.inner.root.read().as_ref().and_then(|r| r.source.clone())
    }

    /// Relation target endpoint, if this root is a relation. Structure read.
    pub fn relation_target(&self) -> Option<Ref> {
        self.inner.structure_signal.notify_read();
        self.inner.root.read().as_ref().and_then(|r| r.target.clone())
    }

    /// Whether this target carries root identity. Structure read.
    pub fn is_root(&self) -> bool {
        self.inner.structure_signal.notify_read();
        self.is_root_untracked()
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Assign a property value.
    pub fn set(&self, prop: &str, value: impl Into<Value>) -> Result<()> {
        self.write_op("set", prop, value.into(), WriteKind::Set)
    }

    /// Structurally (re)define a property. Follows the same validation
    /// path as [`Obj::set`] but notifies only the structure signal.
    pub fn define(&self, prop: &str, value: impl Into<Value>) -> Result<()> {
        self.write_op("define", prop, value.into(), WriteKind::Define)
    }

    /// Remove a property, detaching any owned substructure it held.
    pub fn remove(&self, prop: &str) -> Result<Option<Value>> {
        let rt = Arc::clone(&self.inner.rt);
        let gate = rt.ensure_in_context(self.key(), "remove")?;
        rt.batcher.batch(|| {
            let removed = self.inner.props.write().shift_remove(prop);
            if let Some(value) = &removed {
                if let Some(handle) = value.as_handle() {
                    rt.clear_owner(handle.key());
                }
                rt.batcher.emit(&self.inner.structure_signal);
                if let Some(root_key) = gate {
                    rt.context.queue_notification(root_key);
                }
                rt.notify_owner_chain(self.key())?;
            }
            Ok(removed)
        })
    }

    fn write_op(&self, op: &'static str, prop: &str, value: Value, kind: WriteKind) -> Result<()> {
        let rt = Arc::clone(&self.inner.rt);
        let gate = rt.ensure_in_context(self.key(), op)?;
        rt.batcher.batch(|| self.write_inner(&rt, gate, prop, value, kind))
    }

    fn write_inner(
        &self,
        rt: &Arc<RuntimeState>,
        gate: Option<TargetKey>,
        prop: &str,
        value: Value,
        kind: WriteKind,
    ) -> Result<()> {
        // Plain composites become live targets before anything else looks
        // at them.
        let value = value.adopt(rt);

        // Assert against the local property schema; a failure rejects the
        // whole operation with nothing written.
        let mut stamp: Option<Schema> = None;
        if let Some(local) = self.inner.schema.read().clone() {
            if let Some(prop_schema) = schema::property_schema(&local, prop)? {
                schema::assert_value(&prop_schema, &value, prop)?;
                stamp = Some(prop_schema);
            }
        }

        // Ownership: reject cycles and cross-root aliasing, then bind the
        // new substructure to this target.
        if value.as_handle().is_some() {
            if rt.would_create_cycle(self.key(), &value)? {
                return Err(Error::OwnershipCycle {
                    path: prop.to_string(),
                });
            }
            if rt.has_foreign_owner(&value, self.key())? {
                return Err(Error::OwnershipViolation {
                    path: prop.to_string(),
                });
            }
            rt.set_owner_recursive(&value, self.key(), prop)?;
        }

        // Stamp the property schema onto the new value so deeper writes
        // validate against their local schema.
        if let Some(prop_schema) = &stamp {
            schema::stamp_value(&value, prop_schema);
        }

        let new_key = value.as_handle().map(|handle| handle.key());
        let (added, previous) = {
            let mut props = self.inner.props.write();
            let added = !props.contains_key(prop);
            let previous = props.insert(prop.to_string(), value);
            (added, previous)
        };

        // Replacement detaches the previous substructure.
        if let Some(previous) = previous {
            if let Some(handle) = previous.as_handle() {
                if Some(handle.key()) != new_key {
                    rt.clear_owner(handle.key());
                }
            }
        }

        match kind {
            WriteKind::Set => {
                rt.batcher.emit(&self.inner.value_signal);
                if added {
                    rt.batcher.emit(&self.inner.structure_signal);
                }
            }
            WriteKind::Define => {
                rt.batcher.emit(&self.inner.structure_signal);
            }
        }

        if let Some(root_key) = gate {
            rt.context.queue_notification(root_key);
        }
        rt.notify_owner_chain(self.key())?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Crate-internal accessors
    // ------------------------------------------------------------------

    pub(crate) fn is_root_untracked(&self) -> bool {
        self.inner.root.read().is_some()
    }

    pub(crate) fn id_untracked(&self) -> Option<ObjectId> {
        self.inner.root.read().as_ref().map(|r| r.id.clone())
    }

    pub(crate) fn identity_snapshot(&self) -> Option<RootIdentity> {
        self.inner.root.read().clone()
    }

    pub(crate) fn props_snapshot(&self) -> IndexMap<String, Value> {
        self.inner.props.read().clone()
    }

    pub(crate) fn meta_untracked(&self) -> Option<Obj> {
        self.inner.meta.read().clone()
    }

    pub(crate) fn schema_untracked(&self) -> Option<Arc<Schema>> {
        self.inner.schema.read().clone()
    }

    pub(crate) fn child_values_untracked(&self) -> Vec<Value> {
        let mut children: Vec<Value> = self.inner.props.read().values().cloned().collect();
        if let Some(meta) = self.inner.meta.read().clone() {
            children.push(Value::Object(meta));
        }
        children
    }

    pub(crate) fn set_schema(&self, schema: Arc<Schema>) {
        *self.inner.schema.write() = Some(schema);
    }

    pub(crate) fn set_meta(&self, meta: Obj) {
        *self.inner.meta.write() = Some(meta);
    }

    /// Assign root identity. From this point on the target is
    /// context-gated and carries event capability.
    pub(crate) fn initialize_root(&self, identity: RootIdentity) {
        *self.inner.root.write() = Some(identity);
    }

    pub(crate) fn changed_signal(&self) -> Signal {
        self.inner.changed.clone()
    }

    pub(crate) fn emit_changed(&self) {
        self.inner.changed.emit();
    }
}

impl Debug for Obj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Obj")
            .field("key", &self.inner.key)
            .field("id", &self.id_untracked())
            .field("props", &self.inner.props.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::ReadScope;
    use crate::runtime::Runtime;

    #[test]
    fn repeated_reads_return_the_same_handle() {
        let rt = Runtime::new();
        let obj = rt.loose_object([("nested", Value::record([("x", 1)]))]);

        let first = obj.get("nested").unwrap().as_object().unwrap();
        let second = obj.get("nested").unwrap().as_object().unwrap();
        assert!(first.same(&second));
    }

    #[test]
    fn deep_chains_resolve_through_live_handles() {
        let rt = Runtime::new();
        let obj = rt.loose_object([(
            "a",
            Value::record([("b", Value::record([("c", 7)]))]),
        )]);

        let a = obj.get("a").unwrap().as_object().unwrap();
        let b = a.get("b").unwrap().as_object().unwrap();
        assert_eq!(b.get("c").unwrap().as_int(), Some(7));
    }

    #[test]
    fn get_registers_both_signals() {
        let rt = Runtime::new();
        let obj = rt.loose_object([("x", 1)]);

        let scope = ReadScope::enter();
        let _ = obj.get("x");
        let captured = ReadScope::captured();
        drop(scope);
        assert_eq!(captured.len(), 2);
    }

    #[test]
    fn contains_key_registers_only_the_structure_signal() {
        let rt = Runtime::new();
        let obj = rt.loose_object([("x", 1)]);

        let scope = ReadScope::enter();
        let _ = obj.contains_key("x");
        let captured = ReadScope::captured();
        drop(scope);
        assert_eq!(captured.len(), 1);
    }

    #[test]
    fn set_replaces_and_detaches_previous_value() {
        let rt = Runtime::new();
        let obj = rt.loose_object([("child", Value::record([("x", 1)]))]);
        let old_child = obj.get("child").unwrap();

        obj.set("child", Value::record([("y", 2)])).unwrap();

        // The detached substructure can be attached elsewhere now.
        let other = rt.loose_object::<&str, Value, _>([]);
        other.set("adopted", old_child).unwrap();
        assert!(other.get("adopted").is_some());
    }

    #[test]
    fn remove_returns_the_previous_value() {
        let rt = Runtime::new();
        let obj = rt.loose_object([("x", 5)]);

        let removed = obj.remove("x").unwrap();
        assert_eq!(removed, Some(Value::Int(5)));
        assert!(obj.get("x").is_none());
        assert_eq!(obj.remove("x").unwrap(), None);
    }

    #[test]
    fn loose_objects_mutate_without_a_scope() {
        let rt = Runtime::new();
        let obj = rt.loose_object::<&str, Value, _>([]);
        obj.set("free", true).unwrap();
        assert_eq!(obj.get("free").unwrap().as_bool(), Some(true));
    }
}
