//! Reactive Sequence
//!
//! [`List`] is the sequence counterpart of [`Obj`]: a live, registered
//! target whose mutating operations are context-gated and batch-coalesced.
//! A multi-element splice produces one coalesced emission, not one per
//! touched index.
//!
//! Gating follows the containing graph: if the list's ultimate root is an
//! initialized object, mutators require that root to be the active change
//! context; while the graph above it is still under construction (or the
//! list is loose) mutation is unconditional.
//!
//! Insertions run the same admission pipeline as object writes: adoption,
//! element-schema assertion, cycle/foreign-owner checks and ownership
//! propagation. Removals detach what they took out.
//!
//! [`Obj`]: super::Obj

use std::cmp::Ordering;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::reactive::Signal;
use crate::runtime::RuntimeState;
use crate::schema::{self, Schema};

use super::{AnyTarget, TargetKey, Value};

pub(crate) struct ListInner {
    key: TargetKey,
    rt: Arc<RuntimeState>,
    items: RwLock<Vec<Value>>,
    elem_schema: RwLock<Option<Arc<Schema>>>,
    value_signal: Signal,
    structure_signal: Signal,
}

impl Drop for ListInner {
    fn drop(&mut self) {
        self.rt.registry.remove(&self.key);
        self.rt.owners.remove(&self.key);
    }
}

/// Handle to a live sequence target. Cloning shares state.
#[derive(Clone)]
pub struct List {
    inner: Arc<ListInner>,
}

impl List {
    pub(crate) fn new_raw(rt: &Arc<RuntimeState>) -> List {
        let key = TargetKey::new();
        let inner = Arc::new(ListInner {
            key,
            rt: Arc::clone(rt),
            items: RwLock::new(Vec::new()),
            elem_schema: RwLock::new(None),
            value_signal: Signal::new(),
            structure_signal: Signal::new(),
        });
        rt.registry.insert(key, AnyTarget::List(Arc::downgrade(&inner)));
        List { inner }
    }

    /// Build a list from plain element data, adopting nested composites.
    pub(crate) fn from_vec(rt: &Arc<RuntimeState>, items: Vec<Value>) -> List {
        let list = Self::new_raw(rt);
        {
            let mut slots = list.inner.items.write();
            for value in items {
                let value = value.adopt(rt);
                if let Some(handle) = value.as_handle() {
                    if !handle.is_identified_root() && rt.owner_of(handle.key()).is_none() {
                        rt.owners.insert(handle.key(), list.key());
                    }
                }
                slots.push(value);
            }
        }
        list
    }

    pub(crate) fn from_inner(inner: Arc<ListInner>) -> List {
        List { inner }
    }

    pub(crate) fn key(&self) -> TargetKey {
        self.inner.key
    }

    /// Whether `other` is a handle to the same target.
    pub fn same(&self, other: &List) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Read the element at `index`, registering both signals.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.value_signal.notify_read();
        self.inner.structure_signal.notify_read();
        self.inner.items.read().get(index).cloned()
    }

    /// Number of elements, registering both signals.
    pub fn len(&self) -> usize {
        self.inner.value_signal.notify_read();
        self.inner.structure_signal.notify_read();
        self.inner.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all elements, registering both signals.
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.value_signal.notify_read();
        self.inner.structure_signal.notify_read();
        self.inner.items.read().clone()
    }

    pub(crate) fn items_snapshot(&self) -> Vec<Value> {
        self.inner.items.read().clone()
    }

    pub(crate) fn set_elem_schema(&self, schema: Arc<Schema>) {
        *self.inner.elem_schema.write() = Some(schema);
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Append an element.
    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        let rt = Arc::clone(&self.inner.rt);
        let gate = rt.ensure_in_context(self.key(), "push")?;
        rt.batcher.batch(|| {
            let index = self.inner.items.read().len();
            let value = self.admit(&rt, value.into(), index)?;
            self.inner.items.write().push(value);
            self.committed(&rt, gate, true)
        })
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Result<Option<Value>> {
        let rt = Arc::clone(&self.inner.rt);
        let gate = rt.ensure_in_context(self.key(), "pop")?;
        rt.batcher.batch(|| {
            let removed = self.inner.items.write().pop();
            if let Some(value) = &removed {
                self.detach(&rt, value);
                self.committed(&rt, gate, true)?;
            }
            Ok(removed)
        })
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Result<Option<Value>> {
        let rt = Arc::clone(&self.inner.rt);
        let gate = rt.ensure_in_context(self.key(), "shift")?;
        rt.batcher.batch(|| {
            let removed = {
                let mut items = self.inner.items.write();
                if items.is_empty() {
                    None
                } else {
                    Some(items.remove(0))
                }
            };
            if let Some(value) = &removed {
                self.detach(&rt, value);
                self.committed(&rt, gate, true)?;
            }
            Ok(removed)
        })
    }

    /// Insert an element at the front.
    pub fn unshift(&self, value: impl Into<Value>) -> Result<()> {
        self.insert(0, value)
    }

    /// Insert an element at `index` (clamped to the current length).
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        let rt = Arc::clone(&self.inner.rt);
        let gate = rt.ensure_in_context(self.key(), "insert")?;
        rt.batcher.batch(|| {
            let value = self.admit(&rt, value.into(), index)?;
            {
                let mut items = self.inner.items.write();
                let at = index.min(items.len());
                items.insert(at, value);
            }
            self.committed(&rt, gate, true)
        })
    }

    /// Remove and return the element at `index`, if it exists.
    pub fn remove(&self, index: usize) -> Result<Option<Value>> {
        let rt = Arc::clone(&self.inner.rt);
        let gate = rt.ensure_in_context(self.key(), "remove")?;
        rt.batcher.batch(|| {
            let removed = {
                let mut items = self.inner.items.write();
                if index < items.len() {
                    Some(items.remove(index))
                } else {
                    None
                }
            };
            if let Some(value) = &removed {
                self.detach(&rt, value);
                self.committed(&rt, gate, true)?;
            }
            Ok(removed)
        })
    }

    /// Remove `delete_count` elements starting at `start` (both clamped)
    /// and insert `items` in their place. Returns the removed elements.
    /// All insertions are admitted before anything is mutated.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let rt = Arc::clone(&self.inner.rt);
        let gate = rt.ensure_in_context(self.key(), "splice")?;
        rt.batcher.batch(|| {
            let mut admitted = Vec::with_capacity(items.len());
            for (offset, value) in items.into_iter().enumerate() {
                admitted.push(self.admit(&rt, value, start + offset)?);
            }
            let removed: Vec<Value> = {
                let mut slots = self.inner.items.write();
                let start = start.min(slots.len());
                let end = (start + delete_count).min(slots.len());
                slots.splice(start..end, admitted).collect()
            };
            for value in &removed {
                self.detach(&rt, value);
            }
            self.committed(&rt, gate, true)?;
            Ok(removed)
        })
    }

    /// Replace the element at `index`. Returns whether a replacement
    /// happened (false when the index is out of bounds).
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<bool> {
        let rt = Arc::clone(&self.inner.rt);
        let gate = rt.ensure_in_context(self.key(), "set")?;
        rt.batcher.batch(|| {
            if index >= self.inner.items.read().len() {
                return Ok(false);
            }
            let value = self.admit(&rt, value.into(), index)?;
            let new_key = value.as_handle().map(|handle| handle.key());
            let previous = {
                let mut items = self.inner.items.write();
                if index >= items.len() {
                    drop(items);
                    self.detach(&rt, &value);
                    return Ok(false);
                }
                std::mem::replace(&mut items[index], value)
            };
            if let Some(handle) = previous.as_handle() {
                if Some(handle.key()) != new_key {
                    rt.clear_owner(handle.key());
                }
            }
            self.committed(&rt, gate, false)?;
            Ok(true)
        })
    }

    /// Sort elements with `compare`. One coalesced emission.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) -> Result<()> {
        let rt = Arc::clone(&self.inner.rt);
        let gate = rt.ensure_in_context(self.key(), "sort_by")?;
        rt.batcher.batch(|| {
            self.inner.items.write().sort_by(compare);
            self.committed(&rt, gate, false)
        })
    }

    /// Reverse the element order. One coalesced emission.
    pub fn reverse(&self) -> Result<()> {
        let rt = Arc::clone(&self.inner.rt);
        let gate = rt.ensure_in_context(self.key(), "reverse")?;
        rt.batcher.batch(|| {
            self.inner.items.write().reverse();
            self.committed(&rt, gate, false)
        })
    }

    // ------------------------------------------------------------------
    // Admission & bookkeeping
    // ------------------------------------------------------------------

    /// Run the write-path admission pipeline for one incoming element.
    fn admit(&self, rt: &Arc<RuntimeState>, value: Value, index: usize) -> Result<Value> {
        let value = value.adopt(rt);
        let elem_schema = self.inner.elem_schema.read().clone();
        if let Some(elem_schema) = &elem_schema {
            schema::assert_value(elem_schema, &value, &format!("[{index}]"))?;
        }
        if value.as_handle().is_some() {
            let path = format!("[{index}]");
            if rt.would_create_cycle(self.key(), &value)? {
                return Err(Error::OwnershipCycle { path });
            }
            if rt.has_foreign_owner(&value, self.key())? {
                return Err(Error::OwnershipViolation { path });
            }
            rt.set_owner_recursive(&value, self.key(), &path)?;
        }
        if let Some(elem_schema) = &elem_schema {
            schema::stamp_value(&value, elem_schema);
        }
        Ok(value)
    }

    fn detach(&self, rt: &Arc<RuntimeState>, value: &Value) {
        if let Some(handle) = value.as_handle() {
            rt.clear_owner(handle.key());
        }
    }

    /// Emit signals and queue pending notifications after a commit.
    fn committed(
        &self,
        rt: &Arc<RuntimeState>,
        gate: Option<TargetKey>,
        structural: bool,
    ) -> Result<()> {
        rt.batcher.emit(&self.inner.value_signal);
        if structural {
            rt.batcher.emit(&self.inner.structure_signal);
        }
        if let Some(root_key) = gate {
            rt.context.queue_notification(root_key);
        }
        rt.notify_owner_chain(self.key())
    }
}

impl Debug for List {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("List")
            .field("key", &self.inner.key)
            .field("len", &self.inner.items.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    fn loose_list(rt: &Runtime) -> List {
        let obj = rt.loose_object([("items", Value::seq(Vec::<Value>::new()))]);
        obj.get("items").unwrap().as_list().unwrap()
    }

    #[test]
    fn push_pop_roundtrip() {
        let rt = Runtime::new();
        let list = loose_list(&rt);

        list.push(1).unwrap();
        list.push(2).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.pop().unwrap(), Some(Value::Int(2)));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn shift_and_unshift_work_at_the_front() {
        let rt = Runtime::new();
        let list = loose_list(&rt);

        list.push("b").unwrap();
        list.unshift("a").unwrap();
        assert_eq!(list.get(0).unwrap().as_str(), Some("a"));
        assert_eq!(list.shift().unwrap(), Some(Value::from("a")));
        assert_eq!(list.get(0).unwrap().as_str(), Some("b"));
    }

    #[test]
    fn splice_replaces_a_range() {
        let rt = Runtime::new();
        let list = loose_list(&rt);
        for n in [1, 2, 3, 4] {
            list.push(n).unwrap();
        }

        let removed = list
            .splice(1, 2, vec![Value::from(9), Value::from(8)])
            .unwrap();
        assert_eq!(removed, vec![Value::Int(2), Value::Int(3)]);
        let values: Vec<_> = list.to_vec().iter().filter_map(Value::as_int).collect();
        assert_eq!(values, vec![1, 9, 8, 4]);
    }

    #[test]
    fn sort_and_reverse_reorder_in_place() {
        let rt = Runtime::new();
        let list = loose_list(&rt);
        for n in [3, 1, 2] {
            list.push(n).unwrap();
        }

        list.sort_by(|a, b| a.as_int().cmp(&b.as_int())).unwrap();
        let values: Vec<_> = list.to_vec().iter().filter_map(Value::as_int).collect();
        assert_eq!(values, vec![1, 2, 3]);

        list.reverse().unwrap();
        let values: Vec<_> = list.to_vec().iter().filter_map(Value::as_int).collect();
        assert_eq!(values, vec![3, 2, 1]);
    }

    #[test]
    fn removed_elements_are_detached() {
        let rt = Runtime::new();
        let list = loose_list(&rt);
        list.push(Value::record([("x", 1)])).unwrap();

        let removed = list.pop().unwrap().unwrap();
        let other = rt.loose_object::<&str, Value, _>([]);
        other.set("adopted", removed).unwrap();
        assert!(other.get("adopted").is_some());
    }

    #[test]
    fn nested_elements_cannot_be_aliased() {
        let rt = Runtime::new();
        let list = loose_list(&rt);
        list.push(Value::record([("x", 1)])).unwrap();

        let element = list.get(0).unwrap();
        let other = rt.loose_object::<&str, Value, _>([]);
        let err = other.set("stolen", element).unwrap_err();
        assert!(matches!(err, Error::OwnershipViolation { .. }));
    }

    #[test]
    fn out_of_bounds_set_is_a_no_op() {
        let rt = Runtime::new();
        let list = loose_list(&rt);
        list.push(1).unwrap();

        assert!(!list.set(5, 9).unwrap());
        assert!(list.set(0, 9).unwrap());
        assert_eq!(list.get(0).unwrap().as_int(), Some(9));
    }
}
