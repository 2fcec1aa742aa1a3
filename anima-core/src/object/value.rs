//! Value Model
//!
//! [`Value`] is everything that can sit in a property slot or a sequence
//! element. Composite values come in two forms: *plain* (`Map`, `Seq`),
//! which are inert data a caller builds up freely, and *live* (`Object`,
//! `List`), which are backed by registered targets with identity, signals
//! and an entry in the ownership graph.
//!
//! Plain composites are adopted into live targets the moment they are
//! written into the object graph. Adoption (rather than lazy wrapping on
//! read) is what gives every nested node the stable identity the
//! ownership side-table keys on; dependency tracking stays lazy, per
//! read.
//!
//! A [`Ref`] is an external pointer token: it names another root by id and
//! is never followed by graph walks, which is what keeps ownership
//! acyclic while still allowing reference cycles between roots.

use std::sync::Arc;

use indexmap::IndexMap;

use super::{List, Obj, ObjectId, TargetHandle};
use crate::runtime::RuntimeState;

/// External reference token: points at a root object by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ref {
    /// Id of the referenced root object.
    pub id: ObjectId,
}

impl Ref {
    /// A reference to the root with the given id.
    pub fn to(id: ObjectId) -> Self {
        Self { id }
    }
}

/// A value in the object graph.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Plain sequence, not yet adopted into a reactive list.
    Seq(Vec<Value>),
    /// Plain record, not yet adopted into a backing target.
    Map(IndexMap<String, Value>),
    /// Live reactive sequence.
    List(List),
    /// Live object target (root or nested).
    Object(Obj),
    /// External pointer to another root, never followed by graph walks.
    Ref(Ref),
}

impl Value {
    /// Build a plain record value.
    pub fn record<K, V, I>(entries: I) -> Value
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a plain sequence value.
    pub fn seq<V, I>(items: I) -> Value
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::Seq(items.into_iter().map(Into::into).collect())
    }

    /// Convert plain composites into live targets, recursively.
    pub(crate) fn adopt(self, rt: &Arc<RuntimeState>) -> Value {
        match self {
            Value::Seq(items) => Value::List(List::from_vec(rt, items)),
            Value::Map(map) => Value::Object(Obj::from_map(rt, map)),
            other => other,
        }
    }

    /// Strong handle if this value is a live target.
    pub(crate) fn as_handle(&self) -> Option<TargetHandle> {
        match self {
            Value::Object(obj) => Some(TargetHandle::Obj(obj.clone())),
            Value::List(list) => Some(TargetHandle::List(list.clone())),
            _ => None,
        }
    }

    /// Structural copy of this value as plain, unowned data.
    ///
    /// Live objects and lists become plain records and sequences with
    /// every nested node copied; reference tokens are copied as tokens.
    /// This is the escape hatch for attaching substructure that is owned
    /// elsewhere.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Object(obj) => Value::Map(
                obj.props_snapshot()
                    .into_iter()
                    .map(|(k, v)| (k, v.deep_copy()))
                    .collect(),
            ),
            Value::List(list) => Value::Seq(
                list.items_snapshot()
                    .into_iter()
                    .map(|v| v.deep_copy())
                    .collect(),
            ),
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.deep_copy()))
                    .collect(),
            ),
            Value::Seq(items) => Value::Seq(items.iter().map(|v| v.deep_copy()).collect()),
            other => other.clone(),
        }
    }

    /// Short label for error messages.
    pub fn type_label(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "record",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Ref(_) => "reference",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<Obj> {
        match self {
            Value::Object(obj) => Some(obj.clone()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<List> {
        match self {
            Value::List(list) => Some(list.clone()),
            _ => None,
        }
    }

    pub fn as_ref_token(&self) -> Option<&Ref> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            // Live targets compare by identity.
            (Value::List(a), Value::List(b)) => a.same(b),
            (Value::Object(a), Value::Object(b)) => a.same(b),
            (Value::Ref(a), Value::Ref(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Seq(v)
    }
}

impl From<Ref> for Value {
    fn from(v: Ref) -> Self {
        Value::Ref(v)
    }
}

impl From<Obj> for Value {
    fn from(v: Obj) -> Self {
        Value::Object(v)
    }
}

impl From<&Obj> for Value {
    fn from(v: &Obj) -> Self {
        Value::Object(v.clone())
    }
}

impl From<List> for Value {
    fn from(v: List) -> Self {
        Value::List(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_builder_preserves_order() {
        let value = Value::record([("b", 1), ("a", 2)]);
        match value {
            Value::Map(map) => {
                let keys: Vec<_> = map.keys().cloned().collect();
                assert_eq!(keys, vec!["b", "a"]);
            }
            other => panic!("expected record, got {}", other.type_label()),
        }
    }

    #[test]
    fn plain_values_compare_structurally() {
        assert_eq!(Value::from("x"), Value::from("x"));
        assert_eq!(
            Value::record([("a", 1)]),
            Value::record([("a", 1)]),
        );
        assert_ne!(Value::from(1), Value::from(2));
        assert_ne!(Value::from(1), Value::from(1.0));
    }

    #[test]
    fn deep_copy_of_plain_data_is_structural() {
        let value = Value::record([
            ("name", Value::from("a")),
            ("tags", Value::seq(["x", "y"])),
        ]);
        let copy = value.deep_copy();
        assert_eq!(value, copy);
    }

    #[test]
    fn as_float_widens_ints() {
        assert_eq!(Value::from(2).as_float(), Some(2.0));
        assert_eq!(Value::from(2.5).as_float(), Some(2.5));
        assert_eq!(Value::from("x").as_float(), None);
    }
}
