//! Serialization
//!
//! Two projections of a live object: a structural clone (a new, unowned
//! target with copied data) and a canonical JSON form.
//!
//! Both are shallow over references: a property whose value is another
//! identified root (or an explicit reference token) is copied/serialized
//! as a pointer, never followed. Ownership must be acyclic, but cross-root
//! references may form cycles — externalizing them is what keeps the JSON
//! projection finite and acyclic.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::object::{Obj, ObjectId, RootIdentity, Value};
use crate::schema;

/// Options for [`clone_object`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CloneOptions {
    /// Keep the source's id instead of generating a fresh one.
    pub retain_id: bool,
    /// Also clone referenced roots instead of sharing them. Referenced
    /// roots always receive fresh ids.
    pub deep: bool,
}

/// Structural copy of an object.
///
/// Copies every enumerable property of the unwrapped target; values that
/// are identified roots are copied by reference unless `deep` is set.
/// Metadata and root identity (type, relation endpoints) are carried over.
/// The clone starts unowned, whatever the source's position in a graph.
pub fn clone_object(obj: &Obj, options: CloneOptions) -> Obj {
    let rt = Arc::clone(obj.runtime());

    let props: IndexMap<String, Value> = obj
        .props_snapshot()
        .into_iter()
        .map(|(key, value)| (key, clone_value(&value, options)))
        .collect();
    let clone = Obj::from_map(&rt, props);

    if let Some(meta) = obj.meta_untracked() {
        let meta_props: IndexMap<String, Value> = meta
            .props_snapshot()
            .into_iter()
            .map(|(key, value)| (key, clone_value(&value, options)))
            .collect();
        let meta_clone = Obj::from_map(&rt, meta_props);
        rt.owners.insert(meta_clone.key(), clone.key());
        clone.set_meta(meta_clone);
    }

    if let Some(identity) = obj.identity_snapshot() {
        let id = if options.retain_id {
            identity.id
        } else {
            ObjectId::random()
        };
        clone.initialize_root(RootIdentity {
            id,
            type_name: identity.type_name,
            source: identity.source,
            target: identity.target,
        });
    }

    if let Some(declared) = obj.schema_untracked() {
        schema::stamp_value(&Value::Object(clone.clone()), &declared);
    }

    clone
}

fn clone_value(value: &Value, options: CloneOptions) -> Value {
    match value {
        Value::Object(obj) if obj.is_root_untracked() => {
            if options.deep {
                Value::Object(clone_object(
                    obj,
                    CloneOptions {
                        retain_id: false,
                        deep: true,
                    },
                ))
            } else {
                Value::Object(obj.clone())
            }
        }
        Value::Object(obj) => Value::Map(
            obj.props_snapshot()
                .into_iter()
                .map(|(key, child)| (key, clone_value(&child, options)))
                .collect(),
        ),
        Value::List(list) => Value::Seq(
            list.items_snapshot()
                .iter()
                .map(|item| clone_value(item, options))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Canonical JSON projection of an object.
///
/// Roots serialize their identity block first (`@id`, `@type`, `@meta`,
/// `@self`, relation endpoints), followed by their own data. Properties
/// holding identified roots or reference tokens become `{"$ref": id}`
/// pointers.
pub fn to_json(obj: &Obj) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    if let Some(identity) = obj.identity_snapshot() {
        out.insert("@id".into(), identity.id.as_str().into());
        if let Some(type_name) = identity.type_name {
            out.insert("@type".into(), type_name.into());
        }
        if let Some(meta) = obj.meta_untracked() {
            out.insert("@meta".into(), props_to_json(&meta));
        }
        out.insert("@self".into(), ref_token(&identity.id));
        if let Some(source) = identity.source {
            out.insert("@source".into(), ref_token(&source.id));
        }
        if let Some(target) = identity.target {
            out.insert("@target".into(), ref_token(&target.id));
        }
    }
    for (key, value) in obj.props_snapshot() {
        out.insert(key, value_to_json(&value));
    }
    serde_json::Value::Object(out)
}

fn props_to_json(obj: &Obj) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    for (key, value) in obj.props_snapshot() {
        out.insert(key, value_to_json(&value));
    }
    serde_json::Value::Object(out)
}

fn ref_token(id: &ObjectId) -> serde_json::Value {
    let mut token = serde_json::Map::new();
    token.insert("$ref".into(), id.as_str().into());
    serde_json::Value::Object(token)
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => (*b).into(),
        Value::Int(n) => (*n).into(),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => s.clone().into(),
        Value::Seq(items) => items.iter().map(value_to_json).collect(),
        Value::List(list) => list.items_snapshot().iter().map(value_to_json).collect(),
        Value::Map(map) => {
            let mut out = serde_json::Map::new();
            for (key, child) in map {
                out.insert(key.clone(), value_to_json(child));
            }
            serde_json::Value::Object(out)
        }
        Value::Object(obj) => match obj.id_untracked() {
            // Another root: externalized, never inlined.
            Some(id) => ref_token(&id),
            None => props_to_json(obj),
        },
        Value::Ref(r) => ref_token(&r.id),
    }
}
