//! Structural Schemas
//!
//! A [`Schema`] describes the shape a value must have before it is allowed
//! to land in the underlying record. Object creation requires an
//! object-shaped schema (a setup-time error otherwise); every subsequent
//! write is asserted against the *local* schema for that property path.
//!
//! Locality comes from stamping: when a target is prepared (at creation,
//! and again whenever a composite value is written), each nested object
//! gets its own sub-schema and each nested list its element schema, so a
//! write three levels deep validates against the schema that actually
//! governs that node instead of re-deriving it from the root on every
//! write.
//!
//! Schemas are plain serde-serializable data, so they can be declared in
//! code or loaded from configuration.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::object::Value;

/// Shape of an object-typed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    /// Type name, serialized as `@type` and attached to created roots.
    pub name: Option<String>,
    /// Declared properties, in declaration order.
    pub properties: IndexMap<String, Schema>,
    /// Whether undeclared properties are permitted.
    #[serde(default)]
    pub open: bool,
}

/// A structural schema node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Schema {
    /// Any value, including null.
    Any,
    Bool,
    Int,
    /// A float; integer values are accepted and widened.
    Float,
    String,
    /// The inner shape, or null.
    Optional(Box<Schema>),
    /// A sequence with uniformly-shaped elements.
    Seq(Box<Schema>),
    /// An object with declared properties.
    Object(ObjectSchema),
    /// A reference to another root object.
    Ref,
}

impl Schema {
    /// A named, closed object schema.
    pub fn object<N, K, I>(name: N, properties: I) -> Schema
    where
        N: Into<String>,
        K: Into<String>,
        I: IntoIterator<Item = (K, Schema)>,
    {
        Schema::Object(ObjectSchema {
            name: Some(name.into()),
            properties: properties
                .into_iter()
                .map(|(k, s)| (k.into(), s))
                .collect(),
            open: false,
        })
    }

    /// An anonymous, closed object schema, for nested records.
    pub fn record<K, I>(properties: I) -> Schema
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Schema)>,
    {
        Schema::Object(ObjectSchema {
            name: None,
            properties: properties
                .into_iter()
                .map(|(k, s)| (k.into(), s))
                .collect(),
            open: false,
        })
    }

    pub fn optional(inner: Schema) -> Schema {
        Schema::Optional(Box::new(inner))
    }

    pub fn seq(element: Schema) -> Schema {
        Schema::Seq(Box::new(element))
    }

    /// Human-readable description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Schema::Any => "any".into(),
            Schema::Bool => "bool".into(),
            Schema::Int => "int".into(),
            Schema::Float => "float".into(),
            Schema::String => "string".into(),
            Schema::Optional(inner) => format!("optional {}", inner.describe()),
            Schema::Seq(element) => format!("sequence of {}", element.describe()),
            Schema::Object(os) => os.name.clone().unwrap_or_else(|| "record".into()),
            Schema::Ref => "reference".into(),
        }
    }

    /// Setup-time precondition: the schema handed to object creation must
    /// be object-shaped.
    pub(crate) fn validate_root(&self) -> Result<&ObjectSchema> {
        match self {
            Schema::Object(os) => Ok(os),
            other => Err(Error::InvalidSchema(other.describe())),
        }
    }
}

/// Look up the schema governing one property.
///
/// `Ok(None)` means the property is unconstrained (open schema or a
/// non-object local schema); an undeclared property on a closed schema is
/// an error.
pub(crate) fn property_schema(schema: &Schema, prop: &str) -> Result<Option<Schema>> {
    match schema {
        Schema::Object(os) => match os.properties.get(prop) {
            Some(found) => Ok(Some(found.clone())),
            None if os.open => Ok(None),
            None => Err(Error::SchemaMismatch {
                path: prop.to_string(),
                expected: "a declared property".into(),
                found: "undeclared property".into(),
            }),
        },
        _ => Ok(None),
    }
}

/// Assert that `value` conforms to `schema`. `path` locates the value in
/// error messages.
pub fn assert_value(schema: &Schema, value: &Value, path: &str) -> Result<()> {
    let mismatch = || {
        Err(Error::SchemaMismatch {
            path: path.to_string(),
            expected: schema.describe(),
            found: value.type_label().to_string(),
        })
    };
    match schema {
        Schema::Any => Ok(()),
        Schema::Optional(inner) => {
            if value.is_null() {
                Ok(())
            } else {
                assert_value(inner, value, path)
            }
        }
        Schema::Bool => match value {
            Value::Bool(_) => Ok(()),
            _ => mismatch(),
        },
        Schema::Int => match value {
            Value::Int(_) => Ok(()),
            _ => mismatch(),
        },
        Schema::Float => match value {
            Value::Float(_) | Value::Int(_) => Ok(()),
            _ => mismatch(),
        },
        Schema::String => match value {
            Value::String(_) => Ok(()),
            _ => mismatch(),
        },
        Schema::Seq(element) => match value {
            Value::List(list) => {
                for (index, item) in list.items_snapshot().iter().enumerate() {
                    assert_value(element, item, &format!("{path}[{index}]"))?;
                }
                Ok(())
            }
            Value::Seq(items) => {
                for (index, item) in items.iter().enumerate() {
                    assert_value(element, item, &format!("{path}[{index}]"))?;
                }
                Ok(())
            }
            _ => mismatch(),
        },
        Schema::Object(os) => match value {
            Value::Object(obj) => assert_props(os, &obj.props_snapshot(), path),
            Value::Map(map) => assert_props(os, map, path),
            _ => mismatch(),
        },
        Schema::Ref => match value {
            Value::Ref(_) => Ok(()),
            Value::Object(obj) if obj.is_root_untracked() => Ok(()),
            _ => mismatch(),
        },
    }
}

fn assert_props(os: &ObjectSchema, props: &IndexMap<String, Value>, path: &str) -> Result<()> {
    for (key, prop_schema) in &os.properties {
        let child_path = join_path(path, key);
        match props.get(key) {
            Some(value) => assert_value(prop_schema, value, &child_path)?,
            None => {
                if !matches!(prop_schema, Schema::Optional(_) | Schema::Any) {
                    return Err(Error::SchemaMismatch {
                        path: child_path,
                        expected: prop_schema.describe(),
                        found: "missing".into(),
                    });
                }
            }
        }
    }
    if !os.open {
        for key in props.keys() {
            if !os.properties.contains_key(key) {
                return Err(Error::SchemaMismatch {
                    path: join_path(path, key),
                    expected: "a declared property".into(),
                    found: "undeclared property".into(),
                });
            }
        }
    }
    Ok(())
}

fn join_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Recursively stamp `schema` onto `value`'s live targets so later writes
/// deeper in the tree validate against their local schema.
///
/// Identified roots that already carry a schema keep it: an embedded root
/// is governed by its own declared type, not by the slot it sits in.
pub(crate) fn stamp_value(value: &Value, schema: &Schema) {
    match (value, schema) {
        (value, Schema::Optional(inner)) => stamp_value(value, inner),
        (Value::Object(obj), Schema::Object(_)) => {
            if obj.is_root_untracked() && obj.schema_untracked().is_some() {
                return;
            }
            obj.set_schema(Arc::new(schema.clone()));
            for (key, child) in obj.props_snapshot() {
                if let Ok(Some(child_schema)) = property_schema(schema, &key) {
                    stamp_value(&child, &child_schema);
                }
            }
        }
        (Value::List(list), Schema::Seq(element)) => {
            list.set_elem_schema(Arc::new((**element).clone()));
            for item in list.items_snapshot() {
                stamp_value(&item, element);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_schema() -> Schema {
        Schema::object(
            "Task",
            [
                ("title", Schema::String),
                ("done", Schema::Bool),
                ("priority", Schema::optional(Schema::Int)),
                ("tags", Schema::seq(Schema::String)),
            ],
        )
    }

    #[test]
    fn non_object_schema_is_rejected_at_setup() {
        assert!(Schema::String.validate_root().is_err());
        assert!(Schema::seq(Schema::Int).validate_root().is_err());
        assert!(task_schema().validate_root().is_ok());
    }

    #[test]
    fn conforming_record_passes() {
        let value = Value::record([
            ("title", Value::from("write tests")),
            ("done", Value::from(false)),
            ("tags", Value::seq(["a", "b"])),
        ]);
        assert_value(&task_schema(), &value, "").unwrap();
    }

    #[test]
    fn missing_required_property_fails_with_path() {
        let value = Value::record([("done", Value::from(false)), ("tags", Value::seq(Vec::<Value>::new()))]);
        let err = assert_value(&task_schema(), &value, "").unwrap_err();
        match err {
            Error::SchemaMismatch { path, .. } => assert_eq!(path, "title"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn optional_property_may_be_absent_or_null() {
        let value = Value::record([
            ("title", Value::from("t")),
            ("done", Value::from(true)),
            ("priority", Value::Null),
            ("tags", Value::seq(Vec::<Value>::new())),
        ]);
        assert_value(&task_schema(), &value, "").unwrap();
    }

    #[test]
    fn sequence_elements_are_checked_with_indices() {
        let value = Value::record([
            ("title", Value::from("t")),
            ("done", Value::from(true)),
            ("tags", Value::seq([Value::from("ok"), Value::from(3)])),
        ]);
        let err = assert_value(&task_schema(), &value, "").unwrap_err();
        match err {
            Error::SchemaMismatch { path, .. } => assert_eq!(path, "tags[1]"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn closed_schema_rejects_undeclared_properties() {
        let value = Value::record([
            ("title", Value::from("t")),
            ("done", Value::from(true)),
            ("tags", Value::seq(Vec::<Value>::new())),
            ("extra", Value::from(1)),
        ]);
        let err = assert_value(&task_schema(), &value, "").unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));
    }

    #[test]
    fn float_accepts_ints() {
        assert_value(&Schema::Float, &Value::from(2), "n").unwrap();
        assert_value(&Schema::Float, &Value::from(2.5), "n").unwrap();
        assert!(assert_value(&Schema::Float, &Value::from("x"), "n").is_err());
    }

    #[test]
    fn schemas_roundtrip_through_json() {
        let schema = task_schema();
        let json = serde_json::to_string(&schema).unwrap();
        let back: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(schema, back);
    }
}
