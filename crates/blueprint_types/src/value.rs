//! Property values stored on live objects
//!
//! Every property of an object (default object, instance or subobject) holds
//! a `Value`. Object and class references are held by id so the reinstancer
//! can rewrite them when classes and objects are replaced.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ClassId, ObjectId, PinType};

// ─────────────────────────────────────────────────────────────────────────────
// Value Type
// ─────────────────────────────────────────────────────────────────────────────

/// A property value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Value {
    /// Unset value
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    /// Struct value with optional struct identifier
    Struct {
        #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
        type_id: Option<String>,
        fields: BTreeMap<String, Value>,
    },
    /// Reference to a live object
    Object(Option<ObjectId>),
    /// Reference to a class
    Class(Option<ClassId>),
}

// ─────────────────────────────────────────────────────────────────────────────
// Value Accessors
// ─────────────────────────────────────────────────────────────────────────────

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 (also converts from float if lossless)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Get as f64 (also converts from int)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Referenced object, if this is a non-null object reference
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => *id,
            _ => None,
        }
    }

    /// Referenced class, if this is a non-null class reference
    pub fn as_class(&self) -> Option<ClassId> {
        match self {
            Value::Class(id) => *id,
            _ => None,
        }
    }

    /// Get a struct field
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Struct { fields, .. } => fields.get(key),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Struct { .. } => "struct",
            Value::Object(_) => "object",
            Value::Class(_) => "class",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed Construction
// ─────────────────────────────────────────────────────────────────────────────

impl Value {
    /// Zero value for a property type
    pub fn default_for(ty: &PinType) -> Value {
        match ty {
            PinType::Exec | PinType::Any => Value::Null,
            PinType::Real => Value::Float(0.0),
            PinType::Integer => Value::Int(0),
            PinType::Boolean => Value::Bool(false),
            PinType::String | PinType::Name => Value::String(String::new()),
            PinType::Array { .. } => Value::Array(Vec::new()),
            PinType::Struct { struct_id } => Value::Struct {
                type_id: Some(struct_id.clone()),
                fields: BTreeMap::new(),
            },
            PinType::Object { .. } => Value::Object(None),
            PinType::Class { .. } => Value::Class(None),
        }
    }

    /// Whether the value can be stored in a property of the given type
    pub fn matches_type(&self, ty: &PinType) -> bool {
        match (self, ty) {
            (_, PinType::Any) | (Value::Null, _) => true,
            (Value::Bool(_), PinType::Boolean) => true,
            (Value::Int(_), PinType::Integer | PinType::Real) => true,
            (Value::Float(_), PinType::Real) => true,
            (Value::String(_), PinType::String | PinType::Name) => true,
            (Value::Array(items), PinType::Array { element }) => {
                items.iter().all(|item| item.matches_type(element))
            }
            (Value::Struct { .. }, PinType::Struct { .. }) => true,
            (Value::Object(_), PinType::Object { .. }) => true,
            (Value::Class(_), PinType::Class { .. }) => true,
            _ => false,
        }
    }

    /// Convert a JSON default into a value of the given type
    pub fn from_json_typed(
        json: &serde_json::Value,
        ty: &PinType,
    ) -> Result<Value, ValueConversionError> {
        let value = match (ty, json) {
            (PinType::Object { .. }, serde_json::Value::Null) => Value::Object(None),
            (PinType::Class { .. }, serde_json::Value::Null) => Value::Class(None),
            (PinType::Real, serde_json::Value::Number(n)) => {
                Value::Float(n.as_f64().ok_or(ValueConversionError::TypeMismatch {
                    expected: "float",
                    actual: "number",
                })?)
            }
            (PinType::Struct { struct_id }, serde_json::Value::Object(_)) => {
                match Value::from(json.clone()) {
                    Value::Struct { fields, .. } => Value::Struct {
                        type_id: Some(struct_id.clone()),
                        fields,
                    },
                    other => other,
                }
            }
            _ => Value::from(json.clone()),
        };
        if value.matches_type(ty) {
            Ok(value)
        } else {
            Err(ValueConversionError::TypeMismatch {
                expected: pin_type_name(ty),
                actual: value.type_name(),
            })
        }
    }
}

fn pin_type_name(ty: &PinType) -> &'static str {
    match ty {
        PinType::Exec => "exec",
        PinType::Real => "float",
        PinType::Integer => "int",
        PinType::Boolean => "bool",
        PinType::String => "string",
        PinType::Name => "name",
        PinType::Array { .. } => "array",
        PinType::Struct { .. } => "struct",
        PinType::Object { .. } => "object",
        PinType::Class { .. } => "class",
        PinType::Any => "any",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reference Rewriting
// ─────────────────────────────────────────────────────────────────────────────

impl Value {
    /// Collect every object referenced by this value, recursively
    pub fn referenced_objects(&self, out: &mut Vec<ObjectId>) {
        match self {
            Value::Object(Some(id)) => out.push(*id),
            Value::Array(items) => items.iter().for_each(|v| v.referenced_objects(out)),
            Value::Struct { fields, .. } => {
                fields.values().for_each(|v| v.referenced_objects(out))
            }
            _ => {}
        }
    }

    /// Replace object references found in `map`; returns how many were replaced
    pub fn replace_objects(&mut self, map: &BTreeMap<ObjectId, ObjectId>) -> usize {
        match self {
            Value::Object(Some(id)) => match map.get(id) {
                Some(new_id) => {
                    *id = *new_id;
                    1
                }
                None => 0,
            },
            Value::Array(items) => items.iter_mut().map(|v| v.replace_objects(map)).sum(),
            Value::Struct { fields, .. } => {
                fields.values_mut().map(|v| v.replace_objects(map)).sum()
            }
            _ => 0,
        }
    }

    /// Replace class references found in `map`; returns how many were replaced
    pub fn replace_classes(&mut self, map: &BTreeMap<ClassId, ClassId>) -> usize {
        match self {
            Value::Class(Some(id)) => match map.get(id) {
                Some(new_id) => {
                    *id = *new_id;
                    1
                }
                None => 0,
            },
            Value::Array(items) => items.iter_mut().map(|v| v.replace_classes(map)).sum(),
            Value::Struct { fields, .. } => {
                fields.values_mut().map(|v| v.replace_classes(map)).sum()
            }
            _ => 0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// From Implementations
// ─────────────────────────────────────────────────────────────────────────────

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Object(Some(id))
    }
}

impl From<ClassId> for Value {
    fn from(id: ClassId) -> Self {
        Value::Class(Some(id))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// serde_json::Value Interop
// ─────────────────────────────────────────────────────────────────────────────

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Null
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(obj) => {
                let fields = obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect();
                Value::Struct {
                    type_id: None,
                    fields,
                }
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::Number(i.into()),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(arr) => {
                serde_json::Value::Array(arr.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Struct { fields, .. } => serde_json::Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
            Value::Object(id) => id
                .map(|id| serde_json::Value::String(id.to_string()))
                .unwrap_or(serde_json::Value::Null),
            Value::Class(id) => id
                .map(|id| serde_json::Value::String(id.to_string()))
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TryFrom Implementations
// ─────────────────────────────────────────────────────────────────────────────

/// Error when converting from Value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueConversionError {
    #[error("Expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

impl TryFrom<Value> for bool {
    type Error = ValueConversionError;
    fn try_from(v: Value) -> Result<Self, Self::Error> {
        v.as_bool().ok_or(ValueConversionError::TypeMismatch {
            expected: "bool",
            actual: v.type_name(),
        })
    }
}

impl TryFrom<Value> for f64 {
    type Error = ValueConversionError;
    fn try_from(v: Value) -> Result<Self, Self::Error> {
        v.as_f64().ok_or(ValueConversionError::TypeMismatch {
            expected: "float",
            actual: v.type_name(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_conversions() {
        assert_eq!(Value::from(42).as_i64(), Some(42));
        assert_eq!(Value::from(3.5).as_f64(), Some(3.5));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from("hello").as_str(), Some("hello"));
    }

    #[test]
    fn test_typed_default_from_json() {
        let v = Value::from_json_typed(&serde_json::json!(90), &PinType::Real).unwrap();
        assert_eq!(v, Value::Float(90.0));

        let obj = Value::from_json_typed(&serde_json::Value::Null, &PinType::object("Actor"))
            .unwrap();
        assert_eq!(obj, Value::Object(None));

        let err = Value::from_json_typed(&serde_json::json!("nope"), &PinType::Boolean);
        assert!(matches!(err, Err(ValueConversionError::TypeMismatch { .. })));
    }

    #[test]
    fn test_replace_nested_objects() {
        let mut fields = BTreeMap::new();
        fields.insert("Owner".to_string(), Value::from(ObjectId(1)));
        fields.insert(
            "Children".to_string(),
            Value::Array(vec![Value::from(ObjectId(1)), Value::from(ObjectId(2))]),
        );
        let mut v = Value::Struct {
            type_id: None,
            fields,
        };

        let map = BTreeMap::from([(ObjectId(1), ObjectId(10))]);
        assert_eq!(v.replace_objects(&map), 2);

        let mut refs = Vec::new();
        v.referenced_objects(&mut refs);
        refs.sort();
        assert_eq!(refs, vec![ObjectId(2), ObjectId(10), ObjectId(10)]);
    }

    #[test]
    fn test_replace_classes() {
        let mut v = Value::Array(vec![Value::from(ClassId(3)), Value::Class(None)]);
        let map = BTreeMap::from([(ClassId(3), ClassId(4))]);
        assert_eq!(v.replace_classes(&map), 1);
        assert_eq!(v.as_array().unwrap()[0].as_class(), Some(ClassId(4)));
    }

    #[test]
    fn test_json_roundtrip() {
        let json = serde_json::json!({ "zone": "z-1", "temp": 72.5 });
        let v: Value = json.clone().into();
        assert_eq!(v.get("zone").and_then(|v| v.as_str()), Some("z-1"));
        let back: serde_json::Value = v.into();
        assert_eq!(back, json);
    }
}
