//! Value model and wire codec
//!
//! This module defines:
//! - [`Value`]: closed tagged union for everything a store can hold
//! - [`ValueTag`]: the canonical wire tag of each variant
//!
//! ## Wire Format
//!
//! Every value serializes to a descriptor `{ "type": tag, "value": payload }`:
//!
//! | Variant | Tag | Payload |
//! |---------|-----|---------|
//! | `String` | `"string"` | JSON string |
//! | `Integer` | `"integer"` | JSON integer |
//! | `Number` | `"number"` | JSON number |
//! | `Bool` | `"bool"` | JSON bool |
//! | `Color` | `"color"` | JSON string |
//! | `Url` | `"url"` | JSON string |
//! | `Array` | `"array"` | array of descriptors |
//! | `Object` | `"object"` | object of descriptors, insertion ordered |
//! | `Null` | `"null"` | *(no `value` field)* |
//!
//! Decoding is the exact inverse and rejects unknown tags, missing payloads
//! and payload/type mismatches with [`StoreError::DecodeFailed`]. The same
//! mapping is used by the action builder and by the runtime store, so it
//! must stay bit-for-bit stable.
//!
//! ## Type Rules
//!
//! - `Integer(1) != Number(1.0)`: different variants are never equal
//! - `Color` and `Url` are not `String`
//! - Non-finite numbers cannot be encoded

use crate::error::{StoreError, StoreResult};
use crate::key_path::PathComponent;
use indexmap::IndexMap;
use serde::de::Error as _;
use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Ordered object members
pub type ObjectMap = IndexMap<String, Value>;

/// Canonical wire tag of a [`Value`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueTag {
    /// `"string"`
    String,
    /// `"integer"`
    Integer,
    /// `"number"`
    Number,
    /// `"bool"`
    Bool,
    /// `"color"`
    Color,
    /// `"url"`
    Url,
    /// `"array"`
    Array,
    /// `"object"`
    Object,
    /// `"null"`
    Null,
}

impl ValueTag {
    /// The wire spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueTag::String => "string",
            ValueTag::Integer => "integer",
            ValueTag::Number => "number",
            ValueTag::Bool => "bool",
            ValueTag::Color => "color",
            ValueTag::Url => "url",
            ValueTag::Array => "array",
            ValueTag::Object => "object",
            ValueTag::Null => "null",
        }
    }

    /// Look up a tag by its wire spelling
    pub fn from_wire(tag: &str) -> Option<Self> {
        Some(match tag {
            "string" => ValueTag::String,
            "integer" => ValueTag::Integer,
            "number" => ValueTag::Number,
            "bool" => ValueTag::Bool,
            "color" => ValueTag::Color,
            "url" => ValueTag::Url,
            "array" => ValueTag::Array,
            "object" => ValueTag::Object,
            "null" => ValueTag::Null,
            _ => return None,
        })
    }
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any value a store can hold
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 string
    String(String),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Number(f64),
    /// Boolean
    Bool(bool),
    /// Color literal, e.g. `#FF8800`
    Color(String),
    /// URL literal
    Url(String),
    /// Ordered list
    Array(Vec<Value>),
    /// Insertion-ordered object
    Object(ObjectMap),
    /// Explicit null
    Null,
}

impl Value {
    /// Wire tag of this value
    pub fn tag(&self) -> ValueTag {
        match self {
            Value::String(_) => ValueTag::String,
            Value::Integer(_) => ValueTag::Integer,
            Value::Number(_) => ValueTag::Number,
            Value::Bool(_) => ValueTag::Bool,
            Value::Color(_) => ValueTag::Color,
            Value::Url(_) => ValueTag::Url,
            Value::Array(_) => ValueTag::Array,
            Value::Object(_) => ValueTag::Object,
            Value::Null => ValueTag::Null,
        }
    }

    /// Build an object from `(key, value)` pairs, keeping their order
    pub fn object<K, I>(members: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(members.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// An empty object
    pub fn empty_object() -> Self {
        Value::Object(ObjectMap::new())
    }

    /// Check if this is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this is an object
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Get as &str for String, Color and Url values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Color(s) | Value::Url(s) => Some(s),
            _ => None,
        }
    }

    /// Get as i64 if this is an Integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of Integer and Number values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as bool if this is a Bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as slice if this is an Array
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get the members if this is an Object
    pub fn as_object(&self) -> Option<&ObjectMap> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    // =========================================================================
    // Wire codec
    // =========================================================================

    /// Encode to a descriptor tree
    pub fn to_descriptor(&self) -> StoreResult<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| StoreError::EncodeFailed(e.to_string()))
    }

    /// Encode to a descriptor JSON string
    pub fn encode(&self) -> StoreResult<String> {
        serde_json::to_string(self).map_err(|e| StoreError::EncodeFailed(e.to_string()))
    }

    /// Decode a descriptor tree
    pub fn from_descriptor(descriptor: &serde_json::Value) -> StoreResult<Self> {
        let fail = |reason: &str| StoreError::decode_failed(descriptor.to_string(), reason);

        let obj = descriptor
            .as_object()
            .ok_or_else(|| fail("descriptor must be an object"))?;
        let tag = obj
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| fail("missing 'type'"))?;
        let tag = ValueTag::from_wire(tag).ok_or_else(|| fail("unknown type tag"))?;

        if tag == ValueTag::Null {
            return Ok(Value::Null);
        }
        let payload = obj.get("value").ok_or_else(|| fail("missing 'value'"))?;

        match tag {
            ValueTag::String | ValueTag::Color | ValueTag::Url => {
                let s = payload
                    .as_str()
                    .ok_or_else(|| fail("payload must be a string"))?
                    .to_string();
                Ok(match tag {
                    ValueTag::Color => Value::Color(s),
                    ValueTag::Url => Value::Url(s),
                    _ => Value::String(s),
                })
            }
            ValueTag::Integer => payload
                .as_i64()
                .map(Value::Integer)
                .ok_or_else(|| fail("payload must be an integer")),
            ValueTag::Number => payload
                .as_f64()
                .map(Value::Number)
                .ok_or_else(|| fail("payload must be a number")),
            ValueTag::Bool => payload
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| fail("payload must be a bool")),
            ValueTag::Array => {
                let items = payload
                    .as_array()
                    .ok_or_else(|| fail("payload must be an array"))?;
                items
                    .iter()
                    .map(Value::from_descriptor)
                    .collect::<StoreResult<Vec<_>>>()
                    .map(Value::Array)
            }
            ValueTag::Object => {
                let members = payload
                    .as_object()
                    .ok_or_else(|| fail("payload must be an object"))?;
                let mut out = ObjectMap::with_capacity(members.len());
                for (k, v) in members {
                    out.insert(k.clone(), Value::from_descriptor(v)?);
                }
                Ok(Value::Object(out))
            }
            ValueTag::Null => Ok(Value::Null),
        }
    }

    /// Decode a descriptor JSON string
    pub fn decode(raw: &str) -> StoreResult<Self> {
        let tree: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| StoreError::decode_failed(raw, e.to_string()))?;
        Value::from_descriptor(&tree)
    }

    // =========================================================================
    // Nested access
    // =========================================================================

    /// Value at a relative path inside this value
    pub fn get_at(&self, path: &[PathComponent]) -> Option<&Value> {
        let mut current = self;
        for component in path {
            current = match (component, current) {
                (PathComponent::Property(name), Value::Object(members)) => members.get(name)?,
                (PathComponent::Index(idx), Value::Array(items)) => items.get(*idx)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Set a value at a relative path, creating intermediate containers
    ///
    /// Missing properties create objects or arrays depending on the next
    /// component; `Null` placeholders are replaced the same way. An index
    /// may address an existing element or append exactly one past the end.
    /// The whole path is checked first, so a failed write leaves `self`
    /// untouched.
    pub fn set_at(&mut self, path: &[PathComponent], value: Value) -> Result<(), String> {
        self.check_set_at(path)?;
        self.write_at(path, value)
    }

    fn check_set_at(&self, path: &[PathComponent]) -> Result<(), String> {
        // `None` once the walk is below a container that does not exist yet
        let mut current = Some(self);
        for component in path {
            current = match (component, current) {
                (PathComponent::Property(_), None | Some(Value::Null)) => None,
                (PathComponent::Index(idx), None | Some(Value::Null)) => {
                    if *idx > 0 {
                        return Err(format!("index {} out of bounds (len 0)", idx));
                    }
                    None
                }
                (PathComponent::Property(name), Some(Value::Object(members))) => members.get(name),
                (PathComponent::Index(idx), Some(Value::Array(items))) => {
                    if *idx > items.len() {
                        return Err(format!("index {} out of bounds (len {})", idx, items.len()));
                    }
                    items.get(*idx)
                }
                (PathComponent::Property(name), Some(other)) => {
                    return Err(format!("cannot address '{}' inside {}", name, other.tag()))
                }
                (PathComponent::Index(idx), Some(other)) => {
                    return Err(format!("cannot index [{}] inside {}", idx, other.tag()))
                }
            };
        }
        Ok(())
    }

    fn write_at(&mut self, path: &[PathComponent], value: Value) -> Result<(), String> {
        let Some((first, rest)) = path.split_first() else {
            *self = value;
            return Ok(());
        };

        if self.is_null() {
            *self = match first {
                PathComponent::Property(_) => Value::empty_object(),
                PathComponent::Index(_) => Value::Array(Vec::new()),
            };
        }

        let child = match (first, self) {
            (PathComponent::Property(name), Value::Object(members)) => {
                members.entry(name.clone()).or_insert(Value::Null)
            }
            (PathComponent::Index(idx), Value::Array(items)) => {
                if *idx == items.len() {
                    items.push(Value::Null);
                } else if *idx > items.len() {
                    return Err(format!("index {} out of bounds (len {})", idx, items.len()));
                }
                &mut items[*idx]
            }
            (PathComponent::Property(name), other) => {
                return Err(format!("cannot address '{}' inside {}", name, other.tag()))
            }
            (PathComponent::Index(idx), other) => {
                return Err(format!("cannot index [{}] inside {}", idx, other.tag()))
            }
        };
        child.write_at(rest, value)
    }

    /// Remove and return the value at a relative path
    pub fn remove_at(&mut self, path: &[PathComponent]) -> Option<Value> {
        let (last, parents) = path.split_last()?;
        let mut current = self;
        for component in parents {
            current = match (component, current) {
                (PathComponent::Property(name), Value::Object(members)) => members.get_mut(name)?,
                (PathComponent::Index(idx), Value::Array(items)) => items.get_mut(*idx)?,
                _ => return None,
            };
        }
        match (last, current) {
            (PathComponent::Property(name), Value::Object(members)) => members.shift_remove(name),
            (PathComponent::Index(idx), Value::Array(items)) if *idx < items.len() => {
                Some(items.remove(*idx))
            }
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.is_null() { 1 } else { 2 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("type", self.tag().as_str())?;
        match self {
            Value::String(s) | Value::Color(s) | Value::Url(s) => map.serialize_entry("value", s)?,
            Value::Integer(i) => map.serialize_entry("value", i)?,
            Value::Number(n) => {
                if !n.is_finite() {
                    return Err(S::Error::custom(format!("non-finite number {}", n)));
                }
                map.serialize_entry("value", n)?
            }
            Value::Bool(b) => map.serialize_entry("value", b)?,
            Value::Array(items) => map.serialize_entry("value", items)?,
            Value::Object(members) => map.serialize_entry("value", members)?,
            Value::Null => {}
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tree = serde_json::Value::deserialize(deserializer)?;
        Value::from_descriptor(&tree).map_err(D::Error::custom)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Color(c) => write!(f, "color({})", c),
            Value::Url(u) => write!(f, "url({})", u),
            Value::Array(items) => write!(f, "[{} items]", items.len()),
            Value::Object(members) => write!(f, "{{{} members}}", members.len()),
            Value::Null => f.write_str("null"),
        }
    }
}

// ============================================================================
// From implementations for ergonomic API usage
// ============================================================================

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Number(f)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

impl From<ObjectMap> for Value {
    fn from(o: ObjectMap) -> Self {
        Value::Object(o)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Plain JSON interop: integers stay integers, strings stay strings
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Number(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => Value::Array(arr.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(obj) => {
                Value::Object(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_path::KeyPath;
    use serde_json::json;

    fn comps(path: &str) -> Vec<PathComponent> {
        KeyPath::parse(path).unwrap().components().to_vec()
    }

    #[test]
    fn test_primitive_descriptor_shape() {
        assert_eq!(
            Value::from("hi").to_descriptor().unwrap(),
            json!({"type": "string", "value": "hi"})
        );
        assert_eq!(
            Value::Integer(25).to_descriptor().unwrap(),
            json!({"type": "integer", "value": 25})
        );
        assert_eq!(
            Value::Color("#FF8800".into()).to_descriptor().unwrap(),
            json!({"type": "color", "value": "#FF8800"})
        );
    }

    #[test]
    fn test_null_has_no_value_field() {
        let d = Value::Null.to_descriptor().unwrap();
        assert_eq!(d, json!({"type": "null"}));
        assert_eq!(Value::Null.encode().unwrap(), r#"{"type":"null"}"#);
    }

    #[test]
    fn test_object_preserves_insertion_order() {
        let v = Value::object([("zeta", Value::Integer(1)), ("alpha", Value::Integer(2))]);
        let encoded = v.encode().unwrap();
        assert!(encoded.find("zeta").unwrap() < encoded.find("alpha").unwrap());
        let back = Value::decode(&encoded).unwrap();
        let keys: Vec<&String> = back.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_round_trip_every_variant() {
        let all = vec![
            Value::from("s"),
            Value::Integer(-7),
            Value::Number(2.5),
            Value::Bool(true),
            Value::Color("#000".into()),
            Value::Url("https://example.com".into()),
            Value::Array(vec![Value::Integer(1), Value::Null]),
            Value::object([("nested", Value::Array(vec![Value::from("x")]))]),
            Value::Null,
        ];
        for v in all {
            assert_eq!(Value::decode(&v.encode().unwrap()).unwrap(), v);
        }
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let err = Value::decode(r#"{"type":"blob","value":1}"#).unwrap_err();
        match err {
            StoreError::DecodeFailed { raw, reason } => {
                assert!(raw.contains("blob"));
                assert!(reason.contains("unknown"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_payload_mismatch() {
        assert!(Value::decode(r#"{"type":"integer","value":"5"}"#).is_err());
        assert!(Value::decode(r#"{"type":"integer","value":1.5}"#).is_err());
        assert!(Value::decode(r#"{"type":"bool"}"#).is_err());
        assert!(Value::decode(r#"{"value":1}"#).is_err());
        assert!(Value::decode(r#"[1,2]"#).is_err());
    }

    #[test]
    fn test_nested_decode_failure_propagates() {
        let raw = r#"{"type":"array","value":[{"type":"integer","value":1},{"type":"nope"}]}"#;
        assert!(Value::decode(raw).is_err());
    }

    #[test]
    fn test_non_finite_number_fails_to_encode() {
        let err = Value::Number(f64::NAN).encode().unwrap_err();
        assert!(matches!(err, StoreError::EncodeFailed(_)));
    }

    #[test]
    fn test_integer_not_equal_number() {
        assert_ne!(Value::Integer(1), Value::Number(1.0));
        assert_ne!(Value::from("#fff"), Value::Color("#fff".into()));
    }

    #[test]
    fn test_get_at() {
        let v: Value = json!({"items": [{"name": "a"}, {"name": "b"}]}).into();
        assert_eq!(v.get_at(&comps("items[1].name")), Some(&Value::from("b")));
        assert_eq!(v.get_at(&comps("items[5].name")), None);
        assert_eq!(v.get_at(&comps("items.name")), None);
        assert_eq!(v.get_at(&[]), Some(&v));
    }

    #[test]
    fn test_set_at_creates_intermediates() {
        let mut v = Value::Null;
        v.set_at(&comps("user.tags[0]"), Value::from("new")).unwrap();
        assert_eq!(v.get_at(&comps("user.tags[0]")), Some(&Value::from("new")));

        v.set_at(&comps("user.tags[1]"), Value::from("second")).unwrap();
        assert!(v.set_at(&comps("user.tags[9]"), Value::from("far")).is_err());
        assert!(v.set_at(&comps("user.tags.name"), Value::Null).is_err());
    }

    #[test]
    fn test_failed_set_at_leaves_value_untouched() {
        let mut v: Value = json!({"user": {}}).into();
        let before = v.clone();
        assert!(v.set_at(&comps("user.a.b[3]"), Value::Integer(1)).is_err());
        assert!(v.set_at(&comps("user.a[0][2]"), Value::Integer(1)).is_err());
        assert_eq!(v, before);

        let mut scalar: Value = json!({"count": 1}).into();
        let expected = scalar.clone();
        assert!(scalar.set_at(&comps("count.inner.deep"), Value::Null).is_err());
        assert_eq!(scalar, expected);
    }

    #[test]
    fn test_remove_at() {
        let mut v: Value = json!({"a": {"b": 1, "c": 2}, "list": [1, 2, 3]}).into();
        assert_eq!(v.remove_at(&comps("a.b")), Some(Value::Integer(1)));
        assert_eq!(v.remove_at(&comps("a.b")), None);
        assert_eq!(v.remove_at(&comps("list[0]")), Some(Value::Integer(1)));
        assert_eq!(v.get_at(&comps("list[0]")), Some(&Value::Integer(2)));
        assert_eq!(v.remove_at(&[]), None);
    }

    #[test]
    fn test_from_plain_json() {
        let v: Value = json!({"n": 3, "f": 0.5, "s": "x", "z": null}).into();
        let obj = v.as_object().unwrap();
        assert_eq!(obj["n"], Value::Integer(3));
        assert_eq!(obj["f"], Value::Number(0.5));
        assert!(obj["z"].is_null());
    }
}
