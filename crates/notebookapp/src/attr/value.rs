//! Attribute values and the per-node attribute bundle.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{NotebookError, Result};

/// Runtime representation of a typed attribute value.
///
/// Mirrors the element types of the metadata file format: `string`,
/// `integer`, `real`, `true`/`false`, `null`, `data`, `date`, `array` and
/// `dict`.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    String(String),
    Data(Vec<u8>),
    Date(DateTime<Utc>),
    Array(Vec<AttrValue>),
    Dict(BTreeMap<String, AttrValue>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Real(v) => Some(*v),
            AttrValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[AttrValue]> {
        match self {
            AttrValue::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    /// Array of strings, skipping non-string items.
    pub fn as_string_list(&self) -> Option<Vec<String>> {
        self.as_array().map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
    }

    /// JSON form used on the HTTP wire. `data` becomes base64 text and
    /// `date` becomes RFC 3339 text.
    pub fn to_json(&self) -> Value {
        match self {
            AttrValue::Null => Value::Null,
            AttrValue::Bool(v) => Value::Bool(*v),
            AttrValue::Integer(v) => Value::from(*v),
            AttrValue::Real(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            AttrValue::String(s) => Value::String(s.clone()),
            AttrValue::Data(bytes) => Value::String(BASE64.encode(bytes)),
            AttrValue::Date(dt) => Value::String(dt.to_rfc3339()),
            AttrValue::Array(items) => Value::Array(items.iter().map(AttrValue::to_json).collect()),
            AttrValue::Dict(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn from_json(value: &Value) -> AttrValue {
        match value {
            Value::Null => AttrValue::Null,
            Value::Bool(v) => AttrValue::Bool(*v),
            Value::Number(n) => match n.as_i64() {
                Some(i) => AttrValue::Integer(i),
                None => AttrValue::Real(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => AttrValue::String(s.clone()),
            Value::Array(items) => AttrValue::Array(items.iter().map(AttrValue::from_json).collect()),
            Value::Object(map) => AttrValue::Dict(
                map.iter()
                    .map(|(k, v)| (k.clone(), AttrValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::String(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::String(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Integer(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Integer(v as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Real(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(v: Vec<String>) -> Self {
        AttrValue::Array(v.into_iter().map(AttrValue::String).collect())
    }
}

impl From<Vec<AttrValue>> for AttrValue {
    fn from(v: Vec<AttrValue>) -> Self {
        AttrValue::Array(v)
    }
}

impl Serialize for AttrValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AttrValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(AttrValue::from_json(&value))
    }
}

/// The attribute bundle of one node.
///
/// Keys are kept sorted, so two bundles compare equal regardless of the
/// order their keys were inserted or stored in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeAttr {
    map: BTreeMap<String, AttrValue>,
}

impl NodeAttr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.map.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.map.get(key).and_then(AttrValue::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.map.get(key).and_then(AttrValue::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.map.get(key).and_then(AttrValue::as_bool)
    }

    pub fn get_strings(&self, key: &str) -> Option<Vec<String>> {
        self.map.get(key).and_then(AttrValue::as_string_list)
    }

    pub fn insert(&mut self, key: &str, value: impl Into<AttrValue>) -> Option<AttrValue> {
        self.map.insert(key.to_string(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.map.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.map.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.map.keys()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, AttrValue> {
        &self.map
    }

    pub fn into_map(self) -> BTreeMap<String, AttrValue> {
        self.map
    }

    /// Copies every key of `other` into `self`, overwriting.
    pub fn merge(&mut self, other: &NodeAttr) {
        for (k, v) in other.iter() {
            self.map.insert(k.clone(), v.clone());
        }
    }

    // Schema accessors

    pub fn nodeid(&self) -> Option<&str> {
        self.get_str("nodeid")
    }

    pub fn title(&self) -> &str {
        self.get_str("title").unwrap_or("")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_str("content_type")
    }

    pub fn parentids(&self) -> Vec<String> {
        self.get_strings("parentids").unwrap_or_default()
    }

    pub fn childrenids(&self) -> Vec<String> {
        self.get_strings("childrenids").unwrap_or_default()
    }

    /// First parent, if any. Roots have none.
    pub fn parent_id(&self) -> Option<String> {
        self.parentids().into_iter().next()
    }

    /// Missing modification times compare as 0.
    pub fn modified_time(&self) -> i64 {
        self.get_i64("modified_time").unwrap_or(0)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.map
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    pub fn from_json(value: &Value) -> Result<NodeAttr> {
        match value {
            Value::Object(obj) => Ok(NodeAttr {
                map: obj
                    .iter()
                    .map(|(k, v)| (k.clone(), AttrValue::from_json(v)))
                    .collect(),
            }),
            other => Err(NotebookError::Parse(format!(
                "attribute record must be an object, got {}",
                other
            ))),
        }
    }
}

impl From<BTreeMap<String, AttrValue>> for NodeAttr {
    fn from(map: BTreeMap<String, AttrValue>) -> Self {
        NodeAttr { map }
    }
}

impl FromIterator<(String, AttrValue)> for NodeAttr {
    fn from_iter<T: IntoIterator<Item = (String, AttrValue)>>(iter: T) -> Self {
        NodeAttr {
            map: iter.into_iter().collect(),
        }
    }
}

impl Serialize for NodeAttr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NodeAttr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let map = BTreeMap::<String, AttrValue>::deserialize(deserializer)?;
        Ok(NodeAttr { map })
    }
}
