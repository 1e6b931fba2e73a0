//! Schemaless document model shared by the catalog and the batch path
//!
//! A `Document` is an ordered map of field names to `Value`s. It is the
//! payload carried by synchronization operations and the unit persisted
//! by the store facade.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Field holding a document's primary key in the store.
pub const ID_FIELD: &str = "_id";

const KEY_TAG: char = '#';

/// A value that can be stored in a document field
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    List(Vec<Value>),
    Document(Document),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn int(n: i64) -> Self {
        Value::Int(n)
    }

    pub fn bool(b: bool) -> Self {
        Value::Bool(b)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Render a scalar value as a store key. Composite values and nulls have no key form.
    ///
    /// Strings are used as-is. Every other scalar gets a `#<type>:` prefix
    /// and a string that starts with `#` gets one more, so values of
    /// different types never share a key (`1` and `"1"` stay distinct).
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::String(s) if s.starts_with(KEY_TAG) => Some(format!("{}{}", KEY_TAG, s)),
            Value::String(s) => Some(s.clone()),
            Value::Int(n) => Some(format!("{}int:{}", KEY_TAG, n)),
            Value::Bool(b) => Some(format!("{}bool:{}", KEY_TAG, b)),
            Value::Bytes(b) => Some(format!("{}bytes:{}", KEY_TAG, hex::encode(b))),
            Value::DateTime(t) => Some(format!("{}datetime:{}", KEY_TAG, t.to_rfc3339())),
            Value::Double(_) | Value::Null | Value::List(_) | Value::Document(_) => None,
        }
    }
}

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

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

/// An ordered set of named fields
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set a field, returning the previous value if any.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Overwrite fields of `self` with every field present in `other`.
    pub fn merge(&mut self, other: &Document) {
        for (name, value) in &other.fields {
            self.fields.insert(name.clone(), value.clone());
        }
    }

    /// The store key under `key_field`, if present and scalar.
    pub fn key(&self, key_field: &str) -> Option<String> {
        self.get(key_field).and_then(Value::as_key)
    }
}
