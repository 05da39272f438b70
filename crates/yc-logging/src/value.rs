// Copyright 2024-Present YANDEX LLC
// SPDX-License-Identifier: Apache-2.0

//! Untyped record model and normalization into JSON-representable values.
//!
//! Records arrive from the host without a schema: keys may be strings or raw
//! bytes (or anything else a structured decoder produces), values may nest
//! arbitrarily. [`Value`] keeps that shape intact, and [`normalize`] turns it
//! into something that maps onto JSON: byte strings become UTF-8 strings where
//! possible and map keys that are not strings are dropped.

use std::borrow::Cow;

/// One node of an untyped, arbitrarily nested record.
///
/// Maps are kept as ordered pair lists so that non-string keys survive until
/// normalization decides what to do with them.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

/// A value that has no JSON representation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotRepresentable {
    #[error("opaque byte value is not valid UTF-8")]
    Bytes,
    #[error("non-finite number {0}")]
    NonFinite(f64),
}

impl Value {
    /// Returns the textual form of a map key, if the key is a string or a
    /// UTF-8 byte string.
    #[must_use]
    pub fn as_key(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Bytes(b) => std::str::from_utf8(b).ok().map(Cow::Borrowed),
            _ => None,
        }
    }

    /// Looks up `key` in a map value. Returns `None` for non-maps.
    ///
    /// When a key occurs more than once the last occurrence wins, matching how
    /// the record would look once collected into a map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(pairs) => pairs
                .iter()
                .rev()
                .find(|(k, _)| k.as_key().is_some_and(|k| k == key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

/// Converts any record shape into a JSON-shaped value.
///
/// - valid UTF-8 byte strings become strings, other byte strings are kept as opaque bytes
/// - arrays are normalized element-wise, an empty array stays an empty array
/// - maps are normalized value-wise and keys that are not strings are dropped
/// - everything else passes through unchanged
///
/// Never fails. Opaque bytes surface later, in [`to_json`].
#[must_use]
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => Value::String(s.to_owned()),
            Err(_) => Value::Bytes(bytes.clone()),
        },
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Map(pairs) => Value::Map(
            pairs
                .iter()
                .filter_map(|(k, v)| match normalize(k) {
                    Value::String(key) => Some((Value::String(key), normalize(v))),
                    _ => None,
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Converts a normalized value into `serde_json::Value`.
///
/// Objects are backed by serde_json's sorted map, so serializing the result
/// always yields lexicographically ordered keys.
pub fn to_json(value: &Value) -> Result<serde_json::Value, NotRepresentable> {
    Ok(match value {
        Value::Nil => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::UInt(u) => serde_json::Value::from(*u),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or(NotRepresentable::NonFinite(*f))?,
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(_) => return Err(NotRepresentable::Bytes),
        Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Map(pairs) => {
            let mut object = serde_json::Map::with_capacity(pairs.len());
            for (k, v) in pairs {
                if let Some(key) = k.as_key() {
                    object.insert(key.into_owned(), to_json(v)?);
                }
            }
            serde_json::Value::Object(object)
        }
    })
}

/// Renders a value as a flat string for the message and level fields.
#[must_use]
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Nil => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => s.clone(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        Value::Array(_) | Value::Map(_) => match to_json(&normalize(value)) {
            Ok(json) => json.to_string(),
            Err(_) => format!("{value:?}"),
        },
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(object) => Value::Map(
                object
                    .into_iter()
                    .map(|(k, v)| (Value::String(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}
