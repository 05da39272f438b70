// Copyright 2024-Present YANDEX LLC
// SPDX-License-Identifier: Apache-2.0

//! Lookup of `/`-separated paths inside nested values.

use crate::errors::PathError;
use crate::value::{normalize, to_json, Value};

/// Walks `path` down from `container` and returns the leaf as a string.
///
/// Map nodes are indexed by key, array nodes by a non-negative integer
/// segment. String and byte leaves are returned verbatim; any other leaf is
/// normalized and rendered as compact JSON with lexicographically sorted keys.
pub fn resolve<S: AsRef<str>>(container: &Value, path: &[S]) -> Result<String, PathError> {
    let mut cur = container;
    for segment in path {
        let segment = segment.as_ref();
        cur = match cur {
            Value::Map(_) => cur.get(segment).ok_or_else(|| PathError::Missing {
                segment: segment.to_owned(),
            })?,
            Value::Array(items) => {
                let index: usize = segment.parse().map_err(|_| PathError::BadIndex {
                    segment: segment.to_owned(),
                })?;
                items.get(index).ok_or(PathError::IndexOutOfBounds {
                    index,
                    len: items.len(),
                })?
            }
            _ => {
                return Err(PathError::NotAContainer {
                    segment: segment.to_owned(),
                })
            }
        };
    }

    match cur {
        Value::Nil => Err(PathError::Null),
        Value::String(s) => Ok(s.clone()),
        Value::Bytes(b) => Ok(String::from_utf8_lossy(b).into_owned()),
        other => to_json(&normalize(other))
            .map(|json| json.to_string())
            .map_err(|e| PathError::Unrepresentable(e.to_string())),
    }
}
