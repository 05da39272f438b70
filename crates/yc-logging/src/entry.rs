// Copyright 2024-Present YANDEX LLC
// SPDX-License-Identifier: Apache-2.0

//! Turning one record into one [`Entry`] plus the [`Resource`] it belongs to.
//!
//! Record fields are classified in a fixed order:
//! 1. a key listed in [`FieldMapping::message_keys`] becomes the message
//! 2. the [`FieldMapping::level_key`] becomes the level
//! 3. everything else lands in the JSON payload
//!
//! When a tag key is configured the flush tag is written to the payload first,
//! so a record field with the same name overrides it.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Map;
use tracing::{debug, warn};

use crate::errors::EntryError;
use crate::template::Template;
use crate::value::{normalize, stringify, to_json, Value};

/// Logical source of a group of entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Resource {
    pub resource_type: String,
    pub id: String,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resource_type.is_empty() && self.id.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    pub stream_name: String,
    /// `None` when the record left nothing for the payload.
    pub payload: Option<Map<String, serde_json::Value>>,
}

/// How record fields map onto entry fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping {
    pub level_key: Option<String>,
    /// Candidate message keys. When several are present the earliest listed wins.
    pub message_keys: Vec<String>,
    pub tag_key: Option<String>,
    pub resource_type: Template,
    pub resource_id: Template,
    pub stream_name: Template,
}

/// Result of [`FieldMapping::build`].
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltEntry {
    pub entry: Entry,
    pub resource: Resource,
    /// Fields left out of the payload because they have no JSON form.
    pub dropped_fields: usize,
}

impl FieldMapping {
    pub fn build(
        &self,
        timestamp: DateTime<Utc>,
        record: &Value,
        tag: &str,
    ) -> Result<BuiltEntry, EntryError> {
        let Value::Map(fields) = record else {
            return Err(EntryError::NotAMap);
        };

        let resource_type = self
            .resource_type
            .render(record)
            .map_err(EntryError::ResourceType)?;
        let resource_id = self
            .resource_id
            .render(record)
            .map_err(EntryError::ResourceId)?;
        let stream_name = self
            .stream_name
            .render(record)
            .map_err(EntryError::StreamName)?;

        let mut payload = Map::new();
        if let Some(tag_key) = &self.tag_key {
            payload.insert(tag_key.clone(), serde_json::Value::String(tag.to_string()));
        }

        let mut message = String::new();
        let mut message_rank = usize::MAX;
        let mut level = String::new();
        let mut dropped_fields = 0;

        for (key, value) in fields {
            let Some(key) = key.as_key() else {
                debug!("Dropping field with non-string key {key:?}");
                dropped_fields += 1;
                continue;
            };

            if let Some(rank) = self.message_keys.iter().position(|k| *k == key) {
                if rank <= message_rank {
                    message = stringify(value);
                    message_rank = rank;
                }
                continue;
            }
            if self.level_key.as_deref() == Some(key.as_ref()) {
                level = stringify(value);
                continue;
            }

            match to_json(&normalize(value)) {
                Ok(json) => {
                    payload.insert(key.into_owned(), json);
                }
                Err(e) => {
                    debug!("Dropping field {key:?} from payload: {e}");
                    dropped_fields += 1;
                }
            }
        }

        Ok(BuiltEntry {
            entry: Entry {
                timestamp,
                level,
                message,
                stream_name: stream_name.into_owned(),
                payload: (!payload.is_empty()).then_some(payload),
            },
            resource: Resource::new(resource_type, resource_id),
            dropped_fields,
        })
    }
}

/// Decodes a host supplied timestamp.
///
/// Accepts whole seconds (signed or unsigned), fractional seconds, RFC 3339
/// strings and arrays whose first element is one of those. Anything else is
/// logged and replaced by the current time.
#[must_use]
pub fn decode_timestamp(raw: &Value) -> DateTime<Utc> {
    decode(raw).unwrap_or_else(|| {
        warn!("Provided time ({raw:?}) invalid: defaulting to now");
        Utc::now()
    })
}

fn decode(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::Int(secs) => Utc.timestamp_opt(*secs, 0).single(),
        Value::UInt(secs) => Utc.timestamp_opt(i64::try_from(*secs).ok()?, 0).single(),
        Value::Float(secs) if secs.is_finite() => {
            let whole = secs.floor();
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
            #[allow(clippy::cast_possible_truncation)]
            let whole = whole as i64;
            Utc.timestamp_opt(whole, nanos).single()
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Bytes(b) => decode(&Value::String(std::str::from_utf8(b).ok()?.to_string())),
        Value::Array(items) => match items.first()? {
            Value::Array(_) => None,
            first => decode(first),
        },
        _ => None,
    }
}
