// Copyright 2024-Present YANDEX LLC
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use std::time::Duration;

use yc_logging::config::{Authorization, ClientSettings, Config, Destination, DEFAULT_ENDPOINT};
use yc_logging::entry::{Entry, FieldMapping, Resource};
use yc_logging::group::ResourceGroups;
use yc_logging::template::Template;
use yc_logging::value::Value;

pub fn entry(message: impl Into<String>) -> Entry {
    Entry {
        timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        level: "INFO".to_string(),
        message: message.into(),
        stream_name: String::new(),
        payload: None,
    }
}

/// `count` entries for one resource, messages `"0"`, `"1"`, ...
pub fn single_group(resource: Resource, count: usize) -> ResourceGroups {
    (0..count)
        .map(|i| (resource.clone(), entry(i.to_string())))
        .collect()
}

/// Mapping that takes the resource from record fields `type` and `id`.
pub fn mapping() -> FieldMapping {
    FieldMapping {
        level_key: Some("level".to_string()),
        message_keys: vec!["message".to_string()],
        tag_key: Some("tag".to_string()),
        resource_type: Template::compile("{type}"),
        resource_id: Template::compile("{id}"),
        stream_name: Template::default(),
    }
}

pub fn config() -> Config {
    Config {
        mapping: mapping(),
        destination: Destination::LogGroupId("e23-test-group".to_string()),
        defaults: None,
        client: ClientSettings {
            authorization: Authorization::IamToken,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            ca_file: None,
            write_timeout: Duration::from_secs(5),
        },
    }
}

/// Raw `(timestamp, record)` pair as a host would hand it over.
pub fn record(resource_type: &str, id: &str, message: &str) -> (Value, Value) {
    (
        Value::Int(1_700_000_000),
        Value::from(serde_json::json!({
            "type": resource_type,
            "id": id,
            "message": message,
            "level": "INFO",
        })),
    )
}

/// Records whose `(type, id)` pairs are `(1,1)` x1, `(1,2)` x2, `(2,1)` x3, `(2,2)` x4.
pub fn ten_records() -> Vec<(Value, Value)> {
    let mut records = Vec::new();
    for (t, id, n) in [("1", "1", 1), ("1", "2", 2), ("2", "1", 3), ("2", "2", 4)] {
        for i in 0..n {
            records.push(record(t, id, &format!("{t}/{id}/{i}")));
        }
    }
    records
}
