// Copyright 2024-Present YANDEX LLC
// SPDX-License-Identifier: Apache-2.0

//! Error types shared across the pipeline.
//!
//! Errors are split by blast radius:
//! - [`ConfigError`] aborts startup.
//! - [`PathError`] / [`TemplateError`] / [`EntryError`] skip a single record.
//! - [`TransportError`] aborts one dispatched batch.
//! - [`InitError`] is reported by client (re)initialization and never fails a flush.

use std::time::Duration;

use crate::client::Code;

/// Failure to locate a value inside a nested record or document.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathError {
    #[error("incorrect path: cannot descend into {segment:?}, parent is neither a map nor an array")]
    NotAContainer { segment: String },

    #[error("incorrect path: expected number instead of {segment:?}")]
    BadIndex { segment: String },

    #[error("incorrect path: index {index} out of bound (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("incorrect path: no value under {segment:?}")]
    Missing { segment: String },

    #[error("incorrect path: resolved value is null")]
    Null,

    #[error("failed to marshal JSON: {0}")]
    Unrepresentable(String),
}

/// A template path could not be resolved against a record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("failed to resolve template path {path:?}: {source}")]
pub struct TemplateError {
    /// The failing path, joined back with `/`.
    pub path: String,
    #[source]
    pub source: PathError,
}

/// A record that cannot become an entry. Only that record is skipped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EntryError {
    #[error("failed to parse resource type: {0}")]
    ResourceType(#[source] TemplateError),

    #[error("failed to parse resource ID: {0}")]
    ResourceId(#[source] TemplateError),

    #[error("failed to parse stream name: {0}")]
    StreamName(#[source] TemplateError),

    #[error("record is not a map")]
    NotAMap,
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("could not get all metadata: {0}")]
    Request(String),

    #[error("request to get all metadata returned status other than OK: {0}")]
    Status(u16),

    #[error("could not unmarshal metadata document: {0}")]
    Decode(String),

    #[error("failed to get metadata value by key {key:?}: {source}")]
    Lookup {
        key: String,
        #[source]
        source: PathError,
    },

    #[error("no metadata value for key {0:?}")]
    NotFound(String),
}

/// Startup-time configuration failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("authorization missing")]
    MissingAuthorization,

    #[error("unsupported authorization parameter {0:?}")]
    UnsupportedAuthorization(String),

    #[error("cannot resolve destination: {0}")]
    Destination(#[source] MetadataError),

    #[error("bad level: {0:?}")]
    BadLevel(String),

    #[error("bad default payload: {0}")]
    BadPayload(String),

    #[error("bad value {value:?} for {key}")]
    BadValue { key: &'static str, value: String },

    #[error("failed to initialize ingestion client: {0}")]
    Client(#[source] InitError),
}

/// Whole-request failure reported by an ingestion client.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct TransportError {
    pub code: Code,
    pub message: String,
}

impl TransportError {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("{backoff:?} since last client init haven't passed, only {elapsed:?}")]
    TooSoon { backoff: Duration, elapsed: Duration },

    #[error("failed to obtain credentials: {0}")]
    Credentials(String),

    #[error("error creating tls config: {0}")]
    Tls(String),

    #[error("error creating http client: {0}")]
    Client(String),
}
