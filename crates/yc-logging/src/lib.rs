// Copyright 2024-Present YANDEX LLC
// SPDX-License-Identifier: Apache-2.0

//! # yc-logging
//!
//! Turns untyped, nested log records into leveled entries and delivers them
//! to Yandex Cloud Logging.
//!
//! ```text
//!   records ─> entry builder ─> resource grouper ─> dispatcher ─> ingestion client
//!                  │                                    │
//!              templates                        OK / RETRY / ERROR
//! ```
//!
//! - [`value`]: record model and normalization into JSON shapes
//! - [`path`] and [`template`]: `{path/to/field}` lookups inside records
//! - [`metadata`]: `{{key:default}}` lookups against instance metadata
//! - [`config`]: host configuration keys resolved once at startup
//! - [`entry`] and [`group`]: per-record entry building and grouping by resource
//! - [`dispatcher`]: bounded batches, concurrent writes, per-entry retries
//! - [`client`] and [`ingestion`]: the delivery contract and its HTTP implementation
//! - [`plugin`]: transform, flush and the status a host acts on

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod entry;
pub mod errors;
pub mod group;
pub mod ingestion;
pub mod logger;
pub mod metadata;
pub mod path;
pub mod plugin;
pub mod template;
pub mod tls;
pub mod value;
