// Copyright 2024-Present YANDEX LLC
// SPDX-License-Identifier: Apache-2.0

//! Instance metadata lookups and `{{key}}` / `{{key:default}}` substitution.
//!
//! Configuration strings may reference instance metadata, e.g.
//! `{{yandex/folder-id}}` or `{{instance/name:unknown}}`. They are resolved once
//! at startup through a [`MetadataProvider`]. A lookup that fails falls back to
//! the default after the colon (empty when there is none) and never fails the
//! whole string.

use async_trait::async_trait;
use std::collections::HashMap;
use std::env;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::errors::MetadataError;
use crate::path;
use crate::tls::create_reqwest_client_builder;
use crate::value::Value;

pub const METADATA_URL_ENV: &str = "YC_METADATA_URL";
pub const DEFAULT_METADATA_URL: &str = "http://169.254.169.254";
pub const METADATA_PATH: &str = "/computeMetadata/v1/";
pub const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
pub const METADATA_FLAVOR: &str = "Google";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const CACHE_FRESHNESS: Duration = Duration::from_secs(1);

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn get_value(&self, key: &str) -> Result<String, MetadataError>;
}

/// Base URL of the metadata service, `YC_METADATA_URL` when set.
#[must_use]
pub fn metadata_base_url() -> String {
    env::var(METADATA_URL_ENV)
        .ok()
        .map(|url| url.trim().trim_end_matches('/').to_string())
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_METADATA_URL.to_string())
}

/// Converts `-` separated words to camelCase, the way the recursive metadata
/// document spells its keys: `yandex/folder-id` becomes `yandex/folderId`.
#[must_use]
pub fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.chars() {
        if c == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

struct Cached {
    document: Arc<Value>,
    fetched_at: Instant,
}

/// Fetches the whole recursive metadata document and serves lookups from it,
/// refetching once the copy is older than the freshness window.
pub struct CachingMetadataProvider {
    client: reqwest::Client,
    base_url: String,
    freshness: Duration,
    cache: RwLock<Option<Cached>>,
}

impl CachingMetadataProvider {
    pub fn new() -> Result<Self, MetadataError> {
        Self::with_base_url(metadata_base_url())
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, MetadataError> {
        let client = create_reqwest_client_builder(None)
            .map_err(|e| MetadataError::Request(e.to_string()))?
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MetadataError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            freshness: CACHE_FRESHNESS,
            cache: RwLock::new(None),
        })
    }

    #[must_use]
    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    async fn document(&self) -> Result<Arc<Value>, MetadataError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.fetched_at.elapsed() < self.freshness {
                return Ok(Arc::clone(&cached.document));
            }
        }

        let document = Arc::new(self.fetch().await?);
        *self.cache.write().await = Some(Cached {
            document: Arc::clone(&document),
            fetched_at: Instant::now(),
        });
        Ok(document)
    }

    async fn fetch(&self) -> Result<Value, MetadataError> {
        let url = format!("{}{METADATA_PATH}?recursive=true", self.base_url);
        debug!("Fetching instance metadata from {url}");

        let response = self
            .client
            .get(&url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .send()
            .await
            .map_err(|e| MetadataError::Request(e.to_string()))?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(MetadataError::Status(response.status().as_u16()));
        }

        let document: serde_json::Value = response
            .json()
            .await
            .map_err(|e| MetadataError::Decode(e.to_string()))?;
        Ok(Value::from(document))
    }
}

#[async_trait]
impl MetadataProvider for CachingMetadataProvider {
    async fn get_value(&self, key: &str) -> Result<String, MetadataError> {
        let document = self.document().await?;
        let key = camel_case(key);
        let segments: Vec<&str> = key.split('/').collect();
        path::resolve(&document, &segments).map_err(|source| MetadataError::Lookup {
            key: key.clone(),
            source,
        })
    }
}

/// Fixed key/value metadata, for offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadataProvider {
    values: HashMap<String, String>,
}

impl StaticMetadataProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticMetadataProvider {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl MetadataProvider for StaticMetadataProvider {
    async fn get_value(&self, key: &str) -> Result<String, MetadataError> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(key.to_string()))
    }
}

fn metadata_template_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    RE.get_or_init(|| Regex::new(r"\{\{[^{}]+\}\}").expect("metadata template pattern is valid"))
}

/// Replaces every `{{key}}` / `{{key:default}}` group in `raw` with the
/// provider's value for `key`, or with `default` when the lookup fails.
pub async fn parse(raw: &str, provider: &dyn MetadataProvider) -> String {
    let re = metadata_template_regex();
    if !re.is_match(raw) {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut last = 0;
    for m in re.find_iter(raw) {
        out.push_str(&raw[last..m.start()]);

        let inner = &raw[m.start() + 2..m.end() - 2];
        let mut fields = inner.split(':');
        let key = fields.next().unwrap_or_default();
        let default = fields.next().unwrap_or_default();

        match provider.get_value(key).await {
            Ok(value) => out.push_str(&value),
            Err(e) => {
                warn!(
                    "Using default value {default:?} for template {:?} because of error: {e}",
                    m.as_str()
                );
                out.push_str(default);
            }
        }
        last = m.end();
    }
    out.push_str(&raw[last..]);
    out
}
