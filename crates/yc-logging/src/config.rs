// Copyright 2024-Present YANDEX LLC
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde_json::Map;
use tracing::{debug, info};

use crate::entry::FieldMapping;
use crate::errors::ConfigError;
use crate::metadata::{self, MetadataProvider};
use crate::template::Template;

pub const DEFAULT_ENDPOINT: &str = "ingester.logging.yandexcloud.net:443";
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
const METADATA_FOLDER_ID: &str = "yandex/folder-id";

pub const KEY_LEVEL_KEY: &str = "level_key";
pub const KEY_MESSAGE_KEY: &str = "message_key";
pub const KEY_MESSAGE_KEYS: &str = "message_keys";
pub const KEY_MESSAGE_TAG_KEY: &str = "message_tag_key";
pub const KEY_RESOURCE_TYPE: &str = "resource_type";
pub const KEY_RESOURCE_ID: &str = "resource_id";
pub const KEY_STREAM_NAME: &str = "stream_name";
pub const KEY_GROUP_ID: &str = "group_id";
pub const KEY_FOLDER_ID: &str = "folder_id";
pub const KEY_DEFAULT_LEVEL: &str = "default_level";
pub const KEY_DEFAULT_PAYLOAD: &str = "default_payload";
pub const KEY_AUTHORIZATION: &str = "authorization";
pub const KEY_ENDPOINT: &str = "endpoint";
pub const KEY_CA_FILE: &str = "ca_file";
pub const KEY_WRITE_TIMEOUT: &str = "write_timeout";

/// Every configuration key understood by [`Config::load`].
pub const CONFIG_KEYS: &[&str] = &[
    KEY_LEVEL_KEY,
    KEY_MESSAGE_KEY,
    KEY_MESSAGE_KEYS,
    KEY_MESSAGE_TAG_KEY,
    KEY_RESOURCE_TYPE,
    KEY_RESOURCE_ID,
    KEY_STREAM_NAME,
    KEY_GROUP_ID,
    KEY_FOLDER_ID,
    KEY_DEFAULT_LEVEL,
    KEY_DEFAULT_PAYLOAD,
    KEY_AUTHORIZATION,
    KEY_ENDPOINT,
    KEY_CA_FILE,
    KEY_WRITE_TIMEOUT,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Level::Trace),
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARN" => Ok(Level::Warn),
            "ERROR" => Ok(Level::Error),
            "FATAL" => Ok(Level::Fatal),
            _ => Err(ConfigError::BadLevel(s.to_string())),
        }
    }
}

/// Where entries are written: an explicit log group, or the default group of a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    LogGroupId(String),
    FolderId(String),
}

/// Values the backend applies to entries that omit them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Defaults {
    pub level: Option<Level>,
    pub json_payload: Option<Map<String, serde_json::Value>>,
}

const KEY_FILE_PREFIX: &str = "iam-key-file:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// Token of the service account attached to the instance, via the metadata service.
    InstanceServiceAccount,
    /// IAM token from the `YC_TOKEN` environment variable.
    IamToken,
    /// Authorized key of a service account, exchanged for IAM tokens.
    KeyFile(PathBuf),
}

impl FromStr for Authorization {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "instance-service-account" => Ok(Authorization::InstanceServiceAccount),
            "iam-token" => Ok(Authorization::IamToken),
            other => match other.strip_prefix(KEY_FILE_PREFIX).map(str::trim) {
                Some(path) if !path.is_empty() => Ok(Authorization::KeyFile(PathBuf::from(path))),
                _ => Err(ConfigError::UnsupportedAuthorization(other.to_string())),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub authorization: Authorization,
    pub endpoint: String,
    pub ca_file: Option<PathBuf>,
    pub write_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub mapping: FieldMapping,
    pub destination: Destination,
    pub defaults: Option<Defaults>,
    pub client: ClientSettings,
}

struct Source<'a, F> {
    lookup: F,
    provider: &'a dyn MetadataProvider,
}

impl<F: Fn(&str) -> Option<String>> Source<'_, F> {
    /// Trimmed, metadata-resolved value of `key`. Blank values count as unset.
    async fn get(&self, key: &str) -> Option<String> {
        let raw = (self.lookup)(key)?;
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        Some(metadata::parse(raw, self.provider).await)
    }

    async fn template(&self, key: &str) -> Template {
        self.get(key)
            .await
            .map(|raw| Template::compile(&raw))
            .unwrap_or_default()
    }
}

impl Config {
    /// Reads every key through `lookup` once. Values may reference instance
    /// metadata with `{{key}}` / `{{key:default}}`.
    pub async fn load<F>(lookup: F, provider: &dyn MetadataProvider) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = Source { lookup, provider };

        let mapping = load_mapping(&source).await;
        let destination = load_destination(&source).await?;
        let defaults = load_defaults(&source).await?;
        let client = load_client_settings(&source).await?;

        Ok(Config {
            mapping,
            destination,
            defaults,
            client,
        })
    }
}

async fn load_mapping<F: Fn(&str) -> Option<String>>(source: &Source<'_, F>) -> FieldMapping {
    let mut message_keys: Vec<String> = Vec::new();
    let single = source.get(KEY_MESSAGE_KEY).await;
    let list = source.get(KEY_MESSAGE_KEYS).await.unwrap_or_default();
    for key in single
        .iter()
        .map(String::as_str)
        .chain(list.split(','))
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        if !message_keys.iter().any(|k| k == key) {
            message_keys.push(key.to_string());
        }
    }

    FieldMapping {
        level_key: source.get(KEY_LEVEL_KEY).await,
        message_keys,
        tag_key: source.get(KEY_MESSAGE_TAG_KEY).await,
        resource_type: source.template(KEY_RESOURCE_TYPE).await,
        resource_id: source.template(KEY_RESOURCE_ID).await,
        stream_name: source.template(KEY_STREAM_NAME).await,
    }
}

async fn load_destination<F: Fn(&str) -> Option<String>>(
    source: &Source<'_, F>,
) -> Result<Destination, ConfigError> {
    if let Some(group_id) = source.get(KEY_GROUP_ID).await {
        return Ok(Destination::LogGroupId(group_id));
    }
    if let Some(folder_id) = source.get(KEY_FOLDER_ID).await {
        return Ok(Destination::FolderId(folder_id));
    }

    debug!("Neither group_id nor folder_id set, using folder of the instance");
    let folder_id = source
        .provider
        .get_value(METADATA_FOLDER_ID)
        .await
        .map_err(ConfigError::Destination)?;
    Ok(Destination::FolderId(folder_id))
}

async fn load_defaults<F: Fn(&str) -> Option<String>>(
    source: &Source<'_, F>,
) -> Result<Option<Defaults>, ConfigError> {
    let mut defaults = Defaults::default();

    if let Some(level) = source.get(KEY_DEFAULT_LEVEL).await {
        let level: Level = level.parse()?;
        info!("Will use {level} as default level");
        defaults.level = Some(level);
    }

    if let Some(payload) = source.get(KEY_DEFAULT_PAYLOAD).await {
        match serde_json::from_str(&payload) {
            Ok(serde_json::Value::Object(object)) => {
                info!("Will use default payload {payload}");
                defaults.json_payload = Some(object);
            }
            Ok(other) => {
                return Err(ConfigError::BadPayload(format!(
                    "expected a JSON object, got {other}"
                )))
            }
            Err(e) => return Err(ConfigError::BadPayload(e.to_string())),
        }
    }

    if defaults == Defaults::default() {
        Ok(None)
    } else {
        Ok(Some(defaults))
    }
}

async fn load_client_settings<F: Fn(&str) -> Option<String>>(
    source: &Source<'_, F>,
) -> Result<ClientSettings, ConfigError> {
    let authorization: Authorization = source
        .get(KEY_AUTHORIZATION)
        .await
        .ok_or(ConfigError::MissingAuthorization)?
        .parse()?;

    let write_timeout = match source.get(KEY_WRITE_TIMEOUT).await {
        Some(raw) => match raw.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                return Err(ConfigError::BadValue {
                    key: KEY_WRITE_TIMEOUT,
                    value: raw,
                })
            }
        },
        None => DEFAULT_WRITE_TIMEOUT,
    };

    Ok(ClientSettings {
        authorization,
        endpoint: source
            .get(KEY_ENDPOINT)
            .await
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        ca_file: source.get(KEY_CA_FILE).await.map(PathBuf::from),
        write_timeout,
    })
}
