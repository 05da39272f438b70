// Copyright 2024-Present YANDEX LLC
// SPDX-License-Identifier: Apache-2.0

//! Host facing side of the pipeline: configuration, per-flush transform and
//! delivery, and the single status a host acts on.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::IngestionClient;
use crate::config::Config;
use crate::dispatcher::{BatchOutcome, Dispatcher, DispatcherConfig, DEFAULT_UNIT_DEADLINE};
use crate::entry::{decode_timestamp, FieldMapping};
use crate::errors::{ConfigError, InitError};
use crate::group::ResourceGroups;
use crate::ingestion::HttpIngestionClient;
use crate::metadata::MetadataProvider;
use crate::value::Value;

pub const REINIT_BACKOFF: Duration = Duration::from_secs(30);

/// What the host should do with the chunk it just handed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Delivered, or dropped for good reasons. Forget the chunk.
    Ok,
    /// Transient failure. Hand the same chunk over again later.
    Retry,
    /// Permanent failure. Do not retry the chunk.
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub records: usize,
    pub skipped_records: usize,
    pub dropped_fields: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transformed {
    pub groups: ResourceGroups,
    pub stats: TransformStats,
}

/// Folds batch outcomes into one status. Any terminal transport error wins,
/// then any retryable or credential error, otherwise the flush succeeded.
#[must_use]
pub fn aggregate(outcomes: &[BatchOutcome]) -> FlushStatus {
    let mut status = FlushStatus::Ok;
    for outcome in outcomes {
        if let Err(e) = &outcome.result {
            if e.code.is_retryable() || e.code.is_auth() {
                status = FlushStatus::Retry;
            } else {
                return FlushStatus::Error;
            }
        }
    }
    status
}

pub struct Plugin {
    mapping: FieldMapping,
    dispatcher: Dispatcher,
    client: Arc<dyn IngestionClient>,
    last_reinit: Arc<Mutex<Option<Instant>>>,
    reinit_backoff: Duration,
}

impl Plugin {
    /// Resolves configuration through `lookup` and wires it to `client`.
    /// The client is used as is; initializing it is up to the caller.
    pub async fn new<F>(
        lookup: F,
        provider: &dyn MetadataProvider,
        client: Arc<dyn IngestionClient>,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Config::load(lookup, provider).await?;
        Ok(Self::with_config(config, client))
    }

    /// Like [`Plugin::new`] with an [`HttpIngestionClient`] built from the
    /// configuration and initialized before returning.
    pub async fn from_config<F>(lookup: F, provider: &dyn MetadataProvider) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Config::load(lookup, provider).await?;
        let client = HttpIngestionClient::new(config.client.clone());
        client.init().await.map_err(ConfigError::Client)?;
        Ok(Self::with_config(config, Arc::new(client)))
    }

    #[must_use]
    pub fn with_config(config: Config, client: Arc<dyn IngestionClient>) -> Self {
        let dispatcher_config = DispatcherConfig {
            write_timeout: config.client.write_timeout,
            unit_deadline: DEFAULT_UNIT_DEADLINE.max(config.client.write_timeout),
            ..DispatcherConfig::default()
        };
        Self::with_dispatcher_config(config, client, dispatcher_config)
    }

    #[must_use]
    pub fn with_dispatcher_config(
        config: Config,
        client: Arc<dyn IngestionClient>,
        dispatcher_config: DispatcherConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            Arc::clone(&client),
            config.destination,
            config.defaults,
            dispatcher_config,
        );
        Self {
            mapping: config.mapping,
            dispatcher,
            client,
            last_reinit: Arc::new(Mutex::new(None)),
            reinit_backoff: REINIT_BACKOFF,
        }
    }

    /// Caps how long one batch of a flush may keep retrying.
    #[must_use]
    pub fn with_unit_deadline(mut self, unit_deadline: Duration) -> Self {
        self.dispatcher.set_unit_deadline(unit_deadline);
        self
    }

    #[must_use]
    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    pub async fn init_client(&self) -> Result<(), InitError> {
        self.client.init().await
    }

    /// Builds and groups entries for one flush. Records that fail to build
    /// are logged and skipped.
    pub fn transform<I>(&self, records: I, tag: &str) -> Transformed
    where
        I: IntoIterator<Item = (Value, Value)>,
    {
        let mut transformed = Transformed::default();
        for (timestamp, record) in records {
            transformed.stats.records += 1;
            match self.mapping.build(decode_timestamp(&timestamp), &record, tag) {
                Ok(built) => {
                    transformed.stats.dropped_fields += built.dropped_fields;
                    transformed.groups.push(built.resource, built.entry);
                }
                Err(e) => {
                    transformed.stats.skipped_records += 1;
                    warn!("Could not write entry {record:?} because of error: {e}");
                }
            }
        }
        transformed
    }

    /// Transforms and delivers one chunk of records.
    pub async fn flush<I>(&self, records: I, tag: &str, cancel: &CancellationToken) -> FlushStatus
    where
        I: IntoIterator<Item = (Value, Value)>,
    {
        let Transformed { groups, stats } = self.transform(records, tag);
        debug!(
            "Transformed {} records into {} entries for {} resources, skipped {}, dropped {} fields",
            stats.records,
            groups.entry_count(),
            groups.len(),
            stats.skipped_records,
            stats.dropped_fields,
        );
        if groups.is_empty() {
            return FlushStatus::Ok;
        }

        let outcomes = self.dispatcher.dispatch(groups, cancel).await;
        for outcome in &outcomes {
            match &outcome.result {
                Ok(report) if report.dropped > 0 => warn!(
                    "Dropped {} entries of resource {:?}",
                    report.dropped, outcome.resource
                ),
                Ok(_) => {}
                Err(e) if e.code.is_retryable() || e.code.is_auth() => {
                    warn!("Write retriable error for resource {:?}: {e}", outcome.resource);
                }
                Err(e) => error!("Write failed for resource {:?}: {e}", outcome.resource),
            }
        }

        if outcomes
            .iter()
            .any(|o| matches!(&o.result, Err(e) if e.code.is_auth()))
        {
            self.schedule_reinit();
        }
        aggregate(&outcomes)
    }

    /// Starts a background client reinit unless one was started within the backoff window.
    fn schedule_reinit(&self) {
        {
            let Ok(mut last) = self.last_reinit.lock() else {
                error!("Reinit state lock poisoned, skipping client reinit");
                return;
            };
            if let Some(at) = *last {
                if at.elapsed() < self.reinit_backoff {
                    debug!("Client reinit attempted {:?} ago, skipping", at.elapsed());
                    return;
                }
            }
            *last = Some(Instant::now());
        }

        let client = Arc::clone(&self.client);
        tokio::spawn(async move {
            match client.init().await {
                Ok(()) => info!("Ingestion client reinitialized"),
                Err(e) => warn!("Ingestion client reinit failed: {e}"),
            }
        });
    }
}
