// Copyright 2024-Present YANDEX LLC
// SPDX-License-Identifier: Apache-2.0

//! Batched, concurrent delivery of grouped entries.
//!
//! Each resource's entries are cut into batches of at most
//! [`DispatcherConfig::batch_max_len`]. Every batch runs as its own task: it
//! writes, keeps the entries rejected with a retryable code, drops the rest
//! and writes again until nothing is left. A whole-request failure ends the
//! batch immediately and becomes its outcome, and so does running past
//! [`DispatcherConfig::unit_deadline`].

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::client::{Code, IngestionClient, WriteRequest};
use crate::config::{Defaults, Destination, DEFAULT_WRITE_TIMEOUT};
use crate::entry::{Entry, Resource};
use crate::errors::TransportError;
use crate::group::ResourceGroups;

pub const BATCH_MAX_LEN: usize = 100;
pub const MESSAGE_PREVIEW_LEN: usize = 512;
const RETRY_BACKOFF: Duration = Duration::from_millis(100);
pub const DEFAULT_UNIT_DEADLINE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub batch_max_len: usize,
    /// Deadline for a single write call.
    pub write_timeout: Duration,
    /// Pause between retry rounds of one batch.
    pub retry_backoff: Duration,
    /// Budget for a whole batch, every retry round included.
    pub unit_deadline: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_max_len: BATCH_MAX_LEN,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            retry_backoff: RETRY_BACKOFF,
            unit_deadline: DEFAULT_UNIT_DEADLINE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub resource: Resource,
    pub entries: Vec<Entry>,
}

/// Splits every group into contiguous batches of at most `batch_max_len`
/// entries, keeping order within the group.
#[must_use]
pub fn plan(groups: ResourceGroups, batch_max_len: usize) -> Vec<Batch> {
    let batch_max_len = batch_max_len.max(1);
    let mut batches = Vec::new();
    for (resource, mut entries) in groups {
        while !entries.is_empty() {
            let rest = entries.split_off(entries.len().min(batch_max_len));
            batches.push(Batch {
                resource: resource.clone(),
                entries,
            });
            entries = rest;
        }
    }
    batches
}

/// Shortens `message` to at most `max_len` bytes, ending in `...` when cut.
#[must_use]
pub fn truncate(message: &str, max_len: usize) -> Cow<'_, str> {
    if message.len() <= max_len {
        return Cow::Borrowed(message);
    }
    let mut end = max_len.saturating_sub(3);
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Owned(format!("{}...", &message[..end]))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub delivered: usize,
    /// Entries rejected with a terminal code.
    pub dropped: usize,
    pub rounds: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub resource: Resource,
    pub result: Result<BatchReport, TransportError>,
}

pub struct Dispatcher {
    client: Arc<dyn IngestionClient>,
    destination: Arc<Destination>,
    defaults: Option<Arc<Defaults>>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn IngestionClient>,
        destination: Destination,
        defaults: Option<Defaults>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            client,
            destination: Arc::new(destination),
            defaults: defaults.map(Arc::new),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn set_unit_deadline(&mut self, unit_deadline: Duration) {
        self.config.unit_deadline = unit_deadline;
    }

    /// Delivers every group and returns exactly one outcome per planned batch.
    pub async fn dispatch(
        &self,
        groups: ResourceGroups,
        cancel: &CancellationToken,
    ) -> Vec<BatchOutcome> {
        let batches = plan(groups, self.config.batch_max_len);
        let expected = batches.len();
        debug!("Dispatching {expected} batches");

        let mut set = JoinSet::new();
        let mut resources = HashMap::with_capacity(expected);
        for batch in batches {
            let client = Arc::clone(&self.client);
            let config = self.config.clone();
            let cancel = cancel.clone();
            let request = WriteRequest {
                destination: Arc::clone(&self.destination),
                resource: batch.resource,
                entries: batch.entries,
                defaults: self.defaults.clone(),
            };
            let resource = request.resource.clone();
            let handle = set.spawn(async move {
                deliver(client.as_ref(), request, &config, &cancel).await
            });
            resources.insert(handle.id(), resource);
        }

        let mut outcomes = Vec::with_capacity(expected);
        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((id, result)) => outcomes.push(BatchOutcome {
                    resource: resources.remove(&id).unwrap_or_default(),
                    result,
                }),
                Err(e) => {
                    let resource = resources.remove(&e.id()).unwrap_or_default();
                    error!("Batch task for resource {resource:?} failed: {e}");
                    outcomes.push(BatchOutcome {
                        resource,
                        result: Err(TransportError::new(
                            Code::Internal,
                            format!("batch task failed: {e}"),
                        )),
                    });
                }
            }
        }
        outcomes
    }
}

/// Writes one batch until every entry is delivered or dropped, or until
/// `config.unit_deadline` runs out.
pub async fn deliver(
    client: &dyn IngestionClient,
    request: WriteRequest,
    config: &DispatcherConfig,
    cancel: &CancellationToken,
) -> Result<BatchReport, TransportError> {
    let deadline = tokio::time::Instant::now() + config.unit_deadline;
    match tokio::time::timeout_at(deadline, write_rounds(client, request, config, cancel)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::new(
            Code::DeadlineExceeded,
            format!("batch not delivered within {:?}", config.unit_deadline),
        )),
    }
}

async fn write_rounds(
    client: &dyn IngestionClient,
    mut request: WriteRequest,
    config: &DispatcherConfig,
    cancel: &CancellationToken,
) -> Result<BatchReport, TransportError> {
    let mut report = BatchReport::default();

    while !request.entries.is_empty() {
        if report.rounds > 0 {
            if config.retry_backoff.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    () = cancel.cancelled() => return Err(canceled()),
                    () = tokio::time::sleep(config.retry_backoff) => {}
                }
            }
        }
        report.rounds += 1;

        let failures = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(canceled()),
            written = tokio::time::timeout(config.write_timeout, client.write(&request)) => match written {
                Ok(result) => result?,
                Err(_) => {
                    return Err(TransportError::new(
                        Code::DeadlineExceeded,
                        format!("write did not finish within {:?}", config.write_timeout),
                    ))
                }
            },
        };

        let sent = std::mem::take(&mut request.entries);
        let mut retry = Vec::new();
        for (index, entry) in sent.into_iter().enumerate() {
            match failures.get(&index) {
                None => report.delivered += 1,
                Some(failure) if failure.code.is_retryable() => retry.push(entry),
                Some(failure) => {
                    report.dropped += 1;
                    warn!(
                        "Bad message {:?}: {failure}",
                        truncate(&entry.message, MESSAGE_PREVIEW_LEN)
                    );
                }
            }
        }

        if !retry.is_empty() {
            debug!(
                "Retrying {} entries of resource {:?}",
                retry.len(),
                request.resource
            );
        }
        request.entries = retry;
    }

    Ok(report)
}

fn canceled() -> TransportError {
    TransportError::new(Code::Canceled, "write canceled")
}
