// Copyright 2024-Present YANDEX LLC
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::str::FromStr;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    time::{interval, Duration, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use yc_logging::{
    config::CONFIG_KEYS,
    logger::Formatter,
    metadata::CachingMetadataProvider,
    plugin::{FlushStatus, Plugin},
    value::Value,
};

const ENV_PREFIX: &str = "YC_LOGGING_";
const DEFAULT_TAG: &str = "stdin";
const DEFAULT_FLUSH_INTERVAL: u64 = 5;
const DEFAULT_RETRY_LIMIT: u32 = 5;
const DEFAULT_MAX_BUFFERED: usize = 10_000;

type Record = (Value, Value);

#[tokio::main]
pub async fn main() {
    let log_level = env::var("YC_LOGGING_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .event_format(Formatter)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let tag = env::var("YC_LOGGING_TAG").unwrap_or_else(|_| DEFAULT_TAG.to_string());
    let flush_every = env_number("YC_LOGGING_FLUSH_INTERVAL", DEFAULT_FLUSH_INTERVAL);
    let retry_limit = env::var("YC_LOGGING_RETRY_LIMIT")
        .ok()
        .and_then(|val| val.parse::<u32>().ok())
        .unwrap_or(DEFAULT_RETRY_LIMIT);
    let max_buffered = env_number("YC_LOGGING_MAX_BUFFERED", DEFAULT_MAX_BUFFERED);

    for key in CONFIG_KEYS {
        if let Ok(value) = env::var(env_key(key)) {
            debug!("Configuration {key} = {value:?}");
        }
    }

    let provider = match CachingMetadataProvider::new() {
        Ok(provider) => provider,
        Err(e) => {
            error!("Error creating metadata provider: {e}");
            return;
        }
    };
    let plugin = match Plugin::from_config(|key| env::var(env_key(key)).ok(), &provider).await {
        // a flush may not outlive the interval that triggered it
        Ok(plugin) => plugin.with_unit_deadline(Duration::from_secs(flush_every)),
        Err(e) => {
            error!("Error creating plugin on startup: {e}");
            return;
        }
    };
    info!(
        "Forwarding stdin records with tag {tag:?} every {flush_every}s, \
         keeping at most {max_buffered} records for up to {retry_limit} retries"
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, canceling in-flight writes");
            interrupt.cancel();
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut buffer = Buffer::new(retry_limit, max_buffered);
    let mut flush_interval = interval(Duration::from_secs(flush_every));
    flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    flush_interval.tick().await; // discard first tick, which is instantaneous

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(record) = parse_line(&line) {
                        buffer.push(record);
                    }
                }
                Ok(None) => {
                    debug!("Reached end of input");
                    break;
                }
                Err(e) => {
                    error!("Error reading input: {e}");
                    break;
                }
            },
            _ = flush_interval.tick() => {
                flush(&plugin, &mut buffer, &tag, &cancel).await;
            }
        }
    }

    // in-flight writes may have been canceled, the last flush gets a fresh token
    flush(&plugin, &mut buffer, &tag, &CancellationToken::new()).await;
    if !buffer.records.is_empty() {
        warn!("Exiting with {} undelivered records", buffer.records.len());
    }
}

fn env_key(key: &str) -> String {
    format!("{ENV_PREFIX}{}", key.to_uppercase())
}

/// Reads a positive number from `name`, falling back to `default`.
fn env_number<T>(name: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default,
{
    env::var(name)
        .ok()
        .and_then(|val| val.parse::<T>().ok())
        .filter(|n| *n > T::default())
        .unwrap_or(default)
}

/// Records waiting for delivery, bounded in size and in retried flushes.
struct Buffer {
    records: Vec<Record>,
    /// Consecutive flushes that ended in [`FlushStatus::Retry`].
    retries: u32,
    retry_limit: u32,
    max_records: usize,
    overflow: usize,
}

impl Buffer {
    fn new(retry_limit: u32, max_records: usize) -> Self {
        Self {
            records: Vec::new(),
            retries: 0,
            retry_limit,
            max_records,
            overflow: 0,
        }
    }

    fn push(&mut self, record: Record) {
        if self.records.len() >= self.max_records {
            if self.overflow == 0 {
                error!(
                    "Buffer holds {} records, dropping new records until the next flush",
                    self.records.len()
                );
            }
            self.overflow += 1;
            return;
        }
        self.records.push(record);
    }

    fn clear(&mut self) {
        self.records.clear();
        self.retries = 0;
    }
}

/// Parses one input line: a JSON object, or a `[timestamp, object]` pair.
fn parse_line(line: &str) -> Option<Record> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(line) {
        Ok(record @ serde_json::Value::Object(_)) => Some((now(), Value::from(record))),
        Ok(serde_json::Value::Array(mut pair))
            if pair.len() == 2 && pair[1].is_object() =>
        {
            let record = pair.pop().map(Value::from)?;
            let timestamp = pair.pop().map(Value::from)?;
            Some((timestamp, record))
        }
        Ok(other) => {
            warn!("Skipping line, expected an object or a [timestamp, object] pair: {other}");
            None
        }
        Err(e) => {
            warn!("Skipping unparsable line: {e}");
            None
        }
    }
}

fn now() -> Value {
    Value::String(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true))
}

async fn flush(plugin: &Plugin, buffer: &mut Buffer, tag: &str, cancel: &CancellationToken) {
    if buffer.overflow > 0 {
        error!("Dropped {} records over the buffer limit", buffer.overflow);
        buffer.overflow = 0;
    }
    if buffer.records.is_empty() {
        return;
    }
    debug!("Flushing {} records", buffer.records.len());
    let status = plugin.flush(buffer.records.iter().cloned(), tag, cancel).await;
    settle(status, buffer);
}

/// Keeps the records for the next flush on [`FlushStatus::Retry`] while the
/// retry limit allows it, forgets them otherwise.
fn settle(status: FlushStatus, buffer: &mut Buffer) {
    match status {
        FlushStatus::Ok => buffer.clear(),
        FlushStatus::Retry if buffer.retries >= buffer.retry_limit => {
            error!(
                "Dropping {} records after {} retried flushes",
                buffer.records.len(),
                buffer.retries
            );
            buffer.clear();
        }
        FlushStatus::Retry => {
            buffer.retries += 1;
            debug!(
                "Keeping {} records for the next flush, retry {}/{}",
                buffer.records.len(),
                buffer.retries,
                buffer.retry_limit
            );
        }
        FlushStatus::Error => {
            error!(
                "Dropping {} records after a permanent failure",
                buffer.records.len()
            );
            buffer.clear();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_env_key() {
        assert_eq!(env_key("group_id"), "YC_LOGGING_GROUP_ID");
        assert_eq!(env_key("message_tag_key"), "YC_LOGGING_MESSAGE_TAG_KEY");
    }

    #[test]
    fn test_parse_object_line() {
        let (timestamp, record) = parse_line(r#"{"message": "hi", "n": 1}"#).unwrap();
        assert!(matches!(timestamp, Value::String(_)));
        assert_eq!(record.get("message"), Some(&Value::from("hi")));
        assert_eq!(record.get("n"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_parse_pair_line() {
        let (timestamp, record) = parse_line(r#"[1700000000.5, {"message": "hi"}]"#).unwrap();
        assert_eq!(timestamp, Value::Float(1_700_000_000.5));
        assert_eq!(record.get("message"), Some(&Value::from("hi")));
    }

    #[test]
    fn test_parse_skips_bad_lines() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   ").is_none());
        assert!(parse_line("not json").is_none());
        assert!(parse_line("42").is_none());
        assert!(parse_line(r#"[1, 2]"#).is_none());
        assert!(parse_line(r#"[1, {"a": 1}, 3]"#).is_none());
    }

    fn record() -> Record {
        (Value::Int(0), Value::from(serde_json::json!({"m": 1})))
    }

    fn filled(retry_limit: u32, max_records: usize, len: usize) -> Buffer {
        let mut buffer = Buffer::new(retry_limit, max_records);
        for _ in 0..len {
            buffer.push(record());
        }
        buffer
    }

    #[test]
    fn test_settle() {
        let mut buffer = filled(5, 100, 2);
        settle(FlushStatus::Retry, &mut buffer);
        assert_eq!(buffer.records.len(), 2);
        assert_eq!(buffer.retries, 1);

        settle(FlushStatus::Ok, &mut buffer);
        assert!(buffer.records.is_empty());
        assert_eq!(buffer.retries, 0);

        let mut buffer = filled(5, 100, 1);
        settle(FlushStatus::Error, &mut buffer);
        assert!(buffer.records.is_empty());
    }

    #[test]
    fn test_settle_drops_after_retry_limit() {
        let mut buffer = filled(2, 100, 3);
        settle(FlushStatus::Retry, &mut buffer);
        settle(FlushStatus::Retry, &mut buffer);
        assert_eq!(buffer.records.len(), 3);
        assert_eq!(buffer.retries, 2);

        settle(FlushStatus::Retry, &mut buffer);
        assert!(buffer.records.is_empty());
        assert_eq!(buffer.retries, 0);

        buffer.push(record());
        settle(FlushStatus::Retry, &mut buffer);
        assert_eq!(buffer.records.len(), 1);
    }

    #[test]
    fn test_settle_without_retries() {
        let mut buffer = filled(0, 100, 4);
        settle(FlushStatus::Retry, &mut buffer);
        assert!(buffer.records.is_empty());
    }

    #[test]
    fn test_buffer_drops_records_over_limit() {
        let mut buffer = filled(5, 3, 5);
        assert_eq!(buffer.records.len(), 3);
        assert_eq!(buffer.overflow, 2);

        settle(FlushStatus::Retry, &mut buffer);
        buffer.push(record());
        assert_eq!(buffer.records.len(), 3);
        assert_eq!(buffer.overflow, 3);
    }

    #[test]
    #[serial_test::serial]
    fn test_env_number() {
        env::set_var("YC_LOGGING_MAX_BUFFERED", "250");
        assert_eq!(env_number("YC_LOGGING_MAX_BUFFERED", DEFAULT_MAX_BUFFERED), 250);
        env::set_var("YC_LOGGING_MAX_BUFFERED", "0");
        assert_eq!(
            env_number("YC_LOGGING_MAX_BUFFERED", DEFAULT_MAX_BUFFERED),
            DEFAULT_MAX_BUFFERED
        );
        env::set_var("YC_LOGGING_MAX_BUFFERED", "lots");
        assert_eq!(
            env_number("YC_LOGGING_MAX_BUFFERED", DEFAULT_MAX_BUFFERED),
            DEFAULT_MAX_BUFFERED
        );
        env::remove_var("YC_LOGGING_MAX_BUFFERED");
    }
}
