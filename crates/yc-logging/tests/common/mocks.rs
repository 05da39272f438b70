// Copyright 2024-Present YANDEX LLC
// SPDX-License-Identifier: Apache-2.0

//! Mock ingestion clients for testing

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use yc_logging::client::{Code, EntryFailure, IngestionClient, WriteFailures, WriteRequest};
use yc_logging::errors::{InitError, TransportError};

pub type WriteResult = Result<WriteFailures, TransportError>;
type Responder = Box<dyn Fn(&WriteRequest) -> WriteResult + Send + Sync>;

/// Ingestion client that records every request and answers from a responder.
pub struct MockIngestionClient {
    responder: Responder,
    requests: Mutex<Vec<WriteRequest>>,
    init_calls: AtomicUsize,
}

#[allow(dead_code)]
impl MockIngestionClient {
    /// Accepts every entry.
    pub fn accepting() -> Self {
        Self::with_responder(|_| Ok(HashMap::new()))
    }

    /// Answers writes in order from `script`, accepting everything once it runs out.
    pub fn scripted(script: Vec<WriteResult>) -> Self {
        let script = Mutex::new(VecDeque::from(script));
        Self::with_responder(move |_| {
            script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(HashMap::new()))
        })
    }

    /// Fails every write with `code`.
    pub fn failing(code: Code) -> Self {
        Self::with_responder(move |_| Err(TransportError::new(code, "mock failure")))
    }

    pub fn with_responder(
        responder: impl Fn(&WriteRequest) -> WriteResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            init_calls: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> Vec<WriteRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IngestionClient for MockIngestionClient {
    async fn write(&self, request: &WriteRequest) -> WriteResult {
        self.requests.lock().unwrap().push(request.clone());
        (self.responder)(request)
    }

    async fn init(&self) -> Result<(), InitError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Ingestion client whose writes never complete.
#[allow(dead_code)]
pub struct HangingIngestionClient;

#[async_trait::async_trait]
impl IngestionClient for HangingIngestionClient {
    async fn write(&self, _request: &WriteRequest) -> WriteResult {
        std::future::pending().await
    }

    async fn init(&self) -> Result<(), InitError> {
        Ok(())
    }
}

/// Ingestion client that panics inside write.
#[allow(dead_code)]
pub struct PanickingIngestionClient;

#[async_trait::async_trait]
impl IngestionClient for PanickingIngestionClient {
    async fn write(&self, _request: &WriteRequest) -> WriteResult {
        panic!("mock client panicked");
    }

    async fn init(&self) -> Result<(), InitError> {
        Ok(())
    }
}

/// Failure map from `(index, code)` pairs.
#[allow(dead_code)]
pub fn failures(pairs: &[(usize, Code)]) -> WriteFailures {
    pairs
        .iter()
        .map(|(index, code)| (*index, EntryFailure::new(*code, format!("mock {code}"))))
        .collect()
}
