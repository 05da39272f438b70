// Copyright 2024-Present YANDEX LLC
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{Defaults, Destination};
use crate::entry::{Entry, Resource};
use crate::errors::{InitError, TransportError};

/// Canonical RPC status codes used by the ingestion backend, both for whole
/// requests and for individual entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Ok,
    Canceled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl Code {
    /// Maps a numeric status code. Values outside the canonical range are `Unknown`.
    #[must_use]
    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => Code::Ok,
            1 => Code::Canceled,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }

    /// Transient failures: the same entry may succeed if sent again.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Code::ResourceExhausted
                | Code::FailedPrecondition
                | Code::Unavailable
                | Code::Unknown
                | Code::Canceled
                | Code::DeadlineExceeded
        )
    }

    /// Credential failures that call for a client reinit.
    #[must_use]
    pub fn is_auth(self) -> bool {
        matches!(self, Code::PermissionDenied | Code::Unauthenticated)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for Code {
    type Err = ();

    /// Parses the wire name (`RESOURCE_EXHAUSTED`) or the numeric form (`8`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = s.parse::<i32>() {
            return Ok(Code::from_i32(n));
        }
        let code = match s.to_ascii_uppercase().as_str() {
            "OK" => Code::Ok,
            "CANCELED" | "CANCELLED" => Code::Canceled,
            "UNKNOWN" => Code::Unknown,
            "INVALID_ARGUMENT" => Code::InvalidArgument,
            "DEADLINE_EXCEEDED" => Code::DeadlineExceeded,
            "NOT_FOUND" => Code::NotFound,
            "ALREADY_EXISTS" => Code::AlreadyExists,
            "PERMISSION_DENIED" => Code::PermissionDenied,
            "RESOURCE_EXHAUSTED" => Code::ResourceExhausted,
            "FAILED_PRECONDITION" => Code::FailedPrecondition,
            "ABORTED" => Code::Aborted,
            "OUT_OF_RANGE" => Code::OutOfRange,
            "UNIMPLEMENTED" => Code::Unimplemented,
            "INTERNAL" => Code::Internal,
            "UNAVAILABLE" => Code::Unavailable,
            "DATA_LOSS" => Code::DataLoss,
            "UNAUTHENTICATED" => Code::Unauthenticated,
            _ => return Err(()),
        };
        Ok(code)
    }
}

/// Rejection of a single entry inside an otherwise accepted write.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryFailure {
    pub code: Code,
    pub message: String,
}

impl EntryFailure {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for EntryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// One delivery call: a batch of entries for a single resource.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub destination: Arc<Destination>,
    pub resource: Resource,
    pub entries: Vec<Entry>,
    pub defaults: Option<Arc<Defaults>>,
}

/// Index of a rejected entry within [`WriteRequest::entries`] mapped to the reason.
/// Indices that are absent were delivered.
pub type WriteFailures = HashMap<usize, EntryFailure>;

#[async_trait]
pub trait IngestionClient: Send + Sync {
    /// Sends one batch. `Err` means the whole request failed and nothing
    /// can be assumed about individual entries.
    async fn write(&self, request: &WriteRequest) -> Result<WriteFailures, TransportError>;

    /// (Re)establishes credentials and connection. Implementations rate-limit
    /// themselves and answer [`InitError::TooSoon`] instead of blocking.
    async fn init(&self) -> Result<(), InitError>;
}
