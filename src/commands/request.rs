//! Update Requests
//!
//! An update source (a queue consumer, an RPC endpoint, a test) hands the
//! engine one [`UpdateRequest`] per mutation. Requests are validated before
//! they touch any database.

use crate::error::{Result, StoreError};
use crate::storage::DatabaseId;
use crate::value::Payload;
use bytes::Bytes;
use std::time::Duration;

/// What a request does to its key.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Store a fresh value built from the payload, replacing any existing one.
    Set(Payload),
    /// Merge the payload into the existing value.
    Update(Payload),
    /// Remove the key.
    Delete,
}

impl UpdateOp {
    /// Lowercase operation name, used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            UpdateOp::Set(_) => "set",
            UpdateOp::Update(_) => "update",
            UpdateOp::Delete => "delete",
        }
    }
}

/// A single mutation addressed to one key of one database.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub database: DatabaseId,
    pub key: Bytes,
    pub op: UpdateOp,
    /// Time to live in milliseconds. Only meaningful for `Set`.
    pub ttl_ms: Option<i64>,
}

impl UpdateRequest {
    /// A `Set` request without a ttl.
    pub fn set(database: DatabaseId, key: impl Into<Bytes>, payload: impl Into<Payload>) -> Self {
        Self {
            database,
            key: key.into(),
            op: UpdateOp::Set(payload.into()),
            ttl_ms: None,
        }
    }

    /// An `Update` request.
    pub fn update(
        database: DatabaseId,
        key: impl Into<Bytes>,
        payload: impl Into<Payload>,
    ) -> Self {
        Self {
            database,
            key: key.into(),
            op: UpdateOp::Update(payload.into()),
            ttl_ms: None,
        }
    }

    /// A `Delete` request.
    pub fn delete(database: DatabaseId, key: impl Into<Bytes>) -> Self {
        Self {
            database,
            key: key.into(),
            op: UpdateOp::Delete,
            ttl_ms: None,
        }
    }

    /// Attaches a time to live in milliseconds.
    pub fn with_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    /// The time to live as a duration, once validated.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms
            .and_then(|ms| u64::try_from(ms).ok())
            .map(Duration::from_millis)
    }

    /// Checks the request against an engine accepting `databases` ids.
    pub fn validate(&self, databases: u32) -> Result<()> {
        if self.key.is_empty() {
            return Err(StoreError::invalid("key must not be empty"));
        }
        if self.database >= databases {
            return Err(StoreError::invalid(format!(
                "database {} out of range (0..{})",
                self.database, databases
            )));
        }
        match (self.ttl_ms, &self.op) {
            (Some(ms), _) if ms < 0 => Err(StoreError::invalid(format!(
                "ttl must not be negative, got {}ms",
                ms
            ))),
            (Some(_), UpdateOp::Set(_)) | (None, _) => Ok(()),
            (Some(_), op) => Err(StoreError::invalid(format!(
                "ttl is only valid for set, not {}",
                op.name()
            ))),
        }
    }
}
