//! Error types for the store engine.
//!
//! Every failure is per-operation: an error never leaves a database with a
//! key map and an expiry map that disagree.

use thiserror::Error;

/// Errors returned by engine operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The key is absent (or expired) and the caller asked for strict
    /// existence semantics.
    #[error("no such key: {0}")]
    KeyNotFound(String),

    /// A value variant rejected an update payload of the wrong dynamic type.
    #[error("unsupported type for update: expected {expected}, found {found}")]
    UnsupportedType {
        expected: &'static str,
        found: &'static str,
    },

    /// A malformed update request or an invalid configuration value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A counter increment would overflow.
    #[error("increment would overflow")]
    Overflow,

    /// The expiration manager needs a Tokio runtime to spawn its task.
    #[error("expiration manager must be started inside a Tokio runtime")]
    NoRuntime,
}

impl StoreError {
    /// Builds a [`StoreError::KeyNotFound`] from a raw key, lossily decoded.
    pub fn key_not_found(key: &[u8]) -> Self {
        StoreError::KeyNotFound(String::from_utf8_lossy(key).into_owned())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        StoreError::InvalidArgument(msg.into())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, StoreError>;
