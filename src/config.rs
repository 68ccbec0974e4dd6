//! Engine Configuration

use crate::error::{Result, StoreError};
use crate::storage::ExpiryConfig;

/// Default number of databases accepted at the update-source boundary
/// (same as Redis).
pub const DEFAULT_DATABASES: u32 = 16;

/// What an update does when its key is absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingKeyPolicy {
    /// Succeed without mutating anything.
    #[default]
    Ignore,
    /// Fail with `StoreError::KeyNotFound`.
    Strict,
}

/// Configuration for an [`Engine`](crate::storage::Engine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Update requests must target a database id below this bound.
    pub databases: u32,

    /// Behaviour of `apply_update` on an absent key.
    pub missing_key_policy: MissingKeyPolicy,

    /// Settings used by `Engine::start_expirer`.
    pub expiry: ExpiryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            databases: DEFAULT_DATABASES,
            missing_key_policy: MissingKeyPolicy::default(),
            expiry: ExpiryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Sets the number of database ids accepted by update requests.
    pub fn with_databases(mut self, databases: u32) -> Self {
        self.databases = databases;
        self
    }

    /// Sets what `apply_update` does on an absent key.
    pub fn with_missing_key_policy(mut self, policy: MissingKeyPolicy) -> Self {
        self.missing_key_policy = policy;
        self
    }

    /// Sets the expiration manager settings.
    pub fn with_expiry(mut self, expiry: ExpiryConfig) -> Self {
        self.expiry = expiry;
        self
    }

    /// Checks every field, the nested expiry settings included.
    pub fn validate(&self) -> Result<()> {
        if self.databases == 0 {
            return Err(StoreError::invalid("databases must be at least 1"));
        }
        self.expiry.validate()
    }
}
