//! Storage Module
//!
//! This module provides the core storage functionality for polykv: a set of
//! numbered databases behind one engine-wide readers-writer lock, per-key
//! deadlines, and a background expiration manager.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                              │
//! │        RwLock<HashMap<DatabaseId, Keyspace>>                │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐                     │
//! │  │ db 0     │ │ db 1     │ │ db ...   │   created lazily    │
//! │  │ keys     │ │ keys     │ │ keys     │                     │
//! │  │ expiring │ │ expiring │ │ expiring │                     │
//! │  └──────────┘ └──────────┘ └──────────┘                     │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ Weak
//!              ┌─────────────┴─────────────┐
//!              │         Expirer           │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Multiple Databases**: independent keyspaces addressed by integer id
//! - **Expiry**: keys can carry an absolute deadline
//! - **Lazy Expiry**: expired keys are reclaimed on access
//! - **Active Expiry**: random sampling reclaims keys nobody reads
//! - **Delete Hooks**: every removal path notifies the value exactly once
//!
//! ## Example
//!
//! ```
//! use polykv::storage::Engine;
//! use polykv::value::{Counter, Payload, Value};
//! use bytes::Bytes;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let engine = Engine::default();
//! let db = engine.database(2);
//!
//! db.set_with_ttl(
//!     Bytes::from("visits"),
//!     Arc::new(Counter::new(0)),
//!     Duration::from_secs(3600),
//! );
//! db.update(b"visits", &Payload::Int(1)).unwrap();
//!
//! let visits = db.get_or_expire(b"visits", true).unwrap();
//! assert_eq!(visits.raw_value(), Payload::Int(1));
//! ```

pub mod database;
pub mod engine;
pub mod expiring;
pub mod expiry;

// Re-export commonly used types
pub use database::{Database, DatabaseId, Keyspace};
pub use engine::{Engine, EngineStats};
pub use expiring::ExpiryIndex;
pub use expiry::{sampling_pass, Expirer, ExpiryConfig, ExpiryStats, PassOutcome};
