//! # polykv - An In-Memory Multi-Database Store Engine
//!
//! polykv keeps polymorphic values in numbered databases, expires keys by
//! deadline, and accepts mutations through a small update contract. It has
//! no network surface of its own: transports call the engine and receive
//! replies through a trait.
//!
//! ## Features
//!
//! - **Multiple Databases**: independent keyspaces, created on first use
//! - **Polymorphic Values**: strings, float metrics and counters behind one
//!   trait, open to new variants
//! - **Expiry**: lazy expiry on read plus a sampling background manager
//! - **Delete Hooks**: a value is told exactly once when it leaves a database
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               polykv                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │UpdateRequest│───>│  Command    │───>│   Reply     │──> Responder     │
//! │  │             │    │  Handler    │    │             │                  │
//! │  └─────────────┘    └──────┬──────┘    └─────────────┘                  │
//! │                            │                                            │
//! │                            ▼                                            │
//! │         ┌──────────────────────────────────────────────┐                │
//! │         │                   Engine                     │                │
//! │         │   one RwLock over every database             │                │
//! │         │  ┌────────┐ ┌────────┐ ┌────────┐            │                │
//! │         │  │ db 0   │ │ db 1   │ │ db N   │            │                │
//! │         │  └────────┘ └────────┘ └────────┘            │                │
//! │         └──────────────────────────────────────────────┘                │
//! │                            ▲                                            │
//! │                            │                                            │
//! │         ┌──────────────────┴──────────────────┐                         │
//! │         │              Expirer                │                         │
//! │         │       (Background Tokio Task)       │                         │
//! │         └─────────────────────────────────────┘                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use polykv::commands::{CommandHandler, UpdateRequest};
//! use polykv::storage::Engine;
//!
//! #[tokio::main]
//! async fn main() -> polykv::Result<()> {
//!     let engine = Engine::default();
//!
//!     // Start the background expiration manager
//!     engine.start_expirer()?;
//!
//!     let handler = CommandHandler::new(engine.clone());
//!     handler.handle(UpdateRequest::set(0, "latency", 12.5).with_ttl_ms(60_000));
//!     handler.handle(UpdateRequest::update(0, "latency", 2.5));
//!
//!     println!("{}", handler.get(0, b"latency")); // "15.000000"
//!
//!     engine.stop_expirer();
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`value`]: the `Value` trait and its built-in variants
//! - [`storage`]: databases, the engine and the expiration manager
//! - [`commands`]: update requests and the command handler
//! - [`protocol`]: reply shapes and the `Responder` trait
//! - [`config`]: engine configuration
//! - [`error`]: the crate error type
//!
//! ## Design Highlights
//!
//! ### One Lock
//!
//! All databases sit behind a single readers-writer lock. Every engine
//! operation is one short critical section, and an expiry sample never runs
//! concurrently with a write to any database.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with a deadline are expired in two ways:
//! 1. **Lazy**: reads treat an expired key as absent and reclaim it
//! 2. **Active**: a background task samples random expiring keys
//!
//! This ensures memory is reclaimed even for keys that are never accessed again.

pub mod commands;
pub mod config;
pub mod error;
pub mod protocol;
pub mod storage;
pub mod value;

// Re-export commonly used types for convenience
pub use commands::{CommandHandler, Outcome, UpdateOp, UpdateRequest};
pub use config::{EngineConfig, MissingKeyPolicy};
pub use error::{Result, StoreError};
pub use protocol::{Reply, Responder};
pub use storage::{Database, DatabaseId, Engine, Expirer, ExpiryConfig};
pub use value::{Counter, Metric, Payload, StringItem, Value};

/// Version of polykv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
