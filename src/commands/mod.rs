//! Update Command Module
//!
//! This module is the surface outside producers call through. It receives
//! update requests, executes them against the engine, and returns replies.
//!
//! ## Architecture
//!
//! ```text
//! Update source (queue consumer, RPC front-end, ...)
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ UpdateRequest   │  (request module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (handler module)
//! │                 │
//! │  - Validate     │
//! │  - Execute      │
//! │  - Reply        │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Engine          │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Operations
//!
//! - `Set`: store a fresh value built from the payload, optionally with a ttl
//! - `Update`: merge the payload into the existing value
//! - `Delete`: remove the key
//! - `get`: read a key, absent and expired keys reply null

pub mod handler;
pub mod request;

// Re-export the main command handler
pub use handler::{CommandHandler, Outcome};
pub use request::{UpdateOp, UpdateRequest};
