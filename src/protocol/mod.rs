//! Reply Contract
//!
//! This module defines how results leave the engine: a three-shape [`Reply`]
//! and the [`Responder`] trait a transport implements to receive it.
//!
//! ## Example
//!
//! ```
//! use polykv::protocol::{Reply, Responder};
//!
//! struct Cli(Vec<String>);
//!
//! impl Responder for Cli {
//!     fn write_null(&mut self) {
//!         self.0.push("(nil)".into());
//!     }
//!     fn write_error(&mut self, msg: &str) {
//!         self.0.push(format!("(error) {}", msg));
//!     }
//!     fn write_bulk_string(&mut self, s: &str) {
//!         self.0.push(s.to_string());
//!     }
//! }
//!
//! let mut cli = Cli(Vec::new());
//! Reply::bulk("42").write_to(&mut cli);
//! Reply::Null.write_to(&mut cli);
//! assert_eq!(cli.0, vec!["42", "(nil)"]);
//! ```

pub mod reply;

pub use reply::{Reply, Responder};
