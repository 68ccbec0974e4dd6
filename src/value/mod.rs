//! Polymorphic Stored Values
//!
//! Every key in a database maps to an `Arc<dyn Value>`. The trait fixes a
//! small capability set (raw access, timestamps, a hit counter, a category tag,
//! a type-specific merge rule and a delete hook) so the engine can store and
//! expire values without knowing what they are.
//!
//! ## Variants
//!
//! | Type           | Accepts          | Update rule             | Category             |
//! |----------------|------------------|-------------------------|----------------------|
//! | [`StringItem`] | `Payload::Str`   | replace                 | `analytics_string`   |
//! | [`Metric`]     | `Payload::Float` | add to the running sum  | custom label         |
//! | [`Counter`]    | `Payload::Int`   | add a signed increment  | `counter`            |
//!
//! Third-party variants plug in by implementing [`Value`].
//!
//! ## Concurrency
//!
//! Values are shared out of the engine as `Arc`s and may be updated while the
//! engine lock is not held, so each variant guards its own mutable fields.

pub mod counter;
pub mod metric;
pub mod string;

pub use counter::Counter;
pub use metric::Metric;
pub use string::StringItem;

use crate::error::Result;
use crate::storage::Keyspace;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// The dynamic type of data handed to a value: either its raw contents or an
/// update to merge into it.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Str(String),
    Float(f64),
    Int(i64),
}

impl Payload {
    /// Name of the payload's type, used in `UnsupportedType` errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Str(_) => "string",
            Payload::Float(_) => "float",
            Payload::Int(_) => "integer",
        }
    }

    /// Builds the default value variant for this payload.
    ///
    /// Strings become a [`StringItem`], floats a [`Metric`] labelled
    /// `"metric"`, integers a [`Counter`].
    pub fn into_value(self) -> Arc<dyn Value> {
        match self {
            Payload::Str(s) => Arc::new(StringItem::new(s)),
            Payload::Float(f) => Arc::new(Metric::new("metric", f)),
            Payload::Int(n) => Arc::new(Counter::new(n)),
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Str(s) => f.write_str(s),
            Payload::Float(v) => write!(f, "{:.6}", v),
            Payload::Int(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Str(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Str(s)
    }
}

impl From<f64> for Payload {
    fn from(v: f64) -> Self {
        Payload::Float(v)
    }
}

impl From<i64> for Payload {
    fn from(n: i64) -> Self {
        Payload::Int(n)
    }
}

/// A unit of stored data.
///
/// `update` is the only mutating entry point. A successful update increments
/// [`frequency`](Value::frequency) and refreshes
/// [`last_accessed`](Value::last_accessed); a rejected one changes neither.
pub trait Value: Send + Sync + fmt::Debug {
    /// Snapshot of the underlying payload.
    fn raw_value(&self) -> Payload;

    /// When the value was created. Never changes.
    fn created_at(&self) -> Instant;

    /// When the value was last successfully updated (reads do not count).
    fn last_accessed(&self) -> Instant;

    /// Number of updates applied so far.
    fn frequency(&self) -> u64;

    /// Classification tag.
    fn category(&self) -> &str;

    /// Best-effort string rendering, `None` when the value has none.
    fn as_string(&self) -> Option<String>;

    /// Merges `new_value` into the value using the variant's rule.
    ///
    /// Returns `StoreError::UnsupportedType` if the payload's type is not the
    /// one this variant accepts.
    ///
    /// Updates routed through a [`Database`](crate::storage::Database) run
    /// with the engine's write lock held, under the same rules as
    /// [`on_delete`](Value::on_delete).
    fn update(&self, new_value: &Payload) -> Result<()>;

    /// Called exactly once, synchronously, right before the key is removed by
    /// an explicit delete or by expiration.
    ///
    /// Runs while the engine's write lock is held: implementations must not
    /// block and must not call back into the engine.
    fn on_delete(&self, key: &[u8], db: &Keyspace);
}
