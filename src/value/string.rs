//! String Values
//!
//! A plain string with analytics bookkeeping. Updates replace the contents.

use super::{Payload, Value};
use crate::error::{Result, StoreError};
use crate::storage::Keyspace;
use parking_lot::RwLock;
use std::time::Instant;
use tracing::trace;

#[derive(Debug)]
struct State {
    value: String,
    last_accessed: Instant,
    hits: u64,
}

/// A string-valued item.
///
/// # Example
///
/// ```
/// use polykv::value::{Payload, StringItem, Value};
///
/// let item = StringItem::new("draft");
/// item.update(&Payload::from("final")).unwrap();
///
/// assert_eq!(item.as_string(), Some("final".to_string()));
/// assert_eq!(item.frequency(), 1);
/// ```
#[derive(Debug)]
pub struct StringItem {
    state: RwLock<State>,
    created_at: Instant,
}

impl StringItem {
    pub fn new(value: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            state: RwLock::new(State {
                value: value.into(),
                last_accessed: now,
                hits: 0,
            }),
            created_at: now,
        }
    }
}

impl Value for StringItem {
    fn raw_value(&self) -> Payload {
        Payload::Str(self.state.read().value.clone())
    }

    fn created_at(&self) -> Instant {
        self.created_at
    }

    fn last_accessed(&self) -> Instant {
        self.state.read().last_accessed
    }

    fn frequency(&self) -> u64 {
        self.state.read().hits
    }

    fn category(&self) -> &str {
        "analytics_string"
    }

    fn as_string(&self) -> Option<String> {
        Some(self.state.read().value.clone())
    }

    fn update(&self, new_value: &Payload) -> Result<()> {
        let Payload::Str(s) = new_value else {
            return Err(StoreError::UnsupportedType {
                expected: "string",
                found: new_value.kind(),
            });
        };

        let mut state = self.state.write();
        state.value.clone_from(s);
        state.hits += 1;
        state.last_accessed = Instant::now();
        Ok(())
    }

    fn on_delete(&self, key: &[u8], db: &Keyspace) {
        let state = self.state.read();
        trace!(
            database = db.id(),
            key = %String::from_utf8_lossy(key),
            hits = state.hits,
            lifetime_ms = self.created_at.elapsed().as_millis() as u64,
            "Final report for string value"
        );
    }
}
