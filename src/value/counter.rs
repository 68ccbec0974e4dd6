//! Integer Counters

use super::{Payload, Value};
use crate::error::{Result, StoreError};
use crate::storage::Keyspace;
use parking_lot::Mutex;
use std::time::Instant;
use tracing::trace;

#[derive(Debug)]
struct State {
    count: i64,
    hits: u64,
    last_accessed: Instant,
}

/// A signed counter. Updates add an integer increment (negative to decrement).
#[derive(Debug)]
pub struct Counter {
    state: Mutex<State>,
    created_at: Instant,
}

impl Counter {
    /// Creates a counter starting at `initial`.
    pub fn new(initial: i64) -> Self {
        let now = Instant::now();
        Self {
            state: Mutex::new(State {
                count: initial,
                hits: 0,
                last_accessed: now,
            }),
            created_at: now,
        }
    }

    /// Current value.
    pub fn count(&self) -> i64 {
        self.state.lock().count
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Value for Counter {
    fn raw_value(&self) -> Payload {
        Payload::Int(self.count())
    }

    fn created_at(&self) -> Instant {
        self.created_at
    }

    fn last_accessed(&self) -> Instant {
        self.state.lock().last_accessed
    }

    fn frequency(&self) -> u64 {
        self.state.lock().hits
    }

    fn category(&self) -> &str {
        "counter"
    }

    fn as_string(&self) -> Option<String> {
        Some(self.count().to_string())
    }

    fn update(&self, new_value: &Payload) -> Result<()> {
        let Payload::Int(delta) = new_value else {
            return Err(StoreError::UnsupportedType {
                expected: "integer",
                found: new_value.kind(),
            });
        };

        let mut state = self.state.lock();
        state.count = state
            .count
            .checked_add(*delta)
            .ok_or(StoreError::Overflow)?;
        state.hits += 1;
        state.last_accessed = Instant::now();
        Ok(())
    }

    fn on_delete(&self, key: &[u8], db: &Keyspace) {
        trace!(
            database = db.id(),
            key = %String::from_utf8_lossy(key),
            count = self.count(),
            "Counter removed"
        );
    }
}
