//! Accumulating Metrics
//!
//! A floating-point sum: each update adds its payload and counts as a hit.

use super::{Payload, Value};
use crate::error::{Result, StoreError};
use crate::storage::Keyspace;
use parking_lot::Mutex;
use std::time::Instant;
use tracing::trace;

#[derive(Debug)]
struct State {
    sum: f64,
    hits: u64,
    last_accessed: Instant,
}

/// A labelled float accumulator.
///
/// # Example
///
/// ```
/// use polykv::value::{Metric, Payload, Value};
///
/// let latency = Metric::new("latency_ms", 10.0);
/// latency.update(&Payload::Float(5.0)).unwrap();
/// latency.update(&Payload::Float(5.0)).unwrap();
///
/// assert_eq!(latency.raw_value(), Payload::Float(20.0));
/// assert_eq!(latency.frequency(), 2);
/// assert_eq!(latency.category(), "latency_ms");
/// ```
#[derive(Debug)]
pub struct Metric {
    state: Mutex<State>,
    label: String,
    created_at: Instant,
}

impl Metric {
    pub fn new(label: impl Into<String>, initial: f64) -> Self {
        let now = Instant::now();
        Self {
            state: Mutex::new(State {
                sum: initial,
                hits: 0,
                last_accessed: now,
            }),
            label: label.into(),
            created_at: now,
        }
    }

    /// Current sum.
    pub fn sum(&self) -> f64 {
        self.state.lock().sum
    }
}

impl Value for Metric {
    fn raw_value(&self) -> Payload {
        Payload::Float(self.sum())
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
        &self.label
    }

    fn as_string(&self) -> Option<String> {
        Some(format!("{:.6}", self.sum()))
    }

    fn update(&self, new_value: &Payload) -> Result<()> {
        let Payload::Float(delta) = new_value else {
            return Err(StoreError::UnsupportedType {
                expected: "float",
                found: new_value.kind(),
            });
        };

        let mut state = self.state.lock();
        state.sum += delta;
        state.hits += 1;
        state.last_accessed = Instant::now();
        Ok(())
    }

    fn on_delete(&self, key: &[u8], db: &Keyspace) {
        let state = self.state.lock();
        trace!(
            database = db.id(),
            key = %String::from_utf8_lossy(key),
            label = %self.label,
            sum = state.sum,
            hits = state.hits,
            "Final report for metric"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates() {
        let m = Metric::new("bytes_in", 10.0);
        m.update(&Payload::Float(5.0)).unwrap();
        m.update(&Payload::Float(5.0)).unwrap();

        assert_eq!(m.sum(), 20.0);
        assert_eq!(m.frequency(), 2);
        assert_eq!(m.as_string(), Some("20.000000".to_string()));
    }

    #[test]
    fn test_rejects_integers() {
        let m = Metric::new("bytes_in", 1.0);
        let before = m.last_accessed();

        assert!(matches!(
            m.update(&Payload::Int(3)),
            Err(StoreError::UnsupportedType {
                expected: "float",
                ..
            })
        ));
        assert_eq!(m.sum(), 1.0);
        assert_eq!(m.frequency(), 0);
        assert_eq!(m.last_accessed(), before);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let m = Arc::new(Metric::new("hits", 0.0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&m);
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.update(&Payload::Float(1.0)).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(m.sum(), 800.0);
        assert_eq!(m.frequency(), 800);
    }
}
