//! Expiry Index
//!
//! Maps each expiring key to its deadline and keeps the keys in a dense
//! vector, so the expiration manager can draw a random expiring key in O(1)
//! instead of walking the map.
//!
//! ```text
//!   slots: { "a" -> (t1, 0), "b" -> (t2, 1), "c" -> (t3, 2) }
//!   order: [ "a", "b", "c" ]
//!
//!   remove("a")  =>  swap_remove(0), then fix the moved key's position
//!
//!   slots: { "c" -> (t3, 0), "b" -> (t2, 1) }
//!   order: [ "c", "b" ]
//! ```

use bytes::Bytes;
use rand::Rng;
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Slot {
    at: Instant,
    pos: usize,
}

/// Key -> absolute expiry time, with random sampling.
#[derive(Debug, Default)]
pub struct ExpiryIndex {
    slots: HashMap<Bytes, Slot>,
    order: Vec<Bytes>,
}

impl ExpiryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or moves) the deadline for `key`.
    pub fn insert(&mut self, key: Bytes, at: Instant) {
        if let Some(slot) = self.slots.get_mut(&key) {
            slot.at = at;
            return;
        }
        let pos = self.order.len();
        self.order.push(key.clone());
        self.slots.insert(key, Slot { at, pos });
    }

    /// Drops the deadline for `key`, returning it if there was one.
    pub fn remove(&mut self, key: &[u8]) -> Option<Instant> {
        let slot = self.slots.remove(key)?;
        self.order.swap_remove(slot.pos);
        if let Some(moved) = self.order.get(slot.pos) {
            if let Some(moved_slot) = self.slots.get_mut(moved) {
                moved_slot.pos = slot.pos;
            }
        }
        Some(slot.at)
    }

    #[inline]
    pub fn get(&self, key: &[u8]) -> Option<Instant> {
        self.slots.get(key).map(|slot| slot.at)
    }

    #[inline]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.slots.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Picks an expiring key uniformly at random.
    pub fn random_key<R: Rng>(&self, rng: &mut R) -> Option<&Bytes> {
        if self.order.is_empty() {
            return None;
        }
        self.order.get(rng.random_range(0..self.order.len()))
    }

    /// Iterates over `(key, deadline)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, Instant)> {
        self.slots.iter().map(|(key, slot)| (key, slot.at))
    }
}
