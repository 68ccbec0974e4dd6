//! Databases
//!
//! A database is one independent keyspace: a `key -> value` map plus an
//! `key -> deadline` index for the keys that expire. The data lives in a
//! [`Keyspace`] owned by the engine behind its single lock; callers hold a
//! [`Database`] handle, and every handle method takes that lock for exactly
//! one critical section, so the two maps are never observed half-updated.
//!
//! ## Read paths
//!
//! - [`Database::get`] is a raw read: no expiry check, shared lock.
//! - [`Database::get_or_expire`] is the normal read: expired keys read as
//!   absent and can be reclaimed on the spot. Because it may delete, it takes
//!   the exclusive lock.
//!
//! ## Invariant
//!
//! Every key in the expiry index is also present in the key map.

use crate::error::{Result, StoreError};
use crate::storage::engine::Shared;
use crate::storage::expiring::ExpiryIndex;
use crate::value::{Payload, Value};
use bytes::Bytes;
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identifies a database inside an engine.
pub type DatabaseId = u32;

/// Initial capacity of the per-database maps.
const KEYS_MAP_SIZE: usize = 32;

/// The data of one database. Only reachable while the engine lock is held.
///
/// Delete hooks receive a shared reference to the keyspace the key is
/// leaving, so the read-only accessors here are public.
pub struct Keyspace {
    id: DatabaseId,
    keys: HashMap<Bytes, Arc<dyn Value>>,
    expiring: ExpiryIndex,
}

impl fmt::Debug for Keyspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyspace")
            .field("id", &self.id)
            .field("keys", &self.keys.len())
            .field("expiring", &self.expiring.len())
            .finish()
    }
}

impl Keyspace {
    pub(crate) fn new(id: DatabaseId) -> Self {
        Self {
            id,
            keys: HashMap::with_capacity(KEYS_MAP_SIZE),
            expiring: ExpiryIndex::new(),
        }
    }

    pub fn id(&self) -> DatabaseId {
        self.id
    }

    /// Number of stored keys, expired-but-unreclaimed ones included.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.keys.contains_key(key)
    }

    /// True if the key has a recorded deadline.
    pub fn expires(&self, key: &[u8]) -> bool {
        self.expiring.contains(key)
    }

    pub fn expiry(&self, key: &[u8]) -> Option<Instant> {
        self.expiring.get(key)
    }

    /// True if the key has a deadline and it has been reached.
    pub fn is_expired(&self, key: &[u8]) -> bool {
        self.is_expired_at(key, Instant::now())
    }

    pub fn has_expiring_keys(&self) -> bool {
        !self.expiring.is_empty()
    }

    #[inline]
    fn is_expired_at(&self, key: &[u8], now: Instant) -> bool {
        self.expiring.get(key).is_some_and(|at| now >= at)
    }

    fn get(&self, key: &[u8]) -> Option<&Arc<dyn Value>> {
        self.keys.get(key)
    }

    pub(crate) fn set(&mut self, key: Bytes, value: Arc<dyn Value>, expires_at: Option<Instant>) {
        match expires_at {
            Some(at) => self.expiring.insert(key.clone(), at),
            None => {
                self.expiring.remove(&key);
            }
        }
        self.keys.insert(key, value);
    }

    /// Runs the delete hook, then drops the key from both maps.
    fn remove(&mut self, key: &[u8]) -> bool {
        let Some(value) = self.keys.get(key).cloned() else {
            return false;
        };
        value.on_delete(key, self);
        self.keys.remove(key);
        self.expiring.remove(key);
        true
    }

    pub(crate) fn delete<K: AsRef<[u8]>>(&mut self, keys: &[K]) -> usize {
        let mut deleted = 0;
        for key in keys {
            if self.remove(key.as_ref()) {
                deleted += 1;
            }
        }
        deleted
    }

    pub(crate) fn delete_expired<K: AsRef<[u8]>>(&mut self, keys: &[K], now: Instant) -> usize {
        let mut deleted = 0;
        for key in keys {
            let key: &[u8] = key.as_ref();
            if self.is_expired_at(key, now) && self.remove(key) {
                deleted += 1;
            }
        }
        deleted
    }

    /// Returns the live value for `key`. The flag reports whether an expired
    /// key was reclaimed.
    pub(crate) fn get_or_expire(
        &mut self,
        key: &[u8],
        delete_if_expired: bool,
    ) -> (Option<Arc<dyn Value>>, bool) {
        let Some(value) = self.get(key) else {
            return (None, false);
        };
        if !self.is_expired(key) {
            return (Some(Arc::clone(value)), false);
        }
        if delete_if_expired {
            return (None, self.remove(key));
        }
        (None, false)
    }

    pub(crate) fn random_expiring_key<R: Rng>(&self, rng: &mut R) -> Option<Bytes> {
        self.expiring.random_key(rng).cloned()
    }
}

/// A handle to one database of an [`Engine`](crate::storage::Engine).
///
/// Handles are cheap to clone; all handles for the same id refer to the same
/// keyspace.
///
/// # Example
///
/// ```
/// use polykv::storage::Engine;
/// use polykv::value::{Metric, Payload, Value};
/// use bytes::Bytes;
/// use std::sync::Arc;
///
/// let engine = Engine::default();
/// let db = engine.database(0);
///
/// db.set(Bytes::from("m1"), Arc::new(Metric::new("requests", 10.0)), None);
/// db.update(b"m1", &Payload::Float(5.0)).unwrap();
///
/// let value = db.get_or_expire(b"m1", true).unwrap();
/// assert_eq!(value.raw_value(), Payload::Float(15.0));
/// ```
#[derive(Clone)]
pub struct Database {
    id: DatabaseId,
    shared: Arc<Shared>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").field("id", &self.id).finish()
    }
}

impl Database {
    pub(crate) fn new(id: DatabaseId, shared: Arc<Shared>) -> Self {
        Self { id, shared }
    }

    pub fn id(&self) -> DatabaseId {
        self.id
    }

    /// Runs `f` on the keyspace under the shared lock.
    fn read<R>(&self, f: impl FnOnce(&Keyspace) -> R) -> Option<R> {
        let state = self.shared.state.read();
        state.get(&self.id).map(f)
    }

    /// Runs `f` on the keyspace under the exclusive lock.
    fn write<R>(&self, f: impl FnOnce(&mut Keyspace) -> R) -> R {
        let mut state = self.shared.state.write();
        let keyspace = state
            .entry(self.id)
            .or_insert_with(|| Keyspace::new(self.id));
        f(keyspace)
    }

    fn record_expired(&self, reclaimed: bool) {
        if reclaimed {
            self.shared.stats.expired.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Inserts or replaces `key`.
    ///
    /// With `expires_at = None` any previous deadline is cleared; a replaced
    /// key only keeps expiring if the caller passes a deadline again.
    pub fn set(&self, key: Bytes, value: Arc<dyn Value>, expires_at: Option<Instant>) {
        self.shared.stats.sets.fetch_add(1, Ordering::Relaxed);
        self.write(|ks| ks.set(key, value, expires_at));
    }

    /// Inserts or replaces `key` with a deadline `ttl` from now.
    ///
    /// A `ttl` too large to represent as an instant stores the key without a
    /// deadline.
    pub fn set_with_ttl(&self, key: Bytes, value: Arc<dyn Value>, ttl: Duration) {
        self.set(key, value, Instant::now().checked_add(ttl));
    }

    /// Returns the stored value without checking expiry.
    pub fn get(&self, key: &[u8]) -> Option<Arc<dyn Value>> {
        self.shared.stats.gets.fetch_add(1, Ordering::Relaxed);
        self.read(|ks| ks.get(key).cloned()).flatten()
    }

    /// Returns the value unless the key is absent or expired. With
    /// `delete_if_expired`, an expired key is also removed (running its delete
    /// hook) before returning.
    pub fn get_or_expire(&self, key: &[u8], delete_if_expired: bool) -> Option<Arc<dyn Value>> {
        self.shared.stats.gets.fetch_add(1, Ordering::Relaxed);
        let (value, reclaimed) = self.write(|ks| ks.get_or_expire(key, delete_if_expired));
        self.record_expired(reclaimed);
        value
    }

    /// Deletes the given keys, returning how many were present.
    pub fn delete<K: AsRef<[u8]>>(&self, keys: &[K]) -> usize {
        let deleted = self.write(|ks| ks.delete(keys));
        self.shared
            .stats
            .deletes
            .fetch_add(deleted as u64, Ordering::Relaxed);
        deleted
    }

    /// Deletes only the keys that are currently expired.
    pub fn delete_expired<K: AsRef<[u8]>>(&self, keys: &[K]) -> usize {
        let now = Instant::now();
        let deleted = self.write(|ks| ks.delete_expired(keys, now));
        self.shared
            .stats
            .expired
            .fetch_add(deleted as u64, Ordering::Relaxed);
        deleted
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.read(|ks| ks.exists(key)).unwrap_or(false)
    }

    pub fn expires(&self, key: &[u8]) -> bool {
        self.read(|ks| ks.expires(key)).unwrap_or(false)
    }

    /// The recorded deadline, `None` if the key does not expire.
    pub fn expiry(&self, key: &[u8]) -> Option<Instant> {
        self.read(|ks| ks.expiry(key)).flatten()
    }

    pub fn expired(&self, key: &[u8]) -> bool {
        self.read(|ks| ks.is_expired(key)).unwrap_or(false)
    }

    /// Remaining lifetime of a live expiring key.
    pub fn ttl(&self, key: &[u8]) -> Option<Duration> {
        let at = self.expiry(key)?;
        at.checked_duration_since(Instant::now())
            .filter(|left| !left.is_zero())
    }

    /// Sets a deadline on an existing key. Returns `false` if the key is
    /// absent or already expired (an expired key is reclaimed).
    pub fn expire(&self, key: &[u8], at: Instant) -> bool {
        let (live, reclaimed) = self.write(|ks| {
            let (value, reclaimed) = ks.get_or_expire(key, true);
            match value {
                Some(_) => {
                    ks.expiring.insert(Bytes::copy_from_slice(key), at);
                    (true, false)
                }
                None => (false, reclaimed),
            }
        });
        self.record_expired(reclaimed);
        live
    }

    /// Removes the deadline from a key. Returns `true` if one was removed.
    pub fn persist(&self, key: &[u8]) -> bool {
        let (persisted, reclaimed) = self.write(|ks| {
            let (value, reclaimed) = ks.get_or_expire(key, true);
            match value {
                Some(_) => (ks.expiring.remove(key).is_some(), false),
                None => (false, reclaimed),
            }
        });
        self.record_expired(reclaimed);
        persisted
    }

    /// Applies `payload` to the live value at `key` and returns that value.
    ///
    /// The lookup and [`Value::update`] run in one exclusive critical section,
    /// so a concurrent delete either happens before (the update sees an
    /// absent key) or after (its delete hook sees the updated value). Absent
    /// and expired keys give `Ok(None)`.
    pub fn update_existing(
        &self,
        key: &[u8],
        payload: &Payload,
    ) -> Result<Option<Arc<dyn Value>>> {
        let (result, reclaimed) = self.write(|ks| {
            let (value, reclaimed) = ks.get_or_expire(key, true);
            let result = match value {
                Some(value) => value.update(payload).map(|()| Some(value)),
                None => Ok(None),
            };
            (result, reclaimed)
        });
        self.record_expired(reclaimed);
        result
    }

    /// Like [`update_existing`](Self::update_existing), but absent and
    /// expired keys are both `KeyNotFound`.
    pub fn update(&self, key: &[u8], payload: &Payload) -> Result<()> {
        match self.update_existing(key, payload)? {
            Some(_) => Ok(()),
            None => Err(StoreError::key_not_found(key)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.read(Keyspace::is_empty).unwrap_or(true)
    }

    pub fn len(&self) -> usize {
        self.read(Keyspace::len).unwrap_or(0)
    }

    pub fn has_expiring_keys(&self) -> bool {
        self.read(Keyspace::has_expiring_keys).unwrap_or(false)
    }

    /// Snapshot of every stored key, without expiry checks.
    pub fn keys(&self) -> Vec<Bytes> {
        self.read(|ks| ks.keys.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the expiring keys and their deadlines.
    pub fn expiring_keys(&self) -> Vec<(Bytes, Instant)> {
        self.read(|ks| {
            ks.expiring
                .iter()
                .map(|(key, at)| (key.clone(), at))
                .collect()
        })
        .unwrap_or_default()
    }
}
