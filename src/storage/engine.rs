//! Multi-Database Engine with a Single Global Lock
//!
//! The engine is a registry of databases plus the one readers-writer lock
//! that guards all of them. It holds no value data of its own.
//!
//! ## Design Decisions
//!
//! 1. **One lock for every database**: expiration sweeps and ordinary access
//!    are mutually exclusive across *all* databases, which keeps the locking
//!    model flat and rules out lock-ordering hazards between sibling
//!    databases.
//! 2. **Short critical sections**: every held-lock section is pure in-memory
//!    map work, O(1) per key touched; nothing blocks on I/O under the lock.
//! 3. **Lazy databases**: a database is created on first reference and lives
//!    as long as the engine.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │   RwLock<HashMap<DatabaseId, Keyspace>>                      │
//! │  ┌───────────┐ ┌───────────┐ ┌───────────┐                   │
//! │  │ db 0      │ │ db 1      │ │ db N      │                   │
//! │  │ keys      │ │ keys      │ │ keys      │                   │
//! │  │ expiring  │ │ expiring  │ │ expiring  │                   │
//! │  └───────────┘ └───────────┘ └───────────┘                   │
//! └──────────────────────────────────────────────────────────────┘
//!      ▲ read: get, exists, expires, expiry, lookup
//!      ▲ write: set, delete, delete_expired, get_or_expire, create
//! ```

use crate::config::EngineConfig;
use crate::error::{Result, StoreError};
use crate::storage::database::{Database, DatabaseId, Keyspace};
use crate::storage::expiry::{ExpiryStats, Expirer};
use parking_lot::{Mutex, RwLock};
use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::debug;

/// Operation counters, updated with relaxed ordering.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) gets: AtomicU64,
    pub(crate) sets: AtomicU64,
    pub(crate) deletes: AtomicU64,
    pub(crate) expired: AtomicU64,
    pub(crate) databases_created: AtomicU64,
}

/// Everything the engine handles share.
pub(crate) struct Shared {
    pub(crate) state: RwLock<HashMap<DatabaseId, Keyspace>>,
    pub(crate) stats: Counters,
    config: EngineConfig,
    expirer: Mutex<Option<Expirer>>,
}

/// The store engine.
///
/// Cloning an `Engine` yields another handle to the same registry.
///
/// # Example
///
/// ```
/// use polykv::storage::Engine;
/// use polykv::value::StringItem;
/// use bytes::Bytes;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let engine = Engine::default();
/// let db = engine.database(0);
///
/// db.set(Bytes::from("name"), Arc::new(StringItem::new("alice")), None);
/// let value = db.get_or_expire(b"name", true).unwrap();
/// assert_eq!(value.as_string(), Some("alice".to_string()));
///
/// db.set_with_ttl(
///     Bytes::from("session"),
///     Arc::new(StringItem::new("abc123")),
///     Duration::from_secs(60),
/// );
/// assert!(db.expires(b"session"));
/// ```
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.shared.stats;
        f.debug_struct("Engine")
            .field("databases", &self.shared.state.read().len())
            .field("gets", &stats.gets.load(Ordering::Relaxed))
            .field("sets", &stats.sets.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::from_config(EngineConfig::default())
    }
}

impl Engine {
    /// Creates an engine after validating `config`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: EngineConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(HashMap::new()),
                stats: Counters::default(),
                config,
                expirer: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<Shared> {
        Arc::downgrade(&self.shared)
    }

    pub(crate) fn upgrade(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Returns the database for `id`, creating it on first use.
    ///
    /// Safe under concurrent first access: the optimistic lookup runs under
    /// the shared lock, and creation re-checks under the exclusive lock, so
    /// exactly one keyspace ever exists per id.
    pub fn database(&self, id: DatabaseId) -> Database {
        if self.shared.state.read().contains_key(&id) {
            return Database::new(id, Arc::clone(&self.shared));
        }

        let mut state = self.shared.state.write();
        if let Entry::Vacant(slot) = state.entry(id) {
            slot.insert(Keyspace::new(id));
            self.shared
                .stats
                .databases_created
                .fetch_add(1, Ordering::Relaxed);
            debug!(database = id, "Database created");
        }
        drop(state);

        Database::new(id, Arc::clone(&self.shared))
    }

    /// Handles for every database created so far, ordered by id.
    pub fn databases(&self) -> Vec<Database> {
        let mut ids: Vec<DatabaseId> = self.shared.state.read().keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .map(|id| Database::new(id, Arc::clone(&self.shared)))
            .collect()
    }

    pub fn database_count(&self) -> usize {
        self.shared.state.read().len()
    }

    /// Ids of the databases that currently have at least one expiring key.
    pub fn databases_with_expiring_keys(&self) -> Vec<DatabaseId> {
        self.shared
            .state
            .read()
            .values()
            .filter(|ks| ks.has_expiring_keys())
            .map(Keyspace::id)
            .collect()
    }

    /// One sample of the expiration manager: picks a database from
    /// `candidates` and one of its expiring keys, and reclaims the key if it
    /// is expired. Runs as a single exclusive critical section.
    pub(crate) fn reclaim_random<R: Rng>(&self, candidates: &[DatabaseId], rng: &mut R) -> bool {
        let Some(&id) = candidates.choose(&mut *rng) else {
            return false;
        };

        let mut state = self.shared.state.write();
        let Some(keyspace) = state.get_mut(&id) else {
            return false;
        };
        let Some(key) = keyspace.random_expiring_key(rng) else {
            return false;
        };

        let reclaimed = keyspace.delete_expired(&[key], Instant::now()) == 1;
        if reclaimed {
            self.shared.stats.expired.fetch_add(1, Ordering::Relaxed);
        }
        reclaimed
    }

    /// Returns engine statistics.
    pub fn stats(&self) -> EngineStats {
        let (keys, expiring) = {
            let state = self.shared.state.read();
            state.values().fold((0, 0), |(keys, expiring), ks| {
                (keys + ks.len(), expiring + usize::from(ks.has_expiring_keys()))
            })
        };
        let stats = &self.shared.stats;
        EngineStats {
            keys: keys as u64,
            databases_with_expiry: expiring as u64,
            get_ops: stats.gets.load(Ordering::Relaxed),
            set_ops: stats.sets.load(Ordering::Relaxed),
            del_ops: stats.deletes.load(Ordering::Relaxed),
            expired: stats.expired.load(Ordering::Relaxed),
            databases_created: stats.databases_created.load(Ordering::Relaxed),
        }
    }

    /// Starts the engine's expiration manager with `config().expiry`.
    ///
    /// Fails with `InvalidArgument` if it is already running.
    pub fn start_expirer(&self) -> Result<()> {
        let mut slot = self.shared.expirer.lock();
        if slot.as_ref().is_some_and(Expirer::is_running) {
            return Err(StoreError::invalid("expiration manager is already running"));
        }
        *slot = Some(Expirer::start(self, self.shared.config.expiry.clone())?);
        Ok(())
    }

    /// Stops the expiration manager. Returns `false` if it was not running.
    pub fn stop_expirer(&self) -> bool {
        let expirer = self.shared.expirer.lock().take();
        match expirer {
            Some(expirer) => {
                let was_running = expirer.is_running();
                expirer.stop();
                was_running
            }
            None => false,
        }
    }

    pub fn expirer_running(&self) -> bool {
        self.shared
            .expirer
            .lock()
            .as_ref()
            .is_some_and(Expirer::is_running)
    }

    /// Statistics of the engine-owned expiration manager, if one was started.
    pub fn expiry_stats(&self) -> Option<ExpiryStats> {
        self.shared.expirer.lock().as_ref().map(Expirer::stats)
    }
}

/// Engine statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Keys stored across all databases
    pub keys: u64,
    /// Databases holding at least one expiring key
    pub databases_with_expiry: u64,
    /// Total GET operations
    pub get_ops: u64,
    /// Total SET operations
    pub set_ops: u64,
    /// Keys removed by explicit deletes
    pub del_ops: u64,
    /// Keys reclaimed by lazy or active expiration
    pub expired: u64,
    /// Databases created
    pub databases_created: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ExpiryConfig;
    use crate::value::{StringItem, Value};
    use bytes::Bytes;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::thread;
    use std::time::Duration;

    fn string(s: &str) -> Arc<dyn Value> {
        Arc::new(StringItem::new(s))
    }

    #[test]
    fn test_database_created_lazily() {
        let engine = Engine::default();
        assert_eq!(engine.database_count(), 0);

        engine.database(4);
        engine.database(4);
        engine.database(1);

        assert_eq!(engine.database_count(), 2);
        let ids: Vec<_> = engine.databases().iter().map(Database::id).collect();
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(engine.stats().databases_created, 2);
    }

    #[test]
    fn test_concurrent_first_access_creates_one_database() {
        let engine = Engine::default();
        let handles: Vec<_> = (0..16)
            .map(|t| {
                let engine = engine.clone();
                thread::spawn(move || {
                    let db = engine.database(9);
                    db.set(Bytes::from(format!("key-{}", t)), string("v"), None);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.database_count(), 1);
        assert_eq!(engine.stats().databases_created, 1);
        // Every thread wrote into the same keyspace.
        assert_eq!(engine.database(9).len(), 16);
    }

    #[test]
    fn test_concurrent_access() {
        let engine = Engine::default();
        let mut handles = vec![];

        // Spawn multiple writers across a few databases
        for i in 0..10u32 {
            let engine = engine.clone();
            handles.push(thread::spawn(move || {
                let db = engine.database(i % 3);
                for j in 0..100 {
                    let key = format!("key-{}-{}", i, j);
                    db.set(Bytes::from(key.clone()), string("value"), None);
                    db.get_or_expire(key.as_bytes(), true);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = engine.stats();
        assert_eq!(stats.keys, 1000);
        assert_eq!(stats.set_ops, 1000);
        assert_eq!(stats.get_ops, 1000);
    }

    #[test]
    fn test_reclaim_random_only_removes_expired() {
        let engine = Engine::default();
        let db = engine.database(0);
        db.set_with_ttl(Bytes::from("live"), string("v"), Duration::from_secs(60));

        let mut rng = StdRng::seed_from_u64(11);
        let candidates = engine.databases_with_expiring_keys();
        assert_eq!(candidates, vec![0]);
        assert!(!engine.reclaim_random(&candidates, &mut rng));
        assert!(db.exists(b"live"));

        db.set(
            Bytes::from("dead"),
            string("v"),
            Some(Instant::now() - Duration::from_millis(5)),
        );
        db.delete(&["live"]);
        assert!(engine.reclaim_random(&candidates, &mut rng));
        assert!(db.is_empty());
        assert!(engine.databases_with_expiring_keys().is_empty());
        assert_eq!(engine.stats().expired, 1);
    }

    #[test]
    fn test_reclaim_random_no_candidates() {
        let engine = Engine::default();
        let mut rng = StdRng::seed_from_u64(5);
        assert!(!engine.reclaim_random(&[], &mut rng));
        assert!(!engine.reclaim_random(&[42], &mut rng));
    }

    #[test]
    fn test_stats_track_operations() {
        let engine = Engine::default();
        let db = engine.database(0);

        db.set(Bytes::from("a"), string("1"), None);
        db.set(
            Bytes::from("b"),
            string("2"),
            Some(Instant::now() - Duration::from_millis(1)),
        );
        db.get_or_expire(b"a", true);
        db.get_or_expire(b"b", true);
        db.delete(&["a"]);

        let stats = engine.stats();
        assert_eq!(stats.set_ops, 2);
        assert_eq!(stats.get_ops, 2);
        assert_eq!(stats.del_ops, 1);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.keys, 0);
    }

    #[test]
    fn test_new_validates_config() {
        let config = EngineConfig::default().with_databases(0);
        assert!(matches!(
            Engine::new(config),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_engine_owned_expirer_lifecycle() {
        let config = EngineConfig::default()
            .with_expiry(ExpiryConfig::default().with_tick(Duration::from_millis(10)));
        let engine = Engine::new(config).unwrap();
        assert!(!engine.expirer_running());
        assert!(engine.expiry_stats().is_none());

        engine.start_expirer().unwrap();
        assert!(engine.expirer_running());
        assert!(matches!(
            engine.start_expirer(),
            Err(StoreError::InvalidArgument(_))
        ));

        let db = engine.database(2);
        db.set_with_ttl(Bytes::from("k"), string("v"), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!db.exists(b"k"));
        assert!(engine.expiry_stats().is_some_and(|s| s.reclaimed == 1));

        assert!(engine.stop_expirer());
        assert!(!engine.stop_expirer());
        assert!(!engine.expirer_running());

        // Idle again, so it can be restarted.
        engine.start_expirer().unwrap();
        assert!(engine.expirer_running());
    }
}
