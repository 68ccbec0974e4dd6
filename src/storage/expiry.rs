//! Background Expiration Manager
//!
//! This module implements "active expiry": a background task that reclaims
//! expired keys nobody reads again. Reads do "lazy expiry" on their own (see
//! [`Database::get_or_expire`](crate::storage::Database::get_or_expire)).
//!
//! ## Design
//!
//! Scanning every expiring key on every tick would make the cost of a tick
//! grow with the keyspace. Instead each tick runs one *sampling pass*:
//!
//! 1. Collect the databases that have at least one expiring key.
//! 2. `random_keys` times: pick one of those databases at random, pick one of
//!    its expiring keys at random, delete it if its deadline has passed.
//! 3. If more than `again_percentage` of the samples were expired, the
//!    keyspace probably holds a backlog of dead keys, so another pass is
//!    scheduled right away instead of waiting for the next tick.
//!
//! ## Retries
//!
//! Retry passes run on a separate task and never delay the next tick. One tick
//! triggers at most `max_retries` consecutive retry passes, and only one retry
//! chain is in flight at a time, so a pathological churn rate cannot pile up
//! tasks.
//!
//! ```text
//!   tick ──> pass ──(ratio > again%)──> spawn ──> pass ──> pass ──> ... (≤ max_retries)
//!    │
//!   tick ──> pass
//! ```

use crate::error::{Result, StoreError};
use crate::storage::engine::{Engine, Shared};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace};

/// Configuration for the expiration manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryConfig {
    /// Interval between regular sampling passes (default: 100ms)
    pub tick: Duration,

    /// Number of expiring keys sampled per pass (default: 20)
    pub random_keys: usize,

    /// If more than this percentage of samples were expired, run another pass
    /// immediately. 0 disables retries. (default: 25)
    pub again_percentage: u8,

    /// Cap on consecutive retry passes triggered by one tick (default: 16)
    pub max_retries: usize,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            random_keys: 20,
            again_percentage: 25,
            max_retries: 16,
        }
    }
}

impl ExpiryConfig {
    /// Sets the interval between regular passes.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Sets how many expiring keys each pass samples.
    pub fn with_random_keys(mut self, random_keys: usize) -> Self {
        self.random_keys = random_keys;
        self
    }

    /// Sets the expired-sample percentage that triggers a retry pass.
    pub fn with_again_percentage(mut self, again_percentage: u8) -> Self {
        self.again_percentage = again_percentage;
        self
    }

    /// Caps the retry passes one tick can trigger.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Returns `InvalidArgument` for a zero tick, zero `random_keys` or a
    /// percentage above 100.
    pub fn validate(&self) -> Result<()> {
        if self.tick.is_zero() {
            return Err(StoreError::invalid("expiry tick must be greater than zero"));
        }
        if self.random_keys == 0 {
            return Err(StoreError::invalid("random_keys must be at least 1"));
        }
        if self.again_percentage > 100 {
            return Err(StoreError::invalid(format!(
                "again_percentage must be within 0..=100, got {}",
                self.again_percentage
            )));
        }
        Ok(())
    }
}

/// Result of one sampling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOutcome {
    /// Keys sampled (0 when no database had expiring keys)
    pub sampled: usize,
    /// Sampled keys that were expired and reclaimed
    pub deleted: usize,
}

impl PassOutcome {
    /// Share of sampled keys that were reclaimed, rounded down.
    pub fn expired_percentage(&self) -> usize {
        if self.sampled == 0 {
            0
        } else {
            self.deleted * 100 / self.sampled
        }
    }

    /// True if the pass warrants an immediate follow-up.
    pub fn exceeds(&self, again_percentage: u8) -> bool {
        again_percentage > 0 && self.expired_percentage() > usize::from(again_percentage)
    }
}

/// Runs one sampling pass over every database of `engine`.
///
/// Each sample is its own exclusive critical section, so readers get a chance
/// to run between samples.
pub fn sampling_pass<R: Rng>(engine: &Engine, random_keys: usize, rng: &mut R) -> PassOutcome {
    let candidates = engine.databases_with_expiring_keys();
    if candidates.is_empty() {
        return PassOutcome::default();
    }

    let mut deleted = 0;
    for _ in 0..random_keys {
        if engine.reclaim_random(&candidates, &mut *rng) {
            deleted += 1;
        }
    }

    PassOutcome {
        sampled: random_keys,
        deleted,
    }
}

/// Expiration manager statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryStats {
    /// Sampling passes run, retries included
    pub passes: u64,
    /// Passes run by retry chains
    pub retry_passes: u64,
    /// Keys sampled
    pub sampled: u64,
    /// Keys reclaimed
    pub reclaimed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    passes: AtomicU64,
    retry_passes: AtomicU64,
    sampled: AtomicU64,
    reclaimed: AtomicU64,
}

/// State shared by the ticking task and its retry chains.
#[derive(Debug)]
struct Sweep {
    engine: Weak<Shared>,
    config: ExpiryConfig,
    counters: Counters,
    retry_in_flight: AtomicBool,
    /// Cleared when the ticking task returns.
    task_alive: AtomicBool,
}

impl Sweep {
    fn engine(&self) -> Option<Engine> {
        Engine::upgrade(&self.engine)
    }

    fn run_pass(&self, engine: &Engine) -> PassOutcome {
        let mut rng = rand::rng();
        let outcome = sampling_pass(engine, self.config.random_keys, &mut rng);

        self.counters.passes.fetch_add(1, Ordering::Relaxed);
        self.counters
            .sampled
            .fetch_add(outcome.sampled as u64, Ordering::Relaxed);
        self.counters
            .reclaimed
            .fetch_add(outcome.deleted as u64, Ordering::Relaxed);

        if outcome.deleted > 0 {
            debug!(
                sampled = outcome.sampled,
                deleted = outcome.deleted,
                rate = %format!("{}%", outcome.expired_percentage()),
                "Expired keys reclaimed"
            );
        }

        outcome
    }

    fn snapshot(&self) -> ExpiryStats {
        ExpiryStats {
            passes: self.counters.passes.load(Ordering::Relaxed),
            retry_passes: self.counters.retry_passes.load(Ordering::Relaxed),
            sampled: self.counters.sampled.load(Ordering::Relaxed),
            reclaimed: self.counters.reclaimed.load(Ordering::Relaxed),
        }
    }
}

/// A handle to the running expiration manager.
///
/// When this handle is dropped, the manager is stopped. The background task
/// only holds a weak reference to the engine and exits once the engine is
/// gone.
#[derive(Debug)]
pub struct Expirer {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
    sweep: Arc<Sweep>,
}

impl Expirer {
    /// Starts the expiration manager as a background task.
    ///
    /// The first pass runs one `tick` after start. Fails with
    /// `InvalidArgument` for an invalid config and `NoRuntime` outside a Tokio
    /// runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use polykv::storage::{Engine, Expirer, ExpiryConfig};
    ///
    /// let engine = Engine::default();
    /// let expirer = Expirer::start(&engine, ExpiryConfig::default())?;
    ///
    /// // Expirer runs in the background...
    ///
    /// // Dropping the expirer stops it
    /// drop(expirer);
    /// ```
    pub fn start(engine: &Engine, config: ExpiryConfig) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| StoreError::NoRuntime)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweep = Arc::new(Sweep {
            engine: engine.downgrade(),
            config,
            counters: Counters::default(),
            retry_in_flight: AtomicBool::new(false),
            task_alive: AtomicBool::new(true),
        });

        let task_sweep = Arc::clone(&sweep);
        runtime.spawn(async move {
            expiry_loop(Arc::clone(&task_sweep), shutdown_rx).await;
            task_sweep.task_alive.store(false, Ordering::Release);
        });

        info!(
            tick_ms = sweep.config.tick.as_millis() as u64,
            random_keys = sweep.config.random_keys,
            again_percentage = sweep.config.again_percentage,
            "Background expiration manager started"
        );

        Ok(Self { shutdown_tx, sweep })
    }

    /// Stops the expiration manager.
    ///
    /// No tick-driven pass starts after this returns. A retry pass that is
    /// already running finishes, but its chain does not continue.
    /// Called automatically when the handle is dropped.
    pub fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("Background expiration manager stopped");
        }
    }

    /// True until `stop` is called or the task exits on its own (the engine
    /// was dropped).
    pub fn is_running(&self) -> bool {
        !*self.shutdown_tx.borrow() && self.sweep.task_alive.load(Ordering::Acquire)
    }

    /// The settings this manager was started with.
    pub fn config(&self) -> &ExpiryConfig {
        &self.sweep.config
    }

    /// Snapshot of the pass counters.
    pub fn stats(&self) -> ExpiryStats {
        self.sweep.snapshot()
    }
}

impl Drop for Expirer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The ticking loop.
async fn expiry_loop(sweep: Arc<Sweep>, mut shutdown_rx: watch::Receiver<bool>) {
    let period = sweep.config.tick;
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // Wait for the tick or shutdown signal
        tokio::select! {
            _ = ticker.tick() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiration manager received shutdown signal");
                    return;
                }
            }
        }

        if *shutdown_rx.borrow() {
            return;
        }

        let Some(engine) = sweep.engine() else {
            debug!("Engine dropped, expiration manager exiting");
            return;
        };
        let outcome = sweep.run_pass(&engine);
        drop(engine);

        if outcome.exceeds(sweep.config.again_percentage)
            && sweep.config.max_retries > 0
            && !sweep.retry_in_flight.swap(true, Ordering::AcqRel)
        {
            tokio::spawn(retry_chain(Arc::clone(&sweep), shutdown_rx.clone()));
        }
    }
}

/// Runs follow-up passes until the expired ratio drops back under the
/// threshold, `max_retries` is reached, or the manager is stopped.
async fn retry_chain(sweep: Arc<Sweep>, shutdown_rx: watch::Receiver<bool>) {
    for attempt in 1..=sweep.config.max_retries {
        if *shutdown_rx.borrow() {
            break;
        }
        let Some(engine) = sweep.engine() else {
            break;
        };
        let outcome = sweep.run_pass(&engine);
        drop(engine);
        sweep.counters.retry_passes.fetch_add(1, Ordering::Relaxed);

        trace!(
            attempt = attempt,
            deleted = outcome.deleted,
            "Expiry retry pass finished"
        );

        if !outcome.exceeds(sweep.config.again_percentage) {
            break;
        }
        tokio::task::yield_now().await;
    }

    sweep.retry_in_flight.store(false, Ordering::Release);
}
