//! Bounded TTL cache fronting the storage driver.
//!
//! Entries older than the configured TTL read as absent. When an insert would
//! exceed the capacity, the oldest-inserted entry is evicted; `set` on an
//! existing key counts as a fresh insertion. The cache is advisory only: every
//! value it holds can be rebuilt from storage.
//!
//! Read-through fills capture [`TtlCache::generation`] before reading storage
//! and store with [`TtlCache::set_if_unchanged`], so a value read before an
//! invalidation never lands after it.

use std::{
    collections::BTreeMap,
    hash::Hash,
    sync::{Arc, Weak},
    time::Duration,
};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, warn};

/// Cache sizing and expiry settings.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub capacity: usize,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            capacity: 1_024,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
    seq: u64,
}

#[derive(Debug)]
struct CacheState<K, V> {
    entries: FxHashMap<K, Entry<V>>,
    // Insertion sequence -> key, oldest first.
    order: BTreeMap<u64, K>,
    next_seq: u64,
    // Bumped by every invalidation.
    generation: u64,
}

impl<K, V> CacheState<K, V>
where
    K: Eq + Hash + Clone,
{
    fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            order: BTreeMap::new(),
            next_seq: 0,
            generation: 0,
        }
    }

    fn insert(&mut self, key: K, value: V, capacity: usize) {
        self.remove(&key);

        while self.entries.len() >= capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };

            self.entries.remove(&oldest);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                seq,
            },
        );
    }

    fn remove(&mut self, key: &K) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);

        Some(entry)
    }

    fn purge_expired(&mut self, ttl: Duration, now: Instant) -> usize {
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.inserted_at) >= ttl)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove(key);
        }

        expired.len()
    }
}

#[derive(Debug)]
struct Sweeper {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// TTL cache keyed by `K`.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    state: Arc<Mutex<CacheState<K, V>>>,
    ttl: Duration,
    capacity: usize,
    sweep_interval: Duration,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::new())),
            ttl: config.ttl,
            capacity: config.capacity.max(1),
            sweep_interval: config.sweep_interval,
            sweeper: Mutex::new(None),
        }
    }

    /// Returns the cached value, or `None` when absent or expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock();

        let expired = {
            let entry = state.entries.get(key)?;
            Instant::now().duration_since(entry.inserted_at) >= self.ttl
        };

        if expired {
            state.remove(key);
            return None;
        }

        state.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn set(&self, key: K, value: V) {
        self.state.lock().insert(key, value, self.capacity);
    }

    /// Invalidation counter to capture before a read-through fill.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Store `value` only when no invalidation happened since `generation`
    /// was captured. Returns whether the value was stored.
    pub fn set_if_unchanged(&self, key: K, value: V, generation: u64) -> bool {
        let mut state = self.state.lock();

        if state.generation != generation {
            return false;
        }

        state.insert(key, value, self.capacity);

        true
    }

    pub fn delete(&self, key: &K) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.remove(key);
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.entries.clear();
        state.order.clear();
    }

    /// Number of stored entries, including ones not yet swept.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start the periodic expiry sweep. Must be called from within a tokio
    /// runtime; calling it twice keeps the first sweeper.
    pub fn spawn_sweeper(&self) {
        let mut sweeper = self.sweeper.lock();

        if sweeper.is_some() {
            return;
        }

        let (stop, mut stopped) = watch::channel(false);
        let state: Weak<Mutex<CacheState<K, V>>> = Arc::downgrade(&self.state);
        let ttl = self.ttl;
        let interval = self.sweep_interval;

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(state) = state.upgrade() else {
                            break;
                        };

                        let purged = state.lock().purge_expired(ttl, Instant::now());

                        if purged > 0 {
                            debug!(purged, "cache sweep removed expired entries");
                        }
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        *sweeper = Some(Sweeper { stop, task });
    }

    /// Stop the sweep task and wait for it to exit.
    pub async fn shutdown(&self) {
        let Some(sweeper) = self.sweeper.lock().take() else {
            return;
        };

        // Receiver only drops once the task has already exited.
        _ = sweeper.stop.send(true);

        if let Err(source) = sweeper.task.await {
            warn!("cache sweeper exited abnormally: {source}");
        }
    }

    pub fn sweeper_running(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|sweeper| !sweeper.task.is_finished())
    }
}

impl<K, V> Drop for TtlCache<K, V> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.task.abort();
        }
    }
}
