//! Generic in-memory cache with TTL expiry and bounded capacity

use super::eviction::select_victims;
use super::types::{CacheConfig, CacheCounters, CacheEntry, CacheStats, FALLBACK_ENTRY_SIZE};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

type EntryMap<V> = Arc<Mutex<HashMap<String, CacheEntry<V>>>>;

/// Eviction-aware key/value cache
///
/// All operations are synchronous and never fail. When constructed inside a
/// tokio runtime, a background task removes expired entries every `ttl / 4`
/// until [`Cache::destroy`] is called or the cache is dropped.
#[derive(Debug)]
pub struct Cache<V> {
    name: String,
    config: CacheConfig,
    entries: EntryMap<V>,
    counters: Arc<CacheCounters>,
    sweeper: Mutex<Option<CancellationToken>>,
}

impl<V> Cache<V>
where
    V: Clone + Serialize + Send + 'static,
{
    /// Create a new cache and start its expiry sweep if a runtime is available
    pub fn new(name: impl Into<String>, config: CacheConfig) -> Self {
        let cache = Self {
            name: name.into(),
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(CacheCounters::default()),
            sweeper: Mutex::new(None),
        };
        if tokio::runtime::Handle::try_current().is_ok() {
            cache.start_sweeper();
        }
        cache
    }

    /// Get a value; expired entries count as misses but are left for the sweep
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.touch();
                CacheCounters::add(&self.counters.hits, 1);
                Some(entry.value.clone())
            }
            _ => {
                CacheCounters::add(&self.counters.misses, 1);
                None
            }
        }
    }

    /// Insert or replace a value
    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let estimated_size = serde_json::to_vec(&value)
            .map(|bytes| bytes.len())
            .unwrap_or(FALLBACK_ENTRY_SIZE);

        let mut entries = self.entries.lock();
        if !entries.contains_key(&key) && entries.len() >= self.config.max_entries {
            let victims = select_victims(
                &entries,
                self.config.eviction_strategy,
                self.config.eviction_batch(),
            );
            for victim in &victims {
                entries.remove(victim);
            }
            CacheCounters::add(&self.counters.evictions, victims.len() as u64);
            debug!(cache = %self.name, evicted = victims.len(), "cache at capacity, evicted entries");
        }

        let entry = CacheEntry::new(key.clone(), value, self.config.ttl, estimated_size);
        entries.insert(key, entry);
    }

    /// Check for a live entry without touching statistics
    pub fn has(&self, key: &str) -> bool {
        self.entries
            .lock()
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// Remove an entry, returning whether it was present
    pub fn delete(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Remove all entries and reset statistics
    pub fn clear(&self) {
        self.entries.lock().clear();
        self.counters.reset();
        debug!(cache = %self.name, "cache cleared");
    }

    /// Number of physically stored entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove expired entries now, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        sweep_expired(&self.entries, &self.counters, &self.name)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            name: self.name.clone(),
            entry_count: entries.len(),
            max_entries: self.config.max_entries,
            total_size_bytes: entries.values().map(|e| e.estimated_size as u64).sum(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
        }
    }

    /// Get the cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Start the background expiry sweep; no-op if already running
    pub fn start_sweeper(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let child = token.clone();
        let entries = Arc::clone(&self.entries);
        let counters = Arc::clone(&self.counters);
        let name = self.name.clone();
        let period = self.config.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        sweep_expired(&entries, &counters, &name);
                    }
                }
            }
            debug!(cache = %name, "cache sweeper stopped");
        });

        *sweeper = Some(token);
    }

    /// Stop the background sweep; entries remain readable
    pub fn destroy(&self) {
        if let Some(token) = self.sweeper.lock().take() {
            token.cancel();
        }
    }
}

impl<V> Drop for Cache<V> {
    fn drop(&mut self) {
        if let Some(token) = self.sweeper.lock().take() {
            token.cancel();
        }
    }
}

fn sweep_expired<V>(entries: &EntryMap<V>, counters: &CacheCounters, name: &str) -> usize {
    let now = Instant::now();
    let mut entries = entries.lock();
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired_at(now));
    let removed = before - entries.len();

    if removed > 0 {
        CacheCounters::add(&counters.expirations, removed as u64);
        debug!(cache = %name, removed, "swept expired cache entries");
    }
    removed
}
