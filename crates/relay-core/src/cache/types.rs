//! Cache types and configuration

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Size recorded for values that fail to serialize
pub(super) const FALLBACK_ENTRY_SIZE: usize = 1024;

/// Policy used to pick victims when the cache is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    /// Least recently accessed first
    #[default]
    Lru,
    /// Least frequently accessed first
    Lfu,
    /// Soonest to expire first
    Ttl,
}

/// Configuration for a cache instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries
    pub max_entries: usize,
    /// Time to live for every entry
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Victim selection policy
    pub eviction_strategy: EvictionStrategy,
    /// Values larger than this (serialized) are not stored by the response cache
    pub max_entry_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl: Duration::from_secs(3600),
            eviction_strategy: EvictionStrategy::Lru,
            max_entry_bytes: 1024 * 1024,
        }
    }
}

impl CacheConfig {
    /// Create a config with the given capacity and TTL
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            max_entries,
            ttl,
            ..Default::default()
        }
    }

    /// Set the eviction strategy
    pub fn with_strategy(mut self, strategy: EvictionStrategy) -> Self {
        self.eviction_strategy = strategy;
        self
    }

    /// Number of entries removed per eviction round: 10% of capacity, at least one
    pub fn eviction_batch(&self) -> usize {
        self.max_entries.div_ceil(10).max(1)
    }

    /// Interval of the background expiry sweep
    pub fn sweep_interval(&self) -> Duration {
        (self.ttl / 4).max(Duration::from_millis(10))
    }
}

/// A cached value with bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub created_at: Instant,
    pub last_accessed_at: Instant,
    pub access_count: u64,
    pub expires_at: Instant,
    pub estimated_size: usize,
}

impl<V> CacheEntry<V> {
    pub(super) fn new(key: String, value: V, ttl: Duration, estimated_size: usize) -> Self {
        let now = Instant::now();
        Self {
            key,
            value,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            expires_at: now + ttl,
            estimated_size,
        }
    }

    /// An entry is logically absent once its expiry instant is reached
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub(super) fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub(super) fn touch(&mut self) {
        self.access_count += 1;
        self.last_accessed_at = Instant::now();
    }
}

/// Lock-free counters shared with the sweep task
#[derive(Debug, Default)]
pub(super) struct CacheCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub expirations: AtomicU64,
}

impl CacheCounters {
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub name: String,
    pub entry_count: usize,
    pub max_entries: usize,
    pub total_size_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    /// Hit rate in the range 0.0 - 1.0
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
