//! Victim selection for full caches

use super::types::{CacheEntry, EvictionStrategy};
use std::collections::HashMap;

/// Pick up to `count` keys to evict according to `strategy`
pub(super) fn select_victims<V>(
    entries: &HashMap<String, CacheEntry<V>>,
    strategy: EvictionStrategy,
    count: usize,
) -> Vec<String> {
    let mut candidates: Vec<&CacheEntry<V>> = entries.values().collect();

    match strategy {
        EvictionStrategy::Lru => candidates.sort_by_key(|e| e.last_accessed_at),
        EvictionStrategy::Lfu => {
            candidates.sort_by(|a, b| {
                a.access_count
                    .cmp(&b.access_count)
                    .then_with(|| a.last_accessed_at.cmp(&b.last_accessed_at))
            })
        }
        EvictionStrategy::Ttl => candidates.sort_by_key(|e| e.expires_at),
    }

    candidates
        .into_iter()
        .take(count)
        .map(|e| e.key.clone())
        .collect()
}
