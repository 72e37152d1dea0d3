//! Token count memoization

use super::keys::stable_hash;
use super::store::Cache;
use super::types::{CacheConfig, CacheStats};
use serde::Serialize;

/// Caches token counts per provider, model and message list
#[derive(Debug)]
pub struct TokenCountCache {
    inner: Cache<u64>,
}

impl TokenCountCache {
    /// Create a token count cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Cache::new("token_count", config),
        }
    }

    /// Derive the key for a message list
    pub fn key<M: Serialize + ?Sized>(provider: &str, model: &str, messages: &M) -> String {
        format!("tokens:{}:{}:{}", provider, model, stable_hash(messages))
    }

    /// Cached token count for these messages
    pub fn get_token_count<M: Serialize + ?Sized>(
        &self,
        provider: &str,
        model: &str,
        messages: &M,
    ) -> Option<u64> {
        self.inner.get(&Self::key(provider, model, messages))
    }

    /// Store the token count for these messages
    pub fn set_token_count<M: Serialize + ?Sized>(
        &self,
        provider: &str,
        model: &str,
        messages: &M,
        count: u64,
    ) {
        self.inner.set(Self::key(provider, model, messages), count);
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    /// Access the underlying generic cache
    pub fn cache(&self) -> &Cache<u64> {
        &self.inner
    }
}
