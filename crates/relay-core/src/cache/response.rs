//! Full response memoization

use super::keys::stable_hash;
use super::store::Cache;
use super::types::{CacheConfig, CacheStats};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// Caches provider responses keyed by the normalized request
#[derive(Debug)]
pub struct ResponseCache {
    inner: Cache<Value>,
}

impl ResponseCache {
    /// Create a response cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Cache::new("response", config),
        }
    }

    /// Derive the key for a request; timestamps, request ids and field order are ignored
    pub fn key<R: Serialize + ?Sized>(provider: &str, model: &str, request: &R) -> String {
        format!("response:{}:{}:{}", provider, model, stable_hash(request))
    }

    /// Look up a cached response, decoding it into `T`
    ///
    /// A stored value that no longer decodes as `T` is treated as a miss.
    pub fn get_response<R, T>(&self, provider: &str, model: &str, request: &R) -> Option<T>
    where
        R: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let value = self.inner.get(&Self::key(provider, model, request))?;
        serde_json::from_value(value).ok()
    }

    /// Store a response; oversized or unserializable responses are skipped
    pub fn set_response<R, T>(&self, provider: &str, model: &str, request: &R, response: &T)
    where
        R: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        let Ok(value) = serde_json::to_value(response) else {
            debug!(provider, model, "response not serializable, skipping cache");
            return;
        };

        let size = value.to_string().len();
        if size > self.inner.config().max_entry_bytes {
            debug!(provider, model, size, "response too large to cache");
            return;
        }

        self.inner.set(Self::key(provider, model, request), value);
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    pub fn cache(&self) -> &Cache<Value> {
        &self.inner
    }
}
