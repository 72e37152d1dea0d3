//! Model capability lookups

use super::store::Cache;
use super::types::{CacheConfig, CacheStats};
use serde::{Deserialize, Serialize};

/// What a model supports, as reported by its provider
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub context_window: u64,
    pub max_output_tokens: u64,
    pub supports_tools: bool,
    pub supports_vision: bool,
    pub supports_streaming: bool,
}

/// Caches capabilities per provider and model
#[derive(Debug)]
pub struct ModelCapabilityCache {
    inner: Cache<ModelCapabilities>,
}

impl ModelCapabilityCache {
    /// Create a capability cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Cache::new("model_capability", config),
        }
    }

    /// Cache key for a provider and model
    pub fn key(provider: &str, model: &str) -> String {
        format!("caps:{}:{}", provider, model)
    }

    pub fn get_capabilities(&self, provider: &str, model: &str) -> Option<ModelCapabilities> {
        self.inner.get(&Self::key(provider, model))
    }

    pub fn set_capabilities(&self, provider: &str, model: &str, capabilities: ModelCapabilities) {
        self.inner.set(Self::key(provider, model), capabilities);
    }

    /// Forget a model's capabilities, e.g. after the provider reports a change
    pub fn invalidate(&self, provider: &str, model: &str) -> bool {
        self.inner.delete(&Self::key(provider, model))
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    pub fn cache(&self) -> &Cache<ModelCapabilities> {
        &self.inner
    }
}
