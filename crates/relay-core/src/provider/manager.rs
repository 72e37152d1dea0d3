//! Provider registry and chain construction

use super::types::{ProviderConfig, RequestConfig};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Registered providers and the process-wide fallback order
///
/// Never fails: an unknown provider simply does not appear as a fallback.
#[derive(Debug, Default)]
pub struct ProviderManager {
    providers: RwLock<HashMap<String, ProviderConfig>>,
    fallback_chain: RwLock<Vec<String>>,
}

impl ProviderManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a provider
    pub fn register_provider(&self, config: ProviderConfig) {
        info!(provider = %config.id, enabled = config.enabled, "registered provider");
        self.providers.write().insert(config.id.clone(), config);
    }

    /// Remove a provider, returning whether it was registered
    pub fn unregister_provider(&self, id: &str) -> bool {
        let removed = self.providers.write().remove(id).is_some();
        if removed {
            info!(provider = id, "unregistered provider");
        }
        removed
    }

    /// Whether `id` is registered, enabled or not
    pub fn is_registered(&self, id: &str) -> bool {
        self.providers.read().contains_key(id)
    }

    /// Registered and enabled
    pub fn is_available(&self, id: &str) -> bool {
        self.providers.read().get(id).is_some_and(|p| p.enabled)
    }

    /// Registered config for `id`
    pub fn provider(&self, id: &str) -> Option<ProviderConfig> {
        self.providers.read().get(id).cloned()
    }

    /// All registered providers, sorted by id
    pub fn providers(&self) -> Vec<ProviderConfig> {
        let mut providers: Vec<_> = self.providers.read().values().cloned().collect();
        providers.sort_by(|a, b| a.id.cmp(&b.id));
        providers
    }

    /// Set the default fallback order
    pub fn set_fallback_chain<I, S>(&self, providers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chain: Vec<String> = providers.into_iter().map(Into::into).collect();
        debug!(chain = ?chain, "set global fallback chain");
        *self.fallback_chain.write() = chain;
    }

    /// The global fallback chain
    pub fn fallback_chain(&self) -> Vec<String> {
        self.fallback_chain.read().clone()
    }

    /// Ordered, de-duplicated providers to try for a request
    ///
    /// The primary always comes first. Request-level fallbacks follow, then
    /// the global chain; fallbacks that are unregistered or disabled are
    /// skipped.
    pub fn build_provider_chain(&self, request: &RequestConfig) -> Vec<String> {
        let providers = self.providers.read();
        let global = self.fallback_chain.read();

        let mut seen = HashSet::new();
        let mut chain = vec![request.provider.clone()];
        seen.insert(request.provider.as_str());

        let candidates = request
            .fallback_providers
            .iter()
            .flatten()
            .chain(global.iter());
        for id in candidates {
            if !providers.get(id).is_some_and(|p| p.enabled) {
                continue;
            }
            if seen.insert(id.as_str()) {
                chain.push(id.clone());
            }
        }

        chain
    }
}
