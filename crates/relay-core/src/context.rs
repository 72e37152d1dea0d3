//! Composition root

use crate::cache::{CacheStats, ModelCapabilityCache, ResponseCache, TokenCountCache};
use crate::config::RelayConfig;
use crate::error::RelayResult;
use crate::pool::{ConnectionPool, PoolStats};
use crate::provider::{FallbackExecutor, ProviderManager};
use crate::queue::RequestQueue;
use crate::recovery::{RetryExecutor, RetryPolicy};
use std::sync::Arc;
use tracing::info;

/// Snapshot of every owned component
#[derive(Debug, Clone)]
pub struct RelayStats {
    pub pool: PoolStats,
    pub token_counts: CacheStats,
    pub capabilities: CacheStats,
    pub responses: CacheStats,
}

/// One instance of each component, built from a [`RelayConfig`]
///
/// Construct it once at startup and pass it (or its parts) to whatever needs
/// them. Background sweeps run until [`RelayContext::shutdown`].
pub struct RelayContext {
    config: RelayConfig,
    pool: Arc<ConnectionPool>,
    token_counts: Arc<TokenCountCache>,
    capabilities: Arc<ModelCapabilityCache>,
    responses: Arc<ResponseCache>,
    providers: Arc<ProviderManager>,
    fallback: Arc<FallbackExecutor>,
}

impl RelayContext {
    /// Validate `config` and build every component
    pub fn from_config(config: RelayConfig) -> RelayResult<Self> {
        config.validate()?;

        let providers = Arc::new(ProviderManager::new());
        for provider in &config.providers {
            providers.register_provider(provider.clone());
        }
        providers.set_fallback_chain(config.fallback_chain.iter().cloned());

        let fallback = FallbackExecutor::with_health_config(
            Arc::clone(&providers),
            config.health.clone(),
        )
        .with_policies(config.retry.clone());

        let context = Self {
            pool: Arc::new(ConnectionPool::new(config.pool.clone())),
            token_counts: Arc::new(TokenCountCache::new(config.caches.token_count.clone())),
            capabilities: Arc::new(ModelCapabilityCache::new(config.caches.capability.clone())),
            responses: Arc::new(ResponseCache::new(config.caches.response.clone())),
            providers,
            fallback: Arc::new(fallback),
            config,
        };

        info!(
            providers = context.config.providers.len(),
            fallback_chain = ?context.config.fallback_chain,
            "relay context ready"
        );
        Ok(context)
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn token_counts(&self) -> &Arc<TokenCountCache> {
        &self.token_counts
    }

    pub fn capabilities(&self) -> &Arc<ModelCapabilityCache> {
        &self.capabilities
    }

    pub fn responses(&self) -> &Arc<ResponseCache> {
        &self.responses
    }

    pub fn providers(&self) -> &Arc<ProviderManager> {
        &self.providers
    }

    pub fn fallback(&self) -> &Arc<FallbackExecutor> {
        &self.fallback
    }

    pub fn retry_policy(&self, provider: &str) -> RetryPolicy {
        self.config.retry_policy(provider)
    }

    /// Retry executor for one provider using the configured policy
    pub fn retry_executor(&self, provider: &str) -> RetryExecutor {
        RetryExecutor::new(provider, self.retry_policy(provider))
    }

    /// New request queue with the configured limits
    ///
    /// Queues are typed by payload and result, so callers own them.
    pub fn request_queue<P, R>(&self) -> RequestQueue<P, R>
    where
        P: Send + 'static,
        R: Send + 'static,
    {
        RequestQueue::new(self.config.queue.clone())
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            pool: self.pool.stats(),
            token_counts: self.token_counts.stats(),
            capabilities: self.capabilities.stats(),
            responses: self.responses.stats(),
        }
    }

    /// Stop background sweeps and fail anything waiting on the pool
    pub fn shutdown(&self) {
        self.pool.destroy();
        self.token_counts.cache().destroy();
        self.capabilities.cache().destroy();
        self.responses.cache().destroy();
        info!("relay context shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderConfig, RequestConfig};

    fn config() -> RelayConfig {
        RelayConfig {
            providers: vec![
                ProviderConfig::new("openai"),
                ProviderConfig::new("anthropic"),
                ProviderConfig::new("google").with_enabled(false),
            ],
            fallback_chain: vec!["anthropic".into(), "google".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_from_config_wires_providers() {
        let context = RelayContext::from_config(config()).unwrap();

        let chain = context
            .providers()
            .build_provider_chain(&RequestConfig::new("openai"));
        assert_eq!(chain, vec!["openai", "anthropic"]);
        assert!(context.providers().is_registered("google"));

        context.shutdown();
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = config();
        config.pool.max_connections_per_host = 0;
        assert!(RelayContext::from_config(config).is_err());
    }

    #[tokio::test]
    async fn test_shutdown_stops_pool() {
        let context = RelayContext::from_config(RelayConfig::default()).unwrap();
        context.shutdown();
        assert!(context.pool().get_connection("https://a.com").await.is_err());
    }

    #[tokio::test]
    async fn test_retry_executor_uses_configured_policy() {
        let mut config = config();
        config
            .retry
            .insert("openai".into(), RetryPolicy::default().with_max_retries(9));
        let context = RelayContext::from_config(config).unwrap();

        assert_eq!(context.retry_executor("openai").policy().max_retries, 9);
        assert_eq!(context.fallback().policy_for("openai").max_retries, 9);
        assert_eq!(context.retry_executor("anthropic").policy().max_retries, 3);
    }
}
