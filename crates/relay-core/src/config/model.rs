//! Top-level configuration

use super::logging_config::LoggingConfig;
use crate::cache::CacheConfig;
use crate::error::{RelayError, RelayResult};
use crate::pool::{PoolConfig, host_key};
use crate::provider::{HealthConfig, ProviderConfig};
use crate::queue::QueueConfig;
use crate::recovery::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Capacity and TTL for each specialized cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CachesConfig {
    pub token_count: CacheConfig,
    pub capability: CacheConfig,
    pub response: CacheConfig,
}

impl Default for CachesConfig {
    fn default() -> Self {
        Self {
            token_count: CacheConfig::new(10_000, Duration::from_secs(3600)),
            capability: CacheConfig::new(500, Duration::from_secs(24 * 3600)),
            response: CacheConfig::new(1000, Duration::from_secs(15 * 60)),
        }
    }
}

/// Everything needed to build a [`RelayContext`](crate::RelayContext)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub pool: PoolConfig,
    pub caches: CachesConfig,
    /// Per-provider retry overrides; other providers use built-in presets
    pub retry: HashMap<String, RetryPolicy>,
    pub queue: QueueConfig,
    pub health: HealthConfig,
    pub providers: Vec<ProviderConfig>,
    /// Process-wide fallback order
    pub fallback_chain: Vec<String>,
    pub logging: LoggingConfig,
}

impl RelayConfig {
    /// Reject values the components cannot run with
    pub fn validate(&self) -> RelayResult<()> {
        self.pool.validate()?;
        self.queue.validate()?;

        for (name, cache) in [
            ("token_count", &self.caches.token_count),
            ("capability", &self.caches.capability),
            ("response", &self.caches.response),
        ] {
            if cache.max_entries == 0 {
                return Err(RelayError::config(format!(
                    "cache '{name}' must allow at least one entry"
                )));
            }
            if cache.ttl.is_zero() {
                return Err(RelayError::config(format!("cache '{name}' ttl must be non-zero")));
            }
        }

        for (provider, policy) in &self.retry {
            policy.validate().map_err(|e| {
                RelayError::config(format!("retry policy for '{provider}': {e}"))
            })?;
        }

        if self.health.failure_threshold == 0 {
            return Err(RelayError::config("health.failure_threshold must be at least 1"));
        }

        let mut ids = HashSet::new();
        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                return Err(RelayError::config("provider id must not be empty"));
            }
            if !ids.insert(provider.id.as_str()) {
                return Err(RelayError::config(format!(
                    "provider '{}' is configured twice",
                    provider.id
                )));
            }
            if let Some(url) = &provider.base_url {
                host_key(url)?;
            }
        }

        Ok(())
    }

    /// Retry policy for a provider: configured override or built-in preset
    pub fn retry_policy(&self, provider: &str) -> RetryPolicy {
        self.retry
            .get(provider)
            .cloned()
            .unwrap_or_else(|| RetryPolicy::for_provider(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RelayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_jitter_rejected() {
        let mut config = RelayConfig::default();
        config
            .retry
            .insert("openai".into(), RetryPolicy::default().with_jitter_factor(2.0));

        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert!(err.to_string().contains("openai"));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut config = RelayConfig::default();
        config.caches.response.max_entries = 0;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.queue.max_batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.pool.max_total_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_or_bad_providers_rejected() {
        let mut config = RelayConfig::default();
        config.providers = vec![ProviderConfig::new("openai"), ProviderConfig::new("openai")];
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.providers = vec![ProviderConfig::new("openai").with_base_url("not a url")];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy_lookup() {
        let mut config = RelayConfig::default();
        config
            .retry
            .insert("openai".into(), RetryPolicy::default().with_max_retries(7));

        assert_eq!(config.retry_policy("openai").max_retries, 7);
        assert_eq!(config.retry_policy("openrouter").max_retries, 2);
    }
}
