//! Provider types

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Registration record for a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider id, e.g. `openai`
    pub id: String,
    /// Disabled providers stay registered but never join a chain as fallbacks
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Endpoint used as the connection pool key
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    /// Create an enabled provider config
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            base_url: None,
            default_model: None,
        }
    }

    /// Set whether the provider may be used
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the default model
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }
}

/// Per-request provider selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Primary provider; always first in the chain
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Tried after the primary, before the global chain
    #[serde(default)]
    pub fallback_providers: Option<Vec<String>>,
}

impl RequestConfig {
    /// Create a request config for `provider`
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Default::default()
        }
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set per-request fallback providers, tried before the global chain
    pub fn with_fallbacks<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_providers = Some(providers.into_iter().map(Into::into).collect());
        self
    }
}

/// When a failing provider is taken out of rotation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive failures before the provider cools down
    pub failure_threshold: u32,
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,
    /// Fallback events kept in history
    pub max_history: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
            max_history: 100,
        }
    }
}

/// Health counters for one provider
#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub provider: String,
    pub consecutive_failures: u32,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub last_failure: Option<Instant>,
}

impl ProviderHealth {
    pub(crate) fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            consecutive_failures: 0,
            total_requests: 0,
            successful_requests: 0,
            last_failure: None,
        }
    }

    /// Successful calls over all calls, 1.0 when nothing was recorded
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }

    /// Whether the provider is out of rotation at `now`
    pub fn is_cooling_down(&self, config: &HealthConfig, now: Instant) -> bool {
        if self.consecutive_failures < config.failure_threshold {
            return false;
        }
        self.last_failure
            .is_some_and(|at| now.saturating_duration_since(at) < config.cooldown)
    }
}

/// A provider in the chain failed permanently
#[derive(Debug, Clone)]
pub struct FallbackEvent {
    pub from_provider: String,
    /// `None` when the chain was exhausted
    pub to_provider: Option<String>,
    pub reason: ErrorKind,
    pub timestamp: Instant,
}
