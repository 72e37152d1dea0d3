//! Provider health tracking

use super::types::{HealthConfig, ProviderHealth};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::time::Instant;
use tracing::warn;

/// Consecutive-failure tracker with cooldown
#[derive(Debug, Default)]
pub struct HealthTracker {
    config: HealthConfig,
    states: Mutex<HashMap<String, ProviderHealth>>,
}

impl HealthTracker {
    /// Create a tracker with the given thresholds
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Record a successful call, clearing the failure streak
    pub fn record_success(&self, provider: &str) {
        let mut states = self.states.lock();
        let state = states
            .entry(provider.to_string())
            .or_insert_with(|| ProviderHealth::new(provider));
        state.consecutive_failures = 0;
        state.total_requests += 1;
        state.successful_requests += 1;
    }

    /// Record a failure; returns true if the provider is now cooling down
    pub fn record_failure(&self, provider: &str) -> bool {
        let now = Instant::now();
        let mut states = self.states.lock();
        let state = states
            .entry(provider.to_string())
            .or_insert_with(|| ProviderHealth::new(provider));
        state.consecutive_failures += 1;
        state.total_requests += 1;
        state.last_failure = Some(now);

        let cooling = state.is_cooling_down(&self.config, now);
        if cooling {
            warn!(
                provider,
                failures = state.consecutive_failures,
                cooldown_secs = self.config.cooldown.as_secs(),
                "provider taken out of rotation"
            );
        }
        cooling
    }

    /// Unknown providers are available
    pub fn is_available(&self, provider: &str) -> bool {
        let now = Instant::now();
        self.states
            .lock()
            .get(provider)
            .is_none_or(|state| !state.is_cooling_down(&self.config, now))
    }

    /// Health snapshot for one provider
    pub fn health(&self, provider: &str) -> Option<ProviderHealth> {
        self.states.lock().get(provider).cloned()
    }

    /// Snapshot for every provider seen so far, sorted by id
    pub fn all(&self) -> Vec<ProviderHealth> {
        let mut all: Vec<_> = self.states.lock().values().cloned().collect();
        all.sort_by(|a, b| a.provider.cmp(&b.provider));
        all
    }

    /// Forget all health data for a provider
    pub fn reset(&self, provider: &str) {
        self.states.lock().remove(provider);
    }

    pub fn reset_all(&self) {
        self.states.lock().clear();
    }
}
