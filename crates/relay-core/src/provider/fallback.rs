//! Chain walker: retry each provider, fall back on permanent failure

use super::health::HealthTracker;
use super::manager::ProviderManager;
use super::types::{FallbackEvent, HealthConfig, ProviderHealth, RequestConfig};
use crate::error::{RelayError, RelayResult};
use crate::recovery::{JitterSource, RetryContext, RetryExecutor, RetryPolicy, ThreadRngJitter};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Successful result of [`FallbackExecutor::execute`]
#[derive(Debug)]
pub struct FallbackOutcome<T> {
    pub value: T,
    /// Provider that produced the value
    pub provider: String,
    /// Retry context of the successful provider
    pub context: RetryContext,
    /// Providers that failed before this one
    pub failed_providers: Vec<String>,
}

/// Walks a provider chain, running the operation under each provider's retry policy
pub struct FallbackExecutor {
    manager: Arc<ProviderManager>,
    policies: HashMap<String, RetryPolicy>,
    health: HealthTracker,
    history: Mutex<VecDeque<FallbackEvent>>,
    jitter: Arc<dyn JitterSource>,
}

impl FallbackExecutor {
    /// Create an executor with default health thresholds
    pub fn new(manager: Arc<ProviderManager>) -> Self {
        Self::with_health_config(manager, HealthConfig::default())
    }

    /// Create an executor with custom health thresholds
    pub fn with_health_config(manager: Arc<ProviderManager>, config: HealthConfig) -> Self {
        Self {
            manager,
            policies: HashMap::new(),
            health: HealthTracker::new(config),
            history: Mutex::new(VecDeque::new()),
            jitter: Arc::new(ThreadRngJitter),
        }
    }

    /// Override the retry policy for one provider
    pub fn with_policy(mut self, provider: impl Into<String>, policy: RetryPolicy) -> Self {
        self.policies.insert(provider.into(), policy);
        self
    }

    /// Set retry policy overrides keyed by provider id
    pub fn with_policies(mut self, policies: HashMap<String, RetryPolicy>) -> Self {
        self.policies.extend(policies);
        self
    }

    /// Set the jitter source used by every provider
    pub fn with_jitter_source(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn manager(&self) -> &Arc<ProviderManager> {
        &self.manager
    }

    /// Configured policy, falling back to the built-in preset
    pub fn policy_for(&self, provider: &str) -> RetryPolicy {
        self.policies
            .get(provider)
            .cloned()
            .unwrap_or_else(|| RetryPolicy::for_provider(provider))
    }

    /// Run `operation` against the chain for `request`
    ///
    /// The operation receives the provider id for each attempt. Providers
    /// cooling down are skipped unless every candidate is cooling down.
    #[instrument(skip(self, operation), fields(primary = %request.provider))]
    pub async fn execute<T, F, Fut>(
        &self,
        request: &RequestConfig,
        name: &str,
        mut operation: F,
    ) -> RelayResult<FallbackOutcome<T>>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = RelayResult<T>>,
    {
        let chain = self.manager.build_provider_chain(request);
        let mut candidates: Vec<String> = chain
            .iter()
            .filter(|p| self.health.is_available(p))
            .cloned()
            .collect();
        if candidates.is_empty() {
            warn!(chain = ?chain, "every provider is cooling down, trying the full chain");
            candidates = chain;
        }
        debug!(candidates = ?candidates, "built provider chain");

        let mut failed = Vec::new();
        let mut last_error = None;

        for (index, provider) in candidates.iter().enumerate() {
            let executor = RetryExecutor::new(provider.clone(), self.policy_for(provider))
                .with_jitter_source(Arc::clone(&self.jitter));
            let result = executor
                .execute(|| operation(provider.clone()), name)
                .await;

            match result.outcome {
                Ok(value) => {
                    self.health.record_success(provider);
                    if !failed.is_empty() {
                        info!(provider = %provider, failed = ?failed, "request served by fallback provider");
                    }
                    return Ok(FallbackOutcome {
                        value,
                        provider: provider.clone(),
                        context: result.context,
                        failed_providers: failed,
                    });
                }
                Err(error) => {
                    self.health.record_failure(provider);
                    let next = candidates.get(index + 1).cloned();
                    warn!(
                        provider = %provider,
                        next = ?next,
                        kind = %error.kind,
                        attempts = result.context.attempt,
                        "provider failed: {}",
                        error.message
                    );
                    self.push_event(FallbackEvent {
                        from_provider: provider.clone(),
                        to_provider: next,
                        reason: error.kind,
                        timestamp: Instant::now(),
                    });
                    failed.push(provider.clone());
                    last_error = Some(Box::new(error.source));
                }
            }
        }

        Err(RelayError::ProvidersExhausted {
            attempted: failed,
            last_error,
        })
    }

    fn push_event(&self, event: FallbackEvent) {
        let mut history = self.history.lock();
        history.push_back(event);
        while history.len() > self.health.config().max_history {
            history.pop_front();
        }
    }

    /// Fallback events, oldest first
    pub fn history(&self) -> Vec<FallbackEvent> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn health(&self, provider: &str) -> Option<ProviderHealth> {
        self.health.health(provider)
    }

    /// Health snapshots for every provider seen so far
    pub fn health_stats(&self) -> Vec<ProviderHealth> {
        self.health.all()
    }

    pub fn is_available(&self, provider: &str) -> bool {
        self.health.is_available(provider)
    }

    /// Put a provider back into rotation
    pub fn reset_health(&self, provider: &str) {
        self.health.reset(provider);
    }

    /// Clear health data and fallback history
    pub fn reset_all(&self) {
        self.health.reset_all();
        self.history.lock().clear();
    }
}
