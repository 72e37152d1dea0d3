//! Retry executor
//!
//! Wraps a single asynchronous operation with classification-driven retries.

use super::backoff::{JitterSource, ThreadRngJitter};
use super::policy::RetryPolicy;
use crate::error::{ClassifiedError, RelayError, RelayResult, classify};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument, warn};

/// Per-call bookkeeping, returned with every result
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Attempts made so far (1-based once the first attempt starts)
    pub attempt: u32,
    pub max_attempts: u32,
    pub provider: String,
    pub operation_name: String,
    pub start_time: Instant,
    /// Time spent sleeping between attempts
    pub total_retry_time: Duration,
    /// One entry per failed attempt, oldest first
    pub errors: Vec<ClassifiedError>,
}

impl RetryContext {
    fn new(provider: &str, operation_name: &str, max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            provider: provider.to_string(),
            operation_name: operation_name.to_string(),
            start_time: Instant::now(),
            total_retry_time: Duration::ZERO,
            errors: Vec::new(),
        }
    }

    /// Wall time since the first attempt started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Terminal outcome of [`RetryExecutor::execute`]
#[derive(Debug)]
pub struct RetryResult<T> {
    pub outcome: Result<T, ClassifiedError>,
    pub context: RetryContext,
}

impl<T> RetryResult<T> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn value(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ClassifiedError> {
        self.outcome.as_ref().err()
    }

    /// Get the success value, if any
    pub fn ok(self) -> Option<T> {
        self.outcome.ok()
    }

    /// Convert to a plain result carrying the final underlying error
    pub fn into_result(self) -> RelayResult<T> {
        self.outcome.map_err(|e| e.source)
    }

    pub(crate) fn cancelled(context: RetryContext, reason: &str) -> Self {
        Self {
            outcome: Err(classify(&RelayError::cancelled(reason))),
            context,
        }
    }
}

/// Runs operations under one provider's retry policy
#[derive(Clone)]
pub struct RetryExecutor {
    provider: String,
    policy: RetryPolicy,
    jitter: Arc<dyn JitterSource>,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("provider", &self.provider)
            .field("policy", &self.policy)
            .finish()
    }
}

impl RetryExecutor {
    /// Create an executor for `provider` with `policy`
    pub fn new(provider: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            provider: provider.into(),
            policy,
            jitter: Arc::new(ThreadRngJitter),
        }
    }

    /// Executor using the built-in policy for `provider`
    pub fn for_provider(provider: impl Into<String>) -> Self {
        let provider = provider.into();
        let policy = RetryPolicy::for_provider(&provider);
        Self::new(provider, policy)
    }

    /// Replace the jitter source
    pub fn with_jitter_source(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub(crate) fn new_context(&self, name: &str) -> RetryContext {
        RetryContext::new(&self.provider, name, self.policy.max_attempts())
    }

    /// Execute an operation with retries
    ///
    /// The operation is invoked once per attempt. Failures are classified and
    /// retried while the policy allows it; the final result carries every
    /// classified failure in `context.errors`.
    #[instrument(skip(self, operation), fields(provider = %self.provider))]
    pub async fn execute<T, F, Fut>(&self, mut operation: F, name: &str) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RelayResult<T>>,
    {
        let mut context = self.new_context(name);

        loop {
            context.attempt += 1;

            let error = match operation().await {
                Ok(value) => {
                    if context.attempt > 1 {
                        debug!(attempts = context.attempt, "Operation succeeded after retry");
                    }
                    return RetryResult {
                        outcome: Ok(value),
                        context,
                    };
                }
                Err(error) => classify(&error),
            };
            context.errors.push(error.clone());

            if !self.policy.should_retry(context.attempt, &error) {
                debug!(
                    attempts = context.attempt,
                    kind = %error.kind,
                    "Giving up: {}",
                    error.message
                );
                return RetryResult {
                    outcome: Err(error),
                    context,
                };
            }

            let delay = self
                .policy
                .delay_with_jitter(context.attempt, &error, self.jitter.sample());
            warn!(
                attempt = context.attempt,
                max_attempts = context.max_attempts,
                kind = %error.kind,
                delay_ms = delay.as_millis() as u64,
                "Retrying after error: {}",
                error.message
            );

            sleep(delay).await;
            context.total_retry_time += delay;
        }
    }
}

/// Run `operation` under `policy` and return a plain result
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, name: &str, operation: F) -> RelayResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RelayResult<T>>,
{
    RetryExecutor::new("default", policy)
        .execute(operation, name)
        .await
        .into_result()
}
