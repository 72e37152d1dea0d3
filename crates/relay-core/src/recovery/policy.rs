//! Per-provider retry policy

use super::backoff::{BackoffStrategy, DelayFn, apply_jitter};
use crate::error::{ClassifiedError, ErrorKind, RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Retry policy for one provider
///
/// # Example
/// ```
/// use relay_core::recovery::{BackoffStrategy, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default()
///     .with_max_retries(5)
///     .with_base_delay(Duration::from_millis(500))
///     .with_strategy(BackoffStrategy::Linear);
/// assert_eq!(policy.max_attempts(), 6);
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Relative jitter in `[0, 1]`
    pub jitter_factor: f64,
    /// Error kinds eligible for retry
    pub retryable_errors: HashSet<ErrorKind>,
    #[serde(skip)]
    pub custom_delay: Option<DelayFn>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            strategy: BackoffStrategy::Exponential,
            jitter_factor: 0.1,
            retryable_errors: ErrorKind::transient().into_iter().collect(),
            custom_delay: None,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("strategy", &self.strategy)
            .field("jitter_factor", &self.jitter_factor)
            .field("retryable_errors", &self.retryable_errors)
            .field("custom_delay", &self.custom_delay.is_some())
            .finish()
    }
}

impl RetryPolicy {
    /// Built-in policy for a known provider; unknown providers get the default
    pub fn for_provider(provider: &str) -> Self {
        match provider.to_lowercase().as_str() {
            "anthropic" => Self {
                max_retries: 3,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(60),
                jitter_factor: 0.2,
                ..Default::default()
            },
            "openai" | "azure" => Self {
                max_retries: 3,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(60),
                jitter_factor: 0.1,
                ..Default::default()
            },
            "google" | "gemini" => Self {
                max_retries: 3,
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(60),
                jitter_factor: 0.2,
                ..Default::default()
            },
            "openrouter" => Self {
                max_retries: 2,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
                ..Default::default()
            },
            "ollama" => Self {
                max_retries: 2,
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(5),
                strategy: BackoffStrategy::Linear,
                jitter_factor: 0.0,
                ..Default::default()
            },
            _ => Self::default(),
        }
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Set the maximum number of retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff strategy
    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the jitter factor
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// Replace the set of retryable error kinds
    pub fn with_retryable_errors(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable_errors = kinds.into_iter().collect();
        self
    }

    /// Use a custom delay function; also switches the strategy to `Custom`
    pub fn with_custom_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(u32, &ClassifiedError) -> Duration + Send + Sync + 'static,
    {
        self.custom_delay = Some(Arc::new(delay));
        self.strategy = BackoffStrategy::Custom;
        self
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether a failed `attempt` (1-based) should be followed by another
    pub fn should_retry(&self, attempt: u32, error: &ClassifiedError) -> bool {
        attempt < self.max_attempts()
            && error.is_retryable()
            && self.retryable_errors.contains(&error.kind)
    }

    /// Delay before the attempt following `attempt`, clamped to `max_delay`
    ///
    /// Server-supplied retry-after wins, then the custom function (if the
    /// strategy is `Custom`), then the strategy formula.
    pub fn pre_jitter_delay(&self, attempt: u32, error: &ClassifiedError) -> Duration {
        let delay = match (error.retry_after, self.strategy, &self.custom_delay) {
            (Some(retry_after), _, _) => retry_after,
            (None, BackoffStrategy::Custom, Some(custom)) => custom(attempt, error),
            (None, strategy, _) => strategy.delay_for_attempt(self.base_delay, attempt),
        };
        delay.min(self.max_delay)
    }

    /// Full delay with jitter applied from `sample` in `[-0.5, 0.5)`
    pub fn delay_with_jitter(&self, attempt: u32, error: &ClassifiedError, sample: f64) -> Duration {
        apply_jitter(
            self.pre_jitter_delay(attempt, error),
            self.jitter_factor,
            sample,
        )
    }

    /// Reject out-of-range settings
    pub fn validate(&self) -> RelayResult<()> {
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(RelayError::config(format!(
                "jitter_factor must be within [0, 1], got {}",
                self.jitter_factor
            )));
        }
        if self.base_delay > self.max_delay {
            return Err(RelayError::config("base_delay must not exceed max_delay"));
        }
        if self.strategy == BackoffStrategy::Custom && self.custom_delay.is_none() {
            tracing::warn!("custom backoff strategy without a delay function, using exponential");
        }
        Ok(())
    }
}
