//! Backoff strategies and jitter
//!
//! Delays are computed in two steps: a deterministic pre-jitter delay that
//! never exceeds the policy maximum, then a random perturbation that is
//! floored at [`MIN_RETRY_DELAY`].

use crate::error::ClassifiedError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Lower bound for any delay after jitter is applied
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Custom delay function: `(attempt, error) -> delay`, attempt is 1-based
pub type DelayFn = Arc<dyn Fn(u32, &ClassifiedError) -> Duration + Send + Sync>;

/// How the pre-jitter delay grows with the attempt number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// `base * 2^(attempt - 1)`
    #[default]
    Exponential,
    /// `base * attempt`
    Linear,
    /// `base`
    Fixed,
    /// Delegates to the policy's custom delay function
    Custom,
}

impl BackoffStrategy {
    /// Delay for a 1-based attempt number, before clamping
    pub fn delay_for_attempt(self, base: Duration, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base_ms = base.as_millis() as f64;
        let ms = match self {
            BackoffStrategy::Exponential | BackoffStrategy::Custom => {
                base_ms * 2f64.powi((attempt - 1).min(62) as i32)
            }
            BackoffStrategy::Linear => base_ms * attempt as f64,
            BackoffStrategy::Fixed => base_ms,
        };
        duration_from_ms(ms)
    }
}

/// Source of jitter samples in `[-0.5, 0.5)`
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Jitter from the thread-local RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen_range(-0.5..0.5)
    }
}

/// Always returns the same sample; for deterministic delays in tests
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        self.0.clamp(-0.5, 0.5)
    }
}

/// Apply `delay ± delay * factor * sample`, floored at [`MIN_RETRY_DELAY`]
pub fn apply_jitter(delay: Duration, factor: f64, sample: f64) -> Duration {
    let ms = delay.as_millis() as f64;
    let jittered = ms + ms * factor.clamp(0.0, 1.0) * sample;
    duration_from_ms(jittered).max(MIN_RETRY_DELAY)
}

fn duration_from_ms(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_millis(ms.min(u64::MAX as f64) as u64)
    } else {
        Duration::ZERO
    }
}
