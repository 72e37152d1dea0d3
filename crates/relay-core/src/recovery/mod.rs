//! Retry with provider-specific backoff
//!
//! - Backoff strategies and jitter (`backoff`)
//! - Per-provider retry policies (`policy`)
//! - The retry executor and its results (`retry`)
//! - Bounded parallel execution (`parallel`)

pub mod backoff;
mod parallel;
mod policy;
mod retry;

pub use backoff::{
    BackoffStrategy, DelayFn, FixedJitter, JitterSource, MIN_RETRY_DELAY, ThreadRngJitter,
};
pub use parallel::ParallelOptions;
pub use policy::RetryPolicy;
pub use retry::{RetryContext, RetryExecutor, RetryResult, with_retry};
