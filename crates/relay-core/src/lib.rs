//! Relay Core Library
//!
//! Resilience layer between an application and remote language-model
//! providers: connection pooling, caching, retry with provider-specific
//! backoff, request queueing with batching, and provider fallback chains.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod pool;
pub mod provider;
pub mod queue;
pub mod recovery;

// Re-export commonly used types
pub use cache::{
    Cache, CacheConfig, CacheStats, EvictionStrategy, ModelCapabilities, ModelCapabilityCache,
    ResponseCache, TokenCountCache,
};
pub use config::{LoggingConfig, RelayConfig, load_from_file};
pub use context::{RelayContext, RelayStats};
pub use error::{ClassifiedError, ErrorKind, RelayError, RelayResult, Severity, classify};
pub use pool::{Connection, ConnectionPool, PoolConfig, PoolStats};
pub use provider::{
    FallbackExecutor, FallbackOutcome, ProviderConfig, ProviderManager, RequestConfig,
};
pub use queue::{EnqueueOptions, Priority, QueueConfig, QueueHandle, QueueStats, RequestQueue};
pub use recovery::{
    BackoffStrategy, ParallelOptions, RetryContext, RetryExecutor, RetryPolicy, RetryResult,
    with_retry,
};
