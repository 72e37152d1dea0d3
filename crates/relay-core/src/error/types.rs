//! Core error type for relay

use std::time::Duration;
use thiserror::Error;

/// Result type alias for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Main error type for relay
///
/// Variants are grouped by where the failure comes from: the remote provider
/// (`Http`, `Provider`, `RateLimited`, ...) or the resilience layer itself
/// (`PoolTimeout`, `QueueFull`, ...).
#[derive(Error, Debug, Clone)]
pub enum RelayError {
    /// Provider answered with 429 or an equivalent rate-limit signal
    #[error("Rate limited by {provider}: {message}")]
    RateLimited {
        provider: String,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Provider reported it is overloaded
    #[error("Model overloaded: {message}")]
    ModelOverloaded {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Provider is temporarily unavailable
    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Transport-level failure (DNS, connect, reset)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Request timed out
    #[error("Request timed out after {}ms", elapsed.as_millis())]
    Timeout { elapsed: Duration },

    /// HTTP response with a failure status code
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Free-form provider error, classified by message content
    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Waiting for a pooled connection exceeded the pool timeout
    #[error("Timed out after {}ms waiting for a connection to {host}", waited.as_millis())]
    PoolTimeout { host: String, waited: Duration },

    /// Request queue backlog is at capacity
    #[error("Request queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },

    /// Component was shut down while the operation was pending
    #[error("{component} was shut down")]
    Shutdown { component: String },

    /// Operation was cancelled before it ran
    #[error("Operation cancelled: {reason}")]
    Cancelled { reason: String },

    /// IO errors (configuration files)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Every candidate in the provider chain failed
    #[error("All providers failed: {}", attempted.join(", "))]
    ProvidersExhausted {
        attempted: Vec<String>,
        last_error: Option<Box<RelayError>>,
    },
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig {
            message: format!("JSON: {}", err),
        }
    }
}
