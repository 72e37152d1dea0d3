//! Error classification
//!
//! Maps any [`RelayError`] onto the kind/retryable/severity triple that
//! retry and fallback decisions are made from. This module depends on
//! nothing but the error type so every component can import it directly.

use super::types::RelayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Kind of failure, independent of the concrete error variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    RateLimited,
    NetworkError,
    Timeout,
    ModelOverloaded,
    ServiceUnavailable,
    InvalidConfig,
    PoolTimeout,
    QueueFull,
    Authentication,
    InvalidRequest,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    /// Kinds retried by default policies
    pub fn transient() -> Vec<ErrorKind> {
        vec![
            ErrorKind::RateLimited,
            ErrorKind::NetworkError,
            ErrorKind::Timeout,
            ErrorKind::ModelOverloaded,
            ErrorKind::ServiceUnavailable,
        ]
    }

    fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::NetworkError
                | ErrorKind::Timeout
                | ErrorKind::ModelOverloaded
                | ErrorKind::ServiceUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::ModelOverloaded => "MODEL_OVERLOADED",
            ErrorKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorKind::InvalidConfig => "INVALID_CONFIG",
            ErrorKind::PoolTimeout => "POOL_TIMEOUT",
            ErrorKind::QueueFull => "QUEUE_FULL",
            ErrorKind::Authentication => "AUTHENTICATION",
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Severity of a classified error; critical errors are never retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Critical,
}

/// Normalized view of a failure
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    pub severity: Severity,
    /// Server-supplied delay before the next attempt
    pub retry_after: Option<Duration>,
    /// The error this classification was derived from
    pub source: RelayError,
}

impl ClassifiedError {
    fn new(kind: ErrorKind, source: &RelayError) -> Self {
        let severity = match kind {
            ErrorKind::Authentication | ErrorKind::InvalidConfig => Severity::Critical,
            _ => Severity::Normal,
        };
        Self {
            kind,
            message: source.to_string(),
            retryable: kind.is_transient(),
            severity,
            retry_after: None,
            source: source.clone(),
        }
    }

    fn retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Whether this error may be retried at all, before policy is applied
    pub fn is_retryable(&self) -> bool {
        self.retryable && self.severity != Severity::Critical
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Classify an error
pub fn classify(error: &RelayError) -> ClassifiedError {
    match error {
        RelayError::RateLimited { retry_after, .. } => {
            ClassifiedError::new(ErrorKind::RateLimited, error).retry_after(*retry_after)
        }
        RelayError::ModelOverloaded { retry_after, .. } => {
            ClassifiedError::new(ErrorKind::ModelOverloaded, error).retry_after(*retry_after)
        }
        RelayError::ServiceUnavailable { retry_after, .. } => {
            ClassifiedError::new(ErrorKind::ServiceUnavailable, error).retry_after(*retry_after)
        }
        RelayError::Network { .. } => ClassifiedError::new(ErrorKind::NetworkError, error),
        RelayError::Timeout { .. } => ClassifiedError::new(ErrorKind::Timeout, error),
        RelayError::Http {
            status,
            retry_after,
            ..
        } => ClassifiedError::new(kind_for_status(*status), error).retry_after(*retry_after),
        RelayError::Provider { message, .. } => {
            ClassifiedError::new(kind_for_message(message), error)
        }
        RelayError::InvalidConfig { .. } => ClassifiedError::new(ErrorKind::InvalidConfig, error),
        RelayError::PoolTimeout { .. } => ClassifiedError::new(ErrorKind::PoolTimeout, error),
        RelayError::QueueFull { .. } => ClassifiedError::new(ErrorKind::QueueFull, error),
        RelayError::Shutdown { .. } | RelayError::Cancelled { .. } => {
            ClassifiedError::new(ErrorKind::Cancelled, error)
        }
        RelayError::Io { .. } => ClassifiedError::new(ErrorKind::Unknown, error),
        RelayError::ProvidersExhausted { last_error, .. } => match last_error {
            Some(last) => {
                let mut classified = classify(last);
                classified.message = error.to_string();
                classified.source = error.clone();
                classified
            }
            None => ClassifiedError::new(ErrorKind::Unknown, error),
        },
    }
}

fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        429 => ErrorKind::RateLimited,
        529 => ErrorKind::ModelOverloaded,
        408 | 504 => ErrorKind::Timeout,
        502 | 503 => ErrorKind::ServiceUnavailable,
        401 | 403 => ErrorKind::Authentication,
        400..=499 => ErrorKind::InvalidRequest,
        500..=599 => ErrorKind::ServiceUnavailable,
        _ => ErrorKind::Unknown,
    }
}

fn kind_for_message(message: &str) -> ErrorKind {
    let msg = message.to_lowercase();

    if msg.contains("rate limit") || msg.contains("429") || msg.contains("too many requests") {
        ErrorKind::RateLimited
    } else if msg.contains("overloaded") || msg.contains("529") {
        ErrorKind::ModelOverloaded
    } else if msg.contains("unauthorized")
        || msg.contains("invalid api key")
        || msg.contains("401")
        || msg.contains("403")
    {
        ErrorKind::Authentication
    } else if msg.contains("timeout") || msg.contains("timed out") {
        ErrorKind::Timeout
    } else if msg.contains("unavailable") || msg.contains("503") || msg.contains("502") {
        ErrorKind::ServiceUnavailable
    } else if msg.contains("connection") || msg.contains("network") || msg.contains("dns") {
        ErrorKind::NetworkError
    } else if msg.contains("invalid") || msg.contains("context length") {
        ErrorKind::InvalidRequest
    } else {
        ErrorKind::Unknown
    }
}
