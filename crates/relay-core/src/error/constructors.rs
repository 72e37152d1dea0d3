//! Constructor methods for RelayError

use super::classify::{ErrorKind, classify};
use super::types::RelayError;
use std::time::Duration;

impl RelayError {
    /// Create a rate-limit error
    pub fn rate_limited(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RateLimited {
            provider: provider.into(),
            message: message.into(),
            retry_after: None,
        }
    }

    /// Create a rate-limit error carrying a server-supplied retry-after
    pub fn rate_limited_after(
        provider: impl Into<String>,
        message: impl Into<String>,
        retry_after: Duration,
    ) -> Self {
        Self::RateLimited {
            provider: provider.into(),
            message: message.into(),
            retry_after: Some(retry_after),
        }
    }

    /// Create a model-overloaded error
    pub fn overloaded(message: impl Into<String>) -> Self {
        Self::ModelOverloaded {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Create a service-unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    /// Create an HTTP status error
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Create a free-form provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a shutdown error for the named component
    pub fn shutdown(component: impl Into<String>) -> Self {
        Self::Shutdown {
            component: component.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Attach a server-supplied retry-after hint where the variant carries one
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        match &mut self {
            Self::RateLimited { retry_after, .. }
            | Self::ModelOverloaded { retry_after, .. }
            | Self::ServiceUnavailable { retry_after, .. }
            | Self::Http { retry_after, .. } => *retry_after = Some(delay),
            _ => {}
        }
        self
    }

    /// Classified kind of this error
    pub fn kind(&self) -> ErrorKind {
        classify(self).kind
    }
}
