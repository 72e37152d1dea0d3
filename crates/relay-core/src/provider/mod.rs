//! Provider registry and fallback
//!
//! [`ProviderManager`] turns a request's primary provider and fallback lists
//! into an ordered chain. [`FallbackExecutor`] walks that chain, retrying
//! each provider under its own policy and tracking provider health.

mod fallback;
mod health;
mod manager;
mod types;

#[cfg(test)]
mod tests;

pub use fallback::{FallbackExecutor, FallbackOutcome};
pub use health::HealthTracker;
pub use manager::ProviderManager;
pub use types::{FallbackEvent, HealthConfig, ProviderConfig, ProviderHealth, RequestConfig};
