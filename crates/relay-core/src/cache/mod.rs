//! Caching for provider traffic
//!
//! A single generic [`Cache`] handles expiry, eviction and statistics. Three
//! thin wrappers own the key derivation for their workload:
//!
//! - **Token counts**: keyed by provider, model and a hash of the messages
//! - **Model capabilities**: keyed by provider and model
//! - **Responses**: keyed by provider, model and a hash of the normalized request

mod capability;
mod eviction;
pub mod keys;
mod response;
mod store;
mod token_count;
mod types;


pub use capability::{ModelCapabilities, ModelCapabilityCache};
pub use response::ResponseCache;
pub use store::Cache;
pub use token_count::TokenCountCache;
pub use types::{CacheConfig, CacheEntry, CacheStats, EvictionStrategy};
