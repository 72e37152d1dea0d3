//! Connection pooling
//!
//! Tracks reusable logical connections per host (scheme and authority).
//! Limits apply per host and across the pool; callers over the limit wait in
//! FIFO order until a connection is released or closed.

mod connection_pool;
mod types;

#[cfg(test)]
mod tests;

pub use connection_pool::{ConnectionPool, host_key};
pub use types::{Connection, HostStats, PoolConfig, PoolStats};
