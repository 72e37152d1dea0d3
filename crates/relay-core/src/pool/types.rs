//! Connection pool types

use crate::error::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Pool limits and timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections_per_host: usize,
    pub max_total_connections: usize,
    /// Handed to adapters that establish the physical transport
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,
    /// Idle connections older than this are closed by the sweep
    #[serde(with = "humantime_serde")]
    pub keep_alive_timeout: Duration,
    /// Maximum time a caller waits for a free slot
    #[serde(with = "humantime_serde")]
    pub pool_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections_per_host: 10,
            max_total_connections: 50,
            connection_timeout: Duration::from_secs(30),
            keep_alive_timeout: Duration::from_secs(60),
            pool_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// Set the per-host connection limit
    pub fn with_max_connections_per_host(mut self, max: usize) -> Self {
        self.max_connections_per_host = max;
        self
    }

    /// Set the limit across all hosts
    pub fn with_max_total_connections(mut self, max: usize) -> Self {
        self.max_total_connections = max;
        self
    }

    /// Set how long an idle connection is kept
    pub fn with_keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.keep_alive_timeout = timeout;
        self
    }

    /// Set how long `get_connection` waits for a slot
    pub fn with_pool_timeout(mut self, timeout: Duration) -> Self {
        self.pool_timeout = timeout;
        self
    }

    pub(crate) fn sweep_interval(&self) -> Duration {
        (self.keep_alive_timeout / 2).max(Duration::from_millis(10))
    }

    /// Reject zero limits and a zero pool timeout
    pub fn validate(&self) -> RelayResult<()> {
        if self.max_connections_per_host == 0 || self.max_total_connections == 0 {
            return Err(RelayError::config("connection limits must be greater than zero"));
        }
        if self.pool_timeout.is_zero() {
            return Err(RelayError::config("pool_timeout must be greater than zero"));
        }
        Ok(())
    }
}

/// Logical connection to one host
///
/// Callers receive snapshots and hand them back to
/// [`ConnectionPool::release_connection`](super::ConnectionPool::release_connection)
/// or [`ConnectionPool::close_connection`](super::ConnectionPool::close_connection).
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: Uuid,
    /// Scheme and authority, e.g. `https://api.openai.com`
    pub host: String,
    pub created_at: Instant,
    pub last_used_at: Instant,
    /// Completed requests, incremented on release
    pub request_count: u64,
    pub is_active: bool,
    /// Timeout for establishing the physical transport
    pub connect_timeout: Duration,
}

impl Connection {
    pub(crate) fn new(host: &str, connect_timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            host: host.to_string(),
            created_at: now,
            last_used_at: now,
            request_count: 0,
            is_active: true,
            connect_timeout,
        }
    }

    /// Time since the connection was last handed out or released
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used_at)
    }
}

/// Per-host counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HostStats {
    pub active: usize,
    pub idle: usize,
    pub waiting: usize,
}

/// Point-in-time pool snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    pub active_connections: usize,
    pub idle_connections: usize,
    /// Callers waiting for a connection
    pub pending_requests: usize,
    /// Connections handed out, new or reused
    pub total_requests: u64,
    pub connections_reused: u64,
    pub connections_created: u64,
    pub connections_closed: u64,
    pub hosts: BTreeMap<String, HostStats>,
}

impl PoolStats {
    pub fn total_connections(&self) -> usize {
        self.active_connections + self.idle_connections
    }
}
