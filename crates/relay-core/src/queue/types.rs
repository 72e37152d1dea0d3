//! Request queue types

use crate::error::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Dispatch priority; higher tiers always drain first within a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub(crate) const TIERS: usize = 3;

    /// Tier index, 0 dispatches first
    pub(crate) fn tier(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }
}

/// Per-request options for [`RequestQueue::enqueue`](super::RequestQueue::enqueue)
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub priority: Priority,
    /// May be grouped with other batchable requests of the same channel
    pub batchable: bool,
    /// Only requests with equal keys are batched together
    pub batch_key: Option<String>,
}

impl EnqueueOptions {
    /// Normal priority, not batchable
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Allow batching with other requests sharing `key`
    pub fn batchable(mut self, key: Option<String>) -> Self {
        self.batchable = true;
        self.batch_key = key;
        self
    }
}

/// Queue limits and batching behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum unsettled requests across all channels
    pub max_queue_size: usize,
    pub enable_batching: bool,
    pub max_batch_size: usize,
    /// How long a batchable head waits for its batch to fill
    #[serde(with = "humantime_serde")]
    pub batch_window: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            enable_batching: false,
            max_batch_size: 10,
            batch_window: Duration::from_millis(10),
        }
    }
}

impl QueueConfig {
    /// Set the backlog limit
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Enable batching with the given batch size and window
    pub fn with_batching(mut self, max_batch_size: usize, window: Duration) -> Self {
        self.enable_batching = true;
        self.max_batch_size = max_batch_size;
        self.batch_window = window;
        self
    }

    pub fn validate(&self) -> RelayResult<()> {
        if self.max_queue_size == 0 {
            return Err(RelayError::config("max_queue_size must be greater than zero"));
        }
        if self.max_batch_size == 0 {
            return Err(RelayError::config("max_batch_size must be greater than zero"));
        }
        Ok(())
    }
}

/// Point-in-time queue snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    /// Requests settled successfully
    pub processed: u64,
    pub failed: u64,
    /// Enqueue attempts refused with `QUEUE_FULL`
    pub rejected: u64,
    pub batches_formed: u64,
    pub batched_requests: u64,
    /// Unsettled requests, queued or in flight
    pub pending: usize,
    pub pending_per_channel: BTreeMap<String, usize>,
}
