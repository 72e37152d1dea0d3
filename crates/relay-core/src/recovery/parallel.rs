//! Bounded parallel execution on top of [`RetryExecutor`]

use super::retry::{RetryExecutor, RetryResult};
use crate::error::RelayResult;
use futures::StreamExt;
use futures::stream;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Options for [`RetryExecutor::execute_parallel`]
#[derive(Debug, Clone, Copy)]
pub struct ParallelOptions {
    /// Stop scheduling new operations after the first permanent failure
    pub fail_fast: bool,
    /// Maximum operations in flight; 0 means unbounded
    pub max_concurrency: usize,
}

impl Default for ParallelOptions {
    fn default() -> Self {
        Self {
            fail_fast: false,
            max_concurrency: 4,
        }
    }
}

impl ParallelOptions {
    /// Stop scheduling after the first permanent failure
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Set the in-flight limit; 0 means unbounded
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }
}

impl RetryExecutor {
    /// Execute several operations, each with its own retry loop
    ///
    /// Results are returned in input order. With `fail_fast`, operations that
    /// had not started when a permanent failure was observed yield a
    /// `CANCELLED` result without running.
    pub async fn execute_parallel<T, F, Fut>(
        &self,
        operations: Vec<F>,
        name: &str,
        options: ParallelOptions,
    ) -> Vec<RetryResult<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RelayResult<T>>,
    {
        let total = operations.len();
        let limit = match options.max_concurrency {
            0 => total.max(1),
            n => n,
        };
        let aborted = AtomicBool::new(false);
        let aborted = &aborted;

        debug!(total, limit, fail_fast = options.fail_fast, "Executing operations in parallel");

        let mut slots: Vec<Option<RetryResult<T>>> = (0..total).map(|_| None).collect();
        let mut completed = stream::iter(operations.into_iter().enumerate())
            .map(move |(index, operation)| async move {
                if aborted.load(Ordering::SeqCst) {
                    return (index, None);
                }
                let result = self
                    .execute(operation, &format!("{name}[{index}]"))
                    .await;
                if options.fail_fast && !result.is_success() {
                    warn!(index, "Operation failed permanently, cancelling the rest");
                    aborted.store(true, Ordering::SeqCst);
                }
                (index, Some(result))
            })
            .buffer_unordered(limit);

        while let Some((index, result)) = completed.next().await {
            slots[index] = result;
        }
        drop(completed);

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    RetryResult::cancelled(
                        self.new_context(&format!("{name}[{index}]")),
                        "an earlier operation failed",
                    )
                })
            })
            .collect()
    }
}
