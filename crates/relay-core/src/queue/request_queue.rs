//! Priority request queue with optional batching

use super::types::{EnqueueOptions, Priority, QueueConfig, QueueStats};
use crate::error::{RelayError, RelayResult};
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Processes one request for a channel
pub type RequestProcessor<P, R> =
    Arc<dyn Fn(String, P) -> BoxFuture<'static, RelayResult<R>> + Send + Sync>;

/// Processes a batch for a channel; must return one result per payload, in order
pub type BatchProcessor<P, R> =
    Arc<dyn Fn(String, Vec<P>) -> BoxFuture<'static, RelayResult<Vec<R>>> + Send + Sync>;

type Settle<R> = oneshot::Sender<RelayResult<R>>;

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run a processor call, turning a panic into an error for its entries
async fn guarded<T, F>(channel: &str, call: F) -> RelayResult<T>
where
    F: Future<Output = RelayResult<T>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic);
            warn!(channel, panic = %message, "queue processor panicked");
            Err(RelayError::provider(
                channel,
                format!("processor panicked: {message}"),
            ))
        }
    }
}

struct QueueEntry<P, R> {
    id: Uuid,
    payload: P,
    batchable: bool,
    batch_key: Option<String>,
    enqueued_at: Instant,
    tx: Settle<R>,
}

struct Channel<P, R> {
    tiers: [VecDeque<QueueEntry<P, R>>; Priority::TIERS],
    in_flight: usize,
    dispatching: bool,
}

impl<P, R> Default for Channel<P, R> {
    fn default() -> Self {
        Self {
            tiers: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            in_flight: 0,
            dispatching: false,
        }
    }
}

impl<P, R> Channel<P, R> {
    fn queued(&self) -> usize {
        self.tiers.iter().map(VecDeque::len).sum()
    }

    fn head(&self) -> Option<&QueueEntry<P, R>> {
        self.tiers.iter().find_map(VecDeque::front)
    }

    fn pop_head(&mut self) -> Option<QueueEntry<P, R>> {
        self.tiers.iter_mut().find_map(VecDeque::pop_front)
    }

    /// Tier holding the head entry
    fn head_tier(&self) -> Option<usize> {
        self.tiers.iter().position(|tier| !tier.is_empty())
    }

    fn count_batchable(&self, tier: usize, key: &Option<String>) -> usize {
        self.tiers[tier]
            .iter()
            .filter(|e| e.batchable && e.batch_key == *key)
            .count()
    }

    /// Remove up to `max` batchable entries with `key` from one tier, FIFO
    ///
    /// Lower tiers never join a batch, so a batch cannot overtake entries
    /// queued at a higher priority.
    fn take_batch(
        &mut self,
        tier: usize,
        key: &Option<String>,
        max: usize,
    ) -> Vec<QueueEntry<P, R>> {
        let queue = &mut self.tiers[tier];
        let mut batch = Vec::new();
        let mut rest = VecDeque::with_capacity(queue.len());
        while let Some(entry) = queue.pop_front() {
            if batch.len() < max && entry.batchable && entry.batch_key == *key {
                batch.push(entry);
            } else {
                rest.push_back(entry);
            }
        }
        *queue = rest;
        batch
    }
}

enum Work<P, R> {
    Idle,
    Wait,
    Single(QueueEntry<P, R>),
    Batch(Vec<QueueEntry<P, R>>),
}

struct QueueState<P, R> {
    channels: HashMap<String, Channel<P, R>>,
    /// Unsettled entries across all channels
    pending: usize,
    destroyed: bool,
}

impl<P, R> QueueState<P, R> {
    fn next_work(
        &mut self,
        channel: &str,
        config: &QueueConfig,
        batching: bool,
        waited: bool,
    ) -> Work<P, R> {
        let Some(ch) = self.channels.get_mut(channel) else {
            return Work::Idle;
        };

        let Some(head) = ch.head() else {
            ch.dispatching = false;
            if ch.in_flight == 0 {
                self.channels.remove(channel);
            }
            return Work::Idle;
        };

        if batching && head.batchable {
            let key = head.batch_key.clone();
            let tier = ch.head_tier().unwrap_or_default();
            let ready = ch.count_batchable(tier, &key);
            if ready < config.max_batch_size && !waited && !config.batch_window.is_zero() {
                return Work::Wait;
            }
            let batch = ch.take_batch(tier, &key, config.max_batch_size);
            ch.in_flight += batch.len();
            return Work::Batch(batch);
        }

        match ch.pop_head() {
            Some(entry) => {
                ch.in_flight += 1;
                Work::Single(entry)
            }
            None => Work::Idle,
        }
    }

    fn finish(&mut self, channel: &str, count: usize) {
        self.pending = self.pending.saturating_sub(count);
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.in_flight = ch.in_flight.saturating_sub(count);
        }
    }
}

#[derive(Default)]
struct QueueCounters {
    enqueued: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    batches_formed: AtomicU64,
    batched_requests: AtomicU64,
}

impl QueueCounters {
    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

struct Shared<P, R> {
    config: QueueConfig,
    state: Mutex<QueueState<P, R>>,
    processor: Mutex<Option<RequestProcessor<P, R>>>,
    batch_processor: Mutex<Option<BatchProcessor<P, R>>>,
    counters: QueueCounters,
    shutdown: CancellationToken,
}

impl<P, R> Shared<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    fn settle(&self, tx: Settle<R>, result: RelayResult<R>) {
        let counter = if result.is_ok() {
            &self.counters.processed
        } else {
            &self.counters.failed
        };
        QueueCounters::add(counter, 1);
        // The caller may have dropped its handle
        let _ = tx.send(result);
    }

    async fn process_single(&self, channel: &str, entry: QueueEntry<P, R>) {
        let QueueEntry {
            id,
            payload,
            enqueued_at,
            tx,
            ..
        } = entry;
        debug!(
            channel,
            id = %id,
            waited_ms = enqueued_at.elapsed().as_millis() as u64,
            "dispatching request"
        );

        let processor = self.processor.lock().clone();
        let result = match processor {
            None => Err(RelayError::config(format!(
                "no request processor registered for channel '{channel}'"
            ))),
            Some(processor) => {
                let call = guarded(channel, async {
                    processor(channel.to_string(), payload).await
                });
                tokio::select! {
                    _ = self.shutdown.cancelled() => Err(RelayError::shutdown("request queue")),
                    result = call => result,
                }
            }
        };

        self.state.lock().finish(channel, 1);
        self.settle(tx, result);
    }

    async fn process_batch(&self, channel: &str, batch: Vec<QueueEntry<P, R>>) {
        let size = batch.len();
        QueueCounters::add(&self.counters.batches_formed, 1);
        QueueCounters::add(&self.counters.batched_requests, size as u64);
        debug!(channel, size, "dispatching batch");

        let (payloads, senders): (Vec<P>, Vec<Settle<R>>) =
            batch.into_iter().map(|e| (e.payload, e.tx)).unzip();

        let processor = self.batch_processor.lock().clone();
        let result = match processor {
            None => Err(RelayError::config(format!(
                "no batch processor registered for channel '{channel}'"
            ))),
            Some(processor) => {
                let call = guarded(channel, async {
                    processor(channel.to_string(), payloads).await
                });
                tokio::select! {
                    _ = self.shutdown.cancelled() => Err(RelayError::shutdown("request queue")),
                    result = call => result,
                }
            }
        };

        self.state.lock().finish(channel, size);
        match result {
            Ok(results) if results.len() == size => {
                for (tx, value) in senders.into_iter().zip(results) {
                    self.settle(tx, Ok(value));
                }
            }
            Ok(results) => {
                let err = RelayError::provider(
                    channel,
                    format!(
                        "batch processor returned {} results for {} requests",
                        results.len(),
                        size
                    ),
                );
                warn!(channel, expected = size, got = results.len(), "batch result length mismatch");
                for tx in senders {
                    self.settle(tx, Err(err.clone()));
                }
            }
            Err(err) => {
                for tx in senders {
                    self.settle(tx, Err(err.clone()));
                }
            }
        }
    }
}

async fn run_channel<P, R>(shared: Arc<Shared<P, R>>, channel: String)
where
    P: Send + 'static,
    R: Send + 'static,
{
    let mut waited = false;

    loop {
        if shared.shutdown.is_cancelled() {
            break;
        }

        let batching =
            shared.config.enable_batching && shared.batch_processor.lock().is_some();
        let work = shared
            .state
            .lock()
            .next_work(&channel, &shared.config, batching, waited);

        match work {
            Work::Idle => break,
            Work::Wait => {
                waited = true;
                tokio::select! {
                    _ = shared.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(shared.config.batch_window) => {}
                }
            }
            Work::Single(entry) => {
                waited = false;
                shared.process_single(&channel, entry).await;
            }
            Work::Batch(batch) => {
                waited = false;
                shared.process_batch(&channel, batch).await;
            }
        }
    }

    debug!(channel = %channel, "channel dispatcher stopped");
}

/// Resolves once the queued request has been processed
#[derive(Debug)]
pub struct QueueHandle<R> {
    id: Uuid,
    rx: oneshot::Receiver<RelayResult<R>>,
}

impl<R> QueueHandle<R> {
    /// Id of the queued request
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl<R> Future for QueueHandle<R> {
    type Output = RelayResult<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|settled| settled.unwrap_or_else(|_| Err(RelayError::shutdown("request queue"))))
    }
}

/// Per-channel priority queue
///
/// Each channel (usually a provider id) has its own dispatcher task with at
/// most one processor call in flight. Requests are processed by the
/// processors registered with [`RequestQueue::set_request_processor`] and
/// [`RequestQueue::set_batch_processor`].
pub struct RequestQueue<P, R> {
    shared: Arc<Shared<P, R>>,
}

impl<P, R> RequestQueue<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Create a queue; processors are registered separately
    pub fn new(config: QueueConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(QueueState {
                    channels: HashMap::new(),
                    pending: 0,
                    destroyed: false,
                }),
                processor: Mutex::new(None),
                batch_processor: Mutex::new(None),
                counters: QueueCounters::default(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    /// Register the single-request processor
    pub fn set_request_processor<F, Fut>(&self, processor: F)
    where
        F: Fn(String, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RelayResult<R>> + Send + 'static,
    {
        let processor: RequestProcessor<P, R> =
            Arc::new(move |channel, payload| processor(channel, payload).boxed());
        *self.shared.processor.lock() = Some(processor);
    }

    /// Register the batch processor; batching also requires `enable_batching`
    pub fn set_batch_processor<F, Fut>(&self, processor: F)
    where
        F: Fn(String, Vec<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RelayResult<Vec<R>>> + Send + 'static,
    {
        let processor: BatchProcessor<P, R> =
            Arc::new(move |channel, payloads| processor(channel, payloads).boxed());
        *self.shared.batch_processor.lock() = Some(processor);
    }

    /// Queue a request on `channel`
    ///
    /// Fails immediately with `QUEUE_FULL` when the unsettled backlog is at
    /// `max_queue_size`. Must be called within a tokio runtime.
    pub fn enqueue(
        &self,
        channel: &str,
        payload: P,
        options: EnqueueOptions,
    ) -> RelayResult<QueueHandle<R>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| RelayError::config("request queue requires a tokio runtime"))?;

        let mut state = self.shared.state.lock();
        if state.destroyed {
            return Err(RelayError::shutdown("request queue"));
        }
        if state.pending >= self.shared.config.max_queue_size {
            QueueCounters::add(&self.shared.counters.rejected, 1);
            warn!(
                channel,
                capacity = self.shared.config.max_queue_size,
                "request queue full, rejecting"
            );
            return Err(RelayError::QueueFull {
                capacity: self.shared.config.max_queue_size,
            });
        }

        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let entry = QueueEntry {
            id,
            payload,
            batchable: options.batchable,
            batch_key: options.batch_key,
            enqueued_at: Instant::now(),
            tx,
        };

        state.pending += 1;
        let ch = state.channels.entry(channel.to_string()).or_default();
        ch.tiers[options.priority.tier()].push_back(entry);
        let spawn_dispatcher = !ch.dispatching;
        ch.dispatching = true;
        drop(state);

        QueueCounters::add(&self.shared.counters.enqueued, 1);
        if spawn_dispatcher {
            runtime.spawn(run_channel(Arc::clone(&self.shared), channel.to_string()));
        }

        Ok(QueueHandle { id, rx })
    }

    /// Unsettled requests across all channels
    pub fn pending(&self) -> usize {
        self.shared.state.lock().pending
    }

    pub fn stats(&self) -> QueueStats {
        let counters = &self.shared.counters;
        let state = self.shared.state.lock();
        QueueStats {
            enqueued: counters.enqueued.load(Ordering::Relaxed),
            processed: counters.processed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            batches_formed: counters.batches_formed.load(Ordering::Relaxed),
            batched_requests: counters.batched_requests.load(Ordering::Relaxed),
            pending: state.pending,
            pending_per_channel: state
                .channels
                .iter()
                .map(|(name, ch)| (name.clone(), ch.queued() + ch.in_flight))
                .filter(|(_, count)| *count > 0)
                .collect(),
        }
    }

    /// Fail every unsettled request, stop dispatchers and refuse new work
    pub fn destroy(&self) {
        self.shared.shutdown.cancel();

        let mut state = self.shared.state.lock();
        if state.destroyed {
            return;
        }
        state.destroyed = true;

        let mut failed = 0;
        for ch in state.channels.values_mut() {
            for tier in &mut ch.tiers {
                for entry in tier.drain(..) {
                    self.shared
                        .settle(entry.tx, Err(RelayError::shutdown("request queue")));
                    failed += 1;
                }
            }
        }
        state.pending = state.pending.saturating_sub(failed);
        info!(failed, "request queue destroyed");
    }
}
