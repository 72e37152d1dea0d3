//! Per-host connection pool with FIFO waiters

use super::types::{Connection, HostStats, PoolConfig, PoolStats};
use crate::error::{RelayError, RelayResult};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

type Grant = oneshot::Sender<RelayResult<Connection>>;

struct Waiter {
    id: u64,
    tx: Grant,
}

#[derive(Default)]
struct HostBucket {
    /// Most recently released last
    idle: Vec<Connection>,
    active: HashMap<Uuid, Connection>,
    waiters: VecDeque<Waiter>,
}

impl HostBucket {
    fn connections(&self) -> usize {
        self.idle.len() + self.active.len()
    }

    fn is_unused(&self) -> bool {
        self.idle.is_empty() && self.active.is_empty() && self.waiters.is_empty()
    }
}

#[derive(Default)]
struct PoolState {
    hosts: HashMap<String, HostBucket>,
    total: usize,
    destroyed: bool,
    next_waiter_id: u64,
    total_requests: u64,
    reused: u64,
    created: u64,
    closed: u64,
}

impl PoolState {
    /// Activate an idle or new connection for `host` if limits allow
    ///
    /// The flag is true for a reused connection. Request counters are left
    /// to the caller, which knows whether the connection reached anyone.
    fn try_acquire(&mut self, host: &str, config: &PoolConfig) -> Option<(Connection, bool)> {
        let now = Instant::now();
        let bucket = self.hosts.entry(host.to_string()).or_default();

        if let Some(mut conn) = bucket.idle.pop() {
            conn.is_active = true;
            conn.last_used_at = now;
            bucket.active.insert(conn.id, conn.clone());
            debug!(host, id = %conn.id, "reusing idle connection");
            return Some((conn, true));
        }

        if bucket.connections() >= config.max_connections_per_host {
            return None;
        }
        if self.total >= config.max_total_connections && !self.evict_idle_elsewhere(host) {
            return None;
        }

        let conn = Connection::new(host, config.connection_timeout);
        self.hosts
            .entry(host.to_string())
            .or_default()
            .active
            .insert(conn.id, conn.clone());
        self.total += 1;
        self.created += 1;
        debug!(host, id = %conn.id, total = self.total, "created connection");
        Some((conn, false))
    }

    fn record_handout(&mut self, reused: bool) {
        self.total_requests += 1;
        if reused {
            self.reused += 1;
        }
    }

    /// Close the longest-idle connection of another host to free a global slot
    fn evict_idle_elsewhere(&mut self, host: &str) -> bool {
        let victim = self
            .hosts
            .iter()
            .filter(|(key, _)| key.as_str() != host)
            .flat_map(|(key, bucket)| {
                bucket
                    .idle
                    .iter()
                    .enumerate()
                    .map(move |(index, conn)| (key.clone(), index, conn.last_used_at))
            })
            .min_by_key(|(_, _, last_used)| *last_used);

        let Some((key, index, _)) = victim else {
            return false;
        };
        if let Some(bucket) = self.hosts.get_mut(&key) {
            let conn = bucket.idle.remove(index);
            debug!(host = %key, id = %conn.id, "closed idle connection to make room");
        }
        self.total -= 1;
        self.closed += 1;
        true
    }

    fn push_waiter(&mut self, host: &str, tx: Grant) -> u64 {
        let id = self.next_waiter_id;
        self.next_waiter_id += 1;
        self.hosts
            .entry(host.to_string())
            .or_default()
            .waiters
            .push_back(Waiter { id, tx });
        id
    }

    fn remove_waiter(&mut self, host: &str, id: u64) -> bool {
        let Some(bucket) = self.hosts.get_mut(host) else {
            return false;
        };
        let before = bucket.waiters.len();
        bucket.waiters.retain(|w| w.id != id);
        before != bucket.waiters.len()
    }

    /// Grant connections to waiters, oldest first per host, while limits allow
    fn serve_waiters(&mut self, config: &PoolConfig) {
        let hosts: Vec<String> = self
            .hosts
            .iter()
            .filter(|(_, bucket)| !bucket.waiters.is_empty())
            .map(|(host, _)| host.clone())
            .collect();

        for host in hosts {
            loop {
                let has_waiter = self
                    .hosts
                    .get(&host)
                    .is_some_and(|bucket| !bucket.waiters.is_empty());
                if !has_waiter {
                    break;
                }
                let Some((conn, reused)) = self.try_acquire(&host, config) else {
                    break;
                };
                self.grant(&host, conn, reused);
            }
        }
    }

    /// Send an active connection to the oldest live waiter, or park it idle
    fn grant(&mut self, host: &str, mut conn: Connection, reused: bool) {
        let Some(bucket) = self.hosts.get_mut(host) else {
            return;
        };
        let delivered = loop {
            let Some(waiter) = bucket.waiters.pop_front() else {
                bucket.active.remove(&conn.id);
                conn.is_active = false;
                bucket.idle.push(conn);
                break false;
            };
            match waiter.tx.send(Ok(conn)) {
                Ok(()) => break true,
                // Receiver gave up; try the next waiter with the same connection
                Err(Ok(back)) => conn = back,
                Err(Err(_)) => break false,
            }
        };
        if delivered {
            self.record_handout(reused);
        }
    }

    /// Move an active connection back to the pool, serving waiters first
    fn release(&mut self, host: &str, id: Uuid, config: &PoolConfig, completed: bool) {
        let Some(mut released) = self
            .hosts
            .get_mut(host)
            .and_then(|bucket| bucket.active.remove(&id))
        else {
            debug!(host, id = %id, "release of unknown connection ignored");
            return;
        };

        released.last_used_at = Instant::now();
        if completed {
            released.request_count += 1;
        }

        if let Some(bucket) = self.hosts.get_mut(host) {
            if bucket.waiters.is_empty() {
                released.is_active = false;
                bucket.idle.push(released);
            } else {
                released.is_active = true;
                bucket.active.insert(released.id, released.clone());
                debug!(host, id = %released.id, "handing released connection to waiter");
                self.grant(host, released, true);
            }
        }

        self.serve_waiters(config);
        self.remove_unused_buckets();
    }

    fn remove_unused_buckets(&mut self) {
        self.hosts.retain(|_, bucket| !bucket.is_unused());
    }
}

/// A queued `get_connection` call
///
/// Dropping it before it settles removes the waiter, and returns a
/// connection that was granted but never received.
struct PendingWaiter<'a> {
    state: &'a Mutex<PoolState>,
    config: &'a PoolConfig,
    host: String,
    id: u64,
    rx: oneshot::Receiver<RelayResult<Connection>>,
    settled: bool,
}

impl Drop for PendingWaiter<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.state.lock();
        if !state.remove_waiter(&self.host, self.id) {
            if let Ok(Ok(conn)) = self.rx.try_recv() {
                state.release(&conn.host, conn.id, self.config, false);
            }
        }
        state.remove_unused_buckets();
        debug!(host = %self.host, waiter = self.id, "abandoned wait for a connection");
    }
}

/// Pool of logical connections keyed by scheme and authority
///
/// When constructed inside a tokio runtime, a background task closes
/// connections idle longer than `keep_alive_timeout`, checking every
/// `keep_alive_timeout / 2`.
pub struct ConnectionPool {
    config: PoolConfig,
    state: Arc<Mutex<PoolState>>,
    sweeper: Mutex<Option<CancellationToken>>,
}

impl ConnectionPool {
    /// Create a pool, starting the idle sweep when a runtime is available
    pub fn new(config: PoolConfig) -> Self {
        let pool = Self {
            config,
            state: Arc::new(Mutex::new(PoolState::default())),
            sweeper: Mutex::new(None),
        };
        if tokio::runtime::Handle::try_current().is_ok() {
            pool.start_sweeper();
        }
        pool
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Get a connection for the host of `url`, waiting up to `pool_timeout`
    pub async fn get_connection(&self, url: &str) -> RelayResult<Connection> {
        let host = host_key(url)?;

        let mut waiter = {
            let mut state = self.state.lock();
            if state.destroyed {
                return Err(RelayError::shutdown("connection pool"));
            }
            if let Some((conn, reused)) = state.try_acquire(&host, &self.config) {
                state.record_handout(reused);
                return Ok(conn);
            }
            let (tx, rx) = oneshot::channel();
            let id = state.push_waiter(&host, tx);
            debug!(host = %host, waiter = id, "waiting for a connection");
            PendingWaiter {
                state: &self.state,
                config: &self.config,
                host,
                id,
                rx,
                settled: false,
            }
        };

        let outcome = tokio::time::timeout(self.config.pool_timeout, &mut waiter.rx).await;
        waiter.settled = true;
        match outcome {
            Ok(Ok(granted)) => granted,
            Ok(Err(_)) => Err(RelayError::shutdown("connection pool")),
            Err(_) => {
                let mut state = self.state.lock();
                if state.remove_waiter(&waiter.host, waiter.id) {
                    state.remove_unused_buckets();
                    debug!(
                        host = %waiter.host,
                        waiter = waiter.id,
                        "timed out waiting for a connection"
                    );
                    return Err(RelayError::PoolTimeout {
                        host: waiter.host.clone(),
                        waited: self.config.pool_timeout,
                    });
                }
                // Granted while the timer fired; the send happened under the lock
                waiter
                    .rx
                    .try_recv()
                    .unwrap_or_else(|_| Err(RelayError::shutdown("connection pool")))
            }
        }
    }

    /// Return a connection for reuse
    ///
    /// The oldest waiter for the same host receives it immediately; otherwise
    /// it is parked idle.
    pub fn release_connection(&self, conn: &Connection) {
        let mut state = self.state.lock();
        if state.destroyed {
            return;
        }
        state.release(&conn.host, conn.id, &self.config, true);
    }

    /// Stop tracking a connection, freeing its slot
    pub fn close_connection(&self, conn: &Connection) {
        let mut state = self.state.lock();
        if state.destroyed {
            return;
        }
        let removed = state.hosts.get_mut(&conn.host).is_some_and(|bucket| {
            if bucket.active.remove(&conn.id).is_some() {
                return true;
            }
            let before = bucket.idle.len();
            bucket.idle.retain(|c| c.id != conn.id);
            before != bucket.idle.len()
        });
        if !removed {
            return;
        }

        state.total -= 1;
        state.closed += 1;
        debug!(host = %conn.host, id = %conn.id, "closed connection");
        state.serve_waiters(&self.config);
        state.remove_unused_buckets();
    }

    /// Close idle connections past the keep-alive timeout, returning how many
    pub fn close_idle(&self) -> usize {
        sweep_idle(&self.state, &self.config)
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        let mut stats = PoolStats {
            total_requests: state.total_requests,
            connections_reused: state.reused,
            connections_created: state.created,
            connections_closed: state.closed,
            ..Default::default()
        };
        for (host, bucket) in &state.hosts {
            let host_stats = HostStats {
                active: bucket.active.len(),
                idle: bucket.idle.len(),
                waiting: bucket.waiters.len(),
            };
            stats.active_connections += host_stats.active;
            stats.idle_connections += host_stats.idle;
            stats.pending_requests += host_stats.waiting;
            stats.hosts.insert(host.clone(), host_stats);
        }
        stats
    }

    /// Start the idle sweep; no-op if already running
    pub fn start_sweeper(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let child = token.clone();
        let state = Arc::clone(&self.state);
        let config = self.config.clone();
        let period = config.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        sweep_idle(&state, &config);
                    }
                }
            }
            debug!("connection pool sweeper stopped");
        });

        *sweeper = Some(token);
    }

    /// Close everything, fail all waiters and stop the sweep
    pub fn destroy(&self) {
        if let Some(token) = self.sweeper.lock().take() {
            token.cancel();
        }

        let mut state = self.state.lock();
        if state.destroyed {
            return;
        }
        state.destroyed = true;

        let mut rejected = 0;
        for (_, bucket) in state.hosts.drain() {
            for waiter in bucket.waiters {
                let _ = waiter.tx.send(Err(RelayError::shutdown("connection pool")));
                rejected += 1;
            }
        }
        let closed = state.total;
        state.closed += closed as u64;
        state.total = 0;
        info!(closed, rejected, "connection pool destroyed");
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        if let Some(token) = self.sweeper.lock().take() {
            token.cancel();
        }
    }
}

fn sweep_idle(state: &Mutex<PoolState>, config: &PoolConfig) -> usize {
    let now = Instant::now();
    let mut state = state.lock();
    if state.destroyed {
        return 0;
    }

    let mut removed = 0;
    for bucket in state.hosts.values_mut() {
        let before = bucket.idle.len();
        bucket
            .idle
            .retain(|conn| conn.idle_for(now) <= config.keep_alive_timeout);
        removed += before - bucket.idle.len();
    }

    if removed > 0 {
        state.total -= removed;
        state.closed += removed as u64;
        state.remove_unused_buckets();
        state.serve_waiters(config);
        debug!(removed, "closed idle connections");
    }
    removed
}

/// Pool bucket key for a URL: scheme plus authority, default port elided
pub fn host_key(url: &str) -> RelayResult<String> {
    let parsed =
        Url::parse(url).map_err(|e| RelayError::config(format!("invalid URL '{url}': {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| RelayError::config(format!("URL '{url}' has no host")))?;

    Ok(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}
