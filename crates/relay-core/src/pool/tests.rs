//! Tests for the connection pool

use super::*;
use crate::error::{ErrorKind, RelayError};
use std::sync::Arc;
use std::time::Duration;

fn pool(per_host: usize, total: usize) -> Arc<ConnectionPool> {
    Arc::new(ConnectionPool::new(
        PoolConfig::default()
            .with_max_connections_per_host(per_host)
            .with_max_total_connections(total)
            .with_pool_timeout(Duration::from_secs(5)),
    ))
}

async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}

#[test]
fn test_host_key_elides_default_port() {
    assert_eq!(host_key("https://a.com").unwrap(), "https://a.com");
    assert_eq!(host_key("https://a.com:443/v1/chat").unwrap(), "https://a.com");
    assert_eq!(host_key("http://localhost:11434/api").unwrap(), "http://localhost:11434");
    assert_ne!(
        host_key("http://a.com").unwrap(),
        host_key("https://a.com").unwrap()
    );
}

#[tokio::test]
async fn test_invalid_url_is_config_error() {
    let pool = pool(1, 1);
    let err = pool.get_connection("not a url").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
}

#[tokio::test(start_paused = true)]
async fn test_release_then_reuse() {
    let pool = pool(2, 10);

    let first = pool.get_connection("https://a.com").await.unwrap();
    assert!(first.is_active);
    pool.release_connection(&first);

    let second = pool.get_connection("https://a.com:443").await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.request_count, 1);

    let stats = pool.stats();
    assert_eq!(stats.connections_created, 1);
    assert_eq!(stats.connections_reused, 1);
    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.active_connections, 1);
    assert_eq!(stats.idle_connections, 0);
}

#[tokio::test(start_paused = true)]
async fn test_waiter_resolved_only_after_release() {
    let pool = pool(1, 10);
    let held = pool.get_connection("https://a.com").await.unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.get_connection("https://a.com").await })
    };
    settle().await;

    assert!(!waiter.is_finished());
    assert_eq!(pool.stats().pending_requests, 1);

    pool.release_connection(&held);
    let granted = waiter.await.unwrap().unwrap();

    assert_eq!(granted.id, held.id);
    assert!(granted.is_active);
    let stats = pool.stats();
    assert_eq!(stats.pending_requests, 0);
    assert_eq!(stats.connections_created, 1);
}

#[tokio::test(start_paused = true)]
async fn test_waiters_are_served_fifo() {
    let pool = pool(1, 10);
    let held = pool.get_connection("https://a.com").await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    for label in ["first", "second"] {
        let pool = Arc::clone(&pool);
        let tx = tx.clone();
        tokio::spawn(async move {
            let conn = pool.get_connection("https://a.com").await.unwrap();
            tx.send(label).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            pool.release_connection(&conn);
        });
        settle().await;
    }

    pool.release_connection(&held);
    assert_eq!(rx.recv().await, Some("first"));
    assert_eq!(rx.recv().await, Some("second"));
}

#[tokio::test(start_paused = true)]
async fn test_pool_timeout_removes_waiter() {
    let pool = Arc::new(ConnectionPool::new(
        PoolConfig::default()
            .with_max_connections_per_host(1)
            .with_pool_timeout(Duration::from_millis(100)),
    ));
    let _held = pool.get_connection("https://a.com").await.unwrap();

    let err = pool.get_connection("https://a.com").await.unwrap_err();
    assert!(matches!(err, RelayError::PoolTimeout { .. }));
    assert_eq!(err.kind(), ErrorKind::PoolTimeout);
    assert_eq!(pool.stats().pending_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_frees_slot_for_waiter() {
    let pool = pool(1, 10);
    let held = pool.get_connection("https://a.com").await.unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.get_connection("https://a.com").await })
    };
    settle().await;

    pool.close_connection(&held);
    let granted = waiter.await.unwrap().unwrap();

    assert_ne!(granted.id, held.id);
    let stats = pool.stats();
    assert_eq!(stats.connections_created, 2);
    assert_eq!(stats.connections_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_total_limit_across_hosts() {
    let pool = pool(5, 2);
    let a = pool.get_connection("https://a.com").await.unwrap();
    let _b = pool.get_connection("https://b.com").await.unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.get_connection("https://c.com").await })
    };
    settle().await;
    assert!(!waiter.is_finished());

    // Released connection for a.com goes idle, then makes room for c.com
    pool.release_connection(&a);
    let c = waiter.await.unwrap().unwrap();
    assert_eq!(c.host, "https://c.com");

    let stats = pool.stats();
    assert_eq!(stats.total_connections(), 2);
    assert!(!stats.hosts.contains_key("https://a.com"));
}

#[tokio::test(start_paused = true)]
async fn test_limits_never_exceeded_under_load() {
    let pool = pool(2, 3);
    let mut handles = Vec::new();

    for i in 0..12 {
        let pool = Arc::clone(&pool);
        let url = if i % 2 == 0 { "https://a.com" } else { "https://b.com" };
        handles.push(tokio::spawn(async move {
            let conn = pool.get_connection(url).await?;
            let stats = pool.stats();
            assert!(stats.total_connections() <= 3);
            assert!(stats.hosts.values().all(|h| h.active + h.idle <= 2));
            tokio::time::sleep(Duration::from_millis(20)).await;
            pool.release_connection(&conn);
            Ok::<_, RelayError>(())
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    let stats = pool.stats();
    assert_eq!(stats.total_requests, 12);
    assert_eq!(stats.pending_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_closes_stale_idle_connections() {
    let pool = Arc::new(ConnectionPool::new(
        PoolConfig::default().with_keep_alive_timeout(Duration::from_secs(2)),
    ));
    let conn = pool.get_connection("https://a.com").await.unwrap();
    pool.release_connection(&conn);
    assert_eq!(pool.stats().idle_connections, 1);

    for _ in 0..5 {
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
    }

    let stats = pool.stats();
    assert_eq!(stats.idle_connections, 0);
    assert_eq!(stats.connections_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_idle_keeps_fresh_connections() {
    let pool = pool(2, 10);
    let conn = pool.get_connection("https://a.com").await.unwrap();
    pool.release_connection(&conn);

    assert_eq!(pool.close_idle(), 0);
    assert_eq!(pool.stats().idle_connections, 1);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_rejects_waiters_and_later_calls() {
    let pool = pool(1, 10);
    let _held = pool.get_connection("https://a.com").await.unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.get_connection("https://a.com").await })
    };
    settle().await;

    pool.destroy();
    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, RelayError::Shutdown { .. }));

    assert!(pool.get_connection("https://a.com").await.is_err());
    assert_eq!(pool.stats().total_connections(), 0);
}

#[test]
fn test_construction_outside_runtime() {
    let pool = ConnectionPool::new(PoolConfig::default());
    assert_eq!(pool.stats().total_connections(), 0);
    pool.destroy();
}

#[test]
fn test_config_validation() {
    assert!(PoolConfig::default().validate().is_ok());
    assert!(
        PoolConfig::default()
            .with_max_connections_per_host(0)
            .validate()
            .is_err()
    );
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_waiter_is_removed() {
    let pool = pool(1, 10);
    let held = pool.get_connection("https://a.com").await.unwrap();

    let gave_up =
        tokio::time::timeout(Duration::from_millis(10), pool.get_connection("https://a.com"))
            .await;
    assert!(gave_up.is_err());
    assert_eq!(pool.stats().pending_requests, 0);

    pool.release_connection(&held);
    let stats = pool.stats();
    assert_eq!(stats.connections_reused, 0);
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.idle_connections, 1);
    assert_eq!(stats.active_connections, 0);
}

#[tokio::test(start_paused = true)]
async fn test_granted_but_unreceived_connection_returns_to_pool() {
    let pool = pool(1, 10);
    let held = pool.get_connection("https://a.com").await.unwrap();

    let mut waiting = Box::pin(pool.get_connection("https://a.com"));
    assert!(futures::poll!(waiting.as_mut()).is_pending());

    // Granted under the lock, then dropped before the caller polls again
    pool.release_connection(&held);
    drop(waiting);

    let stats = pool.stats();
    assert_eq!(stats.pending_requests, 0);
    assert_eq!(stats.active_connections, 0);
    assert_eq!(stats.idle_connections, 1);

    let again = pool.get_connection("https://a.com").await.unwrap();
    assert_eq!(again.id, held.id);
}
