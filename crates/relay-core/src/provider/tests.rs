//! Tests for provider chains and fallback

use super::*;
use crate::error::{ErrorKind, RelayError};
use crate::recovery::{FixedJitter, RetryPolicy};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn manager_with(ids: &[&str]) -> Arc<ProviderManager> {
    let manager = Arc::new(ProviderManager::new());
    for id in ids {
        manager.register_provider(ProviderConfig::new(*id));
    }
    manager
}

fn executor(manager: Arc<ProviderManager>) -> FallbackExecutor {
    FallbackExecutor::new(manager).with_jitter_source(Arc::new(FixedJitter(0.0)))
}

#[test]
fn test_chain_primary_then_global() {
    let manager = manager_with(&["openai", "anthropic", "google"]);
    manager.set_fallback_chain(["anthropic", "google"]);

    let chain = manager.build_provider_chain(&RequestConfig::new("openai"));
    assert_eq!(chain, vec!["openai", "anthropic", "google"]);
}

#[test]
fn test_request_fallbacks_precede_global() {
    let manager = manager_with(&["openai", "anthropic", "google", "ollama"]);
    manager.set_fallback_chain(["anthropic", "google"]);

    let request = RequestConfig::new("openai").with_fallbacks(["ollama", "google"]);
    let chain = manager.build_provider_chain(&request);
    assert_eq!(chain, vec!["openai", "ollama", "google", "anthropic"]);
}

#[test]
fn test_chain_skips_unknown_disabled_and_duplicates() {
    let manager = manager_with(&["openai", "anthropic"]);
    manager.register_provider(ProviderConfig::new("google").with_enabled(false));
    manager.set_fallback_chain(["openai", "google", "mistral", "anthropic", "anthropic"]);

    let chain = manager.build_provider_chain(&RequestConfig::new("openai"));
    assert_eq!(chain, vec!["openai", "anthropic"]);

    let unique: HashSet<_> = chain.iter().collect();
    assert_eq!(unique.len(), chain.len());
}

#[test]
fn test_primary_kept_even_if_unregistered() {
    let manager = manager_with(&["anthropic"]);
    manager.set_fallback_chain(["anthropic"]);

    let chain = manager.build_provider_chain(&RequestConfig::new("custom"));
    assert_eq!(chain[0], "custom");
    assert_eq!(chain.len(), 2);
}

#[test]
fn test_reregister_replaces_config() {
    let manager = manager_with(&["openai", "anthropic"]);
    manager.set_fallback_chain(["anthropic"]);
    manager.register_provider(ProviderConfig::new("anthropic").with_enabled(false));

    assert!(manager.is_registered("anthropic"));
    assert!(!manager.is_available("anthropic"));
    assert_eq!(
        manager.build_provider_chain(&RequestConfig::new("openai")),
        vec!["openai"]
    );

    assert!(manager.unregister_provider("anthropic"));
    assert!(!manager.unregister_provider("anthropic"));
    assert_eq!(
        manager
            .providers()
            .iter()
            .map(|p| p.id.as_str())
            .collect::<Vec<_>>(),
        vec!["openai"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_falls_back_after_retries_exhausted() {
    let manager = manager_with(&["openai", "anthropic"]);
    manager.set_fallback_chain(["anthropic"]);
    let executor = executor(manager)
        .with_policy("openai", RetryPolicy::default().with_max_retries(1))
        .with_policy("anthropic", RetryPolicy::no_retry());

    let calls = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&calls);
    let outcome = executor
        .execute(&RequestConfig::new("openai"), "chat", |provider| {
            log.lock().push(provider.clone());
            async move {
                if provider == "openai" {
                    Err(RelayError::overloaded("busy"))
                } else {
                    Ok(format!("answer from {provider}"))
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(outcome.provider, "anthropic");
    assert_eq!(outcome.value, "answer from anthropic");
    assert_eq!(outcome.failed_providers, vec!["openai"]);
    assert_eq!(*calls.lock(), vec!["openai", "openai", "anthropic"]);

    let history = executor.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_provider, "openai");
    assert_eq!(history[0].to_provider.as_deref(), Some("anthropic"));
    assert_eq!(history[0].reason, ErrorKind::ModelOverloaded);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_error_falls_back_immediately() {
    let manager = manager_with(&["openai", "anthropic"]);
    manager.set_fallback_chain(["anthropic"]);
    let executor = executor(manager);

    let calls = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&calls);
    let outcome = executor
        .execute(&RequestConfig::new("openai"), "chat", |provider| {
            log.lock().push(provider.clone());
            async move {
                if provider == "openai" {
                    Err(RelayError::http(401, "invalid api key"))
                } else {
                    Ok(1)
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(outcome.provider, "anthropic");
    assert_eq!(*calls.lock(), vec!["openai", "anthropic"]);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_chain_reports_last_error() {
    let manager = manager_with(&["openai", "anthropic"]);
    manager.set_fallback_chain(["anthropic"]);
    let executor = executor(manager)
        .with_policy("openai", RetryPolicy::no_retry())
        .with_policy("anthropic", RetryPolicy::no_retry());

    let err = executor
        .execute(&RequestConfig::new("openai"), "chat", |_provider| async {
            Err::<(), _>(RelayError::http(503, "down"))
        })
        .await
        .unwrap_err();

    match &err {
        RelayError::ProvidersExhausted {
            attempted,
            last_error,
        } => {
            assert_eq!(attempted, &vec!["openai".to_string(), "anthropic".to_string()]);
            assert!(matches!(
                last_error.as_deref(),
                Some(RelayError::Http { status: 503, .. })
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);

    let history = executor.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].to_provider, None);
}

#[tokio::test(start_paused = true)]
async fn test_cooling_provider_is_skipped() {
    let manager = manager_with(&["openai", "anthropic"]);
    manager.set_fallback_chain(["anthropic"]);
    let executor = FallbackExecutor::with_health_config(
        manager,
        HealthConfig {
            failure_threshold: 1,
            cooldown: Duration::from_secs(30),
            max_history: 100,
        },
    )
    .with_jitter_source(Arc::new(FixedJitter(0.0)))
    .with_policy("openai", RetryPolicy::no_retry());

    let fail_openai = |provider: String| async move {
        if provider == "openai" {
            Err(RelayError::network("connection refused"))
        } else {
            Ok(provider)
        }
    };

    let first = executor
        .execute(&RequestConfig::new("openai"), "chat", fail_openai)
        .await
        .unwrap();
    assert_eq!(first.failed_providers, vec!["openai"]);
    assert!(!executor.is_available("openai"));

    let second = executor
        .execute(&RequestConfig::new("openai"), "chat", fail_openai)
        .await
        .unwrap();
    assert!(second.failed_providers.is_empty());
    assert_eq!(second.provider, "anthropic");

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(executor.is_available("openai"));
}

#[tokio::test(start_paused = true)]
async fn test_health_counters() {
    let manager = manager_with(&["openai"]);
    let executor = executor(manager);

    executor
        .execute(&RequestConfig::new("openai"), "chat", |_| async { Ok(()) })
        .await
        .unwrap();

    let health = executor.health("openai").unwrap();
    assert_eq!(health.total_requests, 1);
    assert_eq!(health.successful_requests, 1);
    assert_eq!(health.consecutive_failures, 0);
    assert_eq!(health.success_rate(), 1.0);

    executor.reset_health("openai");
    assert!(executor.health("openai").is_none());
}

#[test]
fn test_failure_counters() {
    let tracker = HealthTracker::new(HealthConfig::default());
    for _ in 0..5 {
        tracker.record_failure("openai");
    }
    let health = tracker.health("openai").unwrap();
    assert_eq!(health.consecutive_failures, 5);
    assert_eq!(health.success_rate(), 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_history_is_bounded() {
    let manager = manager_with(&["openai"]);
    let executor = FallbackExecutor::with_health_config(
        manager,
        HealthConfig {
            max_history: 2,
            ..Default::default()
        },
    )
    .with_policy("openai", RetryPolicy::no_retry());

    for _ in 0..3 {
        let result = executor
            .execute(&RequestConfig::new("openai"), "chat", |_| async {
                Err::<(), _>(RelayError::http(400, "bad request"))
            })
            .await;
        assert!(result.is_err());
    }

    assert_eq!(executor.history().len(), 2);
}

#[test]
fn test_policy_overrides_and_presets() {
    let executor = FallbackExecutor::new(manager_with(&["ollama"]))
        .with_policy("openai", RetryPolicy::no_retry());

    assert_eq!(executor.policy_for("openai").max_retries, 0);
    assert_eq!(
        executor.policy_for("ollama").max_delay,
        Duration::from_secs(5)
    );
}
