//! File-based configuration loading

use super::model::RelayConfig;
use crate::error::{RelayError, RelayResult};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Load configuration from a file
///
/// Supports JSON, TOML, and YAML formats based on file extension.
/// Returns the default config if the file doesn't exist. The loaded config
/// is validated before it is returned.
pub fn load_from_file(path: &Path) -> RelayResult<RelayConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(RelayConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        RelayError::config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let config: RelayConfig = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|e| {
            RelayError::config(format!(
                "Failed to parse TOML config '{}': {}",
                path.display(),
                e
            ))
        })?,
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
            RelayError::config(format!(
                "Failed to parse YAML config '{}': {}",
                path.display(),
                e
            ))
        })?,
        _ => serde_json::from_str(&content).map_err(|e| {
            RelayError::config(format!(
                "Failed to parse JSON config '{}': {}",
                path.display(),
                e
            ))
        })?,
    };

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EvictionStrategy;
    use crate::config::LogFormat;
    use crate::error::ErrorKind;
    use crate::recovery::BackoffStrategy;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_json_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("relay.json");
        let config_json = r#"{
            "pool": {
                "max_connections_per_host": 4,
                "pool_timeout": "2s"
            },
            "retry": {
                "openai": {
                    "max_retries": 5,
                    "base_delay": "250ms",
                    "strategy": "linear"
                }
            },
            "providers": [
                {"id": "openai", "base_url": "https://api.openai.com/v1"},
                {"id": "anthropic", "enabled": false}
            ],
            "fallback_chain": ["anthropic"],
            "logging": {"level": "debug", "format": "json"}
        }"#;
        fs::write(&config_path, config_json).unwrap();

        let config = load_from_file(&config_path).unwrap();
        assert_eq!(config.pool.max_connections_per_host, 4);
        assert_eq!(config.pool.pool_timeout, Duration::from_secs(2));
        assert_eq!(config.pool.max_total_connections, 50);

        let policy = config.retry_policy("openai");
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.strategy, BackoffStrategy::Linear);

        assert_eq!(config.providers.len(), 2);
        assert!(config.providers[0].enabled);
        assert!(!config.providers[1].enabled);
        assert_eq!(config.fallback_chain, vec!["anthropic"]);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("relay.toml");
        let config_toml = r#"
fallback_chain = ["anthropic", "google"]

[caches.response]
max_entries = 50
ttl = "5m"
eviction_strategy = "lfu"

[queue]
max_queue_size = 20
enable_batching = true
batch_window = "25ms"

[[providers]]
id = "anthropic"

[[providers]]
id = "google"
"#;
        fs::write(&config_path, config_toml).unwrap();

        let config = load_from_file(&config_path).unwrap();
        assert_eq!(config.caches.response.max_entries, 50);
        assert_eq!(config.caches.response.ttl, Duration::from_secs(300));
        assert_eq!(config.caches.response.eviction_strategy, EvictionStrategy::Lfu);
        assert_eq!(config.caches.token_count.max_entries, 10_000);
        assert_eq!(config.queue.max_queue_size, 20);
        assert!(config.queue.enable_batching);
        assert_eq!(config.queue.batch_window, Duration::from_millis(25));
        assert_eq!(config.providers.len(), 2);
    }

    #[test]
    fn test_load_from_yaml_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("relay.yaml");
        let config_yaml = r#"
health:
  failure_threshold: 5
  cooldown: 2m
providers:
  - id: ollama
    base_url: http://localhost:11434
fallback_chain: [ollama]
"#;
        fs::write(&config_path, config_yaml).unwrap();

        let config = load_from_file(&config_path).unwrap();
        assert_eq!(config.health.failure_threshold, 5);
        assert_eq!(config.health.cooldown, Duration::from_secs(120));
        assert_eq!(config.providers[0].id, "ollama");
    }

    #[test]
    fn test_missing_file_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_from_file(&temp_dir.path().join("missing.json")).unwrap();
        assert!(config.providers.is_empty());
        assert_eq!(config.queue.max_queue_size, 1000);
    }

    #[test]
    fn test_invalid_content_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("relay.json");
        fs::write(&config_path, "{ not json").unwrap();

        let err = load_from_file(&config_path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert!(err.to_string().contains("JSON"));
    }

    #[test]
    fn test_loaded_config_is_validated() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("relay.json");
        fs::write(&config_path, r#"{"queue": {"max_queue_size": 0}}"#).unwrap();

        assert!(load_from_file(&config_path).is_err());
    }
}
