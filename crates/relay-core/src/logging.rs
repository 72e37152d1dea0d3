//! Tracing subscriber setup for binaries and tests

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{RelayError, RelayResult};
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber
///
/// `RUST_LOG` takes precedence over `config.level`. Fails if the level is not
/// a valid filter or a global subscriber is already installed; does nothing
/// when `log_to_console` is off.
pub fn init(config: &LoggingConfig) -> RelayResult<()> {
    if !config.log_to_console {
        return Ok(());
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            RelayError::config(format!("invalid log level '{}': {}", config.level, e))
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let installed = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| RelayError::config(format!("failed to install log subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_console_is_noop() {
        let config = LoggingConfig {
            log_to_console: false,
            ..Default::default()
        };
        assert!(init(&config).is_ok());
    }

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig {
            format: LogFormat::Compact,
            level: "warn".to_string(),
            ..Default::default()
        };
        let _ = init(&config);
        assert!(init(&config).is_err());
    }
}
