//! Logging configuration

use serde::{Deserialize, Serialize};

/// Output format of the fmt subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (trace, debug, info, warn, error, or a full `EnvFilter` string)
    pub level: String,
    pub format: LogFormat,
    /// Whether to install a console subscriber at all
    pub log_to_console: bool,
    /// Include the event target (module path) in output
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            log_to_console: true,
            with_target: true,
        }
    }
}
