//! Configuration
//!
//! [`RelayConfig`] gathers every component's settings and can be loaded from
//! JSON, TOML or YAML. Durations are humantime strings such as `"30s"`.

mod file_loader;
mod logging_config;
mod model;

pub use file_loader::load_from_file;
pub use logging_config::{LogFormat, LoggingConfig};
pub use model::{CachesConfig, RelayConfig};
