//! Configuration management for the device tracker.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Section-wise validation
mod http;
mod monitoring;
mod storage;
mod views;
pub use http::*;
pub use monitoring::*;
pub use storage::*;
pub use views::*;
#[cfg(test)]
mod config_test;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable prefix, e.g. `DEVTRACKER__HTTP__PORT=2502`
pub const ENV_PREFIX: &str = "DEVTRACKER";

/// Main configuration container for the device tracker
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct DevtrackerConfig {
    /// HTTP endpoint binding
    pub http: HttpConfig,
    /// View locking, paging and default view policies
    pub views: ViewsConfig,
    /// Device history persistence
    pub storage: StorageConfig,
    /// Prometheus exporter
    pub monitoring: MonitoringConfig,
}

impl Debug for DevtrackerConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("DevtrackerConfig")
            .field("http", &self.http)
            .field("views", &self.views)
            .finish_non_exhaustive()
    }
}

impl DevtrackerConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `DEVTRACKER__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so further overrides can be applied via
    /// `with_override_config()`. Callers MUST call `validate()` before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/devtracker.toml");
    /// std::env::set_var("DEVTRACKER__VIEWS__LOCK_TIMEOUT_MS", "250");
    /// let cfg = DevtrackerConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.http.validate()?;
        self.views.validate()?;
        self.storage.validate()?;
        self.monitoring.validate()?;
        Ok(self)
    }
}

pub(super) fn invalid(message: impl Into<String>) -> crate::Error {
    crate::Error::Config(config::ConfigError::Message(message.into()))
}
