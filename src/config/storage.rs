use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Device history persistence and ageing
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Archive devices into history when they are aged out
    #[serde(default = "default_archive_on_purge")]
    pub archive_on_purge: bool,

    /// Devices idle for longer than this are purged
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            archive_on_purge: default_archive_on_purge(),
            idle_timeout_secs: default_idle_timeout_secs(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(invalid("storage.db_path cannot be empty"));
        }
        if self.purge_interval_secs == 0 {
            return Err(invalid("storage.purge_interval_secs must be greater than 0"));
        }
        Ok(())
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./db")
}

fn default_archive_on_purge() -> bool {
    true
}

fn default_idle_timeout_secs() -> u64 {
    3600
}

fn default_purge_interval_secs() -> u64 {
    60
}
