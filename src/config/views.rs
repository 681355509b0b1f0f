use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// View locking and default-view policy
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ViewsConfig {
    /// How long a view operation waits for its lock before failing
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Upper bound for the `length` of one paginated request
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Signal threshold (dBm, exclusive) of the built-in `strong` view
    #[serde(default = "default_strong_signal_dbm")]
    pub strong_signal_dbm: i32,

    /// A `phy-<name>` view is registered for each entry
    #[serde(default = "default_phys")]
    pub default_phys: Vec<String>,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            max_page_size: default_max_page_size(),
            strong_signal_dbm: default_strong_signal_dbm(),
            default_phys: default_phys(),
        }
    }
}

impl ViewsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout_ms == 0 {
            return Err(invalid("views.lock_timeout_ms must be greater than 0"));
        }
        if self.max_page_size == 0 {
            return Err(invalid("views.max_page_size must be greater than 0"));
        }
        if !(-120..=0).contains(&self.strong_signal_dbm) {
            return Err(invalid(format!(
                "views.strong_signal_dbm {} outside of -120..=0",
                self.strong_signal_dbm
            )));
        }
        if self.default_phys.iter().any(|p| p.trim().is_empty()) {
            return Err(invalid("views.default_phys cannot contain empty names"));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

fn default_lock_timeout_ms() -> u64 {
    500
}

fn default_max_page_size() -> usize {
    500
}

fn default_strong_signal_dbm() -> i32 {
    -60
}

fn default_phys() -> Vec<String> {
    vec!["IEEE802.11".to_string(), "Bluetooth".to_string()]
}
