use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Connection registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// Age after which a per-database property cache is flushed and reloaded on access.
    /// TOML: `registry.property_sync_interval_ms`. Default: `600000`.
    #[serde(default = "default_property_sync_interval_ms")]
    pub property_sync_interval_ms: u64,

    /// SQLite busy timeout applied to every connection.
    /// TOML: `registry.busy_timeout_secs`. Default: `5`.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,

    /// Directory scanned for new files each time a database is opened.
    /// TOML: `registry.auto_import_dir`. Default: unset (no scan).
    #[serde(default)]
    pub auto_import_dir: Option<PathBuf>,
}

impl RegistryConfig {
    pub fn property_sync_interval(&self) -> Duration {
        Duration::from_millis(self.property_sync_interval_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            property_sync_interval_ms: default_property_sync_interval_ms(),
            busy_timeout_secs: default_busy_timeout_secs(),
            auto_import_dir: None,
        }
    }
}

fn default_property_sync_interval_ms() -> u64 {
    600_000
}

fn default_busy_timeout_secs() -> u64 {
    5
}
