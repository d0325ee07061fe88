use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Basic (process-level) configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasicConfig {
    /// Log level for tracing subscriber initialization (e.g., "error", "warn", "info", "debug", "trace").
    /// TOML: `basic.loglevel`. Default: `info`.
    #[serde(default = "default_loglevel")]
    pub loglevel: String,

    /// JSON file backing the process-global property store (also the identity cache).
    /// TOML: `basic.global_properties_path`. Default: unset (in-memory only).
    #[serde(default)]
    pub global_properties_path: Option<PathBuf>,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            loglevel: default_loglevel(),
            global_properties_path: None,
        }
    }
}

fn default_loglevel() -> String {
    "info".to_string()
}
