use serde::{Deserialize, Serialize};
use std::time::Duration;
use studydb_admission::{MAX_LOAD, MAX_WAIT_TIME};

/// Admission gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdmissionConfig {
    /// Ceiling on the summed load of running tasks.
    /// TOML: `admission.max_load`. Default: `1.001`.
    #[serde(default = "default_max_load")]
    pub max_load: f64,

    /// A waiting task that has not polled for this long is evicted.
    /// TOML: `admission.max_wait_ms`. Default: `2000`.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// Poll period used by `AdmissionHandle::wait_for_start`.
    /// TOML: `admission.poll_interval_ms`. Default: `250`.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl AdmissionConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_load: default_max_load(),
            max_wait_ms: default_max_wait_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_max_load() -> f64 {
    MAX_LOAD
}

fn default_max_wait_ms() -> u64 {
    u64::try_from(MAX_WAIT_TIME.as_millis()).unwrap_or(2000)
}

fn default_poll_interval_ms() -> u64 {
    250
}
