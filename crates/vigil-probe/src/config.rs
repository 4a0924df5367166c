//! Configuration for the vigil-probe liveness engine.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ProbeError, Result};

/// Top-level probe configuration.
///
/// Loaded from the `vigil.toml` `[probe]` section or
/// `VIGIL_PROBE__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Path to the endpoint records file kept by the inventory.
    #[serde(default = "default_store_path")]
    pub store_path: String,

    /// Maximum identity groups probed at the same time.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_groups: usize,

    /// Pause between consecutive probes of the same identity, in milliseconds.
    #[serde(default = "default_pace_ms")]
    pub pace_ms: u64,

    /// Timeout applied to each TCP and each ICMP attempt, in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Periodic refresh interval in seconds.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// What a timer tick does while the previous refresh is still running.
    #[serde(default)]
    pub overlap: OverlapPolicy,

    /// Path to the system ping binary (default: "ping").
    #[serde(default = "default_ping_path")]
    pub ping_path: String,
}

/// Behavior when a refresh tick fires while a run is in flight.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Drop the tick and wait for the next one.
    #[default]
    Skip,
    /// Start another run alongside; runs share the scheduler's limiter.
    Concurrent,
}

impl ProbeConfig {
    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_groups == 0 {
            return Err(ProbeError::Config(
                "max_concurrent_groups must be at least 1".to_string(),
            ));
        }
        if self.interval_secs == 0 {
            return Err(ProbeError::Config(
                "interval_secs must be at least 1".to_string(),
            ));
        }
        if self.probe_timeout_ms == 0 {
            return Err(ProbeError::Config(
                "probe_timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_store_path() -> String {
    "./endpoints.json".to_string()
}

fn default_max_concurrent() -> usize {
    30
}

fn default_pace_ms() -> u64 {
    200
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_interval() -> u64 {
    60
}

fn default_ping_path() -> String {
    "ping".to_string()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            max_concurrent_groups: default_max_concurrent(),
            pace_ms: default_pace_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            interval_secs: default_interval(),
            overlap: OverlapPolicy::default(),
            ping_path: default_ping_path(),
        }
    }
}
