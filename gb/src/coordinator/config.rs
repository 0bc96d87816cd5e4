//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoordinatorConfig {
    /// Channel buffer size for coordinator requests
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Longest wait for one band result before the endpoint counts as failed
    #[serde(default = "default_band_timeout_ms")]
    pub band_timeout_ms: u64,

    /// Other live workers to try before giving up on a failed band
    #[serde(default = "default_max_redispatch")]
    pub max_redispatch: usize,

    /// Compute a band in-process when no worker could
    #[serde(default = "default_local_fallback")]
    pub local_fallback: bool,
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    256
}

fn default_band_timeout_ms() -> u64 {
    debug!("default_band_timeout_ms: called");
    30_000
}

fn default_max_redispatch() -> usize {
    debug!("default_max_redispatch: called");
    2
}

fn default_local_fallback() -> bool {
    debug!("default_local_fallback: called");
    true
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            channel_buffer: default_channel_buffer(),
            band_timeout_ms: default_band_timeout_ms(),
            max_redispatch: default_max_redispatch(),
            local_fallback: default_local_fallback(),
        }
    }
}

impl CoordinatorConfig {
    /// Band timeout as a Duration
    pub fn band_timeout(&self) -> Duration {
        debug!(band_timeout_ms = %self.band_timeout_ms, "CoordinatorConfig::band_timeout: called");
        Duration::from_millis(self.band_timeout_ms)
    }
}
