//! golbroker configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::coordinator::CoordinatorConfig;

/// Main configuration, one section per role
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Broker process settings
    pub broker: BrokerConfig,

    /// Worker process settings
    pub worker: WorkerConfig,

    /// Distributor settings for `gb run`
    pub run: RunConfig,

    /// Turn loop tuning, used by the broker and by local runs
    pub coordinator: CoordinatorConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::candidates() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Never fails: a missing or broken config file just yields `None`.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let paths = match config_path {
            Some(path) => vec![path.clone()],
            None => Self::candidates(),
        };
        paths
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(p).ok())
            .and_then(|config| config.log_level)
    }

    /// Project-local `.golbroker.yml`, then `~/.config/golbroker/golbroker.yml`
    fn candidates() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".golbroker.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("golbroker").join("golbroker.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Broker process settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Address the broker listens on
    pub listen: String,

    /// How long a subscribing worker gets to answer the reachability ping
    #[serde(rename = "subscribe-timeout-ms")]
    pub subscribe_timeout_ms: u64,

    /// Connect and write timeout towards workers
    #[serde(rename = "worker-io-timeout-ms")]
    pub worker_io_timeout_ms: u64,

    /// Longest wait for a worker to return a band
    #[serde(rename = "worker-response-timeout-ms")]
    pub worker_response_timeout_ms: u64,

    /// Append run events (without cell flips) to this JSONL file
    #[serde(rename = "event-log")]
    pub event_log: Option<PathBuf>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8030".to_string(),
            subscribe_timeout_ms: 2000,
            worker_io_timeout_ms: 5000,
            worker_response_timeout_ms: 30_000,
            event_log: None,
        }
    }
}

impl BrokerConfig {
    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_millis(self.subscribe_timeout_ms)
    }

    pub fn worker_io_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_io_timeout_ms)
    }

    pub fn worker_response_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_response_timeout_ms)
    }
}

/// Worker process settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Address the worker listens on
    pub listen: String,

    /// Broker to subscribe to
    pub broker: String,

    /// Address the broker should dial, when it differs from `listen`
    pub advertise: Option<String>,

    /// Timeout for requests to the broker
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8040".to_string(),
            broker: "127.0.0.1:8030".to_string(),
            advertise: None,
            timeout_ms: 5000,
        }
    }
}

impl WorkerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Distributor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Broker to run on
    pub broker: String,

    /// Always run in-process
    #[serde(rename = "broker-disabled")]
    pub broker_disabled: bool,

    /// Turns to run
    pub turns: u64,

    /// In-process lanes for local runs
    pub threads: usize,

    #[serde(rename = "image-width")]
    pub image_width: usize,

    #[serde(rename = "image-height")]
    pub image_height: usize,

    /// Directory holding input images
    #[serde(rename = "images-dir")]
    pub images_dir: PathBuf,

    /// Directory output images are written to
    #[serde(rename = "out-dir")]
    pub out_dir: PathBuf,

    /// How often the live cell count is reported
    #[serde(rename = "alive-report-interval-ms")]
    pub alive_report_interval_ms: u64,

    /// How long the broker gets to answer the initial ping
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,

    /// Append run events to this JSONL file
    #[serde(rename = "event-log")]
    pub event_log: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            broker: "127.0.0.1:8030".to_string(),
            broker_disabled: false,
            turns: 100,
            threads: 8,
            image_width: 512,
            image_height: 512,
            images_dir: PathBuf::from("images"),
            out_dir: PathBuf::from("out"),
            alive_report_interval_ms: 2000,
            connect_timeout_ms: 2000,
            event_log: None,
        }
    }
}

impl RunConfig {
    pub fn alive_report_interval(&self) -> Duration {
        Duration::from_millis(self.alive_report_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
