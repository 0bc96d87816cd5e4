//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// golbroker - distributed Game of Life
#[derive(Parser)]
#[command(
    name = "gb",
    about = "Distributed Game of Life on a toroidal grid: broker, workers and client",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a broker that workers subscribe to
    Broker {
        /// Address to listen on
        #[arg(long)]
        listen: Option<String>,

        /// Append run events to this JSONL file
        #[arg(long)]
        event_log: Option<PathBuf>,
    },

    /// Run a worker and subscribe it to a broker
    Worker {
        /// Address to listen on
        #[arg(long)]
        listen: Option<String>,

        /// Broker to subscribe to
        #[arg(short, long)]
        broker: Option<String>,

        /// Address the broker should dial, if not the listen address
        #[arg(long)]
        advertise: Option<String>,
    },

    /// Run a simulation on a broker, or locally when none answers
    Run {
        /// Turns to run
        #[arg(short, long)]
        turns: Option<u64>,

        /// In-process lanes for local runs
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Image width
        #[arg(short = 'W', long)]
        width: Option<usize>,

        /// Image height
        #[arg(short = 'H', long)]
        height: Option<usize>,

        /// Broker address
        #[arg(short, long)]
        broker: Option<String>,

        /// Run in-process without trying a broker
        #[arg(long)]
        local: bool,

        /// Directory holding input images
        #[arg(long)]
        images: Option<PathBuf>,

        /// Directory for output images
        #[arg(long)]
        out: Option<PathBuf>,

        /// Append run events to this JSONL file
        #[arg(long)]
        event_log: Option<PathBuf>,

        /// Ignore stdin key commands
        #[arg(long)]
        no_keys: bool,
    },

    /// Ping a broker to check if it's alive and responsive
    Ping {
        /// Broker address
        #[arg(short, long)]
        broker: Option<String>,
    },
}

impl Command {
    /// Name used for the log file
    pub fn role(&self) -> &'static str {
        match self {
            Command::Broker { .. } => "broker",
            Command::Worker { .. } => "worker",
            Command::Run { .. } => "run",
            Command::Ping { .. } => "ping",
        }
    }
}

/// Directory log files are written to
pub fn get_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("golbroker")
        .join("logs")
}

/// Log file for a role
pub fn get_log_path(role: &str) -> PathBuf {
    debug!(%role, "get_log_path: called");
    get_log_dir().join(format!("gb-{}.log", role))
}

/// Help footer pointing at the logs
pub fn generate_after_help() -> String {
    format!(
        "Logs are written to {}\nKeys during `gb run` (then Enter): s snapshot, p pause/resume, q quit, k kill",
        get_log_dir().display()
    )
}
