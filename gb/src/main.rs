//! gb - distributed Game of Life
//!
//! CLI entry point for the broker, worker and client roles.

use std::fs;
use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches};
use eyre::{Context, Result};
use tracing::{debug, info};

use golbroker::broker::BrokerServer;
use golbroker::cli::{Cli, Command, generate_after_help, get_log_dir, get_log_path};
use golbroker::config::Config;
use golbroker::distributor::{Distributor, select_mode, Mode};
use golbroker::domain::Params;
use golbroker::events::{EventEmitter, EventLogger, create_event_channel, spawn_event_logger};
use golbroker::gridio::PgmStore;
use golbroker::keys::{KeyCommand, spawn_stdin_keys};
use golbroker::report::Reporter;
use golbroker::rpc::BrokerClient;
use golbroker::worker::WorkerNode;

fn setup_logging(role: &str, cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    fs::create_dir_all(get_log_dir()).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(get_log_path(role))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!(role, pid = std::process::id(), "Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.command.role(), cli.log_level.as_deref(), config_log_level.as_deref())
        .context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Broker { listen, event_log } => {
            let mut broker = config.broker.clone();
            if let Some(listen) = listen {
                broker.listen = listen;
            }
            if event_log.is_some() {
                broker.event_log = event_log;
            }
            cmd_broker(&config, broker).await
        }
        Command::Worker {
            listen,
            broker,
            advertise,
        } => {
            let mut worker = config.worker.clone();
            if let Some(listen) = listen {
                worker.listen = listen;
            }
            if let Some(broker) = broker {
                worker.broker = broker;
            }
            if advertise.is_some() {
                worker.advertise = advertise;
            }
            cmd_worker(worker).await
        }
        Command::Run {
            turns,
            threads,
            width,
            height,
            broker,
            local,
            images,
            out,
            event_log,
            no_keys,
        } => {
            let mut run = config.run.clone();
            run.turns = turns.unwrap_or(run.turns);
            run.threads = threads.unwrap_or(run.threads);
            run.image_width = width.unwrap_or(run.image_width);
            run.image_height = height.unwrap_or(run.image_height);
            run.broker = broker.unwrap_or(run.broker);
            run.broker_disabled |= local;
            run.images_dir = images.unwrap_or(run.images_dir);
            run.out_dir = out.unwrap_or(run.out_dir);
            if event_log.is_some() {
                run.event_log = event_log;
            }
            cmd_run(&config, run, no_keys).await
        }
        Command::Ping { broker } => cmd_ping(broker.unwrap_or(config.run.broker)).await,
    }
}

/// Serve as a broker until killed or interrupted
async fn cmd_broker(config: &Config, broker: golbroker::config::BrokerConfig) -> Result<()> {
    debug!(?broker, "cmd_broker: called");
    let (emitter, logger) = match &broker.event_log {
        Some(path) => {
            let (emitter, rx) = create_event_channel();
            (emitter, Some(spawn_event_logger(path, rx)?))
        }
        None => (EventEmitter::disabled(), None),
    };

    let server = BrokerServer::bind(&broker, &config.coordinator, emitter).await?;
    let address = server.local_addr()?;
    println!("Broker listening on {}", address);

    let shutdown = server.shutdown_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cmd_broker: ctrl_c received, initiating shutdown");
            let _ = shutdown.send(()).await;
        }
    });

    server.run().await?;
    if let Some(logger) = logger {
        let _ = logger.await;
    }
    println!("Broker stopped");
    Ok(())
}

/// Serve as a worker until terminated or interrupted
async fn cmd_worker(worker: golbroker::config::WorkerConfig) -> Result<()> {
    debug!(?worker, "cmd_worker: called");
    let node = WorkerNode::bind(&worker).await?;
    println!("Worker listening on {}, subscribing to {}", node.local_addr()?, worker.broker);

    let shutdown = node.shutdown_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cmd_worker: ctrl_c received, initiating shutdown");
            let _ = shutdown.send(()).await;
        }
    });

    node.run().await?;
    println!("Worker stopped");
    Ok(())
}

/// Run one simulation session
async fn cmd_run(config: &Config, run: golbroker::config::RunConfig, no_keys: bool) -> Result<()> {
    debug!(?run, no_keys, "cmd_run: called");
    let params = Params::new(run.turns, run.threads, run.image_width, run.image_height);
    let mode = select_mode(&run).await;
    match &mode {
        Mode::Local => println!("Running {} turns locally on {} lanes", params.turns, params.threads),
        Mode::Broker(address) => println!("Running {} turns on broker {}", params.turns, address),
    }

    let (emitter, rx) = create_event_channel();
    let mut reporter = Reporter::new(std::io::stdout());
    if let Some(path) = &run.event_log {
        reporter = reporter.with_logger(EventLogger::open(path)?);
    }
    let report = tokio::spawn(reporter.run(rx));

    let keys = if no_keys {
        let (_tx, rx) = tokio::sync::mpsc::channel::<KeyCommand>(1);
        rx
    } else {
        spawn_stdin_keys()
    };

    let store = PgmStore::new(&run.images_dir, &run.out_dir);
    let distributor = Distributor::new(params, store, emitter)
        .with_report_interval(run.alive_report_interval())
        .with_coordinator_config(config.coordinator.clone());
    let outcome = distributor.run(mode, keys).await;

    let summary = report.await.context("Reporter task failed")?;
    let outcome = outcome?;
    debug!(?summary, "cmd_run: report finished");
    println!(
        "Final image {} written to {}",
        outcome.image,
        PathBuf::from(&run.out_dir).display()
    );
    Ok(())
}

/// Check a broker is reachable
async fn cmd_ping(address: String) -> Result<()> {
    debug!(%address, "cmd_ping: called");
    let version = BrokerClient::new(address.clone()).ping().await?;
    println!("Broker at {} is alive (version {})", address, version);
    Ok(())
}
