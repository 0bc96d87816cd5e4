//! Broker process
//!
//! Owns the worker registry and the coordinator, and serves the control and
//! subscription RPC surface over TCP. Every connection is handled on its own
//! task, so a long `RunTurns` never blocks `Snapshot` or `Subscribe`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::coordinator::{CoordError, Coordinator, CoordinatorConfig, CoordinatorHandle, RunSnapshot, TurnLoop};
use crate::events::EventEmitter;
use crate::registry::WorkerRegistry;
use crate::rpc::{BrokerRequest, BrokerResponse, RemoteWorker, read_frame, write_frame};

/// How long a client gets to send its request after connecting
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// How long in-flight connections may finish after shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The broker's request handling, independent of the socket
pub struct Broker {
    coordinator: CoordinatorHandle,
    registry: WorkerRegistry,
    turn_loop: TurnLoop,
    config: BrokerConfig,
    shutdown_tx: mpsc::Sender<()>,
}

impl Broker {
    /// Answer one request
    pub async fn handle(&self, request: BrokerRequest) -> BrokerResponse {
        debug!(?request, "Broker::handle: called");
        match request {
            BrokerRequest::Ping => BrokerResponse::Pong {
                version: env!("CARGO_PKG_VERSION").to_string(),
            },

            BrokerRequest::Subscribe { address } => self.subscribe(address).await,

            BrokerRequest::Unsubscribe { worker_id } => {
                if self.registry.remove(worker_id).await.is_none() {
                    debug!(%worker_id, "unsubscribe for unknown worker");
                }
                BrokerResponse::Ok
            }

            BrokerRequest::RunTurns { world, params } => match self.turn_loop.run(world, &params).await {
                Ok(outcome) => BrokerResponse::RunComplete {
                    world: (*outcome.world).clone(),
                    turn: outcome.turn,
                },
                Err(e) => {
                    warn!(error = %e, "run failed");
                    BrokerResponse::Error { message: e.to_string() }
                }
            },

            BrokerRequest::TogglePause => match self.coordinator.toggle_pause().await {
                Ok(state) => BrokerResponse::PauseToggled {
                    turn: state.turn,
                    paused: state.paused,
                },
                Err(e) => BrokerResponse::Error { message: e.to_string() },
            },

            BrokerRequest::Quit => self.state_response(self.coordinator.quit().await),

            BrokerRequest::Kill => {
                let state = self.coordinator.quit().await;
                let terminated = self.registry.terminate_all().await;
                info!(terminated, "kill: workers terminated, shutting down");
                let _ = self.shutdown_tx.try_send(());
                self.state_response(state)
            }

            BrokerRequest::Snapshot => self.state_response(self.coordinator.snapshot().await),

            BrokerRequest::AliveCount => match self.coordinator.alive_count().await {
                Ok(count) => BrokerResponse::AliveCount {
                    turn: count.turn,
                    count: count.count,
                },
                Err(e) => BrokerResponse::Error { message: e.to_string() },
            },
        }
    }

    /// Register a worker after checking it answers
    async fn subscribe(&self, address: String) -> BrokerResponse {
        debug!(%address, "Broker::subscribe: called");
        let worker = RemoteWorker::new(address.clone())
            .with_timeouts(self.config.subscribe_timeout(), self.config.subscribe_timeout());
        if let Err(e) = worker.ping().await {
            warn!(%address, error = %e, "subscription refused: endpoint unreachable");
            return BrokerResponse::Error {
                message: format!("endpoint {} unreachable: {}", address, e),
            };
        }
        let worker = worker.with_timeouts(self.config.worker_io_timeout(), self.config.worker_response_timeout());
        let worker_id = self.registry.register(address, Arc::new(worker)).await;
        BrokerResponse::Subscribed { worker_id }
    }

    fn state_response(&self, state: Result<RunSnapshot, CoordError>) -> BrokerResponse {
        match state {
            Ok(snapshot) => BrokerResponse::State {
                world: (*snapshot.world).clone(),
                turn: snapshot.turn,
            },
            Err(e) => BrokerResponse::Error { message: e.to_string() },
        }
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }
}

/// A bound broker ready to serve
pub struct BrokerServer {
    listener: TcpListener,
    broker: Arc<Broker>,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl BrokerServer {
    /// Bind the listener and start the coordinator
    pub async fn bind(config: &BrokerConfig, coordinator_config: &CoordinatorConfig, emitter: EventEmitter) -> Result<Self> {
        debug!(listen = %config.listen, "BrokerServer::bind: called");
        let listener = TcpListener::bind(&config.listen)
            .await
            .with_context(|| format!("Failed to bind broker on {}", config.listen))?;

        let coordinator = Coordinator::spawn(coordinator_config, emitter);
        let registry = WorkerRegistry::new();
        let turn_loop = TurnLoop::new(coordinator.clone(), registry.clone(), coordinator_config.clone());
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let broker = Arc::new(Broker {
            coordinator,
            registry,
            turn_loop,
            config: config.clone(),
            shutdown_tx: shutdown_tx.clone(),
        });

        Ok(Self {
            listener,
            broker,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Sender that stops the server when signalled
    pub fn shutdown_sender(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn broker(&self) -> Arc<Broker> {
        self.broker.clone()
    }

    /// Accept connections until shutdown is requested
    pub async fn run(self) -> Result<()> {
        let BrokerServer {
            listener,
            broker,
            shutdown_tx,
            mut shutdown_rx,
        } = self;
        drop(shutdown_tx);
        info!(address = ?listener.local_addr().ok(), "Broker listening");

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            debug!(%peer, "run: connection accepted");
                            let broker = broker.clone();
                            connections.spawn(async move {
                                if let Err(e) = handle_connection(&broker, stream).await {
                                    warn!(%peer, error = %e, "run: connection error");
                                }
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "run: accept error");
                        }
                    }
                }

                // Reap finished connection tasks
                Some(_) = connections.join_next(), if !connections.is_empty() => {}

                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        // Let a pending RunTurns return its final state
        let _ = broker.coordinator.quit().await;
        drop(listener);
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("run: connections still open after grace period, aborting them");
            connections.abort_all();
        }
        let _ = broker.coordinator.shutdown().await;
        info!("Broker stopped");
        Ok(())
    }
}

async fn handle_connection(broker: &Broker, stream: TcpStream) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let request: BrokerRequest = tokio::time::timeout(REQUEST_READ_TIMEOUT, read_frame(&mut reader))
        .await
        .context("Request read timeout")?
        .context("Failed to read request")?;
    let response = broker.handle(request).await;
    write_frame(&mut write_half, &response)
        .await
        .context("Failed to send response")?;
    Ok(())
}
