//! Worker process
//!
//! Listens for ComputeBand requests, subscribes itself to a broker, and exits
//! on Terminate or when asked to shut down locally.

use std::net::SocketAddr;

use eyre::{Context, Result};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::compute::compute_band;
use crate::config::WorkerConfig;
use crate::events::EventEmitter;
use crate::rpc::{BrokerClient, WorkerRequest, WorkerResponse, read_frame, write_frame};

/// A bound worker
pub struct WorkerNode {
    listener: TcpListener,
    broker: BrokerClient,
    advertise: String,
    worker_id: Option<Uuid>,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl WorkerNode {
    /// Bind the worker's listener
    pub async fn bind(config: &WorkerConfig) -> Result<Self> {
        debug!(listen = %config.listen, broker = %config.broker, "WorkerNode::bind: called");
        let listener = TcpListener::bind(&config.listen)
            .await
            .with_context(|| format!("Failed to bind worker on {}", config.listen))?;
        let advertise = match &config.advertise {
            Some(address) => address.clone(),
            None => listener.local_addr()?.to_string(),
        };
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Ok(Self {
            listener,
            broker: BrokerClient::new(config.broker.clone()).with_timeout(config.timeout()),
            advertise,
            worker_id: None,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Address the broker is told to dial
    pub fn advertise(&self) -> &str {
        &self.advertise
    }

    /// Sender that stops the worker when signalled
    pub fn shutdown_sender(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Register with the broker
    pub async fn subscribe(&mut self) -> Result<Uuid> {
        let worker_id = self
            .broker
            .subscribe(&self.advertise)
            .await
            .with_context(|| format!("Failed to subscribe to broker at {}", self.broker.address()))?;
        info!(%worker_id, advertise = %self.advertise, "subscribed to broker");
        self.worker_id = Some(worker_id);
        Ok(worker_id)
    }

    /// Subscribe, then serve until terminated
    pub async fn run(mut self) -> Result<()> {
        self.subscribe().await?;
        self.serve().await
    }

    /// Serve requests until Terminate or a local shutdown signal
    pub async fn serve(self) -> Result<()> {
        let WorkerNode {
            listener,
            broker,
            worker_id,
            shutdown_tx,
            mut shutdown_rx,
            ..
        } = self;
        info!(address = ?listener.local_addr().ok(), "Worker listening");

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            debug!(%peer, "serve: connection accepted");
                            let shutdown_tx = shutdown_tx.clone();
                            tokio::spawn(async move {
                                match handle_connection(stream).await {
                                    Ok(true) => {
                                        info!("Terminate received");
                                        let _ = shutdown_tx.try_send(());
                                    }
                                    Ok(false) => {}
                                    Err(e) => warn!(%peer, error = %e, "serve: connection error"),
                                }
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "serve: accept error");
                        }
                    }
                }

                _ = shutdown_rx.recv() => {
                    debug!("serve: shutdown signal received");
                    break;
                }
            }
        }

        // A broker that terminated us has already dropped us; tell it otherwise
        if let Some(worker_id) = worker_id
            && let Err(e) = broker.unsubscribe(worker_id).await
        {
            debug!(error = %e, "serve: unsubscribe failed, broker may be gone");
        }
        info!("Worker stopped");
        Ok(())
    }
}

/// Handle one request; returns true when the worker should terminate
async fn handle_connection(stream: TcpStream) -> Result<bool> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let request: WorkerRequest = read_frame(&mut reader).await.context("Failed to read request")?;
    let (response, terminate) = handle_request(request).await;
    write_frame(&mut write_half, &response)
        .await
        .context("Failed to send response")?;
    Ok(terminate)
}

async fn handle_request(request: WorkerRequest) -> (WorkerResponse, bool) {
    match request {
        WorkerRequest::Ping => (
            WorkerResponse::Pong {
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            false,
        ),
        WorkerRequest::ComputeBand { slice, turn } => {
            debug!(start = slice.band.start, end = slice.band.end, turn, "handle_request: ComputeBand");
            let computed =
                tokio::task::spawn_blocking(move || compute_band(&slice, turn, &EventEmitter::disabled())).await;
            match computed {
                Ok(output) => (WorkerResponse::Band { output }, false),
                Err(e) => (WorkerResponse::Error { message: e.to_string() }, false),
            }
        }
        WorkerRequest::Terminate => (WorkerResponse::Ok, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{BandCompute, step_world};
    use crate::domain::{Band, World};
    use crate::rpc::RemoteWorker;

    async fn start() -> (String, tokio::task::JoinHandle<Result<()>>) {
        let config = WorkerConfig {
            listen: "127.0.0.1:0".to_string(),
            ..Default::default()
        };
        let node = WorkerNode::bind(&config).await.unwrap();
        let address = node.local_addr().unwrap().to_string();
        assert_eq!(node.advertise(), address);
        (address, tokio::spawn(node.serve()))
    }

    #[tokio::test]
    async fn test_worker_computes_band_over_tcp() {
        let (address, server) = start().await;
        let remote = RemoteWorker::new(address);
        assert_eq!(remote.ping().await.unwrap(), env!("CARGO_PKG_VERSION"));

        let world = World::from_pattern(&["....", ".##.", ".##.", "#..."]).unwrap();
        let band = Band::new(1, 3);
        let output = remote.compute_band(world.halo_slice(band), 1).await.unwrap();
        assert_eq!(output.band, band);
        assert_eq!(output.cells, step_world(&world).unwrap().cells()[4..12].to_vec());

        remote.terminate().await.unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_local_shutdown_signal() {
        let config = WorkerConfig {
            listen: "127.0.0.1:0".to_string(),
            ..Default::default()
        };
        let node = WorkerNode::bind(&config).await.unwrap();
        let shutdown = node.shutdown_sender();
        let server = tokio::spawn(node.serve());

        shutdown.send(()).await.unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_advertise_override() {
        let config = WorkerConfig {
            listen: "127.0.0.1:0".to_string(),
            advertise: Some("10.1.2.3:8040".to_string()),
            ..Default::default()
        };
        let node = WorkerNode::bind(&config).await.unwrap();
        assert_eq!(node.advertise(), "10.1.2.3:8040");
    }
}
