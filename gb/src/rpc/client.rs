//! Client for a broker process
//!
//! Used by workers to subscribe and by the distributor to run a simulation
//! remotely and steer it through [`ControlPlane`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result, eyre};
use tracing::debug;
use uuid::Uuid;

use super::frame::exchange;
use super::messages::{BrokerRequest, BrokerResponse};
use crate::control::ControlPlane;
use crate::coordinator::{AliveCount, PauseState, RunSnapshot};
use crate::domain::{Params, World};

/// Default timeout for broker operations
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for talking to a broker over TCP
#[derive(Debug, Clone)]
pub struct BrokerClient {
    address: String,
    timeout: Duration,
}

impl BrokerClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set a custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Check if the broker is alive and get its version
    pub async fn ping(&self) -> Result<String> {
        debug!(address = %self.address, "BrokerClient::ping: called");
        match self.send(BrokerRequest::Ping).await? {
            BrokerResponse::Pong { version } => Ok(version),
            other => Err(unexpected(other)),
        }
    }

    /// Register the worker listening at `worker_address`
    pub async fn subscribe(&self, worker_address: &str) -> Result<Uuid> {
        debug!(address = %self.address, %worker_address, "BrokerClient::subscribe: called");
        let request = BrokerRequest::Subscribe {
            address: worker_address.to_string(),
        };
        match self.send(request).await? {
            BrokerResponse::Subscribed { worker_id } => Ok(worker_id),
            other => Err(unexpected(other)),
        }
    }

    pub async fn unsubscribe(&self, worker_id: Uuid) -> Result<()> {
        debug!(address = %self.address, %worker_id, "BrokerClient::unsubscribe: called");
        match self.send(BrokerRequest::Unsubscribe { worker_id }).await? {
            BrokerResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Run a simulation on the broker and wait for it to end
    ///
    /// There is no response timeout: the answer arrives when the last turn is
    /// done or the run is quit.
    pub async fn run_turns(&self, world: World, params: Params) -> Result<(World, u64)> {
        debug!(address = %self.address, turns = params.turns, "BrokerClient::run_turns: called");
        let response = exchange(&self.address, &BrokerRequest::RunTurns { world, params }, self.timeout, None)
            .await
            .context("RunTurns failed")?;
        match response {
            BrokerResponse::RunComplete { world, turn } => Ok((world, turn)),
            other => Err(unexpected(other)),
        }
    }

    async fn send(&self, request: BrokerRequest) -> Result<BrokerResponse> {
        debug!(address = %self.address, ?request, "BrokerClient: sending request");
        let response = exchange(&self.address, &request, self.timeout, Some(self.timeout))
            .await
            .with_context(|| format!("Broker request to {} failed", self.address))?;
        debug!(?response, "BrokerClient: received response");
        Ok(response)
    }

    async fn state(&self, request: BrokerRequest) -> Result<RunSnapshot> {
        match self.send(request).await? {
            BrokerResponse::State { world, turn } => Ok(RunSnapshot {
                world: Arc::new(world),
                turn,
            }),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: BrokerResponse) -> eyre::Report {
    match response {
        BrokerResponse::Error { message } => eyre!("Broker error: {}", message),
        other => eyre!("Unexpected response: {:?}", other),
    }
}

#[async_trait]
impl ControlPlane for BrokerClient {
    async fn toggle_pause(&self) -> Result<PauseState> {
        match self.send(BrokerRequest::TogglePause).await? {
            BrokerResponse::PauseToggled { turn, paused } => Ok(PauseState { turn, paused }),
            other => Err(unexpected(other)),
        }
    }

    async fn quit(&self) -> Result<RunSnapshot> {
        self.state(BrokerRequest::Quit).await
    }

    async fn kill(&self) -> Result<RunSnapshot> {
        self.state(BrokerRequest::Kill).await
    }

    async fn snapshot(&self) -> Result<RunSnapshot> {
        self.state(BrokerRequest::Snapshot).await
    }

    async fn alive_count(&self) -> Result<AliveCount> {
        match self.send(BrokerRequest::AliveCount).await? {
            BrokerResponse::AliveCount { turn, count } => Ok(AliveCount { turn, count }),
            other => Err(unexpected(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::frame::{read_frame, write_frame};
    use tokio::io::BufReader;
    use tokio::net::TcpListener;

    /// Answer one request with `response`, returning the request seen
    async fn serve_once(response: BrokerResponse) -> (String, tokio::task::JoinHandle<BrokerRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let request: BrokerRequest = read_frame(&mut BufReader::new(read_half)).await.unwrap();
            write_frame(&mut write_half, &response).await.unwrap();
            request
        });
        (address, handle)
    }

    #[test]
    fn test_client_with_timeout() {
        let client = BrokerClient::new("127.0.0.1:8030").with_timeout(Duration::from_secs(10));
        assert_eq!(client.timeout, Duration::from_secs(10));
        assert_eq!(client.address(), "127.0.0.1:8030");
    }

    #[tokio::test]
    async fn test_subscribe_returns_worker_id() {
        let worker_id = Uuid::now_v7();
        let (address, server) = serve_once(BrokerResponse::Subscribed { worker_id }).await;

        let id = BrokerClient::new(address).subscribe("127.0.0.1:9000").await.unwrap();
        assert_eq!(id, worker_id);
        assert_eq!(
            server.await.unwrap(),
            BrokerRequest::Subscribe {
                address: "127.0.0.1:9000".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_error_response_becomes_error() {
        let (address, server) = serve_once(BrokerResponse::Error {
            message: "endpoint unreachable".to_string(),
        })
        .await;

        let err = BrokerClient::new(address).subscribe("127.0.0.1:1").await.unwrap_err();
        assert!(err.to_string().contains("endpoint unreachable"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_control_plane_alive_count() {
        let (address, server) = serve_once(BrokerResponse::AliveCount { turn: 12, count: 40 }).await;

        let client: Box<dyn ControlPlane> = Box::new(BrokerClient::new(address));
        let count = client.alive_count().await.unwrap();
        assert_eq!(count, AliveCount { turn: 12, count: 40 });
        assert_eq!(server.await.unwrap(), BrokerRequest::AliveCount);
    }

    #[tokio::test]
    async fn test_ping_without_broker_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(BrokerClient::new(address).ping().await.is_err());
    }
}
