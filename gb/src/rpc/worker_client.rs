//! Client side of the worker protocol
//!
//! A [`RemoteWorker`] is the network implementation of [`BandCompute`]; the
//! broker keeps one per subscribed worker.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::frame::{RpcError, exchange};
use super::messages::{WorkerRequest, WorkerResponse};
use crate::compute::{BandCompute, ComputeError};
use crate::domain::{BandOutput, BandSlice};

/// Default timeout for connecting and writing
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Default wait for a computed band
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// A worker process reached over TCP
#[derive(Debug, Clone)]
pub struct RemoteWorker {
    address: String,
    io_timeout: Duration,
    response_timeout: Duration,
}

impl RemoteWorker {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            io_timeout: DEFAULT_IO_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// Set custom timeouts
    pub fn with_timeouts(mut self, io_timeout: Duration, response_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self.response_timeout = response_timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Check the worker is reachable and get its version
    pub async fn ping(&self) -> Result<String, ComputeError> {
        debug!(address = %self.address, "RemoteWorker::ping: called");
        match self.send(WorkerRequest::Ping, self.io_timeout).await? {
            WorkerResponse::Pong { version } => Ok(version),
            other => Err(self.unexpected(other)),
        }
    }

    async fn send(&self, request: WorkerRequest, response_timeout: Duration) -> Result<WorkerResponse, ComputeError> {
        exchange(&self.address, &request, self.io_timeout, Some(response_timeout))
            .await
            .map_err(|e| self.classify(e))
    }

    fn classify(&self, error: RpcError) -> ComputeError {
        match error {
            RpcError::Timeout { timeout, .. } => ComputeError::Timeout {
                endpoint: self.address.clone(),
                timeout,
            },
            RpcError::Json(e) => ComputeError::Malformed {
                endpoint: self.address.clone(),
                message: e.to_string(),
            },
            other => ComputeError::Transport {
                endpoint: self.address.clone(),
                message: other.to_string(),
            },
        }
    }

    fn unexpected(&self, response: WorkerResponse) -> ComputeError {
        match response {
            WorkerResponse::Error { message } => ComputeError::Remote {
                endpoint: self.address.clone(),
                message,
            },
            other => ComputeError::Malformed {
                endpoint: self.address.clone(),
                message: format!("unexpected response {:?}", other),
            },
        }
    }
}

#[async_trait]
impl BandCompute for RemoteWorker {
    fn endpoint(&self) -> String {
        self.address.clone()
    }

    async fn compute_band(&self, slice: BandSlice, turn: u64) -> Result<BandOutput, ComputeError> {
        debug!(address = %self.address, start = slice.band.start, end = slice.band.end, turn, "RemoteWorker::compute_band: called");
        match self
            .send(WorkerRequest::ComputeBand { slice, turn }, self.response_timeout)
            .await?
        {
            WorkerResponse::Band { output } => Ok(output),
            other => Err(self.unexpected(other)),
        }
    }

    async fn terminate(&self) -> Result<(), ComputeError> {
        debug!(address = %self.address, "RemoteWorker::terminate: called");
        match self.send(WorkerRequest::Terminate, self.io_timeout).await? {
            WorkerResponse::Ok => Ok(()),
            other => Err(self.unexpected(other)),
        }
    }
}
