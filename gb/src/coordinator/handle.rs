//! CoordinatorHandle - client interface to the state cell

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{
    AliveCount, CoordError, CoordRequest, CoordinatorMetrics, FaultRecord, Gate, PauseState, RunSnapshot,
};
use crate::domain::World;

/// Handle for the turn loop and control plane to reach the Coordinator
///
/// Cloneable; every call is one request and one reply, so callers never hold
/// the world state themselves.
#[derive(Clone, Debug)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordRequest>,
}

impl CoordinatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<CoordRequest>) -> Self {
        debug!("CoordinatorHandle::new: called");
        Self { tx }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> CoordRequest) -> Result<T, CoordError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| CoordError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CoordError::ChannelClosed)
    }

    /// Start a run; fails while another run is in progress
    pub async fn begin(&self, world: Arc<World>) -> Result<(), CoordError> {
        debug!(width = world.width(), height = world.height(), "CoordinatorHandle::begin: called");
        self.request(|reply_tx| CoordRequest::Begin { world, reply_tx }).await?
    }

    /// Wait at a turn boundary until the run may proceed or must stop
    pub async fn gate(&self) -> Result<Gate, CoordError> {
        debug!("CoordinatorHandle::gate: called");
        self.request(|reply_tx| CoordRequest::Gate { reply_tx }).await
    }

    /// Publish the merged world for `turn`
    pub async fn commit(&self, world: Arc<World>, turn: u64) -> Result<(), CoordError> {
        debug!(turn, "CoordinatorHandle::commit: called");
        self.request(|reply_tx| CoordRequest::Commit { world, turn, reply_tx })
            .await?
    }

    pub async fn finish(&self) -> Result<RunSnapshot, CoordError> {
        debug!("CoordinatorHandle::finish: called");
        self.request(|reply_tx| CoordRequest::Finish { reply_tx }).await
    }

    pub async fn toggle_pause(&self) -> Result<PauseState, CoordError> {
        debug!("CoordinatorHandle::toggle_pause: called");
        self.request(|reply_tx| CoordRequest::TogglePause { reply_tx }).await
    }

    pub async fn quit(&self) -> Result<RunSnapshot, CoordError> {
        debug!("CoordinatorHandle::quit: called");
        self.request(|reply_tx| CoordRequest::Quit { reply_tx }).await
    }

    pub async fn snapshot(&self) -> Result<RunSnapshot, CoordError> {
        debug!("CoordinatorHandle::snapshot: called");
        self.request(|reply_tx| CoordRequest::Snapshot { reply_tx }).await
    }

    pub async fn alive_count(&self) -> Result<AliveCount, CoordError> {
        debug!("CoordinatorHandle::alive_count: called");
        self.request(|reply_tx| CoordRequest::AliveCount { reply_tx }).await
    }

    /// Count a fault handling outcome; fire and forget
    pub async fn record(&self, record: FaultRecord) {
        debug!(?record, "CoordinatorHandle::record: called");
        let _ = self.tx.send(CoordRequest::Record(record)).await;
    }

    pub async fn metrics(&self) -> Result<CoordinatorMetrics, CoordError> {
        debug!("CoordinatorHandle::metrics: called");
        self.request(|reply_tx| CoordRequest::GetMetrics { reply_tx }).await
    }

    pub async fn shutdown(&self) -> Result<(), CoordError> {
        debug!("CoordinatorHandle::shutdown: called");
        self.tx
            .send(CoordRequest::Shutdown)
            .await
            .map_err(|_| CoordError::ChannelClosed)
    }
}
