//! Message types for the Coordinator

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{GridError, World};

/// Errors returned by the coordinator's state cell
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordError {
    #[error("Coordinator channel closed")]
    ChannelClosed,

    #[error("run already in progress")]
    AlreadyRunning,

    #[error("No run in progress")]
    NotRunning,

    #[error("Turn {actual} committed out of order, expected {expected}")]
    TurnOutOfOrder { expected: u64, actual: u64 },

    #[error(transparent)]
    Grid(#[from] GridError),
}

/// The last committed world and the turn it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSnapshot {
    pub world: Arc<World>,
    pub turn: u64,
}

/// Result of a pause toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseState {
    pub turn: u64,
    pub paused: bool,
}

/// Live cell count of the last committed world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliveCount {
    pub turn: u64,
    pub count: usize,
}

/// Answer to a turn boundary check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    /// Compute the turn after `snapshot.turn` from `snapshot.world`
    Proceed(RunSnapshot),
    /// Quit was requested; stop without another turn
    Stop(RunSnapshot),
}

/// Fault handling outcomes counted by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultRecord {
    WorkerRemoved,
    BandRedispatched,
    BandComputedLocally,
}

/// Internal requests to the Coordinator task
#[derive(Debug)]
pub enum CoordRequest {
    /// Start a run from `world` at turn 0
    Begin {
        world: Arc<World>,
        reply_tx: oneshot::Sender<Result<(), CoordError>>,
    },

    /// Turn boundary check; parked while paused
    Gate { reply_tx: oneshot::Sender<Gate> },

    /// Publish the world for `turn`
    Commit {
        world: Arc<World>,
        turn: u64,
        reply_tx: oneshot::Sender<Result<(), CoordError>>,
    },

    /// End the run
    Finish {
        reply_tx: oneshot::Sender<RunSnapshot>,
    },

    TogglePause {
        reply_tx: oneshot::Sender<PauseState>,
    },

    /// Stop the run at the next turn boundary
    Quit {
        reply_tx: oneshot::Sender<RunSnapshot>,
    },

    Snapshot {
        reply_tx: oneshot::Sender<RunSnapshot>,
    },

    AliveCount {
        reply_tx: oneshot::Sender<AliveCount>,
    },

    /// Count a fault handling outcome
    Record(FaultRecord),

    /// Get current metrics
    GetMetrics {
        reply_tx: oneshot::Sender<CoordinatorMetrics>,
    },

    /// Shutdown the coordinator
    Shutdown,
}

/// Coordinator metrics for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorMetrics {
    pub runs_started: u64,
    pub turns_committed: u64,
    pub pause_toggles: u64,
    pub workers_removed: u64,
    pub bands_redispatched: u64,
    pub bands_computed_locally: u64,
}

impl CoordinatorMetrics {
    pub(crate) fn record(&mut self, record: FaultRecord) {
        match record {
            FaultRecord::WorkerRemoved => self.workers_removed += 1,
            FaultRecord::BandRedispatched => self.bands_redispatched += 1,
            FaultRecord::BandComputedLocally => self.bands_computed_locally += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_record() {
        let mut metrics = CoordinatorMetrics::default();
        metrics.record(FaultRecord::WorkerRemoved);
        metrics.record(FaultRecord::BandRedispatched);
        metrics.record(FaultRecord::BandRedispatched);
        assert_eq!(metrics.workers_removed, 1);
        assert_eq!(metrics.bands_redispatched, 2);
        assert_eq!(metrics.bands_computed_locally, 0);
    }

    #[test]
    fn test_coord_error_display() {
        let err = CoordError::TurnOutOfOrder { expected: 4, actual: 6 };
        assert_eq!(err.to_string(), "Turn 6 committed out of order, expected 4");
        assert_eq!(CoordError::AlreadyRunning.to_string(), "run already in progress");
    }
}
