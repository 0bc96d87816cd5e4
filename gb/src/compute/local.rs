//! In-process compute lane
//!
//! Runs the band computation on tokio's blocking pool so lanes of the same
//! turn execute in parallel without stalling the async workers.

use async_trait::async_trait;
use tracing::debug;

use super::band_worker::compute_band;
use super::{BandCompute, ComputeError};
use crate::domain::{BandOutput, BandSlice};
use crate::events::EventEmitter;

/// A local lane standing in for a remote worker
#[derive(Debug, Clone)]
pub struct LocalLane {
    name: String,
    emitter: EventEmitter,
}

impl LocalLane {
    /// Create lane `index`, reporting cell flips on `emitter`
    pub fn new(index: usize, emitter: EventEmitter) -> Self {
        debug!(index, "LocalLane::new: called");
        Self::named(format!("local-lane-{}", index), emitter)
    }

    /// Create a lane with an explicit endpoint name
    pub fn named(name: impl Into<String>, emitter: EventEmitter) -> Self {
        Self {
            name: name.into(),
            emitter,
        }
    }

    /// Create `count` lanes sharing one emitter
    pub fn pool(count: usize, emitter: &EventEmitter) -> Vec<LocalLane> {
        (0..count).map(|i| LocalLane::new(i, emitter.clone())).collect()
    }
}

#[async_trait]
impl BandCompute for LocalLane {
    fn endpoint(&self) -> String {
        self.name.clone()
    }

    async fn compute_band(&self, slice: BandSlice, turn: u64) -> Result<BandOutput, ComputeError> {
        let emitter = self.emitter.clone();
        tokio::task::spawn_blocking(move || compute_band(&slice, turn, &emitter))
            .await
            .map_err(|e| ComputeError::Task(e.to_string()))
    }
}
