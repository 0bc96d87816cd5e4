//! Band computation and the ComputeBand capability
//!
//! The turn loop only ever talks to [`BandCompute`]: it does not know whether
//! an entry is a TCP worker or an in-process lane.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod band_worker;
mod local;
mod rule;

pub use band_worker::{compute_band, step_world};
pub use local::LocalLane;
pub use rule::next_state;

use crate::domain::{BandOutput, BandSlice};

/// Errors from a ComputeBand call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComputeError {
    #[error("Transport failure talking to {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint} did not answer within {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("{endpoint} reported an error: {message}")]
    Remote { endpoint: String, message: String },

    #[error("{endpoint} returned a malformed band: {message}")]
    Malformed { endpoint: String, message: String },

    #[error("Band task failed: {0}")]
    Task(String),
}

/// The ComputeBand capability
///
/// Implemented by [`LocalLane`] and by the RPC worker client. A local
/// computation cannot fail except by panicking; remote ones fail on transport
/// faults.
#[async_trait]
pub trait BandCompute: Send + Sync {
    /// Name of the endpoint for logs and errors
    fn endpoint(&self) -> String;

    /// Compute the band described by `slice`, producing turn `turn`
    async fn compute_band(&self, slice: BandSlice, turn: u64) -> Result<BandOutput, ComputeError>;

    /// Ask the endpoint to shut down; lanes without a process ignore this
    async fn terminate(&self) -> Result<(), ComputeError> {
        Ok(())
    }
}
