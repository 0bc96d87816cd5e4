//! RPC message types
//!
//! One JSON document per line, internally tagged by `type`. A connection
//! carries exactly one request and its response.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{BandOutput, BandSlice, Params, World};

/// Requests to a broker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum BrokerRequest {
    /// Check the broker is alive
    Ping,

    /// Register the worker listening at `address`
    Subscribe { address: String },

    /// Remove a worker, sent by the worker itself on shutdown
    Unsubscribe { worker_id: Uuid },

    /// Run a whole simulation; answered when the run ends
    RunTurns { world: World, params: Params },

    TogglePause,

    Quit,

    /// Quit, terminate every worker and shut the broker down
    Kill,

    Snapshot,

    AliveCount,
}

/// Responses from a broker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum BrokerResponse {
    Pong { version: String },

    Subscribed { worker_id: Uuid },

    /// Acknowledgment
    Ok,

    RunComplete { world: World, turn: u64 },

    PauseToggled { turn: u64, paused: bool },

    /// World and turn answered by Quit, Kill and Snapshot
    State { world: World, turn: u64 },

    AliveCount { turn: u64, count: usize },

    Error { message: String },
}

/// Requests to a worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum WorkerRequest {
    Ping,

    /// Compute the next generation of one band
    ComputeBand { slice: BandSlice, turn: u64 },

    /// Shut the worker process down
    Terminate,
}

/// Responses from a worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum WorkerResponse {
    Pong { version: String },

    Band { output: BandOutput },

    Ok,

    Error { message: String },
}
