//! golbroker - Distributed Game of Life
//!
//! A broker partitions a toroidal Game of Life grid into contiguous row bands
//! and farms each turn out to subscribed workers, stitching their results back
//! into the next world. A client (the distributor) loads the initial image,
//! drives the run on a broker or in-process, relays key commands and reports
//! progress as a stream of events.
//!
//! # Core Concepts
//!
//! - **Bands**: each turn the world is cut into row ranges, one per worker,
//!   each shipped with a one-row halo above and below
//! - **Coordinator**: a single actor owns run state (turn, world, pause, quit)
//!   so control commands and snapshots never race the turn loop
//! - **Fault tolerance**: a worker that fails or times out is dropped and its
//!   band recomputed elsewhere within the same turn
//! - **Events**: every observable change is a [`GolEvent`] on a channel
//!
//! # Modules
//!
//! - [`domain`] - World, bands and run parameters
//! - [`compute`] - The life rule and band computation
//! - [`registry`] - Live worker set
//! - [`coordinator`] - Run state actor and the turn loop
//! - [`control`] - Pause, quit, kill and snapshot commands
//! - [`rpc`] - Newline-delimited JSON wire protocol
//! - [`broker`] - Broker server
//! - [`worker`] - Worker server
//! - [`distributor`] - Client session
//! - [`gridio`] - PGM image input and output
//! - [`events`] - Event types, channel and JSONL log
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod broker;
pub mod cli;
pub mod compute;
pub mod config;
pub mod control;
pub mod coordinator;
pub mod distributor;
pub mod domain;
pub mod events;
pub mod gridio;
pub mod keys;
pub mod registry;
pub mod report;
pub mod rpc;
pub mod worker;

// Re-export commonly used types
pub use broker::{Broker, BrokerServer};
pub use compute::{BandCompute, ComputeError, LocalLane, compute_band, next_state, step_world};
pub use config::{BrokerConfig, Config, RunConfig, WorkerConfig};
pub use control::ControlPlane;
pub use coordinator::{
    AliveCount, CoordError, Coordinator, CoordinatorConfig, CoordinatorHandle, CoordinatorMetrics, PauseState,
    RunError, RunOutcome, RunSnapshot, TurnLoop,
};
pub use distributor::{Distributor, Mode, SessionOutcome, select_mode};
pub use domain::{Band, BandOutput, BandSlice, Coord, GridError, Params, PartitionError, World, partition};
pub use events::{EventEmitter, EventLogEntry, EventLogger, GolEvent, RunState, create_event_channel, spawn_event_logger};
pub use gridio::{GridIoError, GridStore, PgmStore};
pub use keys::KeyCommand;
pub use registry::{WorkerHandle, WorkerRegistry};
pub use report::{Reporter, RunSummary};
pub use rpc::{BrokerClient, RemoteWorker};
pub use worker::WorkerNode;
