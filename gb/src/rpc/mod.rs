//! RPC between distributor, broker and workers
//!
//! Plain TCP carrying one newline-terminated JSON request and one JSON
//! response per connection.

pub mod client;
pub mod frame;
pub mod messages;
pub mod worker_client;

pub use client::BrokerClient;
pub use frame::{MAX_FRAME_BYTES, RpcError, exchange, read_frame, write_frame};
pub use messages::{BrokerRequest, BrokerResponse, WorkerRequest, WorkerResponse};
pub use worker_client::RemoteWorker;
