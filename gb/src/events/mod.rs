//! Event sink for run observability
//!
//! Every turn, the turn loop and the band computations emit events into one
//! append-only channel. A display or logging collaborator consumes it.
//!
//! # Ordering
//!
//! ```text
//!   band 0 task ──┐
//!   band 1 task ──┼──► CellFlipped(t) ...  ──►  TurnComplete(t)  ──►  CellFlipped(t+1) ...
//!   band N task ──┘        (any interleaving       (after fan-in)
//!                           across bands)
//! ```
//!
//! - `TurnComplete` events arrive in strictly increasing turn order
//! - every `CellFlipped` of turn `t` arrives before `TurnComplete(t)`
//! - flips of one turn from different bands may interleave
//!
//! See [`GolEvent`] for the complete list of events.

mod bus;
mod logger;
mod types;

pub use bus::{EventEmitter, create_event_channel};
pub use logger::{EventLogger, read_events, spawn_event_logger};
pub use types::{EventLogEntry, GolEvent, RunState};
