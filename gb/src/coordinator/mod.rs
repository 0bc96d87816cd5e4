//! Coordinator - turn-loop state machine
//!
//! ```text
//!   Idle ──Begin──► Running ◄──TogglePause──► Paused
//!                      │
//!                      └──Finish / Quit / Kill──► Finished
//! ```
//!
//! [`Coordinator`] is a single-writer state cell for the world, the turn and
//! the run state. [`TurnLoop`] drives turns through it and never touches the
//! state directly.

mod config;
mod core;
mod handle;
mod messages;
mod turn_loop;

pub use config::CoordinatorConfig;
pub use core::Coordinator;
pub use handle::CoordinatorHandle;
pub use messages::{AliveCount, CoordError, CoordinatorMetrics, FaultRecord, Gate, PauseState, RunSnapshot};
pub use turn_loop::{RunError, RunOutcome, TurnLoop};
