//! Event channel - many producers, one consumer
//!
//! Band computations running on concurrent tasks all emit into the same
//! unbounded channel, so emitting never blocks a computation. Events from one
//! sender arrive in the order they were sent; events from different bands of
//! the same turn may interleave.

use tokio::sync::mpsc;
use tracing::trace;

use super::types::{GolEvent, RunState};
use crate::domain::Coord;

/// Create an emitter and the receiver that consumes its events
pub fn create_event_channel() -> (EventEmitter, mpsc::UnboundedReceiver<GolEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventEmitter { tx: Some(tx) }, rx)
}

/// Handle for components to emit events without owning the consumer
///
/// Cheap to clone. A disabled emitter drops everything, which is what a
/// broker uses for cell flips nobody is watching.
#[derive(Clone, Debug, Default)]
pub struct EventEmitter {
    tx: Option<mpsc::UnboundedSender<GolEvent>>,
}

impl EventEmitter {
    /// An emitter that discards every event
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Whether anyone can still receive events from this emitter
    pub fn is_enabled(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Emit a raw event
    ///
    /// Fire-and-forget: a dropped receiver is not an error for the producer.
    pub fn emit(&self, event: GolEvent) {
        if let Some(tx) = &self.tx {
            trace!(event_type = event.event_type(), "EventEmitter::emit");
            let _ = tx.send(event);
        }
    }

    // === Convenience methods ===

    pub fn cell_flipped(&self, completed_turns: u64, cell: Coord) {
        self.emit(GolEvent::CellFlipped { completed_turns, cell });
    }

    pub fn turn_complete(&self, completed_turns: u64) {
        self.emit(GolEvent::TurnComplete { completed_turns });
    }

    pub fn final_turn_complete(&self, completed_turns: u64, alive: Vec<Coord>) {
        self.emit(GolEvent::FinalTurnComplete { completed_turns, alive });
    }

    pub fn state_change(&self, completed_turns: u64, new_state: RunState) {
        self.emit(GolEvent::StateChange {
            completed_turns,
            new_state,
        });
    }

    pub fn alive_cells_count(&self, completed_turns: u64, cells_count: usize) {
        self.emit(GolEvent::AliveCellsCount {
            completed_turns,
            cells_count,
        });
    }

    pub fn image_output_complete(&self, completed_turns: u64, filename: impl Into<String>) {
        self.emit(GolEvent::ImageOutputComplete {
            completed_turns,
            filename: filename.into(),
        });
    }
}
