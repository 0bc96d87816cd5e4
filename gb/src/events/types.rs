//! Event types for run observability
//!
//! These events are what a display or logging collaborator sees:
//! - Cell level changes (`CellFlipped`)
//! - Turn progress (`TurnComplete`, `FinalTurnComplete`, `AliveCellsCount`)
//! - Run state transitions (`StateChange`)
//! - Snapshot output (`ImageOutputComplete`)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Coord;

/// The control plane's view of the turn loop's mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Executing,
    Paused,
    Quitting,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Executing => write!(f, "Executing"),
            Self::Paused => write!(f, "Paused"),
            Self::Quitting => write!(f, "Quitting"),
        }
    }
}

/// Core event enum
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GolEvent {
    /// A cell changed state during `completed_turns`
    CellFlipped { completed_turns: u64, cell: Coord },

    /// A generation was merged and is now visible to readers
    TurnComplete { completed_turns: u64 },

    /// The run ended; `alive` is the final live cell set
    FinalTurnComplete { completed_turns: u64, alive: Vec<Coord> },

    /// The run changed mode
    StateChange { completed_turns: u64, new_state: RunState },

    /// Periodic live cell count report
    AliveCellsCount { completed_turns: u64, cells_count: usize },

    /// A snapshot image was written
    ImageOutputComplete { completed_turns: u64, filename: String },
}

impl GolEvent {
    /// Turn number the event refers to
    pub fn completed_turns(&self) -> u64 {
        match self {
            GolEvent::CellFlipped { completed_turns, .. }
            | GolEvent::TurnComplete { completed_turns }
            | GolEvent::FinalTurnComplete { completed_turns, .. }
            | GolEvent::StateChange { completed_turns, .. }
            | GolEvent::AliveCellsCount { completed_turns, .. }
            | GolEvent::ImageOutputComplete { completed_turns, .. } => *completed_turns,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            GolEvent::CellFlipped { .. } => "CellFlipped",
            GolEvent::TurnComplete { .. } => "TurnComplete",
            GolEvent::FinalTurnComplete { .. } => "FinalTurnComplete",
            GolEvent::StateChange { .. } => "StateChange",
            GolEvent::AliveCellsCount { .. } => "AliveCellsCount",
            GolEvent::ImageOutputComplete { .. } => "ImageOutputComplete",
        }
    }
}

impl std::fmt::Display for GolEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GolEvent::CellFlipped { completed_turns, cell } => {
                write!(f, "turn {}: cell ({}, {}) flipped", completed_turns, cell.x, cell.y)
            }
            GolEvent::TurnComplete { completed_turns } => write!(f, "turn {} complete", completed_turns),
            GolEvent::FinalTurnComplete { completed_turns, alive } => {
                write!(f, "final turn {} complete, {} cells alive", completed_turns, alive.len())
            }
            GolEvent::StateChange {
                completed_turns,
                new_state,
            } => write!(f, "turn {}: {}", completed_turns, new_state),
            GolEvent::AliveCellsCount {
                completed_turns,
                cells_count,
            } => write!(f, "turn {}: {} cells alive", completed_turns, cells_count),
            GolEvent::ImageOutputComplete {
                completed_turns,
                filename,
            } => write!(f, "turn {}: wrote {}", completed_turns, filename),
        }
    }
}

/// A timestamped event log entry for file persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Timestamp of the event
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// The event
    pub event: GolEvent,
}

impl EventLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(event: GolEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type() {
        let event = GolEvent::TurnComplete { completed_turns: 3 };
        assert_eq!(event.event_type(), "TurnComplete");
        assert_eq!(event.completed_turns(), 3);
    }

    #[test]
    fn test_event_serialization() {
        let event = GolEvent::CellFlipped {
            completed_turns: 7,
            cell: Coord::new(2, 5),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"CellFlipped","completed_turns":7,"cell":{"x":2,"y":5}}"#);

        let parsed: GolEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_state_change_display() {
        let event = GolEvent::StateChange {
            completed_turns: 12,
            new_state: RunState::Paused,
        };
        assert_eq!(event.to_string(), "turn 12: Paused");
    }

    #[test]
    fn test_event_log_entry() {
        let entry = EventLogEntry::new(GolEvent::TurnComplete { completed_turns: 1 });
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"ts\""));
        assert!(json.contains("TurnComplete"));
    }
}
