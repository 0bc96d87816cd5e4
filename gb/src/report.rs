//! Terminal report of a run's events
//!
//! Consumes the event channel, prints the events a person cares about and
//! optionally hands every event to an [`EventLogger`].

use std::io::Write;

use colored::Colorize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::{EventLogger, GolEvent, RunState};

/// What the reporter saw by the time the channel closed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub final_turn: Option<u64>,
    pub final_alive: usize,
    pub turns_completed: u64,
    pub images: Vec<String>,
}

/// Prints events as they arrive
pub struct Reporter<W: Write + Send> {
    out: W,
    logger: Option<EventLogger>,
}

impl<W: Write + Send> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out, logger: None }
    }

    /// Also persist events
    pub fn with_logger(mut self, logger: EventLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Consume events until every emitter is dropped
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<GolEvent>) -> RunSummary {
        debug!("Reporter::run: called");
        let mut summary = RunSummary::default();
        while let Some(event) = rx.recv().await {
            if let Some(logger) = &mut self.logger
                && let Err(e) = logger.write_event(&event)
            {
                warn!(error = %e, "Reporter: failed to log event");
            }
            if let Err(e) = self.print(&event, &mut summary) {
                warn!(error = %e, "Reporter: failed to print event");
            }
        }
        let _ = self.out.flush();
        summary
    }

    fn print(&mut self, event: &GolEvent, summary: &mut RunSummary) -> std::io::Result<()> {
        match event {
            GolEvent::CellFlipped { .. } => {}
            GolEvent::TurnComplete { completed_turns } => {
                summary.turns_completed = *completed_turns;
            }
            GolEvent::AliveCellsCount {
                completed_turns,
                cells_count,
            } => {
                writeln!(
                    self.out,
                    "{} turn {}: {} cells alive",
                    "●".cyan(),
                    completed_turns,
                    cells_count.to_string().bold()
                )?;
            }
            GolEvent::StateChange {
                completed_turns,
                new_state,
            } => {
                let state = match new_state {
                    RunState::Executing => "Executing".green(),
                    RunState::Paused => "Paused".yellow(),
                    RunState::Quitting => "Quitting".red(),
                };
                writeln!(self.out, "{} turn {}: {}", "◆".blue(), completed_turns, state)?;
            }
            GolEvent::ImageOutputComplete {
                completed_turns,
                filename,
            } => {
                summary.images.push(filename.clone());
                writeln!(self.out, "{} turn {}: wrote {}", "✓".green(), completed_turns, filename)?;
            }
            GolEvent::FinalTurnComplete { completed_turns, alive } => {
                summary.final_turn = Some(*completed_turns);
                summary.final_alive = alive.len();
                writeln!(
                    self.out,
                    "{} finished after {} turns with {} cells alive",
                    "■".bold(),
                    completed_turns.to_string().bold(),
                    alive.len().to_string().bold()
                )?;
            }
        }
        Ok(())
    }
}
