//! Event Logger - persists events to a JSONL file
//!
//! Consumes the event channel and appends one timestamped JSON line per event.
//! Cell flips are skipped unless asked for; on a large grid they dwarf
//! everything else.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::types::{EventLogEntry, GolEvent};

/// Event logger that writes events to a JSONL file
pub struct EventLogger {
    path: PathBuf,
    writer: BufWriter<File>,
    include_flips: bool,
}

impl EventLogger {
    /// Open (or create) the log file at `path` for appending
    pub fn open(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "EventLogger::open: called");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            include_flips: false,
        })
    }

    /// Also record `CellFlipped` events
    pub fn with_flips(mut self, include_flips: bool) -> Self {
        self.include_flips = include_flips;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event
    pub fn write_event(&mut self, event: &GolEvent) -> eyre::Result<()> {
        if !self.include_flips && matches!(event, GolEvent::CellFlipped { .. }) {
            return Ok(());
        }
        let entry = EventLogEntry::new(event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(self.writer, "{}", json)?;
        // Final events close a run; make sure they hit the disk
        if matches!(event, GolEvent::FinalTurnComplete { .. } | GolEvent::StateChange { .. }) {
            self.writer.flush()?;
        }
        Ok(())
    }

    /// Run the logger until every emitter is dropped
    ///
    /// This is meant to be spawned as a background task.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<GolEvent>) {
        debug!(path = ?self.path, "EventLogger::run: starting event logger");
        while let Some(event) = rx.recv().await {
            match &event {
                GolEvent::CellFlipped { .. } => {}
                GolEvent::TurnComplete { completed_turns } => debug!(completed_turns, "turn complete"),
                other => info!(event = %other, "run event"),
            }
            if let Err(e) = self.write_event(&event) {
                error!(error = %e, "EventLogger: failed to write event");
            }
        }
        debug!("EventLogger: channel closed, shutting down");
        if let Err(e) = self.writer.flush() {
            warn!(error = %e, "EventLogger: failed to flush on shutdown");
        }
    }
}

/// Read events back from a JSONL log
pub fn read_events(path: impl AsRef<Path>) -> eyre::Result<Vec<EventLogEntry>> {
    let path = path.as_ref();
    debug!(?path, "read_events: reading log file");

    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(line, error = %e, "read_events: failed to parse line");
            }
        }
    }

    debug!(count = entries.len(), "read_events: loaded entries");
    Ok(entries)
}

/// Spawn an event logger writing to `path` as a background task
pub fn spawn_event_logger(
    path: impl AsRef<Path>,
    rx: mpsc::UnboundedReceiver<GolEvent>,
) -> eyre::Result<tokio::task::JoinHandle<()>> {
    let logger = EventLogger::open(path)?;
    Ok(tokio::spawn(logger.run(rx)))
}
