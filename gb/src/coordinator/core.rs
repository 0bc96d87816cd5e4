//! Coordinator task - the single writer of World, Turn and RunState
//!
//! Every read and every commit goes through this task's queue, so a control
//! query can never observe a half-merged generation.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::config::CoordinatorConfig;
use super::handle::CoordinatorHandle;
use super::messages::{AliveCount, CoordError, CoordRequest, CoordinatorMetrics, Gate, PauseState, RunSnapshot};
use crate::domain::World;
use crate::events::EventEmitter;

/// Lifecycle of the state cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Finished,
}

/// State owned by the coordinator task
struct StateCell {
    world: Arc<World>,
    turn: u64,
    phase: Phase,
    paused: bool,
    quitting: bool,
    /// Turn loop waiting at a boundary while paused
    parked: Option<oneshot::Sender<Gate>>,
}

impl StateCell {
    fn new() -> Self {
        Self {
            world: Arc::new(World::default()),
            turn: 0,
            phase: Phase::Idle,
            paused: false,
            quitting: false,
            parked: None,
        }
    }

    fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            world: self.world.clone(),
            turn: self.turn,
        }
    }

    fn release_parked(&mut self) {
        if let Some(reply_tx) = self.parked.take() {
            let gate = if self.quitting {
                Gate::Stop(self.snapshot())
            } else {
                Gate::Proceed(self.snapshot())
            };
            let _ = reply_tx.send(gate);
        }
    }
}

/// The Coordinator owns the run state and answers control queries
pub struct Coordinator {
    emitter: EventEmitter,
    tx: mpsc::Sender<CoordRequest>,
    rx: mpsc::Receiver<CoordRequest>,
}

impl Coordinator {
    /// Create a new Coordinator that reports turn completion on `emitter`
    pub fn new(config: &CoordinatorConfig, emitter: EventEmitter) -> Self {
        debug!(channel_buffer = config.channel_buffer, "Coordinator::new: called");
        let (tx, rx) = mpsc::channel(config.channel_buffer);
        Self { emitter, tx, rx }
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(self.tx.clone())
    }

    /// Spawn the coordinator task and return a handle to it
    pub fn spawn(config: &CoordinatorConfig, emitter: EventEmitter) -> CoordinatorHandle {
        let coordinator = Self::new(config, emitter);
        let handle = coordinator.handle();
        tokio::spawn(coordinator.run());
        handle
    }

    /// Run the Coordinator task until shutdown is requested or every handle is dropped
    pub async fn run(self) {
        let Coordinator { emitter, tx, mut rx } = self;
        // Only handles keep the queue open
        drop(tx);

        let mut state = StateCell::new();
        let mut metrics = CoordinatorMetrics::default();

        info!("Coordinator started");

        while let Some(req) = rx.recv().await {
            match req {
                CoordRequest::Begin { world, reply_tx } => {
                    if state.phase == Phase::Running {
                        warn!("Begin rejected: run already in progress");
                        let _ = reply_tx.send(Err(CoordError::AlreadyRunning));
                        continue;
                    }
                    info!(width = world.width(), height = world.height(), "run started");
                    state.world = world;
                    state.turn = 0;
                    state.phase = Phase::Running;
                    state.paused = false;
                    state.quitting = false;
                    metrics.runs_started += 1;
                    let _ = reply_tx.send(Ok(()));
                }

                CoordRequest::Gate { reply_tx } => {
                    if state.phase != Phase::Running || state.quitting {
                        let _ = reply_tx.send(Gate::Stop(state.snapshot()));
                    } else if state.paused {
                        debug!(turn = state.turn, "turn loop parked while paused");
                        state.parked = Some(reply_tx);
                    } else {
                        let _ = reply_tx.send(Gate::Proceed(state.snapshot()));
                    }
                }

                CoordRequest::Commit { world, turn, reply_tx } => {
                    let result = if state.phase != Phase::Running {
                        Err(CoordError::NotRunning)
                    } else if turn != state.turn + 1 {
                        Err(CoordError::TurnOutOfOrder {
                            expected: state.turn + 1,
                            actual: turn,
                        })
                    } else {
                        world
                            .ensure_dimensions(state.world.width(), state.world.height())
                            .map_err(CoordError::from)
                    };
                    if result.is_ok() {
                        state.world = world;
                        state.turn = turn;
                        metrics.turns_committed += 1;
                        emitter.turn_complete(turn);
                    } else {
                        warn!(turn, ?result, "commit rejected");
                    }
                    let _ = reply_tx.send(result);
                }

                CoordRequest::Finish { reply_tx } => {
                    if state.phase == Phase::Running {
                        info!(turn = state.turn, "run finished");
                        state.phase = Phase::Finished;
                    }
                    state.release_parked();
                    let _ = reply_tx.send(state.snapshot());
                }

                CoordRequest::TogglePause { reply_tx } => {
                    state.paused = !state.paused;
                    metrics.pause_toggles += 1;
                    info!(turn = state.turn, paused = state.paused, "pause toggled");
                    if !state.paused {
                        state.release_parked();
                    }
                    let _ = reply_tx.send(PauseState {
                        turn: state.turn,
                        paused: state.paused,
                    });
                }

                CoordRequest::Quit { reply_tx } => {
                    if state.phase == Phase::Running {
                        info!(turn = state.turn, "quit requested");
                        state.quitting = true;
                        state.release_parked();
                    }
                    let _ = reply_tx.send(state.snapshot());
                }

                CoordRequest::Snapshot { reply_tx } => {
                    let _ = reply_tx.send(state.snapshot());
                }

                CoordRequest::AliveCount { reply_tx } => {
                    let _ = reply_tx.send(AliveCount {
                        turn: state.turn,
                        count: state.world.alive_count(),
                    });
                }

                CoordRequest::Record(record) => {
                    metrics.record(record);
                }

                CoordRequest::GetMetrics { reply_tx } => {
                    let _ = reply_tx.send(metrics.clone());
                }

                CoordRequest::Shutdown => {
                    info!("Coordinator shutting down");
                    state.quitting = true;
                    state.release_parked();
                    break;
                }
            }
        }

        info!("Coordinator stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::coordinator::FaultRecord;
    use crate::domain::Coord;
    use crate::events::{GolEvent, create_event_channel};

    fn spawn() -> CoordinatorHandle {
        Coordinator::spawn(&CoordinatorConfig::default(), EventEmitter::disabled())
    }

    fn world() -> Arc<World> {
        Arc::new(World::with_alive(4, 4, &[Coord::new(1, 1), Coord::new(2, 2)]).unwrap())
    }

    #[tokio::test]
    async fn test_begin_gate_commit() {
        let handle = spawn();
        handle.begin(world()).await.unwrap();

        match handle.gate().await.unwrap() {
            Gate::Proceed(snapshot) => assert_eq!(snapshot.turn, 0),
            other => panic!("expected Proceed, got {:?}", other),
        }

        let next = Arc::new(World::new(4, 4).unwrap());
        handle.commit(next.clone(), 1).await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.turn, 1);
        assert_eq!(snapshot.world, next);
    }

    #[tokio::test]
    async fn test_second_begin_rejected() {
        let handle = spawn();
        handle.begin(world()).await.unwrap();
        assert_eq!(handle.begin(world()).await, Err(CoordError::AlreadyRunning));

        handle.finish().await.unwrap();
        assert!(handle.begin(world()).await.is_ok());
    }

    #[tokio::test]
    async fn test_commit_rejects_skipped_turn() {
        let handle = spawn();
        handle.begin(world()).await.unwrap();
        let err = handle.commit(world(), 2).await.unwrap_err();
        assert_eq!(err, CoordError::TurnOutOfOrder { expected: 1, actual: 2 });
        assert_eq!(handle.snapshot().await.unwrap().turn, 0);
    }

    #[tokio::test]
    async fn test_commit_rejects_dimension_change() {
        let handle = spawn();
        handle.begin(world()).await.unwrap();
        let wrong = Arc::new(World::new(4, 5).unwrap());
        assert!(matches!(handle.commit(wrong, 1).await, Err(CoordError::Grid(_))));
    }

    #[tokio::test]
    async fn test_commit_without_run_fails() {
        let handle = spawn();
        assert_eq!(handle.commit(world(), 1).await, Err(CoordError::NotRunning));
    }

    #[tokio::test]
    async fn test_commit_emits_turn_complete() {
        let (emitter, mut rx) = create_event_channel();
        let handle = Coordinator::spawn(&CoordinatorConfig::default(), emitter);
        handle.begin(world()).await.unwrap();
        handle.commit(world(), 1).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), GolEvent::TurnComplete { completed_turns: 1 });
    }

    #[tokio::test]
    async fn test_gate_parks_while_paused() {
        let handle = spawn();
        handle.begin(world()).await.unwrap();
        let paused = handle.toggle_pause().await.unwrap();
        assert_eq!(paused, PauseState { turn: 0, paused: true });

        let gate_handle = handle.clone();
        let gate = tokio::spawn(async move { gate_handle.gate().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!gate.is_finished());
        // Queries are still answered while the loop is parked
        assert_eq!(handle.alive_count().await.unwrap(), AliveCount { turn: 0, count: 2 });

        let resumed = handle.toggle_pause().await.unwrap();
        assert!(!resumed.paused);
        assert!(matches!(gate.await.unwrap().unwrap(), Gate::Proceed(_)));
    }

    #[tokio::test]
    async fn test_quit_releases_parked_gate_with_stop() {
        let handle = spawn();
        handle.begin(world()).await.unwrap();
        handle.toggle_pause().await.unwrap();

        let gate_handle = handle.clone();
        let gate = tokio::spawn(async move { gate_handle.gate().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let snapshot = handle.quit().await.unwrap();
        assert_eq!(snapshot.turn, 0);
        assert!(matches!(gate.await.unwrap().unwrap(), Gate::Stop(_)));
    }

    #[tokio::test]
    async fn test_begin_resets_pause() {
        let handle = spawn();
        handle.toggle_pause().await.unwrap();
        handle.begin(world()).await.unwrap();
        assert!(matches!(handle.gate().await.unwrap(), Gate::Proceed(_)));
    }

    #[tokio::test]
    async fn test_snapshot_and_alive_count_are_idempotent() {
        let handle = spawn();
        handle.begin(world()).await.unwrap();
        assert_eq!(handle.snapshot().await.unwrap(), handle.snapshot().await.unwrap());
        assert_eq!(handle.alive_count().await.unwrap(), handle.alive_count().await.unwrap());
    }

    #[tokio::test]
    async fn test_state_readable_after_finish() {
        let handle = spawn();
        handle.begin(world()).await.unwrap();
        handle.commit(world(), 1).await.unwrap();
        let finished = handle.finish().await.unwrap();
        assert_eq!(finished.turn, 1);
        assert_eq!(handle.alive_count().await.unwrap().turn, 1);
        assert!(matches!(handle.gate().await.unwrap(), Gate::Stop(_)));
    }

    #[tokio::test]
    async fn test_metrics() {
        let handle = spawn();
        handle.begin(world()).await.unwrap();
        handle.commit(world(), 1).await.unwrap();
        handle.toggle_pause().await.unwrap();
        handle.record(FaultRecord::BandComputedLocally).await;

        let metrics = handle.metrics().await.unwrap();
        assert_eq!(metrics.runs_started, 1);
        assert_eq!(metrics.turns_committed, 1);
        assert_eq!(metrics.pause_toggles, 1);
        assert_eq!(metrics.bands_computed_locally, 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_channel() {
        let handle = spawn();
        handle.shutdown().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.snapshot().await, Err(CoordError::ChannelClosed));
    }
}
