//! Distributor - the client side of a run
//!
//! Loads the input image, runs the simulation on a broker or in-process,
//! reports the live cell count on a timer, applies key commands, and writes
//! the final image.
//!
//! ```text
//!   GridStore ──► Distributor ──► Backend (broker RPC | local turn loop)
//!                    ▲   │
//!        KeyCommand ─┘   └──► EventEmitter ──► Reporter
//! ```

use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result, eyre};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::compute::LocalLane;
use crate::config::RunConfig;
use crate::control::ControlPlane;
use crate::coordinator::{Coordinator, CoordinatorConfig, CoordinatorHandle, RunSnapshot, TurnLoop};
use crate::domain::{Params, World};
use crate::events::{EventEmitter, RunState};
use crate::gridio::GridStore;
use crate::keys::KeyCommand;
use crate::registry::WorkerRegistry;
use crate::rpc::BrokerClient;

/// Environment variable forcing in-process runs
pub const BROKER_DISABLED_ENV: &str = "BROKER_DISABLED";

/// How long a run gets to stop after a failed key command before it is aborted
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Where the turns are computed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// In-process lanes
    Local,
    /// A broker at this address
    Broker(String),
}

/// Pick the run mode: local when disabled by config or environment, or when
/// the broker does not answer a ping
pub async fn select_mode(config: &RunConfig) -> Mode {
    debug!(broker = %config.broker, "select_mode: called");
    let env_disabled = std::env::var(BROKER_DISABLED_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("true"));
    if config.broker_disabled || env_disabled {
        info!("broker disabled, running locally");
        return Mode::Local;
    }
    let client = BrokerClient::new(config.broker.clone()).with_timeout(config.connect_timeout());
    match client.ping().await {
        Ok(version) => {
            info!(broker = %config.broker, %version, "broker reachable");
            Mode::Broker(config.broker.clone())
        }
        Err(e) => {
            warn!(broker = %config.broker, error = %e, "broker unreachable, running locally");
            Mode::Local
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub turn: u64,
    pub alive: usize,
    pub image: String,
}

/// A started run: something to steer it with and something to await
struct Backend {
    control: Arc<dyn ControlPlane>,
    run: JoinHandle<Result<RunSnapshot>>,
    coordinator: Option<CoordinatorHandle>,
}

impl Backend {
    /// Quit the run, wait for it to end and shut down the local coordinator
    async fn stop(&mut self) {
        debug!("Backend::stop: called");
        if let Err(e) = self.control.quit().await {
            warn!(error = %e, "quit failed while stopping the run");
        }
        if tokio::time::timeout(STOP_GRACE, &mut self.run).await.is_err() {
            warn!("run did not stop after quit, aborting it");
            self.run.abort();
            let _ = (&mut self.run).await;
        }
        if let Some(coordinator) = self.coordinator.take() {
            let _ = coordinator.shutdown().await;
        }
    }
}

/// How the session loop ended
enum Ended {
    Run(Result<RunSnapshot>),
    Aborted(eyre::Report),
}

/// One run of the simulation from the client's side
pub struct Distributor<S: GridStore> {
    params: Params,
    store: S,
    emitter: EventEmitter,
    report_interval: Duration,
    coordinator_config: CoordinatorConfig,
}

impl<S: GridStore> Distributor<S> {
    pub fn new(params: Params, store: S, emitter: EventEmitter) -> Self {
        Self {
            params,
            store,
            emitter,
            report_interval: Duration::from_secs(2),
            coordinator_config: CoordinatorConfig::default(),
        }
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn with_coordinator_config(mut self, config: CoordinatorConfig) -> Self {
        self.coordinator_config = config;
        self
    }

    /// Run to completion, quit or kill
    ///
    /// The event channel is closed when this returns, also on error.
    pub async fn run(self, mode: Mode, mut keys: mpsc::Receiver<KeyCommand>) -> Result<SessionOutcome> {
        let params = self.params;
        info!(?mode, turns = params.turns, width = params.image_width, height = params.image_height, "Distributor::run: called");

        let world = self
            .store
            .read_grid(&params.input_name(), params.image_width, params.image_height)
            .context("Failed to read input image")?;
        for cell in world.alive_cells() {
            self.emitter.cell_flipped(0, cell);
        }

        let mut backend = self.start(mode, world).await;
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.report_interval,
            self.report_interval,
        );
        let mut keys_open = true;
        let mut stop_state: Option<RunSnapshot> = None;

        let ended = loop {
            tokio::select! {
                result = &mut backend.run => {
                    break Ended::Run(result.map_err(|e| eyre!("Run task failed: {}", e)).and_then(|r| r));
                }

                _ = ticker.tick() => {
                    match backend.control.alive_count().await {
                        Ok(count) => self.emitter.alive_cells_count(count.turn, count.count),
                        Err(e) => warn!(error = %e, "alive count failed"),
                    }
                }

                key = keys.recv(), if keys_open => {
                    match key {
                        Some(command) => match self.apply(command, backend.control.as_ref()).await {
                            Ok(Some(state)) => stop_state = Some(state),
                            Ok(None) => {}
                            Err(e) => break Ended::Aborted(e),
                        },
                        None => keys_open = false,
                    }
                }
            }
        };

        let finished = match ended {
            Ended::Run(result) => result,
            Ended::Aborted(e) => {
                warn!(error = %e, "key command failed, stopping the run");
                backend.stop().await;
                return Err(e);
            }
        };

        if let Some(coordinator) = backend.coordinator.take() {
            let _ = coordinator.shutdown().await;
        }

        // A killed broker may go away before answering RunTurns
        let final_state = match (finished, stop_state) {
            (Ok(state), _) => state,
            (Err(e), Some(state)) => {
                warn!(error = %e, "run ended without a result, using the state from quit");
                state
            }
            (Err(e), None) => return Err(e),
        };
        self.finish(final_state)
    }

    async fn start(&self, mode: Mode, world: World) -> Backend {
        let params = self.params;
        match mode {
            Mode::Local => {
                let coordinator = Coordinator::spawn(&self.coordinator_config, self.emitter.clone());
                let lanes = LocalLane::pool(params.threads, &self.emitter);
                let registry = WorkerRegistry::with_lanes(lanes).await;
                let turn_loop = TurnLoop::new(coordinator.clone(), registry, self.coordinator_config.clone())
                    .with_fallback_emitter(self.emitter.clone());
                let run = tokio::spawn(async move {
                    let outcome = turn_loop.run(world, &params).await?;
                    Ok(RunSnapshot {
                        world: outcome.world,
                        turn: outcome.turn,
                    })
                });
                Backend {
                    control: Arc::new(coordinator.clone()),
                    run,
                    coordinator: Some(coordinator),
                }
            }
            Mode::Broker(address) => {
                let client = BrokerClient::new(address);
                let runner = client.clone();
                let run = tokio::spawn(async move {
                    let (world, turn) = runner.run_turns(world, params).await?;
                    Ok(RunSnapshot {
                        world: Arc::new(world),
                        turn,
                    })
                });
                Backend {
                    control: Arc::new(client),
                    run,
                    coordinator: None,
                }
            }
        }
    }

    /// Apply one key command; returns the state answered by quit or kill
    async fn apply(&self, command: KeyCommand, control: &dyn ControlPlane) -> Result<Option<RunSnapshot>> {
        debug!(?command, "Distributor::apply: called");
        match command {
            KeyCommand::Snapshot => {
                let snapshot = control.snapshot().await?;
                self.write_image(&snapshot)?;
                Ok(None)
            }
            KeyCommand::Pause => {
                let state = control.toggle_pause().await?;
                let new_state = if state.paused {
                    RunState::Paused
                } else {
                    RunState::Executing
                };
                self.emitter.state_change(state.turn, new_state);
                Ok(None)
            }
            KeyCommand::Quit => Ok(Some(control.quit().await?)),
            KeyCommand::Kill => Ok(Some(control.kill().await?)),
        }
    }

    fn write_image(&self, snapshot: &RunSnapshot) -> Result<String> {
        let name = self.params.output_name(snapshot.turn);
        self.store
            .write_grid(&name, &snapshot.world)
            .with_context(|| format!("Failed to write image {}", name))?;
        self.emitter.image_output_complete(snapshot.turn, name.clone());
        Ok(name)
    }

    /// Final events and output, then close the channel
    fn finish(self, state: RunSnapshot) -> Result<SessionOutcome> {
        let alive = state.world.alive_cells();
        self.emitter.final_turn_complete(state.turn, alive.clone());
        let image = self.write_image(&state)?;
        self.emitter.state_change(state.turn, RunState::Quitting);
        info!(turn = state.turn, alive = alive.len(), "session finished");
        Ok(SessionOutcome {
            turn: state.turn,
            alive: alive.len(),
            image,
        })
    }
}
