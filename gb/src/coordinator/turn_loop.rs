//! The per-turn fan-out/fan-in
//!
//! ```text
//!   gate ──► registry snapshot ──► bands (cached per generation)
//!              │
//!              ├─► band 0 ─► worker 0 ─┐
//!              ├─► band 1 ─► worker 1 ─┼─► join all ─► recover faults ─► merge ─► commit
//!              └─► band N ─► worker N ─┘
//! ```
//!
//! A turn is committed only once every band has a result of the right shape.
//! Quit and pause take effect at the gate, never inside a turn.

use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::CoordinatorConfig;
use super::handle::CoordinatorHandle;
use super::messages::{CoordError, FaultRecord, Gate, RunSnapshot};
use crate::compute::{BandCompute, ComputeError, LocalLane};
use crate::domain::{Band, BandOutput, GridError, Params, PartitionError, World, partition};
use crate::events::EventEmitter;
use crate::registry::{WorkerHandle, WorkerRegistry};

/// Why a run could not complete
#[derive(Debug, Error)]
pub enum RunError {
    /// No compute capacity at a turn boundary
    #[error("Configuration fault: {0}")]
    Configuration(#[from] PartitionError),

    /// A band could not be computed anywhere
    #[error("Transport fault on band [{}, {}): {source}", .band.start, .band.end)]
    Transport { band: Band, source: ComputeError },

    #[error(transparent)]
    Coordinator(#[from] CoordError),

    #[error(transparent)]
    Grid(#[from] GridError),
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub world: Arc<World>,
    pub turn: u64,
    /// True when Quit or Kill ended the run before all turns were computed
    pub stopped: bool,
}

/// Band layout cached against the registry generation it was computed for
struct Layout {
    generation: u64,
    height: usize,
    bands: Vec<Band>,
}

/// Drives turns through the coordinator using the workers in a registry
pub struct TurnLoop {
    coordinator: CoordinatorHandle,
    registry: WorkerRegistry,
    fallback: LocalLane,
    config: CoordinatorConfig,
}

impl TurnLoop {
    pub fn new(coordinator: CoordinatorHandle, registry: WorkerRegistry, config: CoordinatorConfig) -> Self {
        debug!(?config, "TurnLoop::new: called");
        Self {
            coordinator,
            registry,
            fallback: LocalLane::named("local-fallback", EventEmitter::disabled()),
            config,
        }
    }

    /// Report cell flips of locally recomputed bands on `emitter`
    pub fn with_fallback_emitter(mut self, emitter: EventEmitter) -> Self {
        self.fallback = LocalLane::named("local-fallback", emitter);
        self
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Run `params.turns` turns starting from `world`
    ///
    /// The coordinator is always finished, also when the run fails, so the
    /// last committed world stays readable.
    pub async fn run(&self, world: World, params: &Params) -> Result<RunOutcome, RunError> {
        info!(turns = params.turns, width = world.width(), height = world.height(), "TurnLoop::run: called");
        params.check_world(&world)?;
        self.coordinator.begin(Arc::new(world)).await?;

        let driven = self.drive(params.turns).await;
        let RunSnapshot { world, turn } = self.coordinator.finish().await?;
        let stopped = driven?;
        info!(turn, stopped, "run ended");
        Ok(RunOutcome { world, turn, stopped })
    }

    /// Returns whether the run was stopped early
    async fn drive(&self, turns: u64) -> Result<bool, RunError> {
        let mut layout: Option<Layout> = None;
        loop {
            let RunSnapshot { world, turn } = match self.coordinator.gate().await? {
                Gate::Proceed(snapshot) => snapshot,
                Gate::Stop(snapshot) => {
                    info!(turn = snapshot.turn, "run stopped at turn boundary");
                    return Ok(true);
                }
            };
            if turn >= turns {
                return Ok(false);
            }
            let next = self.step(&world, turn + 1, &mut layout).await?;
            self.coordinator.commit(Arc::new(next), turn + 1).await?;
        }
    }

    /// Compute turn `turn` from `world` across the registered workers
    async fn step(&self, world: &Arc<World>, turn: u64, layout: &mut Option<Layout>) -> Result<World, RunError> {
        debug!(turn, "TurnLoop::step: called");
        let snapshot = self.registry.snapshot().await;
        let bands = match layout {
            Some(cached) if cached.generation == snapshot.generation && cached.height == world.height() => {
                cached.bands.clone()
            }
            _ => {
                let bands = partition(world.height(), snapshot.workers.len())?;
                info!(generation = snapshot.generation, workers = bands.len(), "bands recomputed");
                *layout = Some(Layout {
                    generation: snapshot.generation,
                    height: world.height(),
                    bands: bands.clone(),
                });
                bands
            }
        };

        let band_timeout = self.config.band_timeout();
        let tasks = bands.iter().zip(&snapshot.workers).map(|(band, worker)| {
            let band = *band;
            let client = worker.client.clone();
            let slice = (!band.is_empty()).then(|| world.halo_slice(band));
            tokio::spawn(async move {
                match slice {
                    None => Ok(BandOutput { band, cells: Vec::new() }),
                    Some(slice) => call_with_timeout(client.as_ref(), slice, turn, band_timeout).await,
                }
            })
        });
        let results = join_all(tasks).await;

        let mut failed: Vec<Uuid> = Vec::new();
        let mut outputs = Vec::with_capacity(bands.len());
        for ((band, worker), joined) in bands.iter().zip(&snapshot.workers).zip(results) {
            let result = joined
                .map_err(|e| ComputeError::Task(e.to_string()))
                .and_then(|r| r)
                .and_then(|output| check_shape(output, *band, world.width(), &worker.address));
            match result {
                Ok(output) => outputs.push(output.cells),
                Err(e) => {
                    warn!(turn, start = band.start, end = band.end, worker = %worker.address, error = %e, "band failed");
                    self.drop_worker(worker, &mut failed).await;
                    let output = self.recover(world, *band, turn, e, &mut failed).await?;
                    outputs.push(output.cells);
                }
            }
        }

        Ok(World::from_bands(world.width(), world.height(), outputs)?)
    }

    async fn drop_worker(&self, worker: &WorkerHandle, failed: &mut Vec<Uuid>) {
        failed.push(worker.id);
        if self.registry.remove(worker.id).await.is_some() {
            self.coordinator.record(FaultRecord::WorkerRemoved).await;
        }
    }

    /// Recompute a failed band on another live worker, then locally
    async fn recover(
        &self,
        world: &World,
        band: Band,
        turn: u64,
        mut last_error: ComputeError,
        failed: &mut Vec<Uuid>,
    ) -> Result<BandOutput, RunError> {
        debug!(turn, start = band.start, end = band.end, "TurnLoop::recover: called");
        let band_timeout = self.config.band_timeout();
        let candidates: Vec<WorkerHandle> = self
            .registry
            .snapshot()
            .await
            .workers
            .into_iter()
            .filter(|w| !failed.contains(&w.id))
            .take(self.config.max_redispatch)
            .collect();

        for worker in candidates {
            let result = call_with_timeout(worker.client.as_ref(), world.halo_slice(band), turn, band_timeout)
                .await
                .and_then(|output| check_shape(output, band, world.width(), &worker.address));
            match result {
                Ok(output) => {
                    info!(turn, start = band.start, worker = %worker.address, "band redispatched");
                    self.coordinator.record(FaultRecord::BandRedispatched).await;
                    return Ok(output);
                }
                Err(e) => {
                    warn!(turn, worker = %worker.address, error = %e, "redispatch failed");
                    self.drop_worker(&worker, failed).await;
                    last_error = e;
                }
            }
        }

        if !self.config.local_fallback {
            return Err(RunError::Transport {
                band,
                source: last_error,
            });
        }
        let output = self
            .fallback
            .compute_band(world.halo_slice(band), turn)
            .await
            .map_err(|source| RunError::Transport { band, source })?;
        info!(turn, start = band.start, end = band.end, "band computed locally");
        self.coordinator.record(FaultRecord::BandComputedLocally).await;
        Ok(output)
    }
}

async fn call_with_timeout(
    client: &dyn BandCompute,
    slice: crate::domain::BandSlice,
    turn: u64,
    band_timeout: std::time::Duration,
) -> Result<BandOutput, ComputeError> {
    match timeout(band_timeout, client.compute_band(slice, turn)).await {
        Ok(result) => result,
        Err(_) => Err(ComputeError::Timeout {
            endpoint: client.endpoint(),
            timeout: band_timeout,
        }),
    }
}

fn check_shape(output: BandOutput, band: Band, width: usize, endpoint: &str) -> Result<BandOutput, ComputeError> {
    if output.fits(band, width) {
        Ok(output)
    } else {
        Err(ComputeError::Malformed {
            endpoint: endpoint.to_string(),
            message: format!(
                "expected band [{}, {}) with {} cells, got [{}, {}) with {}",
                band.start,
                band.end,
                band.len() * width,
                output.band.start,
                output.band.end,
                output.cells.len()
            ),
        })
    }
}
