//! WorkerRegistry - the live set of compute endpoints
//!
//! Guarded separately from the coordinator's world state: subscribing a worker
//! never waits on a turn, and a control query never waits on a subscription.
//! Every mutation bumps a generation counter so the turn loop knows when its
//! cached band layout is stale.

use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::compute::BandCompute;

/// A registered compute endpoint, local or remote
#[derive(Clone)]
pub struct WorkerHandle {
    pub id: Uuid,
    pub address: String,
    pub client: Arc<dyn BandCompute>,
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("address", &self.address)
            .finish()
    }
}

/// The registry as seen at one turn boundary
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub generation: u64,
    pub workers: Vec<WorkerHandle>,
}

#[derive(Default)]
struct Inner {
    workers: Vec<WorkerHandle>,
    generation: u64,
}

/// Shared, cloneable registry of workers in subscription order
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        debug!("WorkerRegistry::new: called");
        Self::default()
    }

    /// Build a registry pre-filled with local lanes
    pub async fn with_lanes<C>(lanes: Vec<C>) -> Self
    where
        C: BandCompute + 'static,
    {
        let registry = Self::new();
        for lane in lanes {
            let address = lane.endpoint();
            registry.register(address, Arc::new(lane)).await;
        }
        registry
    }

    /// Add a worker; it takes part from the next turn boundary on
    pub async fn register(&self, address: impl Into<String>, client: Arc<dyn BandCompute>) -> Uuid {
        let address = address.into();
        debug!(%address, "WorkerRegistry::register: called");
        let id = Uuid::now_v7();
        let mut inner = self.inner.write().await;
        inner.workers.push(WorkerHandle {
            id,
            address: address.clone(),
            client,
        });
        inner.generation += 1;
        info!(%id, %address, workers = inner.workers.len(), "worker registered");
        id
    }

    /// Remove a worker, returning it if it was present
    pub async fn remove(&self, id: Uuid) -> Option<WorkerHandle> {
        debug!(%id, "WorkerRegistry::remove: called");
        let mut inner = self.inner.write().await;
        let pos = inner.workers.iter().position(|w| w.id == id)?;
        let handle = inner.workers.remove(pos);
        inner.generation += 1;
        info!(%id, address = %handle.address, workers = inner.workers.len(), "worker removed");
        Some(handle)
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        let inner = self.inner.read().await;
        RegistrySnapshot {
            generation: inner.generation,
            workers: inner.workers.clone(),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.workers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.workers.is_empty()
    }

    pub async fn generation(&self) -> u64 {
        self.inner.read().await.generation
    }

    /// Send terminate to every worker and empty the registry
    ///
    /// Returns how many workers acknowledged.
    pub async fn terminate_all(&self) -> usize {
        debug!("WorkerRegistry::terminate_all: called");
        let workers = {
            let mut inner = self.inner.write().await;
            inner.generation += 1;
            std::mem::take(&mut inner.workers)
        };
        let results = futures::future::join_all(workers.iter().map(|w| w.client.terminate())).await;
        let mut acknowledged = 0;
        for (worker, result) in workers.iter().zip(results) {
            match result {
                Ok(()) => acknowledged += 1,
                Err(e) => warn!(id = %worker.id, address = %worker.address, error = %e, "terminate failed"),
            }
        }
        info!(acknowledged, total = workers.len(), "workers terminated");
        acknowledged
    }
}
