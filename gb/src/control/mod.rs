//! ControlPlane - operations that inspect or steer a run
//!
//! Implemented by [`CoordinatorHandle`] for a run in this process and by the
//! broker RPC client for a run on a broker, so the distributor drives both the
//! same way.

use async_trait::async_trait;
use eyre::Result;
use tracing::debug;

use crate::coordinator::{AliveCount, CoordinatorHandle, PauseState, RunSnapshot};

/// Control operations; all of them are safe while a turn is in flight
///
/// Pause and resume are one toggle: calling it twice restores the original mode.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Flip between executing and paused
    async fn toggle_pause(&self) -> Result<PauseState>;

    /// Stop the run at the next turn boundary
    async fn quit(&self) -> Result<RunSnapshot>;

    /// Quit and terminate every worker
    async fn kill(&self) -> Result<RunSnapshot>;

    /// Last committed world and turn
    async fn snapshot(&self) -> Result<RunSnapshot>;

    /// Live cells in the last committed world
    async fn alive_count(&self) -> Result<AliveCount>;
}

#[async_trait]
impl ControlPlane for CoordinatorHandle {
    async fn toggle_pause(&self) -> Result<PauseState> {
        Ok(CoordinatorHandle::toggle_pause(self).await?)
    }

    async fn quit(&self) -> Result<RunSnapshot> {
        Ok(CoordinatorHandle::quit(self).await?)
    }

    /// In-process lanes have nothing to terminate, so this is a quit
    async fn kill(&self) -> Result<RunSnapshot> {
        debug!("ControlPlane::kill: local run, quitting");
        Ok(CoordinatorHandle::quit(self).await?)
    }

    async fn snapshot(&self) -> Result<RunSnapshot> {
        Ok(CoordinatorHandle::snapshot(self).await?)
    }

    async fn alive_count(&self) -> Result<AliveCount> {
        Ok(CoordinatorHandle::alive_count(self).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::coordinator::{Coordinator, CoordinatorConfig};
    use crate::domain::World;
    use crate::events::EventEmitter;

    #[tokio::test]
    async fn test_coordinator_handle_as_control_plane() {
        let handle = Coordinator::spawn(&CoordinatorConfig::default(), EventEmitter::disabled());
        handle.begin(Arc::new(World::new(3, 3).unwrap())).await.unwrap();
        let control: Box<dyn ControlPlane> = Box::new(handle);

        let paused = control.toggle_pause().await.unwrap();
        assert!(paused.paused);
        let resumed = control.toggle_pause().await.unwrap();
        assert!(!resumed.paused);

        assert_eq!(control.alive_count().await.unwrap().count, 0);
        let killed = control.kill().await.unwrap();
        assert_eq!(killed.turn, 0);
        assert_eq!(killed.world.width(), 3);
    }
}
