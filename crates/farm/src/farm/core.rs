use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::dispatcher::PoolHandle;
use crate::metrics::{FarmMetrics, MetricsSnapshot};
use crate::traits::FarmServer;

/// Coarse lifecycle position of a farm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FarmStatus {
    /// No server attached (fresh, or after [`Farm::reset`]).
    Uninitialized,
    /// Server attached, not running.
    Initialized,
    /// Dispatch loop and workers are up and accepting jobs.
    Running,
}

/// A task farm running jobs for the embedder's [`FarmServer`].
///
/// Administrative calls (`init`, `start`, `shutdown`, `reset`) take the
/// exclusive side of one lock and `submit` takes the shared side, so any
/// number of submitters run concurrently but never overlap a transition.
///
/// A farm can be used on its own, for example as a process-wide instance in
/// a `static LazyLock<Farm<MyServer>>`, or provisioned through a
/// [`FarmRegistry`](crate::FarmRegistry).
pub struct Farm<S: FarmServer> {
    pub(crate) state: RwLock<FarmState<S>>,
    pub(crate) metrics: Arc<FarmMetrics>,
}

/// Everything guarded by the farm's state lock.
///
/// `server.is_some()` is "initialized" and `pool.is_some()` is "running".
pub(crate) struct FarmState<S: FarmServer> {
    pub(crate) server: Option<Arc<S>>,
    pub(crate) first_start: bool,
    pub(crate) pool: Option<PoolHandle<S>>,
}

impl<S: FarmServer> Default for FarmState<S> {
    fn default() -> Self {
        Self {
            server: None,
            first_start: false,
            pool: None,
        }
    }
}

impl<S: FarmServer> FarmState<S> {
    pub(crate) fn status(&self) -> FarmStatus {
        match (&self.server, &self.pool) {
            (_, Some(_)) => FarmStatus::Running,
            (Some(_), None) => FarmStatus::Initialized,
            (None, None) => FarmStatus::Uninitialized,
        }
    }
}

impl<S: FarmServer> Farm<S> {
    /// Create an empty, uninitialized farm.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(FarmState::default()),
            metrics: Arc::new(FarmMetrics::default()),
        }
    }

    /// Current lifecycle position.
    pub async fn status(&self) -> FarmStatus {
        self.state.read().await.status()
    }

    /// Whether the farm is accepting jobs.
    pub async fn is_running(&self) -> bool {
        self.status().await == FarmStatus::Running
    }

    /// Snapshot of job counters since the last reset.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl<S: FarmServer> Default for Farm<S> {
    fn default() -> Self {
        Self::new()
    }
}
