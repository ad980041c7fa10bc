use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::FarmConfig;
use crate::dispatcher::{PoolHandle, ShutdownMode};
use crate::error::FarmError;
use crate::traits::FarmServer;

use super::{Farm, FarmState};

impl<S: FarmServer> Farm<S> {
    /// Attach the embedder's server. Allowed once until the next [`reset`](Self::reset).
    pub async fn init(&self, server: impl Into<Arc<S>>) -> Result<(), FarmError> {
        let mut state = self.state.write().await;
        if state.server.is_some() {
            return Err(FarmError::AlreadyInitialized);
        }

        state.server = Some(server.into());
        state.first_start = true;
        debug!("farm initialized");
        Ok(())
    }

    /// Run the server's start hook, then spawn the workers and dispatch loop.
    ///
    /// On any error no worker is left running and the farm is unchanged.
    pub async fn start(&self, config: &FarmConfig) -> Result<(), FarmError> {
        let mut state = self.state.write().await;
        if state.pool.is_some() {
            return Err(FarmError::AlreadyRunning);
        }
        let server = state.server.clone().ok_or(FarmError::NotInitialized)?;
        config.validate()?;

        if let Err(e) = server.start(config, state.first_start).await {
            warn!(farm = %config.name, error = %e, "start hook failed");
            return Err(FarmError::Hook(e));
        }

        state.pool = Some(PoolHandle::launch(
            &config.name,
            config.num_workers,
            server,
            Arc::clone(&self.metrics),
        )?);
        state.first_start = false;
        self.metrics.record_start();

        info!(farm = %config.name, workers = config.num_workers, "farm started");
        Ok(())
    }

    /// Run the server's shutdown hook, then stop the dispatch loop and wait
    /// for every worker to exit.
    ///
    /// If the hook fails the farm keeps running and the call can be retried.
    pub async fn shutdown(&self, mode: ShutdownMode) -> Result<(), FarmError> {
        let mut state = self.state.write().await;
        Self::shutdown_locked(&mut state, mode).await
    }

    /// Shutdown with the state lock already held exclusively.
    pub(crate) async fn shutdown_locked(
        state: &mut FarmState<S>,
        mode: ShutdownMode,
    ) -> Result<(), FarmError> {
        let server = match (&state.server, &state.pool) {
            (Some(server), Some(_)) => Arc::clone(server),
            _ => return Err(FarmError::NotRunning),
        };

        if let Err(e) = server.shutdown().await {
            warn!(?mode, error = %e, "shutdown hook failed, farm keeps running");
            return Err(FarmError::Hook(e));
        }

        if let Some(pool) = state.pool.take() {
            let name = pool.name().to_string();
            pool.stop(mode).await;
            info!(farm = %name, ?mode, "farm stopped");
        }
        Ok(())
    }

    /// Return the farm to its freshly constructed state, dropping the server.
    ///
    /// A running farm is force-stopped first without calling the server's
    /// shutdown hook.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        if let Some(pool) = state.pool.take() {
            warn!(farm = %pool.name(), "resetting a running farm, forcing stop");
            pool.stop(ShutdownMode::Force).await;
        }
        *state = FarmState::default();
        self.metrics.reset();
        debug!("farm reset");
    }
}
