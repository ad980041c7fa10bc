//! Provisioning of independent farms that share one server type.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::dispatcher::ShutdownMode;
use crate::error::FarmError;
use crate::farm::Farm;
use crate::traits::FarmServer;

/// Stable identity of a provisioned farm. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FarmId(Uuid);

impl FarmId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FarmId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Caller's handle to a farm handed out by [`FarmRegistry::provision`].
///
/// Derefs to [`Farm`], so the handle is used exactly like a standalone farm.
pub struct FarmHandle<S: FarmServer> {
    id: FarmId,
    farm: Arc<Farm<S>>,
}

impl<S: FarmServer> FarmHandle<S> {
    pub fn id(&self) -> FarmId {
        self.id
    }
}

impl<S: FarmServer> Clone for FarmHandle<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            farm: Arc::clone(&self.farm),
        }
    }
}

impl<S: FarmServer> Deref for FarmHandle<S> {
    type Target = Farm<S>;

    fn deref(&self) -> &Farm<S> {
        &self.farm
    }
}

impl<S: FarmServer> fmt::Debug for FarmHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FarmHandle").field("id", &self.id).finish()
    }
}

/// Tracks every provisioned farm, in provision order.
pub struct FarmRegistry<S: FarmServer> {
    farms: Mutex<IndexMap<FarmId, Arc<Farm<S>>>>,
}

impl<S: FarmServer> FarmRegistry<S> {
    pub fn new() -> Self {
        Self {
            farms: Mutex::new(IndexMap::new()),
        }
    }

    /// Create a fresh, uninitialized farm and track it.
    pub async fn provision(&self) -> FarmHandle<S> {
        let id = FarmId::new();
        let farm = Arc::new(Farm::new());
        let mut farms = self.farms.lock().await;
        farms.insert(id, Arc::clone(&farm));
        info!(farm_id = %id, total = farms.len(), "farm provisioned");
        FarmHandle { id, farm }
    }

    /// Stop the farm if it is running and forget it.
    ///
    /// A farm that is merely initialized, or never initialized, is removed
    /// without calling any hook. If the shutdown hook fails the farm stays
    /// registered and running, and the error is returned.
    ///
    /// Only the farm's own state lock is held while it drains; the registry
    /// stays available to other farms. Lock order is farm state, then registry.
    pub async fn decommission(
        &self,
        handle: &FarmHandle<S>,
        mode: ShutdownMode,
    ) -> Result<(), FarmError> {
        if !self.farms.lock().await.contains_key(&handle.id) {
            return Err(FarmError::UnknownFarm(handle.id));
        }

        let mut state = handle.farm.state.write().await;
        if state.pool.is_some() {
            Farm::shutdown_locked(&mut state, mode).await?;
        }

        let mut farms = self.farms.lock().await;
        // A concurrent decommission of the same farm may have won the race.
        if farms.shift_remove(&handle.id).is_none() {
            return Err(FarmError::UnknownFarm(handle.id));
        }
        info!(farm_id = %handle.id, ?mode, remaining = farms.len(), "farm decommissioned");
        Ok(())
    }

    /// Look up a tracked farm.
    pub async fn get(&self, id: FarmId) -> Option<FarmHandle<S>> {
        let farms = self.farms.lock().await;
        farms.get(&id).map(|farm| FarmHandle {
            id,
            farm: Arc::clone(farm),
        })
    }

    /// Ids of tracked farms in provision order.
    pub async fn ids(&self) -> Vec<FarmId> {
        self.farms.lock().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.farms.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.farms.lock().await.is_empty()
    }
}

impl<S: FarmServer> Default for FarmRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
