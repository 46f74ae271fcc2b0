use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard};

use crate::hw::{CpuHotplug, Result};
use crate::tracing::prelude::*;

/// Serialized view of which cores are online.
///
/// Hotplug operations take the write side; iterating the online set takes
/// the read side and holds it until the [`OnlineView`] is dropped, so the
/// set can't change mid-iteration.
pub struct CoreSet {
    hotplug: Arc<dyn CpuHotplug>,
    lock: RwLock<()>,
}

/// Online cores at the time the view was taken, in index order.
pub struct OnlineView<'a> {
    _guard: RwLockReadGuard<'a, ()>,
    cores: Vec<usize>,
}

impl OnlineView<'_> {
    pub fn cores(&self) -> &[usize] {
        &self.cores
    }
}

impl CoreSet {
    pub fn new(hotplug: Arc<dyn CpuHotplug>) -> Self {
        Self {
            hotplug,
            lock: RwLock::new(()),
        }
    }

    pub fn possible_cores(&self) -> usize {
        self.hotplug.possible_cores()
    }

    pub async fn is_online(&self, core: usize) -> Result<bool> {
        let _guard = self.lock.read().await;
        self.hotplug.is_online(core).await
    }

    /// Lock the set and list the online cores.
    ///
    /// A core whose state can't be read is left out.
    pub async fn online(&self) -> OnlineView<'_> {
        let guard = self.lock.read().await;
        let mut cores = Vec::with_capacity(self.possible_cores());
        for core in 0..self.possible_cores() {
            match self.hotplug.is_online(core).await {
                Ok(true) => cores.push(core),
                Ok(false) => {}
                Err(e) => warn!(core, error = %e, "Failed to read core state"),
            }
        }
        OnlineView {
            _guard: guard,
            cores,
        }
    }

    /// Bring `core` online if it isn't. Returns whether it changed.
    pub async fn ensure_online(&self, core: usize) -> Result<bool> {
        let _guard = self.lock.write().await;
        if self.hotplug.is_online(core).await? {
            return Ok(false);
        }
        self.hotplug.bring_online(core).await?;
        Ok(true)
    }

    /// Take `core` offline if it isn't. Returns whether it changed.
    pub async fn ensure_offline(&self, core: usize) -> Result<bool> {
        let _guard = self.lock.write().await;
        if !self.hotplug.is_online(core).await? {
            return Ok(false);
        }
        self.hotplug.take_offline(core).await?;
        Ok(true)
    }

    /// Bring every possible core online. Failures are logged and skipped.
    ///
    /// Returns the cores that were brought up.
    pub async fn bring_all_online(&self) -> Vec<usize> {
        let mut brought = Vec::new();
        for core in 0..self.possible_cores() {
            match self.ensure_online(core).await {
                Ok(true) => brought.push(core),
                Ok(false) => {}
                Err(e) => warn!(core, error = %e, "Failed to bring core online"),
            }
        }
        brought
    }
}
