use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

use super::config::{ConfigStore, ThermalConfig};
use super::cores::CoreSet;
use super::latches::SafetyLatches;
use super::limiter::FrequencyLimiter;
use crate::api_client::types::GovernorStatus;
use crate::config::TopologyClass;
use crate::hw::{Platform, PlatformSignals};
use crate::tracing::prelude::*;
use crate::tunables::{Tunable, TunableError};

/// State shared between the control loop and the tunables surface.
///
/// Holds everything that outlives a single tick: the config store, both
/// safety latches, the frequency limiter and the serialized core set.
/// Created once per run and passed around behind an `Arc`.
pub struct GovernorContext {
    latches: Arc<SafetyLatches>,
    config: ConfigStore,
    limiter: Arc<FrequencyLimiter>,
    cores: Arc<CoreSet>,
    signals: Arc<dyn PlatformSignals>,
    core_control: AtomicBool,
    status_tx: watch::Sender<GovernorStatus>,
}

impl GovernorContext {
    pub fn new(topology: Option<TopologyClass>, hardware_max_freq: u32, platform: &Platform) -> Self {
        let latches = Arc::new(SafetyLatches::default());
        let cores = Arc::new(CoreSet::new(platform.hotplug.clone()));
        let limiter = Arc::new(FrequencyLimiter::new(
            hardware_max_freq,
            platform.cpufreq.clone(),
            cores.clone(),
        ));

        let (status_tx, _) = watch::channel(GovernorStatus {
            hardware_max_freq_khz: hardware_max_freq,
            limited_max_freq_khz: hardware_max_freq,
            topology: topology.map(|t| t.to_string()),
            possible_cores: cores.possible_cores(),
            core_control_enabled: true,
            ..Default::default()
        });

        Self {
            config: ConfigStore::new(ThermalConfig::for_topology(topology), latches.clone()),
            latches,
            limiter,
            cores,
            signals: platform.signals.clone(),
            core_control: AtomicBool::new(true),
            status_tx,
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn latches(&self) -> &Arc<SafetyLatches> {
        &self.latches
    }

    pub fn limiter(&self) -> &Arc<FrequencyLimiter> {
        &self.limiter
    }

    pub fn cores(&self) -> &Arc<CoreSet> {
        &self.cores
    }

    pub fn core_control_enabled(&self) -> bool {
        self.core_control.load(Ordering::Acquire)
    }

    /// Turn temperature-driven hotplug on or off.
    ///
    /// Refused either way while another hotplug driver is active.
    /// Disabling brings every possible core online once; the bands stay
    /// idle until re-enabled.
    pub async fn set_core_control(&self, enabled: bool) -> Result<(), TunableError> {
        if self.signals.external_hotplug_active().await {
            return Err(TunableError::Unavailable(
                Tunable::CoreControlEnabled,
                "another hotplug driver is active".into(),
            ));
        }

        if self.core_control.swap(enabled, Ordering::AcqRel) == enabled {
            return Ok(());
        }
        info!(enabled, "Core control toggled");

        if !enabled {
            let brought = self.cores.bring_all_online().await;
            if !brought.is_empty() {
                info!(cores = ?brought, "Woke all cores");
            }
        }

        self.publish(|_| {});
        Ok(())
    }

    pub fn subscribe(&self) -> watch::Receiver<GovernorStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> GovernorStatus {
        self.status_tx.borrow().clone()
    }

    /// Update the published status. Fields owned by this context (latches,
    /// limit, core control) are refreshed on every publish.
    pub fn publish(&self, update: impl FnOnce(&mut GovernorStatus)) {
        self.status_tx.send_modify(|status| {
            update(status);
            status.limited_max_freq_khz = self.limiter.limited_max_freq();
            status.core_control_enabled = self.core_control_enabled();
            status.core0_disable_permanently_denied = self.latches.permission_gate().is_closed();
            status.frequency_table_overridden = self.latches.user_override().is_closed();
        });
    }
}
