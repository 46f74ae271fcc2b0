//! Temperature-driven core hotplug.
//!
//! Each tick first runs core-0 recovery, then (when core control is
//! enabled) picks the band matching the temperature and walks its steps.
//! Bands bring needed cores up before taking others down so the system
//! never momentarily runs with no active core.
//!
//! Octa (big.LITTLE, cores 0-7):
//!
//! | Band     | Condition      | Steps                              |
//! |----------|----------------|------------------------------------|
//! | critical | t > 80         | down 3,2,1,(0),7,6                 |
//! | hot      | 55 < t <= 65   | up 6,7; down 3,2,1,(0)             |
//! | warm     | 45 < t <= 50   | up 0,1; down 3,2                   |
//! | recovery | t == 40        | up every offline core              |
//!
//! Quad (cores 0-3):
//!
//! | Band     | Condition      | Steps                              |
//! |----------|----------------|------------------------------------|
//! | critical | t > 80         | down 3,2,1                         |
//! | hot      | 70 < t <= 75   | up 1; down 3,2                     |
//! | warm     | 60 < t <= 65   | up 2; down 3                       |
//! | recovery | t == 55        | up every offline core              |
//!
//! `(0)` is taken down only while the platform permits disabling core 0
//! automatically and the user has not overridden the frequency table.
//! Temperatures outside every band leave the core set untouched; the
//! recovery bands match a single value.

use std::sync::Arc;

use super::cores::CoreSet;
use super::latches::SafetyLatches;
use crate::config::TopologyClass;
use crate::hw::PlatformSignals;
use crate::tracing::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BandCondition {
    Above(i32),
    /// `above < t <= up_to`
    Within { above: i32, up_to: i32 },
    Exactly(i32),
}

impl BandCondition {
    fn matches(self, temp: i32) -> bool {
        match self {
            BandCondition::Above(limit) => temp > limit,
            BandCondition::Within { above, up_to } => temp > above && temp <= up_to,
            BandCondition::Exactly(value) => temp == value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Online(usize),
    Offline(usize),
    /// Core 0, subject to the platform signal and the user override.
    OfflineCore0IfPermitted,
    OnlineAll,
}

#[derive(Debug)]
pub struct Band {
    pub name: &'static str,
    condition: BandCondition,
    steps: &'static [Step],
}

use BandCondition::{Above, Exactly, Within};
use Step::{Offline, OfflineCore0IfPermitted, Online, OnlineAll};

const OCTA_BANDS: &[Band] = &[
    Band {
        name: "critical",
        condition: Above(80),
        steps: &[
            Offline(3),
            Offline(2),
            Offline(1),
            OfflineCore0IfPermitted,
            Offline(7),
            Offline(6),
        ],
    },
    Band {
        name: "hot",
        condition: Within { above: 55, up_to: 65 },
        steps: &[
            Online(6),
            Online(7),
            Offline(3),
            Offline(2),
            Offline(1),
            OfflineCore0IfPermitted,
        ],
    },
    Band {
        name: "warm",
        condition: Within { above: 45, up_to: 50 },
        steps: &[Online(0), Online(1), Offline(3), Offline(2)],
    },
    Band {
        name: "recovery",
        condition: Exactly(40),
        steps: &[OnlineAll],
    },
];

const QUAD_BANDS: &[Band] = &[
    Band {
        name: "critical",
        condition: Above(80),
        steps: &[Offline(3), Offline(2), Offline(1)],
    },
    Band {
        name: "hot",
        condition: Within { above: 70, up_to: 75 },
        steps: &[Online(1), Offline(3), Offline(2)],
    },
    Band {
        name: "warm",
        condition: Within { above: 60, up_to: 65 },
        steps: &[Online(2), Offline(3)],
    },
    Band {
        name: "recovery",
        condition: Exactly(55),
        steps: &[OnlineAll],
    },
];

fn bands_for(topology: Option<TopologyClass>) -> &'static [Band] {
    match topology {
        Some(TopologyClass::Octa) => OCTA_BANDS,
        Some(TopologyClass::Quad) => QUAD_BANDS,
        None => &[],
    }
}

/// Band matching `temp`, if any.
pub fn select_band(topology: Option<TopologyClass>, temp: i32) -> Option<&'static Band> {
    bands_for(topology)
        .iter()
        .find(|band| band.condition.matches(temp))
}

/// Core transitions performed during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HotplugReport {
    pub band: Option<&'static str>,
    pub core0_recovered: bool,
    pub brought_online: Vec<usize>,
    pub taken_offline: Vec<usize>,
}

pub struct HotplugController {
    topology: Option<TopologyClass>,
    cores: Arc<CoreSet>,
    latches: Arc<SafetyLatches>,
    signals: Arc<dyn PlatformSignals>,
    last_band: Option<&'static str>,
}

impl HotplugController {
    pub fn new(
        topology: Option<TopologyClass>,
        cores: Arc<CoreSet>,
        latches: Arc<SafetyLatches>,
        signals: Arc<dyn PlatformSignals>,
    ) -> Self {
        Self {
            topology,
            cores,
            latches,
            signals,
            last_band: None,
        }
    }

    /// Run core-0 recovery, then the band for `temp` when `core_control`
    /// is enabled.
    ///
    /// A failed core toggle is logged and skipped; the next tick
    /// re-evaluates the band and retries naturally.
    pub async fn tick(&mut self, temp: i32, core_control: bool) -> HotplugReport {
        let mut report = HotplugReport {
            core0_recovered: self.recover_core0().await,
            ..Default::default()
        };

        if !core_control {
            self.last_band = None;
            return report;
        }

        let band = select_band(self.topology, temp);
        let band_name = band.map(|b| b.name);
        if band_name != self.last_band && band_name.is_some() {
            info!(band = band_name, temp_c = temp, "Hotplug band entered");
        }
        self.last_band = band_name;
        report.band = band_name;

        let Some(band) = band else {
            return report;
        };

        for step in band.steps {
            self.execute(*step, &mut report).await;
        }

        if !report.brought_online.is_empty() || !report.taken_offline.is_empty() {
            debug!(
                band = band.name,
                temp_c = temp,
                online = ?report.brought_online,
                offline = ?report.taken_offline,
                "Hotplug tick"
            );
        }

        report
    }

    /// Latch the permission gate if core 0 is down, and bring it back up
    /// unless the platform permits it to stay down.
    ///
    /// Returns whether core 0 was brought online.
    async fn recover_core0(&self) -> bool {
        match self.cores.is_online(0).await {
            Ok(true) => return false,
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "Failed to read core 0 state");
                return false;
            }
        }

        if self.latches.permission_gate().close() {
            warn!(
                latch = self.latches.permission_gate().name(),
                "Core 0 found offline; disabling it is now permanently denied and \
                 frequency ceilings are locked until restart"
            );
        }

        // Core 0 stays down while the platform permits it.
        if self.signals.core0_auto_disable_permitted().await {
            return false;
        }

        match self.cores.ensure_online(0).await {
            Ok(changed) => {
                if changed {
                    info!("Core 0 brought back online");
                }
                changed
            }
            Err(e) => {
                warn!(error = %e, "Failed to bring core 0 online");
                false
            }
        }
    }

    async fn core0_disable_permitted(&self) -> bool {
        !self.latches.user_override().is_closed() && self.signals.core0_auto_disable_permitted().await
    }

    async fn execute(&self, step: Step, report: &mut HotplugReport) {
        match step {
            Step::Online(core) => self.online(core, report).await,
            Step::Offline(core) => self.offline(core, report).await,
            Step::OfflineCore0IfPermitted => {
                if self.core0_disable_permitted().await {
                    self.offline(0, report).await;
                }
            }
            Step::OnlineAll => {
                let brought = self.cores.bring_all_online().await;
                report.brought_online.extend(brought);
            }
        }
    }

    async fn online(&self, core: usize, report: &mut HotplugReport) {
        match self.cores.ensure_online(core).await {
            Ok(true) => report.brought_online.push(core),
            Ok(false) => {}
            Err(e) => warn!(core, error = %e, "Failed to bring core online"),
        }
    }

    async fn offline(&self, core: usize, report: &mut HotplugReport) {
        match self.cores.ensure_offline(core).await {
            Ok(true) => report.taken_offline.push(core),
            Ok(false) => {}
            Err(e) => warn!(core, error = %e, "Failed to take core offline"),
        }
    }
}
