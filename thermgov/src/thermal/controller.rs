use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::context::GovernorContext;
use super::hotplug::{HotplugController, HotplugReport};
use super::sample::{Reading, TemperatureSampler};
use super::state::{ThrottleDecision, ThrottleState, ThrottleStateMachine};
use crate::config::{GovernorConfig, TopologyClass};
use crate::error::Result;
use crate::hw::{CpuFreqPolicy, Platform};
use crate::tracing::prelude::*;

/// Outcome of one control tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub reading: Reading,
    pub hotplug: HotplugReport,
    pub throttle: ThrottleDecision,
}

/// The periodic control loop.
///
/// Every tick samples the temperature once, runs the hotplug controller,
/// then the throttle state machine, then publishes status. The throttle
/// step re-reads the online set after hotplug has finished, so a new cap
/// reaches exactly the cores left online.
pub struct ThermalGovernor {
    context: Arc<GovernorContext>,
    cpufreq: Arc<dyn CpuFreqPolicy>,
    sampler: TemperatureSampler,
    hotplug: HotplugController,
    throttle: ThrottleStateMachine,
    poll_interval: Duration,
    initial_delay: Duration,
    ticks: u64,
}

impl ThermalGovernor {
    /// Validate `config`, probe the platform and build the governor.
    pub async fn new(config: &GovernorConfig, platform: Platform) -> Result<Self> {
        config.validate()?;

        let possible = platform.hotplug.possible_cores();
        let topology = TopologyClass::from_core_count(possible);
        if topology.is_none() {
            warn!(
                possible_cores = possible,
                "No hotplug band table for this core count; only core 0 recovery is active"
            );
        }

        let hardware_max_freq = match config.hardware_max_freq_khz {
            Some(freq) => freq,
            None => platform.cpufreq.hardware_max_freq().await?,
        };

        let context = Arc::new(GovernorContext::new(topology, hardware_max_freq, &platform));

        info!(
            sensor_id = config.sensor_id,
            topology = ?topology,
            possible_cores = possible,
            hardware_max_freq_khz = hardware_max_freq,
            "Thermal governor initialized"
        );

        Ok(Self {
            hotplug: HotplugController::new(
                topology,
                context.cores().clone(),
                context.latches().clone(),
                platform.signals.clone(),
            ),
            sampler: TemperatureSampler::new(platform.sensor.clone(), config.sensor_id),
            throttle: ThrottleStateMachine::new(config.safe_diff_c),
            cpufreq: platform.cpufreq,
            context,
            poll_interval: config.poll_interval,
            initial_delay: config.initial_delay,
            ticks: 0,
        })
    }

    pub fn context(&self) -> Arc<GovernorContext> {
        self.context.clone()
    }

    pub fn throttle_state(&self) -> ThrottleState {
        self.throttle.state()
    }

    /// Run until `cancellation` fires.
    ///
    /// Registers the frequency limiter with the policy subsystem for the
    /// duration of the run. Cancellation is observed between ticks only;
    /// a tick in progress always completes.
    pub async fn run(mut self, cancellation: CancellationToken) {
        let notifier = self.cpufreq.register_notifier(self.context.limiter().clone());
        info!("Thermal governor started");

        tokio::select! {
            _ = cancellation.cancelled() => {}
            _ = tokio::time::sleep(self.initial_delay) => {
                let mut interval = tokio::time::interval(self.poll_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        biased;
                        _ = cancellation.cancelled() => {
                            break;
                        }
                        _ = interval.tick() => {
                            self.tick().await;
                        }
                    }
                }
            }
        }

        self.cpufreq.unregister_notifier(notifier);
        info!(ticks = self.ticks, "Thermal governor stopped");
    }

    /// Run one control tick.
    ///
    /// Returns `None` when no temperature is available yet.
    pub async fn tick(&mut self) -> Option<TickReport> {
        let Some(reading) = self.sampler.sample().await else {
            debug!("Thermal governor tick: no temperature reading available yet");
            return None;
        };
        let temp = reading.temperature_c;
        self.ticks += 1;

        let hotplug = self
            .hotplug
            .tick(temp, self.context.core_control_enabled())
            .await;

        let config = self.context.config().snapshot();
        let throttle = self
            .throttle
            .tick(temp, &config, self.context.limiter())
            .await;

        let online = self.context.cores().online().await.cores().to_vec();

        debug!(
            temp_c = temp,
            degraded = reading.degraded,
            state = ?self.throttle.state(),
            decision = ?throttle,
            limited_max_freq_khz = self.context.limiter().limited_max_freq(),
            online = ?online,
            "Thermal control tick"
        );

        let throttling = self.throttle.state() == ThrottleState::Throttling;
        let ticks = self.ticks;
        let band = hotplug.band.map(str::to_string);
        self.context.publish(|status| {
            status.temperature_c = Some(temp);
            status.sensor_degraded = reading.degraded;
            status.throttling = throttling;
            status.online_cores = online;
            status.band = band;
            status.ticks = ticks;
        });

        Some(TickReport {
            reading,
            hotplug,
            throttle,
        })
    }
}
