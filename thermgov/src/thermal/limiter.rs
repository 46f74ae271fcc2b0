use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::cores::CoreSet;
use crate::hw::{CpuFreqPolicy, PolicyEvent, PolicyLimits, PolicyNotifier};
use crate::tracing::prelude::*;

/// Inclusive frequency range in kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyRange {
    pub min: u32,
    pub max: u32,
}

/// Owner of the enforced maximum frequency.
///
/// The control loop writes the cap through [`apply`](Self::apply). The
/// frequency-policy subsystem reads it through the [`PolicyNotifier`]
/// impl from arbitrary threads; that path only touches atomics.
pub struct FrequencyLimiter {
    hardware_max_freq: u32,
    limited_max_freq: AtomicU32,
    pending_change: AtomicBool,
    cpufreq: Arc<dyn CpuFreqPolicy>,
    cores: Arc<CoreSet>,
}

impl FrequencyLimiter {
    /// Starts uncapped, at `hardware_max_freq`.
    pub fn new(hardware_max_freq: u32, cpufreq: Arc<dyn CpuFreqPolicy>, cores: Arc<CoreSet>) -> Self {
        Self {
            hardware_max_freq,
            limited_max_freq: AtomicU32::new(hardware_max_freq),
            pending_change: AtomicBool::new(false),
            cpufreq,
            cores,
        }
    }

    pub fn hardware_max_freq(&self) -> u32 {
        self.hardware_max_freq
    }

    pub fn limited_max_freq(&self) -> u32 {
        self.limited_max_freq.load(Ordering::Acquire)
    }

    /// True only while [`apply`](Self::apply) is re-evaluating policies.
    pub fn pending_change(&self) -> bool {
        self.pending_change.load(Ordering::Acquire)
    }

    /// Enforce `limit` on every online core.
    ///
    /// Limits above the hardware ceiling are capped to it. Applying the
    /// current limit again does nothing. Otherwise each online core's
    /// policy is re-evaluated once, in index order, with the core set
    /// locked against hotplug for the duration.
    ///
    /// Returns whether a re-evaluation pass ran.
    pub async fn apply(&self, limit: u32) -> bool {
        let limit = limit.min(self.hardware_max_freq);
        if self.limited_max_freq() == limit {
            return false;
        }

        self.pending_change.store(true, Ordering::Release);
        self.limited_max_freq.store(limit, Ordering::Release);

        let online = self.cores.online().await;
        for &core in online.cores() {
            match self.cpufreq.update_policy(core).await {
                Ok(()) => info!("Setting cpu{core} max frequency to {limit}"),
                Err(e) => warn!(core, error = %e, "Failed to re-evaluate frequency policy"),
            }
        }
        drop(online);

        self.pending_change.store(false, Ordering::Release);
        true
    }

    /// Range a core with minimum `core_min_freq` must be kept within.
    pub fn clamp(&self, core_min_freq: u32) -> FrequencyRange {
        FrequencyRange {
            min: core_min_freq,
            max: self.limited_max_freq(),
        }
    }
}

impl PolicyNotifier for FrequencyLimiter {
    fn on_policy_event(&self, event: PolicyEvent, policy: &mut PolicyLimits) {
        if event != PolicyEvent::Adjust && !self.pending_change() {
            return;
        }
        let range = self.clamp(policy.cpuinfo_min_freq);
        policy.verify_within_limits(range.min, range.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::sim::{SimEvent, SimulatedCpu};

    const HW_MAX: u32 = 2_265_600;

    fn limiter() -> (Arc<FrequencyLimiter>, Arc<SimulatedCpu>) {
        let cpu = SimulatedCpu::quad();
        let cores = Arc::new(CoreSet::new(cpu.clone()));
        let limiter = Arc::new(FrequencyLimiter::new(HW_MAX, cpu.clone(), cores));
        cpu.register_notifier(limiter.clone());
        (limiter, cpu)
    }

    fn policy_updates(events: &[SimEvent]) -> Vec<(usize, u32)> {
        events
            .iter()
            .filter_map(|e| match e {
                SimEvent::PolicyUpdated { core, max } => Some((*core, *max)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn should_start_uncapped() {
        let (limiter, _cpu) = limiter();
        assert_eq!(limiter.limited_max_freq(), HW_MAX);
        assert!(!limiter.pending_change());
    }

    #[tokio::test]
    async fn should_reevaluate_each_online_core_in_order() {
        let (limiter, cpu) = limiter();
        cpu.force_online_state(2, false);

        assert!(limiter.apply(1_094_400).await);

        assert_eq!(
            policy_updates(&cpu.take_events()),
            vec![(0, 1_094_400), (1, 1_094_400), (3, 1_094_400)]
        );
        assert_eq!(limiter.limited_max_freq(), 1_094_400);
        assert!(!limiter.pending_change());
    }

    #[tokio::test]
    async fn should_run_one_pass_for_repeated_limit() {
        let (limiter, cpu) = limiter();

        assert!(limiter.apply(800_000).await);
        assert!(!limiter.apply(800_000).await);

        assert_eq!(policy_updates(&cpu.events()).len(), 4);
    }

    #[tokio::test]
    async fn should_cap_limit_at_hardware_max() {
        let (limiter, cpu) = limiter();

        assert!(!limiter.apply(HW_MAX + 1).await);
        assert_eq!(limiter.limited_max_freq(), HW_MAX);
        assert!(cpu.events().is_empty());
    }

    #[tokio::test]
    async fn should_restore_hardware_max() {
        let (limiter, cpu) = limiter();
        limiter.apply(800_000).await;

        limiter.apply(HW_MAX).await;

        assert_eq!(cpu.policy(0).unwrap().max, HW_MAX);
    }

    #[test]
    fn should_clamp_to_core_min_and_limit() {
        let (limiter, _cpu) = limiter();
        limiter.limited_max_freq.store(900_000, Ordering::Release);

        assert_eq!(
            limiter.clamp(300_000),
            FrequencyRange {
                min: 300_000,
                max: 900_000
            }
        );
    }

    #[test]
    fn should_ignore_non_adjust_events_without_pending_change() {
        let (limiter, _cpu) = limiter();
        limiter.limited_max_freq.store(900_000, Ordering::Release);
        let mut policy = PolicyLimits::full_range(0, 300_000, HW_MAX);

        limiter.on_policy_event(PolicyEvent::Notify, &mut policy);
        assert_eq!(policy.max, HW_MAX);

        limiter.pending_change.store(true, Ordering::Release);
        limiter.on_policy_event(PolicyEvent::Notify, &mut policy);
        assert_eq!(policy.max, 900_000);
    }

    #[test]
    fn should_never_observe_torn_limit_from_concurrent_readers() {
        let (limiter, _cpu) = limiter();
        let values = [800_000u32, 1_094_400, HW_MAX];

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..10_000 {
                    limiter
                        .limited_max_freq
                        .store(values[i % values.len()], Ordering::Release);
                }
            });
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..10_000 {
                        let mut policy = PolicyLimits::full_range(0, 300_000, HW_MAX);
                        limiter.on_policy_event(PolicyEvent::Adjust, &mut policy);
                        assert!(values.contains(&policy.max));
                    }
                });
            }
        });
    }
}
