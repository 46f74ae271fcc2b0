//! Hardware collaborator interfaces.
//!
//! The governor never touches hardware directly. It samples temperature,
//! toggles cores and asks for frequency-policy re-evaluation through these
//! traits, and the frequency-policy side calls back into the governor
//! through [`PolicyNotifier`].
//!
//! Two implementations exist: [`sysfs`] for a running Linux system and
//! [`sim`] for tests and dry runs.

pub mod sim;
pub mod sysfs;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use crate::config::GovernorConfig;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unparseable value {value:?} in {}", path.display())]
    Parse { path: PathBuf, value: String },

    #[error("core {0} does not exist")]
    NoSuchCore(usize),

    #[error("core {0} cannot be hotplugged")]
    NotHotpluggable(usize),

    #[error("{0}")]
    Fault(String),
}

pub type Result<T> = std::result::Result<T, HwError>;

/// Thermal sensor subsystem.
#[async_trait]
pub trait TemperatureSensor: Send + Sync {
    /// Current temperature of `sensor_id` in whole degrees Celsius.
    async fn read_temperature(&self, sensor_id: u32) -> Result<i32>;
}

/// Core on/off primitive.
///
/// Calls may block for a while (the kernel migrates tasks off a core
/// before it goes down). Callers serialize them through
/// [`crate::thermal::CoreSet`].
#[async_trait]
pub trait CpuHotplug: Send + Sync {
    /// Number of cores that can ever be online, indexed `0..n`.
    fn possible_cores(&self) -> usize;

    async fn is_online(&self, core: usize) -> Result<bool>;

    async fn bring_online(&self, core: usize) -> Result<()>;

    async fn take_offline(&self, core: usize) -> Result<()>;
}

/// Why the frequency-policy subsystem is calling its notifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyEvent {
    /// Limits are being computed; notifiers may narrow them.
    Adjust,
    /// A notifier's limits conflicted and are being reconciled.
    Incompatible,
    /// Final limits are being announced.
    Notify,
}

/// Frequency limits of one core's policy, in kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyLimits {
    pub core: usize,
    pub cpuinfo_min_freq: u32,
    pub cpuinfo_max_freq: u32,
    pub min: u32,
    pub max: u32,
}

impl PolicyLimits {
    /// Policy spanning the full hardware range.
    pub fn full_range(core: usize, cpuinfo_min_freq: u32, cpuinfo_max_freq: u32) -> Self {
        Self {
            core,
            cpuinfo_min_freq,
            cpuinfo_max_freq,
            min: cpuinfo_min_freq,
            max: cpuinfo_max_freq,
        }
    }

    /// Clamp `min` and `max` into `[lower, upper]`, keeping `min <= max`.
    pub fn verify_within_limits(&mut self, lower: u32, upper: u32) {
        if self.min > upper {
            self.min = upper;
        }
        if self.max > upper {
            self.max = upper;
        }
        if self.min < lower {
            self.min = lower;
        }
        if self.max < lower {
            self.max = lower;
        }
        if self.min > self.max {
            self.min = self.max;
        }
    }
}

/// Callback invoked by the frequency-policy subsystem on every policy
/// (re-)evaluation.
///
/// May run on any thread, concurrently with the control loop, so
/// implementations must not block.
pub trait PolicyNotifier: Send + Sync {
    fn on_policy_event(&self, event: PolicyEvent, policy: &mut PolicyLimits);
}

/// Handle returned by [`CpuFreqPolicy::register_notifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotifierId(u64);

/// Frequency-policy subsystem.
#[async_trait]
pub trait CpuFreqPolicy: Send + Sync {
    /// Highest frequency the hardware supports (kHz).
    async fn hardware_max_freq(&self) -> Result<u32>;

    /// Re-evaluate `core`'s policy, running every registered notifier with
    /// [`PolicyEvent::Adjust`] and applying the result.
    async fn update_policy(&self, core: usize) -> Result<()>;

    fn register_notifier(&self, notifier: Arc<dyn PolicyNotifier>) -> NotifierId;

    /// Returns `false` if `id` was not registered.
    fn unregister_notifier(&self, id: NotifierId) -> bool;
}

/// Signals owned by other platform components.
#[async_trait]
pub trait PlatformSignals: Send + Sync {
    /// Whether core 0 may be taken offline automatically.
    async fn core0_auto_disable_permitted(&self) -> bool;

    /// Whether another hotplug driver currently manages cores.
    async fn external_hotplug_active(&self) -> bool;
}

/// Registered policy notifiers, shared by the backends.
#[derive(Default)]
pub struct NotifierChain {
    next_id: AtomicU64,
    notifiers: RwLock<Vec<(NotifierId, Arc<dyn PolicyNotifier>)>>,
}

impl NotifierChain {
    pub fn register(&self, notifier: Arc<dyn PolicyNotifier>) -> NotifierId {
        let id = NotifierId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.notifiers.write().push((id, notifier));
        id
    }

    pub fn unregister(&self, id: NotifierId) -> bool {
        let mut notifiers = self.notifiers.write();
        let before = notifiers.len();
        notifiers.retain(|(registered, _)| *registered != id);
        notifiers.len() != before
    }

    pub fn len(&self) -> usize {
        self.notifiers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every notifier in registration order.
    pub fn call(&self, event: PolicyEvent, policy: &mut PolicyLimits) {
        for (_, notifier) in self.notifiers.read().iter() {
            notifier.on_policy_event(event, policy);
        }
    }
}

/// The full set of collaborators the governor needs.
#[derive(Clone)]
pub struct Platform {
    pub sensor: Arc<dyn TemperatureSensor>,
    pub hotplug: Arc<dyn CpuHotplug>,
    pub cpufreq: Arc<dyn CpuFreqPolicy>,
    pub signals: Arc<dyn PlatformSignals>,
}

impl Platform {
    /// Collaborators backed by the running kernel's sysfs.
    pub async fn sysfs(config: &GovernorConfig) -> Result<Self> {
        let cpu = Arc::new(sysfs::SysfsCpu::discover(config.cpu_root.clone()).await?);
        Ok(Self {
            sensor: Arc::new(sysfs::SysfsThermalZones::new(
                config.thermal_root.clone(),
                config.temperature_divisor,
            )),
            hotplug: cpu.clone(),
            cpufreq: cpu,
            signals: Arc::new(sysfs::SysfsSignals::new(
                config.core0_permission_path.clone(),
                config.external_hotplug_path.clone(),
            )),
        })
    }

    /// Collaborators backed by one in-memory CPU.
    pub fn simulated(cpu: Arc<sim::SimulatedCpu>) -> Self {
        Self {
            sensor: cpu.clone(),
            hotplug: cpu.clone(),
            cpufreq: cpu.clone(),
            signals: cpu,
        }
    }
}
