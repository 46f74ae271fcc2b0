//! Collaborators backed by Linux sysfs.
//!
//! - temperature: `<thermal_root>/thermal_zone<id>/temp`
//! - hotplug: `<cpu_root>/cpu<n>/online`
//! - frequency policy: `<cpu_root>/cpu<n>/cpufreq/{cpuinfo,scaling}_{min,max}_freq`
//!
//! Userspace has no cpufreq notifier hook, so [`SysfsCpu`] runs the
//! registered notifiers itself during [`CpuFreqPolicy::update_policy`] and
//! writes the outcome to `scaling_max_freq` / `scaling_min_freq`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;

use super::{
    CpuFreqPolicy, CpuHotplug, HwError, NotifierChain, NotifierId, PlatformSignals, PolicyEvent,
    PolicyLimits, PolicyNotifier, Result, TemperatureSensor,
};
use crate::tracing::prelude::*;

async fn read_trimmed(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .await
        .map(|s| s.trim().to_string())
        .map_err(|source| HwError::Io {
            path: path.to_path_buf(),
            source,
        })
}

async fn read_number<T: std::str::FromStr>(path: &Path) -> Result<T> {
    let value = read_trimmed(path).await?;
    value.parse().map_err(|_| HwError::Parse {
        path: path.to_path_buf(),
        value,
    })
}

async fn write_value(path: &Path, value: &str) -> Result<()> {
    fs::write(path, value).await.map_err(|source| HwError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a kernel CPU list such as `0-3,6,8-9` and return the highest
/// index plus one.
pub fn parse_cpu_list_len(list: &str) -> Option<usize> {
    let mut highest: Option<usize> = None;
    for part in list.trim().split(',').filter(|p| !p.is_empty()) {
        let end = match part.split_once('-') {
            Some((start, end)) => {
                let start: usize = start.parse().ok()?;
                let end: usize = end.parse().ok()?;
                if end < start {
                    return None;
                }
                end
            }
            None => part.parse().ok()?,
        };
        highest = Some(highest.map_or(end, |h| h.max(end)));
    }
    highest.map(|h| h + 1)
}

/// Thermal zones under `/sys/class/thermal`.
pub struct SysfsThermalZones {
    root: PathBuf,
    divisor: i32,
}

impl SysfsThermalZones {
    pub fn new(root: PathBuf, divisor: i32) -> Self {
        Self { root, divisor }
    }
}

#[async_trait]
impl TemperatureSensor for SysfsThermalZones {
    async fn read_temperature(&self, sensor_id: u32) -> Result<i32> {
        let path = self.root.join(format!("thermal_zone{sensor_id}/temp"));
        let raw: i64 = read_number(&path).await?;
        let degrees = raw / i64::from(self.divisor.max(1));
        i32::try_from(degrees).map_err(|_| HwError::Parse {
            path,
            value: raw.to_string(),
        })
    }
}

/// CPU hotplug and frequency policy under `/sys/devices/system/cpu`.
pub struct SysfsCpu {
    root: PathBuf,
    possible: usize,
    notifiers: NotifierChain,
}

impl SysfsCpu {
    /// Read the possible-core list from `<root>/possible`.
    pub async fn discover(root: PathBuf) -> Result<Self> {
        let path = root.join("possible");
        let list = read_trimmed(&path).await?;
        let possible = parse_cpu_list_len(&list).ok_or(HwError::Parse { path, value: list })?;
        debug!(possible, root = %root.display(), "Discovered CPUs");
        Ok(Self {
            root,
            possible,
            notifiers: NotifierChain::default(),
        })
    }

    fn check_core(&self, core: usize) -> Result<()> {
        if core < self.possible {
            Ok(())
        } else {
            Err(HwError::NoSuchCore(core))
        }
    }

    fn online_path(&self, core: usize) -> PathBuf {
        self.root.join(format!("cpu{core}/online"))
    }

    fn cpufreq_path(&self, core: usize, file: &str) -> PathBuf {
        self.root.join(format!("cpu{core}/cpufreq/{file}"))
    }
}

#[async_trait]
impl CpuHotplug for SysfsCpu {
    fn possible_cores(&self) -> usize {
        self.possible
    }

    async fn is_online(&self, core: usize) -> Result<bool> {
        self.check_core(core)?;
        let path = self.online_path(core);
        match fs::read_to_string(&path).await {
            Ok(value) => Ok(value.trim() == "1"),
            // No online file: the core can't be hotplugged and is always up.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(source) => Err(HwError::Io { path, source }),
        }
    }

    async fn bring_online(&self, core: usize) -> Result<()> {
        self.check_core(core)?;
        write_value(&self.online_path(core), "1").await
    }

    async fn take_offline(&self, core: usize) -> Result<()> {
        self.check_core(core)?;
        let path = self.online_path(core);
        match fs::write(&path, "0").await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(HwError::NotHotpluggable(core)),
            Err(source) => Err(HwError::Io { path, source }),
        }
    }
}

#[async_trait]
impl CpuFreqPolicy for SysfsCpu {
    /// Highest `cpuinfo_max_freq` of any core. Clusters differ on
    /// big.LITTLE parts; each policy is still held to its own ceiling by
    /// `verify_within_limits`.
    async fn hardware_max_freq(&self) -> Result<u32> {
        let mut highest: Option<u32> = None;
        let mut last_err = None;
        for core in 0..self.possible {
            match read_number::<u32>(&self.cpufreq_path(core, "cpuinfo_max_freq")).await {
                Ok(freq) => highest = Some(highest.map_or(freq, |h| h.max(freq))),
                // Offline cores may have no cpufreq directory.
                Err(e) => {
                    debug!(core, error = %e, "No frequency ceiling for core");
                    last_err = Some(e);
                }
            }
        }
        match (highest, last_err) {
            (Some(freq), _) => Ok(freq),
            (None, Some(e)) => Err(e),
            (None, None) => Err(HwError::Fault("no possible cores".into())),
        }
    }

    async fn update_policy(&self, core: usize) -> Result<()> {
        self.check_core(core)?;
        let cpuinfo_min = read_number(&self.cpufreq_path(core, "cpuinfo_min_freq")).await?;
        let cpuinfo_max = read_number(&self.cpufreq_path(core, "cpuinfo_max_freq")).await?;
        let scaling_min: u32 = read_number(&self.cpufreq_path(core, "scaling_min_freq")).await?;

        let mut policy = PolicyLimits::full_range(core, cpuinfo_min, cpuinfo_max);
        policy.min = scaling_min;
        self.notifiers.call(PolicyEvent::Adjust, &mut policy);
        self.notifiers.call(PolicyEvent::Notify, &mut policy);

        // Lower the minimum first so the new maximum is never below it.
        if policy.min < scaling_min {
            write_value(
                &self.cpufreq_path(core, "scaling_min_freq"),
                &policy.min.to_string(),
            )
            .await?;
        }
        write_value(
            &self.cpufreq_path(core, "scaling_max_freq"),
            &policy.max.to_string(),
        )
        .await?;

        trace!(core, min = policy.min, max = policy.max, "Policy updated");
        Ok(())
    }

    fn register_notifier(&self, notifier: Arc<dyn PolicyNotifier>) -> NotifierId {
        self.notifiers.register(notifier)
    }

    fn unregister_notifier(&self, id: NotifierId) -> bool {
        self.notifiers.unregister(id)
    }
}

/// Boolean signals read from files written by other components.
///
/// A missing path, unreadable file or unrecognized content reads as false.
pub struct SysfsSignals {
    core0_permission: Option<PathBuf>,
    external_hotplug: Option<PathBuf>,
}

impl SysfsSignals {
    pub fn new(core0_permission: Option<PathBuf>, external_hotplug: Option<PathBuf>) -> Self {
        Self {
            core0_permission,
            external_hotplug,
        }
    }
}

async fn read_flag(path: Option<&Path>) -> bool {
    let Some(path) = path else {
        return false;
    };
    match read_trimmed(path).await {
        Ok(value) => matches!(value.as_str(), "1" | "Y" | "y"),
        Err(e) => {
            debug!(error = %e, "Signal unreadable, treating as false");
            false
        }
    }
}

#[async_trait]
impl PlatformSignals for SysfsSignals {
    async fn core0_auto_disable_permitted(&self) -> bool {
        read_flag(self.core0_permission.as_deref()).await
    }

    async fn external_hotplug_active(&self) -> bool {
        read_flag(self.external_hotplug.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("0-7" => Some(8))]
    #[test_case("0-3\n" => Some(4))]
    #[test_case("0" => Some(1))]
    #[test_case("0-3,6,8-9" => Some(10))]
    #[test_case("" => None)]
    #[test_case("3-1" => None)]
    #[test_case("a-b" => None)]
    fn should_parse_cpu_list(list: &str) -> Option<usize> {
        parse_cpu_list_len(list)
    }

    /// Temporary sysfs-like tree, removed on drop.
    struct Scratch(TempDir);

    impl Scratch {
        fn new() -> Self {
            Self(tempfile::tempdir().unwrap())
        }

        fn path(&self) -> PathBuf {
            self.0.path().to_path_buf()
        }

        fn write(&self, rel: &str, contents: &str) {
            let path = self.0.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }

        fn read(&self, rel: &str) -> String {
            std::fs::read_to_string(self.0.path().join(rel)).unwrap()
        }
    }

    fn cpu_tree() -> Scratch {
        let scratch = Scratch::new();
        scratch.write("possible", "0-3\n");
        for core in 0..4 {
            if core > 0 {
                scratch.write(&format!("cpu{core}/online"), "1\n");
            }
            scratch.write(&format!("cpu{core}/cpufreq/cpuinfo_min_freq"), "300000\n");
            scratch.write(&format!("cpu{core}/cpufreq/cpuinfo_max_freq"), "2265600\n");
            scratch.write(&format!("cpu{core}/cpufreq/scaling_min_freq"), "300000\n");
            scratch.write(&format!("cpu{core}/cpufreq/scaling_max_freq"), "2265600\n");
        }
        scratch
    }

    #[tokio::test]
    async fn should_convert_millidegrees() {
        let scratch = Scratch::new();
        scratch.write("thermal_zone3/temp", "48500\n");
        let zones = SysfsThermalZones::new(scratch.path(), 1000);

        assert_eq!(zones.read_temperature(3).await.unwrap(), 48);
    }

    #[tokio::test]
    async fn should_report_missing_zone_as_io_error() {
        let scratch = Scratch::new();
        let zones = SysfsThermalZones::new(scratch.path(), 1000);

        assert!(matches!(
            zones.read_temperature(0).await,
            Err(HwError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn should_treat_core_without_online_file_as_online() {
        let scratch = cpu_tree();
        let cpu = SysfsCpu::discover(scratch.path()).await.unwrap();

        assert_eq!(cpu.possible_cores(), 4);
        assert!(cpu.is_online(0).await.unwrap());
        assert!(matches!(
            cpu.take_offline(0).await,
            Err(HwError::NotHotpluggable(0))
        ));
    }

    #[tokio::test]
    async fn should_toggle_online_file() {
        let scratch = cpu_tree();
        let cpu = SysfsCpu::discover(scratch.path()).await.unwrap();

        cpu.take_offline(2).await.unwrap();
        assert_eq!(scratch.read("cpu2/online"), "0");
        cpu.bring_online(2).await.unwrap();
        assert_eq!(scratch.read("cpu2/online"), "1");
        assert!(matches!(cpu.is_online(9).await, Err(HwError::NoSuchCore(9))));
    }

    struct Cap(u32);

    impl PolicyNotifier for Cap {
        fn on_policy_event(&self, event: PolicyEvent, policy: &mut PolicyLimits) {
            if event == PolicyEvent::Adjust {
                let lower = policy.cpuinfo_min_freq;
                policy.verify_within_limits(lower, self.0);
            }
        }
    }

    #[tokio::test]
    async fn should_write_notifier_result_to_scaling_max() {
        let scratch = cpu_tree();
        let cpu = SysfsCpu::discover(scratch.path()).await.unwrap();
        let id = cpu.register_notifier(Arc::new(Cap(1_094_400)));

        cpu.update_policy(1).await.unwrap();
        assert_eq!(scratch.read("cpu1/cpufreq/scaling_max_freq"), "1094400");

        cpu.unregister_notifier(id);
        cpu.update_policy(1).await.unwrap();
        assert_eq!(scratch.read("cpu1/cpufreq/scaling_max_freq"), "2265600");
    }

    #[tokio::test]
    async fn should_read_signal_files() {
        let scratch = Scratch::new();
        scratch.write("boost", "Y\n");
        scratch.write("aio", "0\n");
        let signals = SysfsSignals::new(Some(scratch.path().join("boost")), Some(scratch.path().join("aio")));

        assert!(signals.core0_auto_disable_permitted().await);
        assert!(!signals.external_hotplug_active().await);
        assert!(!SysfsSignals::new(None, None).core0_auto_disable_permitted().await);
    }

    #[tokio::test]
    async fn should_report_highest_ceiling_across_clusters() {
        let scratch = cpu_tree();
        scratch.write("possible", "0-7\n");
        for core in 4..8 {
            scratch.write(&format!("cpu{core}/online"), "1\n");
            scratch.write(&format!("cpu{core}/cpufreq/cpuinfo_min_freq"), "300000\n");
            scratch.write(&format!("cpu{core}/cpufreq/cpuinfo_max_freq"), "2803200\n");
            scratch.write(&format!("cpu{core}/cpufreq/scaling_min_freq"), "300000\n");
            scratch.write(&format!("cpu{core}/cpufreq/scaling_max_freq"), "2803200\n");
        }
        let cpu = SysfsCpu::discover(scratch.path()).await.unwrap();

        assert_eq!(cpu.hardware_max_freq().await.unwrap(), 2_803_200);
    }

    #[tokio::test]
    async fn should_skip_cores_without_cpufreq_when_reading_ceiling() {
        let scratch = cpu_tree();
        std::fs::remove_dir_all(scratch.path().join("cpu3/cpufreq")).unwrap();
        let cpu = SysfsCpu::discover(scratch.path()).await.unwrap();

        assert_eq!(cpu.hardware_max_freq().await.unwrap(), 2_265_600);
    }

    #[tokio::test]
    async fn should_keep_each_policy_within_its_own_ceiling() {
        let scratch = cpu_tree();
        scratch.write("cpu0/cpufreq/cpuinfo_max_freq", "1497600\n");
        let cpu = SysfsCpu::discover(scratch.path()).await.unwrap();
        cpu.register_notifier(Arc::new(Cap(2_265_600)));

        cpu.update_policy(0).await.unwrap();
        cpu.update_policy(1).await.unwrap();

        assert_eq!(scratch.read("cpu0/cpufreq/scaling_max_freq"), "1497600");
        assert_eq!(scratch.read("cpu1/cpufreq/scaling_max_freq"), "2265600");
    }
}
