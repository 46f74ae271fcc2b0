//! Startup configuration for the governor daemon.
//!
//! Everything here is fixed for the lifetime of a run. Values that can be
//! changed while running live in [`crate::thermal::ThermalConfig`] and are
//! reached through [`crate::tunables`].

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sensor count of the platform's thermal sensor block.
pub const DEFAULT_MAX_SENSORS: u32 = 11;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Delay before the first tick after startup.
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(50);

/// Hysteresis margin below `temp_threshold` before throttling ends (°C).
const DEFAULT_SAFE_DIFF_C: i32 = 5;

const DEFAULT_API_PORT: u16 = 7786;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sensor id {sensor_id} out of range (platform supports {max_sensors} sensors)")]
    SensorOutOfRange { sensor_id: u32, max_sensors: u32 },

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// Core-count-derived category selecting the hotplug band table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum TopologyClass {
    /// Four identical cores.
    Quad,
    /// Eight cores, assumed to be a big.LITTLE arrangement.
    Octa,
}

impl TopologyClass {
    /// Classify by the number of possible cores. Other counts have no band
    /// table.
    pub fn from_core_count(cores: usize) -> Option<Self> {
        match cores {
            4 => Some(TopologyClass::Quad),
            8 => Some(TopologyClass::Octa),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// Thermal sensor to sample. Must be below `max_sensors`.
    pub sensor_id: u32,

    pub max_sensors: u32,

    pub poll_interval: Duration,

    pub initial_delay: Duration,

    pub safe_diff_c: i32,

    /// Overrides the ceiling read from `cpuinfo_max_freq` (kHz).
    pub hardware_max_freq_khz: Option<u32>,

    pub thermal_root: PathBuf,

    pub cpu_root: PathBuf,

    /// Raw sensor readings are divided by this to get °C. Thermal zones
    /// report millidegrees.
    pub temperature_divisor: i32,

    /// File holding the external "core 0 may be disabled automatically"
    /// signal. Absent means the signal is always false.
    pub core0_permission_path: Option<PathBuf>,

    /// File reporting whether another hotplug driver is active.
    pub external_hotplug_path: Option<PathBuf>,

    pub api_bind: SocketAddr,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            sensor_id: 0,
            max_sensors: DEFAULT_MAX_SENSORS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            initial_delay: DEFAULT_INITIAL_DELAY,
            safe_diff_c: DEFAULT_SAFE_DIFF_C,
            hardware_max_freq_khz: None,
            thermal_root: PathBuf::from("/sys/class/thermal"),
            cpu_root: PathBuf::from("/sys/devices/system/cpu"),
            temperature_divisor: 1000,
            core0_permission_path: None,
            external_hotplug_path: None,
            api_bind: SocketAddr::from(([127, 0, 0, 1], DEFAULT_API_PORT)),
        }
    }
}

impl GovernorConfig {
    /// Defaults overridden by `THERMGOV_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = parse_env("THERMGOV_SENSOR_ID")? {
            config.sensor_id = v;
        }
        if let Some(v) = parse_env("THERMGOV_MAX_SENSORS")? {
            config.max_sensors = v;
        }
        if let Some(ms) = parse_env::<u64>("THERMGOV_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(v) = parse_env("THERMGOV_SAFE_DIFF")? {
            config.safe_diff_c = v;
        }
        if let Some(v) = parse_env("THERMGOV_HW_MAX_FREQ_KHZ")? {
            config.hardware_max_freq_khz = Some(v);
        }
        if let Some(v) = parse_env("THERMGOV_THERMAL_ROOT")? {
            config.thermal_root = v;
        }
        if let Some(v) = parse_env("THERMGOV_CPU_ROOT")? {
            config.cpu_root = v;
        }
        if let Some(v) = parse_env("THERMGOV_TEMP_DIVISOR")? {
            config.temperature_divisor = v;
        }
        if let Some(v) = parse_env("THERMGOV_CORE0_PERMISSION_PATH")? {
            config.core0_permission_path = Some(v);
        }
        if let Some(v) = parse_env("THERMGOV_EXTERNAL_HOTPLUG_PATH")? {
            config.external_hotplug_path = Some(v);
        }
        if let Some(v) = parse_env("THERMGOV_API_BIND")? {
            config.api_bind = v;
        }

        Ok(config)
    }

    /// Refuse configurations the governor can't start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sensor_id >= self.max_sensors {
            return Err(ConfigError::SensorOutOfRange {
                sensor_id: self.sensor_id,
                max_sensors: self.max_sensors,
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll interval must be non-zero".into()));
        }
        if self.temperature_divisor <= 0 {
            return Err(ConfigError::Invalid(format!(
                "temperature divisor must be positive, got {}",
                self.temperature_divisor
            )));
        }
        if self.safe_diff_c < 0 {
            return Err(ConfigError::Invalid(format!(
                "safe diff must not be negative, got {}",
                self.safe_diff_c
            )));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
        Err(_) => Ok(None),
    }
}
