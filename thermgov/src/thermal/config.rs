use std::sync::Arc;

use parking_lot::RwLock;

use super::latches::SafetyLatches;
use crate::config::TopologyClass;
use crate::tracing::prelude::*;
use crate::tunables::{Tunable, TunableError};

pub const TEMP_THRESHOLD_MIN_C: i32 = 40;
pub const TEMP_THRESHOLD_MAX_C: i32 = 90;
pub const TEMP_STEP_MIN_C: i32 = 1;
pub const TEMP_STEP_MAX_C: i32 = 6;

const DEFAULT_TEMP_THRESHOLD_C: i32 = 55;
const DEFAULT_TEMP_STEP_C: i32 = 5;
const DEFAULT_FREQ_HOT_KHZ: u32 = 800_000;
const DEFAULT_FREQ_WARM_OCTA_KHZ: u32 = 1_113_600;
const DEFAULT_FREQ_WARM_QUAD_KHZ: u32 = 1_094_400;

/// Runtime-tunable throttling parameters.
///
/// `level_hot` is derived and always equals `temp_threshold + temp_step`;
/// the fields are private so nothing can break that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThermalConfig {
    temp_threshold_c: i32,
    temp_step_c: i32,
    level_hot_c: i32,
    freq_hot_khz: u32,
    freq_warm_khz: u32,
}

impl ThermalConfig {
    pub fn new(temp_threshold_c: i32, temp_step_c: i32, freq_hot_khz: u32, freq_warm_khz: u32) -> Self {
        Self {
            temp_threshold_c,
            temp_step_c,
            level_hot_c: temp_threshold_c + temp_step_c,
            freq_hot_khz,
            freq_warm_khz,
        }
    }

    /// Defaults for a topology. `freq_warm` differs between octa and quad
    /// parts.
    pub fn for_topology(topology: Option<TopologyClass>) -> Self {
        let freq_warm = match topology {
            Some(TopologyClass::Octa) => DEFAULT_FREQ_WARM_OCTA_KHZ,
            _ => DEFAULT_FREQ_WARM_QUAD_KHZ,
        };
        Self::new(
            DEFAULT_TEMP_THRESHOLD_C,
            DEFAULT_TEMP_STEP_C,
            DEFAULT_FREQ_HOT_KHZ,
            freq_warm,
        )
    }

    /// Lowest temperature that starts throttling (°C).
    pub fn temp_threshold_c(&self) -> i32 {
        self.temp_threshold_c
    }

    /// Gap between the warm and hot throttle points (°C).
    pub fn temp_step_c(&self) -> i32 {
        self.temp_step_c
    }

    /// Temperature at or above which `freq_hot` applies (°C).
    pub fn level_hot_c(&self) -> i32 {
        self.level_hot_c
    }

    pub fn freq_hot_khz(&self) -> u32 {
        self.freq_hot_khz
    }

    pub fn freq_warm_khz(&self) -> u32 {
        self.freq_warm_khz
    }
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self::for_topology(Some(TopologyClass::Quad))
    }
}

/// Validated store for [`ThermalConfig`].
///
/// Writes are validated and either applied whole or rejected with the
/// previous value kept. Frequency-ceiling writes consult the permission
/// gate and mark the frequency table as user-overridden.
pub struct ConfigStore {
    config: RwLock<ThermalConfig>,
    latches: Arc<SafetyLatches>,
}

impl ConfigStore {
    pub fn new(config: ThermalConfig, latches: Arc<SafetyLatches>) -> Self {
        Self {
            config: RwLock::new(config),
            latches,
        }
    }

    pub fn snapshot(&self) -> ThermalConfig {
        *self.config.read()
    }

    pub fn set_threshold(&self, value: i32) -> Result<(), TunableError> {
        check_range(
            Tunable::TempThreshold,
            value,
            TEMP_THRESHOLD_MIN_C,
            TEMP_THRESHOLD_MAX_C,
        )?;
        let mut config = self.config.write();
        *config = ThermalConfig::new(value, config.temp_step_c, config.freq_hot_khz, config.freq_warm_khz);
        info!(temp_threshold_c = value, level_hot_c = config.level_hot_c, "Threshold updated");
        Ok(())
    }

    pub fn set_step(&self, value: i32) -> Result<(), TunableError> {
        check_range(Tunable::TempStep, value, TEMP_STEP_MIN_C, TEMP_STEP_MAX_C)?;
        let mut config = self.config.write();
        *config = ThermalConfig::new(config.temp_threshold_c, value, config.freq_hot_khz, config.freq_warm_khz);
        info!(temp_step_c = value, level_hot_c = config.level_hot_c, "Step updated");
        Ok(())
    }

    pub fn set_freq_hot(&self, value: u32) -> Result<(), TunableError> {
        self.set_frequency(Tunable::FreqHot, value, |config| &mut config.freq_hot_khz)
    }

    pub fn set_freq_warm(&self, value: u32) -> Result<(), TunableError> {
        self.set_frequency(Tunable::FreqWarm, value, |config| &mut config.freq_warm_khz)
    }

    fn set_frequency(
        &self,
        tunable: Tunable,
        value: u32,
        field: impl FnOnce(&mut ThermalConfig) -> &mut u32,
    ) -> Result<(), TunableError> {
        if value == 0 {
            return Err(TunableError::InvalidInput(value.to_string()));
        }

        {
            // Gate read under the write lock: this is where a ceiling
            // write takes effect relative to the gate closing.
            let mut config = self.config.write();
            if self.latches.permission_gate().is_closed() {
                return Err(TunableError::PermanentlyLocked(tunable));
            }
            *field(&mut *config) = value;
        }
        if self.latches.user_override().close() {
            info!(
                latch = self.latches.user_override().name(),
                "Frequency table overridden by user; core 0 will not be disabled automatically"
            );
        }
        info!(tunable = %tunable, freq_khz = value, "Frequency ceiling updated");
        Ok(())
    }
}

fn check_range(tunable: Tunable, value: i32, min: i32, max: i32) -> Result<(), TunableError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(TunableError::OutOfRange {
            tunable,
            value: i64::from(value),
            min: i64::from(min),
            max: i64::from(max),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn store() -> (ConfigStore, Arc<SafetyLatches>) {
        let latches = Arc::new(SafetyLatches::default());
        (
            ConfigStore::new(ThermalConfig::default(), latches.clone()),
            latches,
        )
    }

    #[test]
    fn should_default_level_hot_to_sixty() {
        let config = ThermalConfig::default();
        assert_eq!(config.temp_threshold_c(), 55);
        assert_eq!(config.temp_step_c(), 5);
        assert_eq!(config.level_hot_c(), 60);
    }

    #[test]
    fn should_pick_warm_frequency_by_topology() {
        assert_eq!(
            ThermalConfig::for_topology(Some(TopologyClass::Octa)).freq_warm_khz(),
            1_113_600
        );
        assert_eq!(
            ThermalConfig::for_topology(Some(TopologyClass::Quad)).freq_warm_khz(),
            1_094_400
        );
        assert_eq!(ThermalConfig::for_topology(None).freq_warm_khz(), 1_094_400);
    }

    #[test_case(40)]
    #[test_case(62)]
    #[test_case(90)]
    fn should_recompute_level_hot_on_threshold_change(threshold: i32) {
        let (store, _) = store();
        store.set_step(3).unwrap();
        store.set_threshold(threshold).unwrap();

        assert_eq!(store.snapshot().level_hot_c(), threshold + 3);
    }

    #[test_case(1)]
    #[test_case(4)]
    #[test_case(6)]
    fn should_recompute_level_hot_on_step_change(step: i32) {
        let (store, _) = store();
        store.set_threshold(70).unwrap();
        store.set_step(step).unwrap();

        assert_eq!(store.snapshot().level_hot_c(), 70 + step);
    }

    #[test_case(39)]
    #[test_case(91)]
    #[test_case(-5)]
    fn should_reject_threshold_out_of_range(value: i32) {
        let (store, _) = store();
        let before = store.snapshot();

        let err = store.set_threshold(value).unwrap_err();

        assert!(matches!(err, TunableError::OutOfRange { .. }));
        assert_eq!(store.snapshot(), before);
    }

    #[test_case(0)]
    #[test_case(7)]
    fn should_reject_step_out_of_range(value: i32) {
        let (store, _) = store();
        let before = store.snapshot();

        let err = store.set_step(value).unwrap_err();

        assert!(matches!(err, TunableError::OutOfRange { .. }));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn should_set_override_flag_on_frequency_write() {
        let (store, latches) = store();
        assert!(!latches.user_override().is_closed());

        store.set_freq_hot(729_600).unwrap();

        assert_eq!(store.snapshot().freq_hot_khz(), 729_600);
        assert!(latches.user_override().is_closed());
    }

    #[test]
    fn should_lock_frequency_writes_once_gate_is_closed() {
        let (store, latches) = store();
        latches.permission_gate().close();

        assert!(matches!(
            store.set_freq_hot(900_000),
            Err(TunableError::PermanentlyLocked(Tunable::FreqHot))
        ));
        assert!(matches!(
            store.set_freq_warm(900_000),
            Err(TunableError::PermanentlyLocked(Tunable::FreqWarm))
        ));
        assert_eq!(store.snapshot(), ThermalConfig::default());
        assert!(!latches.user_override().is_closed());
    }

    #[test]
    fn should_reject_zero_frequency_without_setting_override() {
        let (store, latches) = store();

        assert!(matches!(
            store.set_freq_warm(0),
            Err(TunableError::InvalidInput(_))
        ));
        assert!(!latches.user_override().is_closed());
    }

    #[test]
    fn should_never_change_ceiling_after_reporting_lock() {
        let (store, latches) = store();

        std::thread::scope(|s| {
            let writer = s.spawn(|| {
                let mut last_accepted = None;
                for freq in 500_000..600_000 {
                    match store.set_freq_hot(freq) {
                        Ok(()) => last_accepted = Some(freq),
                        Err(TunableError::PermanentlyLocked(_)) => return last_accepted,
                        Err(e) => panic!("unexpected error {e}"),
                    }
                }
                last_accepted
            });
            s.spawn(|| latches.permission_gate().close());

            let last_accepted = writer.join().unwrap();
            let stored = store.snapshot().freq_hot_khz();
            assert_eq!(stored, last_accepted.unwrap_or(800_000));
        });

        assert!(store.set_freq_hot(700_000).is_err());
    }
}
