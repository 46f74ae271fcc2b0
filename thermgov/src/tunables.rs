//! Named runtime settings.
//!
//! Every tunable reads back as a decimal string and is written from one.
//! A rejected write leaves the stored value unchanged.
//!
//! | Name                   | Range / rule                                  |
//! |------------------------|-----------------------------------------------|
//! | `temp_threshold`       | 40..=90 °C, recomputes `level_hot`            |
//! | `temp_step`            | 1..=6 °C, recomputes `level_hot`              |
//! | `freq_hot`             | kHz > 0, locked once core 0 was recovered     |
//! | `freq_warm`            | kHz > 0, locked once core 0 was recovered     |
//! | `core_control_enabled` | integer, non-zero enables (alias `core_control`) |

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::thermal::GovernorContext;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Tunable {
    TempThreshold,
    TempStep,
    FreqHot,
    FreqWarm,
    #[serde(alias = "core_control")]
    #[strum(to_string = "core_control_enabled", serialize = "core_control")]
    CoreControlEnabled,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TunableError {
    #[error("invalid input {0:?}")]
    InvalidInput(String),

    #[error("{tunable} must be between {min} and {max}, got {value}")]
    OutOfRange {
        tunable: Tunable,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("{0} is locked: core 0 was force-recovered, restart required to change it")]
    PermanentlyLocked(Tunable),

    #[error("{0} unavailable: {1}")]
    Unavailable(Tunable, String),

    #[error("unknown tunable {0:?}")]
    UnknownTunable(String),
}

/// Read/write access to the governor's tunables.
#[derive(Clone)]
pub struct Tunables {
    context: Arc<GovernorContext>,
}

impl Tunables {
    pub fn new(context: Arc<GovernorContext>) -> Self {
        Self { context }
    }

    pub fn lookup(name: &str) -> Result<Tunable, TunableError> {
        Tunable::from_str(name.trim()).map_err(|_| TunableError::UnknownTunable(name.to_string()))
    }

    pub fn read(&self, tunable: Tunable) -> String {
        let config = self.context.config().snapshot();
        match tunable {
            Tunable::TempThreshold => config.temp_threshold_c().to_string(),
            Tunable::TempStep => config.temp_step_c().to_string(),
            Tunable::FreqHot => config.freq_hot_khz().to_string(),
            Tunable::FreqWarm => config.freq_warm_khz().to_string(),
            Tunable::CoreControlEnabled => u8::from(self.context.core_control_enabled()).to_string(),
        }
    }

    pub fn read_all(&self) -> Vec<(Tunable, String)> {
        Tunable::iter().map(|t| (t, self.read(t))).collect()
    }

    pub async fn write(&self, tunable: Tunable, raw: &str) -> Result<(), TunableError> {
        let store = self.context.config();
        let result = match tunable {
            Tunable::TempThreshold => store.set_threshold(parse_unsigned(raw)?),
            Tunable::TempStep => store.set_step(parse_unsigned(raw)?),
            Tunable::FreqHot => store.set_freq_hot(parse_frequency(raw)?),
            Tunable::FreqWarm => store.set_freq_warm(parse_frequency(raw)?),
            Tunable::CoreControlEnabled => {
                let value: i32 = raw
                    .trim()
                    .parse()
                    .map_err(|_| TunableError::InvalidInput(raw.to_string()))?;
                self.context.set_core_control(value != 0).await
            }
        };
        if result.is_ok() {
            self.context.publish(|_| {});
        }
        result
    }

    pub async fn write_named(&self, name: &str, raw: &str) -> Result<(), TunableError> {
        self.write(Self::lookup(name)?, raw).await
    }
}

/// Unsigned decimal, as the thresholds are. Values too large for `i32`
/// are reported as out of range by the caller's bounds check.
fn parse_unsigned(raw: &str) -> Result<i32, TunableError> {
    let value: u32 = raw
        .trim()
        .parse()
        .map_err(|_| TunableError::InvalidInput(raw.to_string()))?;
    Ok(i32::try_from(value).unwrap_or(i32::MAX))
}

fn parse_frequency(raw: &str) -> Result<u32, TunableError> {
    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(TunableError::InvalidInput(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopologyClass;
    use crate::hw::Platform;
    use crate::hw::sim::SimulatedCpu;
    use test_case::test_case;

    fn tunables() -> (Tunables, Arc<GovernorContext>, Arc<SimulatedCpu>) {
        let cpu = SimulatedCpu::octa();
        let context = Arc::new(GovernorContext::new(
            Some(TopologyClass::Octa),
            1_958_400,
            &Platform::simulated(cpu.clone()),
        ));
        (Tunables::new(context.clone()), context, cpu)
    }

    #[test_case("temp_threshold" => Ok(Tunable::TempThreshold))]
    #[test_case("temp_step" => Ok(Tunable::TempStep))]
    #[test_case("freq_hot" => Ok(Tunable::FreqHot))]
    #[test_case("freq_warm" => Ok(Tunable::FreqWarm))]
    #[test_case("core_control_enabled" => Ok(Tunable::CoreControlEnabled))]
    #[test_case("core_control" => Ok(Tunable::CoreControlEnabled))]
    #[test_case("level_hot" => Err(TunableError::UnknownTunable("level_hot".into())))]
    fn should_look_up_by_name(name: &str) -> Result<Tunable, TunableError> {
        Tunables::lookup(name)
    }

    #[test]
    fn should_display_canonical_names() {
        let names: Vec<String> = Tunable::iter().map(|t| t.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "temp_threshold",
                "temp_step",
                "freq_hot",
                "freq_warm",
                "core_control_enabled"
            ]
        );
    }

    #[test]
    fn should_read_defaults() {
        let (tunables, _, _) = tunables();

        assert_eq!(tunables.read(Tunable::TempThreshold), "55");
        assert_eq!(tunables.read(Tunable::TempStep), "5");
        assert_eq!(tunables.read(Tunable::FreqHot), "800000");
        assert_eq!(tunables.read(Tunable::FreqWarm), "1113600");
        assert_eq!(tunables.read(Tunable::CoreControlEnabled), "1");
    }

    #[test_case(Tunable::TempThreshold, "abc")]
    #[test_case(Tunable::TempThreshold, "-50")]
    #[test_case(Tunable::TempStep, "")]
    #[test_case(Tunable::FreqHot, "fast")]
    #[test_case(Tunable::FreqWarm, "0")]
    #[test_case(Tunable::CoreControlEnabled, "yes")]
    #[tokio::test]
    async fn should_reject_malformed_input(tunable: Tunable, raw: &str) {
        let (tunables, _, _) = tunables();
        let before = tunables.read(tunable);

        let err = tunables.write(tunable, raw).await.unwrap_err();

        assert!(matches!(err, TunableError::InvalidInput(_)));
        assert_eq!(tunables.read(tunable), before);
    }

    #[tokio::test]
    async fn should_accept_trailing_newline() {
        let (tunables, context, _) = tunables();

        tunables.write(Tunable::TempThreshold, "70\n").await.unwrap();

        assert_eq!(context.config().snapshot().level_hot_c(), 75);
    }

    #[tokio::test]
    async fn should_report_huge_threshold_out_of_range() {
        let (tunables, _, _) = tunables();

        let err = tunables
            .write(Tunable::TempThreshold, "4294967295")
            .await
            .unwrap_err();

        assert!(matches!(err, TunableError::OutOfRange { .. }));
    }

    #[tokio::test]
    async fn should_toggle_core_control_with_any_nonzero_integer() {
        let (tunables, context, _) = tunables();

        tunables.write_named("core_control", "0").await.unwrap();
        assert!(!context.core_control_enabled());

        tunables.write_named("core_control", "7").await.unwrap();
        assert!(context.core_control_enabled());
    }

    #[tokio::test]
    async fn should_refresh_status_after_frequency_write() {
        let (tunables, context, _) = tunables();

        tunables.write(Tunable::FreqWarm, "1000000").await.unwrap();

        assert!(context.status().frequency_table_overridden);
    }

    #[tokio::test]
    async fn should_lock_frequency_tunables_after_gate_closes() {
        let (tunables, context, _) = tunables();
        context.latches().permission_gate().close();

        let err = tunables.write(Tunable::FreqHot, "900000").await.unwrap_err();

        assert_eq!(err, TunableError::PermanentlyLocked(Tunable::FreqHot));
        assert_eq!(tunables.read(Tunable::FreqHot), "800000");
    }
}
