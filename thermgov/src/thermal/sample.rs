use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::hw::TemperatureSensor;
use crate::tracing::prelude::*;

/// Readings outside this range are treated as sensor faults (°C).
const PLAUSIBLE_RANGE_C: RangeInclusive<i32> = -40..=150;

/// One temperature sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub temperature_c: i32,
    /// The sensor failed and `temperature_c` is the last known good value.
    pub degraded: bool,
}

/// Samples the sensor and falls back to the last good value on failure.
///
/// A failed read or an implausible value never reaches the control logic.
/// Until the first good read there is nothing to fall back to and
/// [`sample`](Self::sample) returns `None`.
pub struct TemperatureSampler {
    sensor: Arc<dyn TemperatureSensor>,
    sensor_id: u32,
    last_good: Option<i32>,
    degraded: bool,
}

impl TemperatureSampler {
    pub fn new(sensor: Arc<dyn TemperatureSensor>, sensor_id: u32) -> Self {
        Self {
            sensor,
            sensor_id,
            last_good: None,
            degraded: false,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub async fn sample(&mut self) -> Option<Reading> {
        let fault = match self.sensor.read_temperature(self.sensor_id).await {
            Ok(temp) if PLAUSIBLE_RANGE_C.contains(&temp) => {
                if self.degraded {
                    info!(sensor_id = self.sensor_id, temp_c = temp, "Sensor recovered");
                }
                self.degraded = false;
                self.last_good = Some(temp);
                return Some(Reading {
                    temperature_c: temp,
                    degraded: false,
                });
            }
            Ok(temp) => format!("implausible reading {temp}°C"),
            Err(e) => e.to_string(),
        };

        if !self.degraded {
            warn!(
                sensor_id = self.sensor_id,
                fault = %fault,
                last_good_c = ?self.last_good,
                "Sensor read failed; running degraded on last known temperature"
            );
        }
        self.degraded = true;

        self.last_good.map(|temp| Reading {
            temperature_c: temp,
            degraded: true,
        })
    }
}
