//! Thermal control: frequency capping with hysteresis and temperature-driven
//! core hotplug.

mod config;
mod context;
mod controller;
mod cores;
mod hotplug;
mod latches;
mod limiter;
mod sample;
mod state;

pub use config::{
    ConfigStore, TEMP_STEP_MAX_C, TEMP_STEP_MIN_C, TEMP_THRESHOLD_MAX_C, TEMP_THRESHOLD_MIN_C,
    ThermalConfig,
};
pub use context::GovernorContext;
pub use controller::{ThermalGovernor, TickReport};
pub use cores::{CoreSet, OnlineView};
pub use hotplug::{Band, HotplugController, HotplugReport, select_band};
pub use latches::SafetyLatches;
pub use limiter::{FrequencyLimiter, FrequencyRange};
pub use sample::{Reading, TemperatureSampler};
pub use state::{ThrottleDecision, ThrottleState, ThrottleStateMachine};
