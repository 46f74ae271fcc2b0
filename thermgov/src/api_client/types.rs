//! API data transfer objects.
//!
//! These types define the API contract shared between the server and
//! clients.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Governor state snapshot, refreshed after every control tick.
#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct GovernorStatus {
    /// Last temperature used for control decisions (°C).
    pub temperature_c: Option<i32>,
    /// The sensor is failing and `temperature_c` is the last good value.
    pub sensor_degraded: bool,
    pub throttling: bool,
    pub hardware_max_freq_khz: u32,
    pub limited_max_freq_khz: u32,
    pub topology: Option<String>,
    pub possible_cores: usize,
    pub online_cores: Vec<usize>,
    /// Hotplug band applied on the last tick.
    pub band: Option<String>,
    pub core_control_enabled: bool,
    pub core0_disable_permanently_denied: bool,
    pub frequency_table_overridden: bool,
    pub ticks: u64,
}

/// Current value of one tunable.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct TunableValue {
    pub name: String,
    pub value: String,
}

/// Request body for writing a tunable.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct TunableWrite {
    pub value: String,
}

/// Error response body.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}
