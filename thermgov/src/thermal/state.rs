use super::config::ThermalConfig;
use super::limiter::FrequencyLimiter;
use crate::tracing::prelude::*;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ThrottleState {
    Normal,
    Throttling,
}

/// What one evaluation decided to do with the frequency cap.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ThrottleDecision {
    /// Cooled below `temp_threshold - safe_diff`: lift the cap.
    Restore,
    /// At or above `level_hot`: cap at `freq_hot`.
    Hot(u32),
    /// Above `temp_threshold`: cap at `freq_warm`.
    Warm(u32),
    /// Leave state and cap as they are.
    Hold,
}

impl ThrottleState {
    /// Evaluate the transition rules for `temp`.
    ///
    /// Exiting uses `temp_threshold - safe_diff` rather than the entry
    /// threshold so the cap doesn't flap around a single temperature.
    pub fn decide(self, temp: i32, config: &ThermalConfig, safe_diff_c: i32) -> ThrottleDecision {
        if self == ThrottleState::Throttling && temp < config.temp_threshold_c() - safe_diff_c {
            ThrottleDecision::Restore
        } else if temp >= config.level_hot_c() {
            ThrottleDecision::Hot(config.freq_hot_khz())
        } else if temp > config.temp_threshold_c() {
            ThrottleDecision::Warm(config.freq_warm_khz())
        } else {
            ThrottleDecision::Hold
        }
    }
}

/// Two-state hysteresis driving the [`FrequencyLimiter`].
#[derive(Debug)]
pub struct ThrottleStateMachine {
    state: ThrottleState,
    safe_diff_c: i32,
}

impl ThrottleStateMachine {
    pub fn new(safe_diff_c: i32) -> Self {
        Self {
            state: ThrottleState::Normal,
            safe_diff_c,
        }
    }

    pub fn state(&self) -> ThrottleState {
        self.state
    }

    pub async fn tick(
        &mut self,
        temp: i32,
        config: &ThermalConfig,
        limiter: &FrequencyLimiter,
    ) -> ThrottleDecision {
        let decision = self.state.decide(temp, config, self.safe_diff_c);
        let previous = self.state;

        match decision {
            ThrottleDecision::Restore => {
                limiter.apply(limiter.hardware_max_freq()).await;
                self.state = ThrottleState::Normal;
            }
            ThrottleDecision::Hot(freq) | ThrottleDecision::Warm(freq) => {
                limiter.apply(freq).await;
                self.state = ThrottleState::Throttling;
            }
            ThrottleDecision::Hold => {}
        }

        if self.state != previous {
            info!(
                previous_state = ?previous,
                new_state = ?self.state,
                temp_c = temp,
                limited_max_freq_khz = limiter.limited_max_freq(),
                "Throttle state changed"
            );
        }

        decision
    }

    #[cfg(test)]
    fn set_state(&mut self, state: ThrottleState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::hw::sim::SimulatedCpu;
    use crate::thermal::cores::CoreSet;
    use test_case::test_case;

    const SAFE_DIFF: i32 = 5;

    #[test_case(ThrottleState::Normal, 55 => ThrottleDecision::Hold; "normal at threshold")]
    #[test_case(ThrottleState::Normal, 56 => ThrottleDecision::Warm(1_094_400); "normal just above threshold")]
    #[test_case(ThrottleState::Normal, 59 => ThrottleDecision::Warm(1_094_400); "normal below level hot")]
    #[test_case(ThrottleState::Normal, 60 => ThrottleDecision::Hot(800_000); "normal at level hot")]
    #[test_case(ThrottleState::Normal, 82 => ThrottleDecision::Hot(800_000); "normal far above")]
    #[test_case(ThrottleState::Normal, 20 => ThrottleDecision::Hold; "normal cold")]
    #[test_case(ThrottleState::Throttling, 49 => ThrottleDecision::Restore; "throttling below exit")]
    #[test_case(ThrottleState::Throttling, 50 => ThrottleDecision::Hold; "throttling at exit")]
    #[test_case(ThrottleState::Throttling, 55 => ThrottleDecision::Hold; "throttling at threshold")]
    #[test_case(ThrottleState::Throttling, 57 => ThrottleDecision::Warm(1_094_400); "throttling warm")]
    #[test_case(ThrottleState::Throttling, 61 => ThrottleDecision::Hot(800_000); "throttling hot")]
    fn should_decide(state: ThrottleState, temp: i32) -> ThrottleDecision {
        state.decide(temp, &ThermalConfig::default(), SAFE_DIFF)
    }

    fn limiter() -> (FrequencyLimiter, Arc<SimulatedCpu>) {
        let cpu = SimulatedCpu::quad();
        let cores = Arc::new(CoreSet::new(cpu.clone()));
        (FrequencyLimiter::new(2_265_600, cpu.clone(), cores), cpu)
    }

    #[tokio::test]
    async fn should_enter_throttling_with_hot_cap() {
        let (limiter, _cpu) = limiter();
        let mut machine = ThrottleStateMachine::new(SAFE_DIFF);

        machine.tick(82, &ThermalConfig::default(), &limiter).await;

        assert_eq!(machine.state(), ThrottleState::Throttling);
        assert_eq!(limiter.limited_max_freq(), 800_000);
    }

    #[tokio::test]
    async fn should_step_from_hot_to_warm_cap() {
        let (limiter, _cpu) = limiter();
        let mut machine = ThrottleStateMachine::new(SAFE_DIFF);
        let config = ThermalConfig::default();

        machine.tick(65, &config, &limiter).await;
        machine.tick(57, &config, &limiter).await;

        assert_eq!(machine.state(), ThrottleState::Throttling);
        assert_eq!(limiter.limited_max_freq(), 1_094_400);
    }

    #[tokio::test]
    async fn should_restore_hardware_max_below_exit_temperature() {
        let (limiter, _cpu) = limiter();
        let mut machine = ThrottleStateMachine::new(SAFE_DIFF);
        let config = ThermalConfig::default();

        machine.tick(62, &config, &limiter).await;
        let decision = machine.tick(49, &config, &limiter).await;

        assert_eq!(decision, ThrottleDecision::Restore);
        assert_eq!(machine.state(), ThrottleState::Normal);
        assert_eq!(limiter.limited_max_freq(), 2_265_600);
    }

    #[tokio::test]
    async fn should_keep_cap_inside_hysteresis_band() {
        let (limiter, _cpu) = limiter();
        let mut machine = ThrottleStateMachine::new(SAFE_DIFF);
        let config = ThermalConfig::default();

        machine.tick(57, &config, &limiter).await;
        machine.tick(52, &config, &limiter).await;

        assert_eq!(machine.state(), ThrottleState::Throttling);
        assert_eq!(limiter.limited_max_freq(), 1_094_400);
    }

    #[tokio::test]
    async fn should_hold_without_touching_cores() {
        let (limiter, cpu) = limiter();
        let mut machine = ThrottleStateMachine::new(SAFE_DIFF);
        machine.set_state(ThrottleState::Throttling);

        let decision = machine.tick(52, &ThermalConfig::default(), &limiter).await;

        assert_eq!(decision, ThrottleDecision::Hold);
        assert_eq!(machine.state(), ThrottleState::Throttling);
        assert!(cpu.events().is_empty());
    }
}
