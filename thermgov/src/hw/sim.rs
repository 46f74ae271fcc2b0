//! In-memory CPU for tests and dry runs.
//!
//! One [`SimulatedCpu`] implements every collaborator trait. Tests set the
//! temperature, flip the external signals and inject faults, then inspect
//! the recorded [`SimEvent`]s to see exactly which hotplug operations and
//! policy re-evaluations the governor performed, in order.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    CpuFreqPolicy, CpuHotplug, HwError, NotifierChain, NotifierId, PlatformSignals, PolicyEvent,
    PolicyLimits, PolicyNotifier, Result, TemperatureSensor,
};

/// Externally observable action performed against the simulated CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    BroughtOnline(usize),
    TakenOffline(usize),
    /// A policy re-evaluation finished with this maximum (kHz).
    PolicyUpdated { core: usize, max: u32 },
}

/// Oldest events are dropped past this many, so a long `--simulate` run
/// stays bounded.
const EVENT_LOG_CAPACITY: usize = 1024;

#[derive(Debug)]
struct SimState {
    online: Vec<bool>,
    temperature: i32,
    /// When non-empty, each read consumes the next entry, cycling.
    script: Vec<i32>,
    script_pos: usize,
    sensor_fault: bool,
    failing_cores: HashSet<usize>,
    policies: Vec<PolicyLimits>,
    events: VecDeque<SimEvent>,
    core0_auto_disable_permitted: bool,
    external_hotplug_active: bool,
}

impl SimState {
    fn record(&mut self, event: SimEvent) {
        if self.events.len() == EVENT_LOG_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

pub struct SimulatedCpu {
    state: Mutex<SimState>,
    notifiers: NotifierChain,
    hardware_min_freq: u32,
    hardware_max_freq: u32,
}

impl SimulatedCpu {
    /// A CPU with `cores` cores, all online, at 30°C.
    pub fn new(cores: usize, hardware_min_freq: u32, hardware_max_freq: u32) -> Self {
        let policies = (0..cores)
            .map(|core| PolicyLimits::full_range(core, hardware_min_freq, hardware_max_freq))
            .collect();
        Self {
            state: Mutex::new(SimState {
                online: vec![true; cores],
                temperature: 30,
                script: Vec::new(),
                script_pos: 0,
                sensor_fault: false,
                failing_cores: HashSet::new(),
                policies,
                events: VecDeque::with_capacity(EVENT_LOG_CAPACITY),
                core0_auto_disable_permitted: false,
                external_hotplug_active: false,
            }),
            notifiers: NotifierChain::default(),
            hardware_min_freq,
            hardware_max_freq,
        }
    }

    /// Octa-core CPU with typical big.LITTLE frequencies.
    pub fn octa() -> Arc<Self> {
        Arc::new(Self::new(8, 384_000, 1_958_400))
    }

    /// Quad-core CPU with typical frequencies.
    pub fn quad() -> Arc<Self> {
        Arc::new(Self::new(4, 300_000, 2_265_600))
    }

    pub fn set_temperature(&self, temperature: i32) {
        self.state.lock().temperature = temperature;
    }

    /// Replay `script` on successive reads, wrapping around.
    pub fn set_temperature_script(&self, script: Vec<i32>) {
        let mut state = self.state.lock();
        state.script = script;
        state.script_pos = 0;
    }

    pub fn set_sensor_fault(&self, fault: bool) {
        self.state.lock().sensor_fault = fault;
    }

    /// Make hotplug operations on `core` fail.
    pub fn set_hotplug_fault(&self, core: usize, fault: bool) {
        let mut state = self.state.lock();
        if fault {
            state.failing_cores.insert(core);
        } else {
            state.failing_cores.remove(&core);
        }
    }

    pub fn set_core0_auto_disable_permitted(&self, permitted: bool) {
        self.state.lock().core0_auto_disable_permitted = permitted;
    }

    pub fn set_external_hotplug_active(&self, active: bool) {
        self.state.lock().external_hotplug_active = active;
    }

    /// Change a core's state from outside the governor. Not recorded as an
    /// event.
    pub fn force_online_state(&self, core: usize, online: bool) {
        if let Some(slot) = self.state.lock().online.get_mut(core) {
            *slot = online;
        }
    }

    pub fn online_cores(&self) -> Vec<usize> {
        let state = self.state.lock();
        (0..state.online.len()).filter(|&c| state.online[c]).collect()
    }

    pub fn policy(&self, core: usize) -> Option<PolicyLimits> {
        self.state.lock().policies.get(core).copied()
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.state.lock().events.iter().copied().collect()
    }

    /// Return and clear the recorded events.
    pub fn take_events(&self) -> Vec<SimEvent> {
        self.state.lock().events.drain(..).collect()
    }

    pub fn notifier_count(&self) -> usize {
        self.notifiers.len()
    }

    fn set_online(&self, core: usize, online: bool) -> Result<()> {
        let mut state = self.state.lock();
        if core >= state.online.len() {
            return Err(HwError::NoSuchCore(core));
        }
        if state.failing_cores.contains(&core) {
            return Err(HwError::Fault(format!("simulated hotplug fault on core {core}")));
        }
        state.online[core] = online;
        state.record(if online {
            SimEvent::BroughtOnline(core)
        } else {
            SimEvent::TakenOffline(core)
        });
        Ok(())
    }
}

#[async_trait]
impl TemperatureSensor for SimulatedCpu {
    async fn read_temperature(&self, _sensor_id: u32) -> Result<i32> {
        let mut state = self.state.lock();
        if state.sensor_fault {
            return Err(HwError::Fault("simulated sensor fault".into()));
        }
        if !state.script.is_empty() {
            let pos = state.script_pos % state.script.len();
            let next = state.script[pos];
            state.temperature = next;
            state.script_pos = pos + 1;
        }
        Ok(state.temperature)
    }
}

#[async_trait]
impl CpuHotplug for SimulatedCpu {
    fn possible_cores(&self) -> usize {
        self.state.lock().online.len()
    }

    async fn is_online(&self, core: usize) -> Result<bool> {
        self.state
            .lock()
            .online
            .get(core)
            .copied()
            .ok_or(HwError::NoSuchCore(core))
    }

    async fn bring_online(&self, core: usize) -> Result<()> {
        self.set_online(core, true)
    }

    async fn take_offline(&self, core: usize) -> Result<()> {
        self.set_online(core, false)
    }
}

#[async_trait]
impl CpuFreqPolicy for SimulatedCpu {
    async fn hardware_max_freq(&self) -> Result<u32> {
        Ok(self.hardware_max_freq)
    }

    async fn update_policy(&self, core: usize) -> Result<()> {
        if core >= self.possible_cores() {
            return Err(HwError::NoSuchCore(core));
        }

        // Notifiers run without the state lock held.
        let mut policy =
            PolicyLimits::full_range(core, self.hardware_min_freq, self.hardware_max_freq);
        self.notifiers.call(PolicyEvent::Adjust, &mut policy);
        self.notifiers.call(PolicyEvent::Notify, &mut policy);

        let mut state = self.state.lock();
        state.policies[core] = policy;
        state.record(SimEvent::PolicyUpdated {
            core,
            max: policy.max,
        });
        Ok(())
    }

    fn register_notifier(&self, notifier: Arc<dyn PolicyNotifier>) -> NotifierId {
        self.notifiers.register(notifier)
    }

    fn unregister_notifier(&self, id: NotifierId) -> bool {
        self.notifiers.unregister(id)
    }
}

#[async_trait]
impl PlatformSignals for SimulatedCpu {
    async fn core0_auto_disable_permitted(&self) -> bool {
        self.state.lock().core0_auto_disable_permitted
    }

    async fn external_hotplug_active(&self) -> bool {
        self.state.lock().external_hotplug_active
    }
}
