use crate::types::OneShotLatch;

/// The governor's two irreversible safety decisions.
///
/// - The permission gate closes the first time core 0 is found offline.
///   From then on the frequency ceilings can't be written until restart.
/// - The user override closes on the first successful frequency-ceiling
///   write. From then on core 0 is never taken offline automatically.
#[derive(Debug)]
pub struct SafetyLatches {
    permission_gate: OneShotLatch,
    user_override: OneShotLatch,
}

impl Default for SafetyLatches {
    fn default() -> Self {
        Self {
            permission_gate: OneShotLatch::new("core0_disable_permanently_denied"),
            user_override: OneShotLatch::new("user_overrode_frequency_table"),
        }
    }
}

impl SafetyLatches {
    pub fn permission_gate(&self) -> &OneShotLatch {
        &self.permission_gate
    }

    pub fn user_override(&self) -> &OneShotLatch {
        &self.user_override
    }
}
