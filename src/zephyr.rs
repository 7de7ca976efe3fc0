use serde::{Deserialize, Serialize};

/// Hard cap on a single TM binary payload.
pub const TM_PAYLOAD_MAX_BYTES: usize = 8192;

/// Seconds before an unacknowledged TM would be re-sent by the gateway layer.
pub const ZEPHYR_RESEND_TIMEOUT: u32 = 60;

/// Severity carried in a TM state message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateFlag {
    Fine,
    Warn,
    Crit,
}

/// Ground-facing telemetry gateway. Submission is synchronous and atomic at
/// this layer; `send_tm` returns false if the gateway refused the packet.
pub trait ZephyrGateway {
    fn send_tm(&mut self, flag: StateFlag, message: &str, payload: &[u8]) -> bool;

    /// Nominal-outcome log TM (message only).
    fn log_fine(&mut self, message: &str) -> bool {
        self.send_tm(StateFlag::Fine, message, &[])
    }

    /// Warning-outcome log TM (message only).
    fn log_warn(&mut self, message: &str) -> bool {
        self.send_tm(StateFlag::Warn, message, &[])
    }
}
