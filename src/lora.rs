use crate::report::ECU_RECORD_SIZE_BYTES;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// LoRa messages to observe before a warmup gate opens.
pub const LORA_MSG_COUNT: u32 = 3;

/// First byte of an outbound ECU frame: power on/off.
pub const ECU_CMD_POWER: u8 = 0x01;
/// First byte of an outbound ECU frame: processing configuration.
pub const ECU_CMD_CONFIG: u8 = 0x02;
/// Seconds allowed for a warmup gate to collect its messages.
pub const LORA_WARMUP_MSG_TIMEOUT: u32 = 15;

/// One message from the ECU over the LoRa link: a link-level id plus a
/// fixed-size measurement record destined for the RATS report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcuLoraMsg {
    pub id: u32,
    pub record: [u8; ECU_RECORD_SIZE_BYTES],
}

/// Short-range radio link to the ECU. `receive` is non-blocking and returns
/// at most one message per call; driver-internal queue overflows are surfaced
/// through `queue_overflows` and are non-fatal.
pub trait EcuLoraLink {
    fn receive(&mut self) -> Option<EcuLoraMsg>;
    fn send(&mut self, payload: &[u8]) -> bool;
    fn queue_overflows(&mut self) -> u32 {
        0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct LoraCounters {
    pub total: u32,
    pub warmup: u32,
    pub driver_overflows: u32,
}

/// Receive-side state: the most recent message and the two counters the
/// warmup gates and the report trigger run on.
#[derive(Debug, Default)]
pub struct LoraRx {
    last_msg: Option<EcuLoraMsg>,
    counters: LoraCounters,
}

impl LoraRx {
    pub fn new() -> Self {
        Self::default()
    }

    /// Poll the link once. Returns the record of a newly received message so
    /// the caller can hand it to the report aggregator.
    pub fn poll<L: EcuLoraLink>(&mut self, link: &mut L) -> Option<[u8; ECU_RECORD_SIZE_BYTES]> {
        let overflows = link.queue_overflows();
        if overflows > self.counters.driver_overflows {
            warn!(
                dropped = overflows - self.counters.driver_overflows,
                "LoRa driver queue overflow"
            );
            self.counters.driver_overflows = overflows;
        }

        let msg = link.receive()?;
        self.counters.total += 1;
        self.counters.warmup += 1;
        let record = msg.record;
        self.last_msg = Some(msg);
        Some(record)
    }

    /// Warmup counter access, mirroring the reset-on-demand gate: pass
    /// `reset = true` when (re)entering a warmup phase.
    pub fn count_check(&mut self, reset: bool) -> u32 {
        if reset {
            self.counters.warmup = 0;
        }
        self.counters.warmup
    }

    /// Register a synthetic message (SIM_LORA_MSG action).
    pub fn inject_synthetic(&mut self) -> [u8; ECU_RECORD_SIZE_BYTES] {
        let record = [0u8; ECU_RECORD_SIZE_BYTES];
        self.counters.total += 1;
        self.counters.warmup += 1;
        self.last_msg = Some(EcuLoraMsg { id: 0, record });
        record
    }

    pub fn counters(&self) -> &LoraCounters {
        &self.counters
    }

    pub fn last_msg(&self) -> Option<&EcuLoraMsg> {
        self.last_msg.as_ref()
    }
}
