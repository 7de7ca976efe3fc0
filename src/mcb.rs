use heapless::Vec;
use serde::{Deserialize, Serialize};

/// Largest binary chunk carried by a single MCB status message.
pub const MCB_BINARY_MAX: usize = 256;
/// Largest MCB EEPROM dump relayed to the ground.
pub const MCB_EEPROM_DUMP_MAX: usize = 512;

/// Seconds without an acknowledgement before a motion command is re-sent.
pub const MCB_RESEND_TIMEOUT: u32 = 10;

pub type McbChunk = Vec<u8, MCB_BINARY_MAX>;

/// Commands sent to the motor control board.
#[derive(Debug, Clone, PartialEq)]
pub enum McbCommand {
    ReelOut { revs: f32, velocity: f32 },
    ReelIn { revs: f32, velocity: f32 },
    /// Reel in without engaging the level wind.
    InNoLw { revs: f32, velocity: f32 },
    CancelMotion,
    ZeroReel,
    GetEeprom,
    GetVoltages,
    IgnoreLimits,
    UseLimits,
    OutAcc(f32),
    InAcc(f32),
    TorqueLimits(f32, f32),
    CurrentLimits(f32, f32),
}

impl McbCommand {
    pub fn is_motion_start(&self) -> bool {
        matches!(
            self,
            McbCommand::ReelOut { .. } | McbCommand::ReelIn { .. } | McbCommand::InNoLw { .. }
        )
    }
}

/// Which command an MCB acknowledgement refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum McbAck {
    Motion,
    Cancel,
    ZeroReel,
    Acceleration,
    Limits,
}

/// Messages received from the motor control board.
#[derive(Debug, Clone, PartialEq)]
pub enum McbEvent {
    Ack(McbAck),
    MotionFinished,
    MotionFault([u16; 8]),
    /// Periodic binary status during a motion; `raw` is relayed to the
    /// ground inside the motion TM.
    Status { reel_pos: f32, raw: McbChunk },
    EepromDump(Vec<u8, MCB_EEPROM_DUMP_MAX>),
    Voltages([f32; 4]),
    /// ASCII chatter, logged and dropped.
    Line(heapless::String<80>),
}

/// Serial port to the MCB. `send` returns false on TX failure; `poll` is
/// non-blocking and drained once per tick.
pub trait McbPort {
    fn send(&mut self, command: McbCommand) -> bool;
    fn poll(&mut self) -> Option<McbEvent>;
}
