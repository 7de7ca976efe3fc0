use serde::{Deserialize, Serialize};
use tracing::warn;

/// Ticks a raised-but-unobserved flag survives before it is force-cleared.
pub const FLAG_STALE: u8 = 3;

pub const NUM_ACTIONS: usize = 12;

/// Deferred signals exchanged between the scheduler, the telecommand
/// dispatcher, and the flight state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(usize)]
pub enum ScheduleAction {
    SendStatus,
    GpsWaitMsg,
    LoraWaitMsg,
    LoraCountMsgs,
    StartTelemetry,
    RatsReport,
    ReelOut,
    ReelIn,
    InNoLw,
    MotionStop,
    MotionTimeout,
    SimLoraMsg,
}

pub const ALL_ACTIONS: [ScheduleAction; NUM_ACTIONS] = [
    ScheduleAction::SendStatus,
    ScheduleAction::GpsWaitMsg,
    ScheduleAction::LoraWaitMsg,
    ScheduleAction::LoraCountMsgs,
    ScheduleAction::StartTelemetry,
    ScheduleAction::RatsReport,
    ScheduleAction::ReelOut,
    ScheduleAction::ReelIn,
    ScheduleAction::InNoLw,
    ScheduleAction::MotionStop,
    ScheduleAction::MotionTimeout,
    ScheduleAction::SimLoraMsg,
];

impl ScheduleAction {
    pub fn label(self) -> &'static str {
        match self {
            ScheduleAction::SendStatus => "SEND_STATUS",
            ScheduleAction::GpsWaitMsg => "GPS_WAIT_MSG",
            ScheduleAction::LoraWaitMsg => "LORA_WAIT_MSG",
            ScheduleAction::LoraCountMsgs => "LORA_COUNT_MSGS",
            ScheduleAction::StartTelemetry => "START_TELEMETRY",
            ScheduleAction::RatsReport => "RATS_REPORT",
            ScheduleAction::ReelOut => "REEL_OUT",
            ScheduleAction::ReelIn => "REEL_IN",
            ScheduleAction::InNoLw => "IN_NO_LW",
            ScheduleAction::MotionStop => "MOTION_STOP",
            ScheduleAction::MotionTimeout => "MOTION_TIMEOUT",
            ScheduleAction::SimLoraMsg => "SIM_LORA_MSG",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ActionFlag {
    raised: bool,
    stale_ticks: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ActionFlagStats {
    pub total_raised: u32,
    pub total_consumed: u32,
    pub total_stale_cleared: u32,
}

/// Edge-triggered flag table indexed by [`ScheduleAction`].
///
/// Single-producer/single-consumer within one tick: producers call `set`,
/// the state machine calls `check_and_clear`, and the controller calls
/// `tick` last so an unconsumed flag decays after [`FLAG_STALE`] ticks.
#[derive(Debug, Default)]
pub struct ActionFlags {
    flags: [ActionFlag; NUM_ACTIONS],
    stats: ActionFlagStats,
}

impl ActionFlags {
    pub fn new() -> Self {
        Self {
            flags: [ActionFlag::default(); NUM_ACTIONS],
            stats: ActionFlagStats::default(),
        }
    }

    /// Raise a flag. A flag that is already raised and unconsumed keeps its
    /// remaining staleness window.
    pub fn set(&mut self, action: ScheduleAction) {
        let flag = &mut self.flags[action as usize];
        if !flag.raised {
            flag.raised = true;
            flag.stale_ticks = FLAG_STALE;
            self.stats.total_raised += 1;
        }
    }

    /// Return whether the flag was raised, clearing it either way.
    pub fn check_and_clear(&mut self, action: ScheduleAction) -> bool {
        let flag = &mut self.flags[action as usize];
        let was_raised = flag.raised;
        flag.raised = false;
        flag.stale_ticks = 0;
        if was_raised {
            self.stats.total_consumed += 1;
        }
        was_raised
    }

    pub fn is_raised(&self, action: ScheduleAction) -> bool {
        self.flags[action as usize].raised
    }

    /// Decay unconsumed flags; a flag whose window reaches zero is forcibly
    /// cleared and logged.
    pub fn tick(&mut self) {
        for action in ALL_ACTIONS {
            let flag = &mut self.flags[action as usize];
            if flag.raised {
                flag.stale_ticks = flag.stale_ticks.saturating_sub(1);
                if flag.stale_ticks == 0 {
                    flag.raised = false;
                    self.stats.total_stale_cleared += 1;
                    warn!(action = action.label(), "stale action flag cleared");
                }
            }
        }
    }

    pub fn stats(&self) -> &ActionFlagStats {
        &self.stats
    }

    pub fn stale_ticks(&self, action: ScheduleAction) -> u8 {
        self.flags[action as usize].stale_ticks
    }
}
