use crate::mcb::MCB_RESEND_TIMEOUT;
use serde::{Deserialize, Serialize};

/// Slack added to the velocity-derived motion time before the watchdog trips.
pub const MOTION_TIMEOUT_MARGIN_SECS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionKind {
    ReelIn,
    ReelOut,
    /// Reel in without the level wind engaged.
    InNoLw,
}

impl MotionKind {
    pub fn label(self) -> &'static str {
        match self {
            MotionKind::ReelIn => "REEL_IN",
            MotionKind::ReelOut => "REEL_OUT",
            MotionKind::InNoLw => "IN_NO_LW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionState {
    Idle,
    Starting,
    Running,
    Cancelling,
    Completing,
}

/// Per-tick outcome handed back to the flight state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionOutcome {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MotionSnapshot {
    pub state: MotionState,
    pub kind: Option<MotionKind>,
    pub ongoing: bool,
    pub reel_pos: f32,
    pub elapsed_secs: u32,
    pub max_seconds: u32,
}

/// Context for the single in-flight reel motion.
///
/// The MCB router mutates this as acks, status, faults, and completion
/// arrive on the serial link; the flight state machine polls it once per
/// tick and decides the transition. At most one motion exists at a time.
#[derive(Debug)]
pub struct ReelMotion {
    state: MotionState,
    kind: Option<MotionKind>,
    ongoing: bool,
    started_at_ms: u64,
    max_seconds: u32,
    deploy_revs: f32,
    retract_revs: f32,
    reel_pos: f32,
    fault_word: [u16; 8],
    fault_pending: bool,
    cancel_acked: bool,
    last_command_ms: u64,
    resend_count: u8,
}

impl ReelMotion {
    pub fn new() -> Self {
        Self {
            state: MotionState::Idle,
            kind: None,
            ongoing: false,
            started_at_ms: 0,
            max_seconds: 0,
            deploy_revs: 0.0,
            retract_revs: 0.0,
            reel_pos: 0.0,
            fault_word: [0; 8],
            fault_pending: false,
            cancel_acked: false,
            last_command_ms: 0,
            resend_count: 0,
        }
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn kind(&self) -> Option<MotionKind> {
        self.kind
    }

    pub fn ongoing(&self) -> bool {
        self.ongoing
    }

    pub fn reel_pos(&self) -> f32 {
        self.reel_pos
    }

    pub fn fault_word(&self) -> &[u16; 8] {
        &self.fault_word
    }

    pub fn max_seconds(&self) -> u32 {
        self.max_seconds
    }

    pub fn set_deploy_revs(&mut self, revs: f32) {
        self.deploy_revs = revs;
    }

    pub fn set_retract_revs(&mut self, revs: f32) {
        self.retract_revs = revs;
    }

    pub fn deploy_revs(&self) -> f32 {
        self.deploy_revs
    }

    pub fn retract_revs(&self) -> f32 {
        self.retract_revs
    }

    /// Commanded revolutions for a motion of `kind`.
    pub fn revs_for(&self, kind: MotionKind) -> f32 {
        match kind {
            MotionKind::ReelOut => self.deploy_revs,
            MotionKind::ReelIn | MotionKind::InNoLw => self.retract_revs,
        }
    }

    /// Watchdog budget: commanded revs at the configured velocity plus a
    /// fixed margin.
    pub fn compute_max_seconds(revs: f32, velocity: f32) -> u32 {
        if velocity <= 0.0 || !revs.is_finite() {
            return MOTION_TIMEOUT_MARGIN_SECS;
        }
        (revs.abs() / velocity).ceil() as u32 + MOTION_TIMEOUT_MARGIN_SECS
    }

    /// Claim the motion context. Refused while a motion is ongoing.
    pub fn arm(&mut self, kind: MotionKind, max_seconds: u32, now_ms: u64) -> Result<(), &'static str> {
        if self.ongoing {
            return Err("motion already ongoing");
        }
        self.state = MotionState::Starting;
        self.kind = Some(kind);
        self.ongoing = true;
        self.started_at_ms = now_ms;
        self.max_seconds = max_seconds;
        self.fault_word = [0; 8];
        self.fault_pending = false;
        self.cancel_acked = false;
        self.last_command_ms = now_ms;
        self.resend_count = 0;
        debug_assert!(self.kind.is_some());
        Ok(())
    }

    pub fn mark_command_sent(&mut self, now_ms: u64) {
        self.last_command_ms = now_ms;
        self.resend_count += 1;
    }

    pub fn resend_count(&self) -> u8 {
        self.resend_count
    }

    /// True while waiting for the motion ack past the resend window.
    pub fn needs_resend(&self, now_ms: u64) -> bool {
        self.state == MotionState::Starting
            && now_ms.saturating_sub(self.last_command_ms) >= u64::from(MCB_RESEND_TIMEOUT) * 1000
    }

    pub fn timed_out(&self, now_ms: u64) -> bool {
        self.ongoing
            && now_ms.saturating_sub(self.started_at_ms) >= u64::from(self.max_seconds) * 1000
    }

    pub fn elapsed_secs(&self, now_ms: u64) -> u32 {
        (now_ms.saturating_sub(self.started_at_ms) / 1000) as u32
    }

    // MCB router entry points ------------------------------------------------

    pub fn on_motion_ack(&mut self) {
        if self.state == MotionState::Starting {
            self.state = MotionState::Running;
        }
    }

    pub fn on_cancel_ack(&mut self) {
        if self.state == MotionState::Cancelling {
            self.cancel_acked = true;
        }
    }

    pub fn on_status(&mut self, reel_pos: f32) {
        self.reel_pos = reel_pos;
    }

    pub fn on_complete(&mut self) {
        if matches!(self.state, MotionState::Starting | MotionState::Running) {
            self.state = MotionState::Completing;
        }
    }

    pub fn on_fault(&mut self, fault_word: [u16; 8]) {
        self.fault_word = fault_word;
        self.fault_pending = true;
    }

    // Flight state machine entry points --------------------------------------

    pub fn begin_cancel(&mut self) {
        if self.ongoing {
            self.state = MotionState::Cancelling;
        }
    }

    pub fn fault_pending(&self) -> bool {
        self.fault_pending
    }

    pub fn cancel_complete(&self) -> bool {
        self.state == MotionState::Cancelling && self.cancel_acked
    }

    pub fn motion_complete(&self) -> bool {
        self.state == MotionState::Completing
    }

    /// Release the context. Terminal for every outcome path.
    pub fn finish(&mut self) {
        self.state = MotionState::Idle;
        self.kind = None;
        self.ongoing = false;
        self.fault_pending = false;
        self.cancel_acked = false;
        self.max_seconds = 0;
    }

    pub fn snapshot(&self, now_ms: u64) -> MotionSnapshot {
        MotionSnapshot {
            state: self.state,
            kind: self.kind,
            ongoing: self.ongoing,
            reel_pos: self.reel_pos,
            elapsed_secs: if self.ongoing { self.elapsed_secs(now_ms) } else { 0 },
            max_seconds: self.max_seconds,
        }
    }
}

impl Default for ReelMotion {
    fn default() -> Self {
        Self::new()
    }
}
