use crate::actions::ScheduleAction;
use crate::controller::FlightController;
use crate::lora::{EcuLoraLink, LORA_MSG_COUNT, LORA_WARMUP_MSG_TIMEOUT};
use crate::mcb::{McbCommand, McbPort};
use crate::motion::{MotionKind, MotionOutcome, ReelMotion};
use crate::zephyr::{StateFlag, ZephyrGateway};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Seconds between telemetry flushes once MEASURE is reached.
pub const TELEMETRY_PERIOD_SECS: u32 = 60;

/// Flight-mode sub-state, distinct from the host's top-level mode.
///
/// Entered at `Entry` when the host selects flight mode; `Exit` is set by
/// the host when it leaves. Only the state-machine step mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightSubState {
    Entry,
    GpsWait,
    LoraWait1,
    ConfigEcu,
    LoraWait2,
    Measure,
    SendTelemetry,
    ManualIdle,
    ManualMotion,
    Error,
    Shutdown,
    Exit,
}

impl FlightSubState {
    pub fn label(self) -> &'static str {
        match self {
            FlightSubState::Entry => "ENTRY",
            FlightSubState::GpsWait => "GPS_WAIT",
            FlightSubState::LoraWait1 => "LORA_WAIT1",
            FlightSubState::ConfigEcu => "CONFIG_ECU",
            FlightSubState::LoraWait2 => "LORA_WAIT2",
            FlightSubState::Measure => "MEASURE",
            FlightSubState::SendTelemetry => "SEND_TELEMETRY",
            FlightSubState::ManualIdle => "MANUAL_IDLE",
            FlightSubState::ManualMotion => "MANUAL_MOTION",
            FlightSubState::Error => "ERROR",
            FlightSubState::Shutdown => "SHUTDOWN",
            FlightSubState::Exit => "EXIT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarmupStatus {
    NotStarted,
    InProcess,
    Failed,
    Complete,
}

impl<M, L, Z> FlightController<M, L, Z>
where
    M: McbPort,
    L: EcuLoraLink,
    Z: ZephyrGateway,
{
    /// One state-machine evaluation. Runs the status emitter cadence and
    /// publishes the sub-state before the switch.
    pub(crate) fn flight_mode_step(&mut self, now_ms: u64) {
        self.status_msg_check(now_ms);
        self.published_substate = self.substate;

        match self.substate {
            FlightSubState::Entry => {
                info!("Entering FL");
                self.scheduler.schedule(ScheduleAction::SendStatus, 1, now_ms);
                self.scheduler.schedule(ScheduleAction::GpsWaitMsg, 5, now_ms);
                self.ecu_control(true);
                self.warmup_status = WarmupStatus::InProcess;
                self.enter(FlightSubState::GpsWait);
            }
            FlightSubState::GpsWait => {
                if self.flags.check_and_clear(ScheduleAction::GpsWaitMsg) {
                    info!("GPS_WAIT waiting for GPS time");
                    self.scheduler.schedule(ScheduleAction::GpsWaitMsg, 5, now_ms);
                }
                if self.time_valid {
                    self.scheduler.schedule(ScheduleAction::LoraWaitMsg, 1, now_ms);
                    self.lora.count_check(true);
                    self.lora_wait_start_ms = now_ms;
                    self.enter(FlightSubState::LoraWait1);
                }
            }
            FlightSubState::LoraWait1 => {
                if let Some(next) = self.lora_wait_step(now_ms, FlightSubState::ConfigEcu) {
                    self.enter(next);
                }
            }
            FlightSubState::ConfigEcu => {
                self.configure_ecu();
                self.lora.count_check(true);
                self.lora_wait_start_ms = now_ms;
                self.enter(FlightSubState::LoraWait2);
            }
            FlightSubState::LoraWait2 => {
                if let Some(next) = self.lora_wait_step(now_ms, FlightSubState::Measure) {
                    if next == FlightSubState::Measure {
                        self.warmup_status = WarmupStatus::Complete;
                        self.scheduler.schedule(ScheduleAction::StartTelemetry, 0, now_ms);
                    }
                    self.enter(next);
                }
            }
            FlightSubState::Measure => {
                if self.flags.check_and_clear(ScheduleAction::StartTelemetry) {
                    self.enter(FlightSubState::SendTelemetry);
                } else {
                    self.try_begin_reel(now_ms);
                }
                debug!("FL Measure");
            }
            FlightSubState::SendTelemetry => {
                self.rats_report_check(now_ms);
                self.scheduler
                    .schedule(ScheduleAction::StartTelemetry, TELEMETRY_PERIOD_SECS, now_ms);
                self.enter(FlightSubState::Measure);
            }
            FlightSubState::ManualIdle => {
                debug!("FL Manual Idle");
                if !self.try_begin_reel(now_ms) {
                    // The telemetry cadence dies if START_TELEMETRY went
                    // stale during a long motion; re-arm it on the way out
                    if !self.scheduler.is_scheduled(ScheduleAction::StartTelemetry)
                        && !self.flags.is_raised(ScheduleAction::StartTelemetry)
                    {
                        self.scheduler.schedule(
                            ScheduleAction::StartTelemetry,
                            TELEMETRY_PERIOD_SECS,
                            now_ms,
                        );
                    }
                    self.enter(FlightSubState::Measure);
                }
            }
            FlightSubState::ManualMotion => match self.poll_motion(now_ms) {
                MotionOutcome::Running => {}
                MotionOutcome::Completed => self.enter(FlightSubState::ManualIdle),
                MotionOutcome::Failed => {
                    self.stats.motions_failed += 1;
                    self.enter(FlightSubState::Error);
                }
            },
            FlightSubState::Error => {
                self.rats_shutdown();
                debug!("In Error Sub State");
            }
            FlightSubState::Shutdown => {
                self.rats_shutdown();
            }
            FlightSubState::Exit => {
                self.rats_shutdown();
            }
        }
    }

    fn enter(&mut self, next: FlightSubState) {
        info!("Entering FL_{}", next.label());
        self.substate = next;
    }

    /// Shared body of the two LoRa warmup gates. Returns the follow-on
    /// sub-state once the message-count gate opens.
    fn lora_wait_step(&mut self, now_ms: u64, on_pass: FlightSubState) -> Option<FlightSubState> {
        if self.flags.check_and_clear(ScheduleAction::LoraWaitMsg) {
            info!("LORA_WAIT waiting for LoRa messages");
            self.scheduler.schedule(ScheduleAction::LoraWaitMsg, 1, now_ms);
            if self.lora.count_check(false) >= LORA_MSG_COUNT {
                info!("LORA_WAIT LoRa messages received");
                if self.warmup_status == WarmupStatus::Failed {
                    self.warmup_status = WarmupStatus::InProcess;
                }
                return Some(on_pass);
            }
        }

        // Gate did not open in time: report, reset the window, retry in place
        let window_ms = u64::from(LORA_WARMUP_MSG_TIMEOUT) * 1000;
        if now_ms.saturating_sub(self.lora_wait_start_ms) >= window_ms {
            self.warmup_status = WarmupStatus::Failed;
            self.warmup_cycles = self.warmup_cycles.saturating_add(1);
            self.stats.warmup_retries += 1;
            warn!(cycles = self.warmup_cycles, "LoRa warmup timeout, retrying");
            self.zephyr.log_warn("LoRa warmup timeout, retrying");
            self.lora.count_check(true);
            self.lora_wait_start_ms = now_ms;
        }
        None
    }

    /// Consume any raised reel action and start the motion. REEL_OUT wins
    /// when several reel actions are raised in the same tick.
    fn try_begin_reel(&mut self, now_ms: u64) -> bool {
        let reel_out = self.flags.check_and_clear(ScheduleAction::ReelOut);
        let reel_in = self.flags.check_and_clear(ScheduleAction::ReelIn);
        let in_no_lw = self.flags.check_and_clear(ScheduleAction::InNoLw);

        let kind = if reel_out {
            MotionKind::ReelOut
        } else if reel_in {
            MotionKind::ReelIn
        } else if in_no_lw {
            MotionKind::InNoLw
        } else {
            return false;
        };

        info!("{} manual command", kind.label());
        if self.begin_motion(kind, now_ms).is_ok() {
            self.enter(FlightSubState::ManualMotion);
        }
        true
    }

    /// Start an MCB motion with parameters from the EEPROM configuration and
    /// the most recent telecommand lengths. A TX failure aborts the motion
    /// without entering the Error sub-state.
    pub(crate) fn begin_motion(
        &mut self,
        kind: MotionKind,
        now_ms: u64,
    ) -> Result<(), crate::controller::ControllerError> {
        use crate::controller::ControllerError;

        if self.motion.ongoing() {
            return Err(ControllerError::GuardViolation("motion ongoing"));
        }

        let revs = self.motion.revs_for(kind);
        let velocity = match kind {
            MotionKind::ReelOut => self.config.deploy_velocity(),
            MotionKind::ReelIn | MotionKind::InNoLw => self.config.retract_velocity(),
        };
        let max_seconds = ReelMotion::compute_max_seconds(revs, velocity);

        if !self.mcb.send(motion_command(kind, revs, velocity)) {
            error!(kind = kind.label(), "motion command TX failed");
            self.zephyr.log_warn("Error sending motion command to MCB");
            return Err(ControllerError::PeripheralTxFailure("motion command"));
        }

        // arm() cannot fail past the ongoing guard above
        self.motion.arm(kind, max_seconds, now_ms).map_err(ControllerError::GuardViolation)?;
        self.motion_tm.start_motion();
        self.scheduler
            .schedule(ScheduleAction::MotionTimeout, max_seconds, now_ms);
        self.stats.motions_started += 1;
        info!(
            kind = kind.label(),
            revs, velocity, max_seconds, "reel motion started"
        );
        Ok(())
    }

    /// Evaluate the in-flight motion once per tick.
    pub(crate) fn poll_motion(&mut self, now_ms: u64) -> MotionOutcome {
        if self.flags.check_and_clear(ScheduleAction::MotionStop) {
            info!("motion stop requested");
            self.motion.begin_cancel();
            if !self.mcb.send(McbCommand::CancelMotion) {
                warn!("cancel command TX failed");
                self.zephyr.log_warn("Error sending cancel to MCB");
            }
        }

        if self.motion.cancel_complete() {
            let msg = format!("Motion cancelled at {:.1} revs", self.motion.reel_pos());
            self.motion_tm.flush(StateFlag::Fine, &msg, &mut self.zephyr);
            self.end_motion();
            return MotionOutcome::Completed;
        }

        if self.motion.fault_pending() {
            let msg = format!("MCB motion fault {:?}", self.motion.fault_word());
            self.motion_tm.flush(StateFlag::Warn, &msg, &mut self.zephyr);
            self.end_motion();
            return MotionOutcome::Failed;
        }

        if self.flags.check_and_clear(ScheduleAction::MotionTimeout) || self.motion.timed_out(now_ms)
        {
            error!(max_seconds = self.motion.max_seconds(), "reel motion timeout");
            let msg = format!(
                "MCB motion timeout after {} s",
                self.motion.elapsed_secs(now_ms)
            );
            self.motion_tm.flush(StateFlag::Warn, &msg, &mut self.zephyr);
            self.end_motion();
            return MotionOutcome::Failed;
        }

        if self.motion.motion_complete() {
            let msg = format!("Motion complete: {:.1} revs", self.motion.reel_pos());
            self.motion_tm.flush(StateFlag::Fine, &msg, &mut self.zephyr);
            self.end_motion();
            return MotionOutcome::Completed;
        }

        if self.motion.needs_resend(now_ms) {
            if let Some(kind) = self.motion.kind() {
                warn!(
                    kind = kind.label(),
                    attempt = self.motion.resend_count(),
                    "motion command unacknowledged, resending"
                );
                let revs = self.motion.revs_for(kind);
                let velocity = match kind {
                    MotionKind::ReelOut => self.config.deploy_velocity(),
                    MotionKind::ReelIn | MotionKind::InNoLw => self.config.retract_velocity(),
                };
                if !self.mcb.send(motion_command(kind, revs, velocity)) {
                    warn!("motion command resend TX failed");
                }
                self.motion.mark_command_sent(now_ms);
            }
        }

        MotionOutcome::Running
    }

    fn end_motion(&mut self) {
        self.scheduler.cancel(ScheduleAction::MotionTimeout);
        self.motion.finish();
    }
}

fn motion_command(kind: MotionKind, revs: f32, velocity: f32) -> McbCommand {
    match kind {
        MotionKind::ReelOut => McbCommand::ReelOut { revs, velocity },
        MotionKind::ReelIn => McbCommand::ReelIn { revs, velocity },
        MotionKind::InNoLw => McbCommand::InNoLw { revs, velocity },
    }
}
