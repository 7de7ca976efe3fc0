use crate::actions::ScheduleAction;
use crate::controller::FlightController;
use crate::flight::FlightSubState;
use crate::lora::EcuLoraLink;
use crate::mcb::{McbCommand, McbPort};
use crate::zephyr::{StateFlag, ZephyrGateway};
use arrayvec::ArrayString;
use core::fmt::Write;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

const TC_SUMMARY_MAX: usize = 128;

type TcSummary = ArrayString<TC_SUMMARY_MAX>;

/// Telecommands delivered by the Zephyr gateway. The ground-side framing is
/// handled by the host; the dispatcher receives them already typed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Telecommand {
    DeployLen { revs: f32 },
    DeployVel { velocity: f32 },
    DeployAcc { acceleration: f32 },
    RetractLen { revs: f32 },
    RetractVel { velocity: f32 },
    RetractAcc { acceleration: f32 },
    FullRetract,
    CancelMotion,
    ZeroReel,
    TorqueLimits { limits: [f32; 2] },
    CurrentLimits { limits: [f32; 2] },
    IgnoreLimits,
    UseLimits,
    GetMcbEeprom,
    GetMcbVoltages,
    DataProcMethod { method: u8 },
    RealTimeMcbOn,
    RealTimeMcbOff,
    GetRatsEeprom,
    Unknown { id: u8 },
}

impl<M, L, Z> FlightController<M, L, Z>
where
    M: McbPort,
    L: EcuLoraLink,
    Z: ZephyrGateway,
{
    pub(crate) fn process_telecommands(&mut self, now_ms: u64) {
        while let Some(tc) = self.pop_telecommand() {
            self.dispatch_telecommand(tc, now_ms);
            self.stats.telecommands_handled += 1;
        }
    }

    /// Execute one telecommand. Always acknowledges; failures are reported
    /// through the log and a warn-level summary TM. Exactly one log line and
    /// one summary TM per command.
    pub fn dispatch_telecommand(&mut self, tc: Telecommand, _now_ms: u64) -> bool {
        let mut msg = TcSummary::new();
        let mut level = StateFlag::Fine;

        match tc {
            Telecommand::DeployLen { revs } => {
                if self.substate == FlightSubState::Measure {
                    self.motion.set_deploy_revs(revs);
                    let _ = write!(msg, "TC Deploy Length: {:.1} revs", revs);
                    self.flags.set(ScheduleAction::ReelOut);
                } else {
                    let _ = write!(msg, "Cannot deploy, not in MEASURE");
                    level = StateFlag::Warn;
                }
            }
            Telecommand::DeployVel { velocity } => {
                match self.config.set_deploy_velocity(velocity) {
                    Ok(()) => {
                        let _ = write!(msg, "TC Deploy Velocity: {}", velocity);
                    }
                    Err(reason) => {
                        let _ = write!(msg, "Rejected deploy velocity {}: {}", velocity, reason);
                        level = StateFlag::Warn;
                    }
                }
            }
            Telecommand::DeployAcc { acceleration } => {
                if self.mcb.send(McbCommand::OutAcc(acceleration)) {
                    let _ = write!(msg, "TC Deploy Acceleration: {}", acceleration);
                } else {
                    let _ = write!(msg, "Error sending deploy acc to MCB");
                    level = StateFlag::Warn;
                }
            }
            Telecommand::RetractLen { revs } => {
                if self.substate == FlightSubState::Measure {
                    self.motion.set_retract_revs(revs);
                    let _ = write!(msg, "TC Retract Length: {:.1} revs", revs);
                    self.flags.set(ScheduleAction::ReelIn);
                } else {
                    let _ = write!(msg, "Cannot retract, not in MEASURE");
                    level = StateFlag::Warn;
                }
            }
            Telecommand::RetractVel { velocity } => {
                match self.config.set_retract_velocity(velocity) {
                    Ok(()) => {
                        let _ = write!(msg, "TC Retract Velocity: {}", velocity);
                    }
                    Err(reason) => {
                        let _ = write!(msg, "Rejected retract velocity {}: {}", velocity, reason);
                        level = StateFlag::Warn;
                    }
                }
            }
            Telecommand::RetractAcc { acceleration } => {
                if self.mcb.send(McbCommand::InAcc(acceleration)) {
                    let _ = write!(msg, "TC Retract Acceleration: {}", acceleration);
                } else {
                    let _ = write!(msg, "Error sending retract acc to MCB");
                    level = StateFlag::Warn;
                }
            }
            Telecommand::FullRetract => {
                if self.substate == FlightSubState::Measure {
                    // Reel all the way back in from the current position,
                    // level wind disengaged
                    self.motion.set_retract_revs(self.motion.reel_pos().abs());
                    let _ = write!(msg, "TC Full Retract");
                    self.flags.set(ScheduleAction::InNoLw);
                } else {
                    let _ = write!(msg, "Cannot full retract, not in MEASURE");
                    level = StateFlag::Warn;
                }
            }
            Telecommand::CancelMotion => {
                // Attempt the send no matter the sub-state
                if self.mcb.send(McbCommand::CancelMotion) {
                    let _ = write!(msg, "TC Cancel Motion");
                } else {
                    let _ = write!(msg, "Error sending cancel to MCB");
                    level = StateFlag::Warn;
                }
                self.flags.set(ScheduleAction::MotionStop);
            }
            Telecommand::ZeroReel => {
                if self.motion.ongoing() {
                    let _ = write!(msg, "Can't zero reel, motion ongoing");
                    level = StateFlag::Warn;
                } else if self.mcb.send(McbCommand::ZeroReel) {
                    let _ = write!(msg, "TC Zero Reel");
                } else {
                    let _ = write!(msg, "Error sending zero reel to MCB");
                    level = StateFlag::Warn;
                }
            }
            Telecommand::TorqueLimits { limits } => {
                if self.mcb.send(McbCommand::TorqueLimits(limits[0], limits[1])) {
                    let _ = write!(msg, "TC Torque Limits");
                } else {
                    let _ = write!(msg, "Error sending torque limits to MCB");
                    level = StateFlag::Warn;
                }
            }
            Telecommand::CurrentLimits { limits } => {
                if self.mcb.send(McbCommand::CurrentLimits(limits[0], limits[1])) {
                    let _ = write!(msg, "TC Current Limits");
                } else {
                    let _ = write!(msg, "Error sending curr limits to MCB");
                    level = StateFlag::Warn;
                }
            }
            Telecommand::IgnoreLimits => {
                if self.mcb.send(McbCommand::IgnoreLimits) {
                    let _ = write!(msg, "TC Ignore Limits");
                } else {
                    let _ = write!(msg, "Error sending ignore limits to MCB");
                    level = StateFlag::Warn;
                }
            }
            Telecommand::UseLimits => {
                if self.mcb.send(McbCommand::UseLimits) {
                    let _ = write!(msg, "TC Use Limits");
                } else {
                    let _ = write!(msg, "Error sending use limits to MCB");
                    level = StateFlag::Warn;
                }
            }
            Telecommand::GetMcbEeprom => {
                if self.motion.ongoing() {
                    let _ = write!(msg, "Motion ongoing, request MCB EEPROM later");
                    level = StateFlag::Warn;
                } else if self.mcb.send(McbCommand::GetEeprom) {
                    // The MCB router relays the dump TM when it arrives
                    let _ = write!(msg, "TC get MCB EEPROM");
                } else {
                    let _ = write!(msg, "Error requesting MCB EEPROM");
                    level = StateFlag::Warn;
                }
            }
            Telecommand::GetMcbVoltages => {
                if self.mcb.send(McbCommand::GetVoltages) {
                    let _ = write!(msg, "TC get MCB voltages");
                } else {
                    let _ = write!(msg, "Error requesting MCB voltages");
                    level = StateFlag::Warn;
                }
            }
            Telecommand::DataProcMethod { method } => {
                match self.config.set_data_proc_method(method) {
                    Ok(()) => {
                        let _ = write!(msg, "TC set processing mode {}", method);
                    }
                    Err(reason) => {
                        let _ = write!(msg, "Rejected processing mode {}: {}", method, reason);
                        level = StateFlag::Warn;
                    }
                }
            }
            Telecommand::RealTimeMcbOn => {
                self.set_real_time_mcb(true, &mut msg, &mut level);
            }
            Telecommand::RealTimeMcbOff => {
                self.set_real_time_mcb(false, &mut msg, &mut level);
            }
            Telecommand::GetRatsEeprom => {
                if self.motion.ongoing() {
                    let _ = write!(msg, "Motion ongoing, request RATS EEPROM later");
                    level = StateFlag::Warn;
                } else {
                    self.send_rats_eeprom();
                    let _ = write!(msg, "TC get RATS EEPROM");
                }
            }
            Telecommand::Unknown { id } => {
                let _ = write!(msg, "Unknown TC {} received", id);
                level = StateFlag::Warn;
            }
        }

        match level {
            StateFlag::Fine => {
                info!("{}", msg.as_str());
                self.zephyr.log_fine(&msg);
            }
            StateFlag::Warn | StateFlag::Crit => {
                error!("{}", msg.as_str());
                self.zephyr.log_warn(&msg);
            }
        }

        true
    }

    fn set_real_time_mcb(&mut self, enabled: bool, msg: &mut TcSummary, level: &mut StateFlag) {
        if self.motion.ongoing() {
            let _ = write!(msg, "Cannot change real-time MCB mode, motion ongoing");
            *level = StateFlag::Warn;
            return;
        }
        // Never strand aggregated motion data across a mode switch
        if self.motion_tm.has_pending() {
            self.motion_tm
                .flush(StateFlag::Fine, "MCB motion data", &mut self.zephyr);
        }
        match self.config.set_real_time_mcb(enabled) {
            Ok(()) => {
                let _ = write!(
                    msg,
                    "{} real-time MCB mode",
                    if enabled { "Enabled" } else { "Disabled" }
                );
            }
            Err(reason) => {
                let _ = write!(msg, "Real-time MCB mode not stored: {}", reason);
                *level = StateFlag::Warn;
            }
        }
    }

    /// TM carrying the persisted configuration block as JSON.
    fn send_rats_eeprom(&mut self) {
        match serde_json::to_vec(self.config.values()) {
            Ok(payload) => {
                if !self.zephyr.send_tm(StateFlag::Fine, "RATS EEPROM", &payload) {
                    tracing::warn!("RATS EEPROM TM refused");
                }
            }
            Err(e) => tracing::warn!(error = %e, "RATS EEPROM serialization failed"),
        }
    }
}
