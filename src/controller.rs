use crate::actions::{ActionFlags, ScheduleAction};
use crate::config::{EepromStore, RatsConfig};
use crate::flight::{FlightSubState, WarmupStatus};
use crate::lora::{EcuLoraLink, LoraCounters, LoraRx, ECU_CMD_CONFIG, ECU_CMD_POWER};
use crate::mcb::{McbAck, McbEvent, McbPort};
use crate::motion::{MotionSnapshot, ReelMotion};
use crate::report::{MotionTmBuffer, RatsReportAggregator, ReportStats, ReportTrigger};
use crate::scheduler::ActionScheduler;
use crate::telecommand::Telecommand;
use crate::zephyr::{StateFlag, ZephyrGateway};
use heapless::Deque;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const MAX_TELECOMMAND_QUEUE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("guard violation: {0}")]
    GuardViolation(&'static str),
    #[error("peripheral TX failure: {0}")]
    PeripheralTxFailure(&'static str),
    #[error("motion timeout")]
    MotionTimeout,
    #[error("motion fault")]
    MotionFault,
    #[error("buffer overflow prevented")]
    BufferOverflowPrevented,
    #[error("telecommand queue full")]
    TelecommandQueueFull,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ControllerStats {
    pub ticks: u64,
    pub telecommands_handled: u32,
    pub motions_started: u32,
    pub motions_failed: u32,
    pub warmup_retries: u32,
}

/// One-line state summary, also serialized by the simulator.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub substate: &'static str,
    pub warmup_status: WarmupStatus,
    pub warmup_cycles: u8,
    pub time_valid: bool,
    pub motion: MotionSnapshot,
    pub lora: LoraCounters,
    pub reports: ReportStats,
}

/// The flight-mode controller aggregate.
///
/// Owns every piece of instrument state plus the three peripheral ports.
/// The host supervisory framework constructs it once, calls
/// [`begin_flight_mode`](Self::begin_flight_mode) on mode entry, and then
/// drives [`tick`](Self::tick) once per main loop. Telecommands and the GPS
/// time-valid edge arrive through inbound calls between ticks.
pub struct FlightController<M, L, Z>
where
    M: McbPort,
    L: EcuLoraLink,
    Z: ZephyrGateway,
{
    pub(crate) mcb: M,
    pub(crate) lora_link: L,
    pub(crate) zephyr: Z,

    pub(crate) flags: ActionFlags,
    pub(crate) scheduler: ActionScheduler,
    pub(crate) config: RatsConfig,
    pub(crate) lora: LoraRx,
    pub(crate) report: RatsReportAggregator,
    pub(crate) motion_tm: MotionTmBuffer,
    pub(crate) motion: ReelMotion,

    pub(crate) substate: FlightSubState,
    /// Sub-state as of the latest state-machine step, read by the status
    /// emitter and the telecommand validator.
    pub(crate) published_substate: FlightSubState,
    pub(crate) warmup_status: WarmupStatus,
    pub(crate) warmup_cycles: u8,
    pub(crate) lora_wait_start_ms: u64,

    pub(crate) time_valid: bool,
    /// A LoRa message arrived since the last RATS report; drives the
    /// header's ECU-power flag.
    pub(crate) ecu_msg_since_report: bool,
    pub(crate) v56_centivolts: u16,
    pub(crate) shutdown_done: bool,

    tc_queue: Deque<Telecommand, MAX_TELECOMMAND_QUEUE>,
    pub(crate) stats: ControllerStats,
}

impl<M, L, Z> FlightController<M, L, Z>
where
    M: McbPort,
    L: EcuLoraLink,
    Z: ZephyrGateway,
{
    pub fn new(mcb: M, lora_link: L, zephyr: Z, eeprom: Box<dyn EepromStore + Send>) -> Self {
        Self {
            mcb,
            lora_link,
            zephyr,
            flags: ActionFlags::new(),
            scheduler: ActionScheduler::new(),
            config: RatsConfig::new(eeprom),
            lora: LoraRx::new(),
            report: RatsReportAggregator::new(),
            motion_tm: MotionTmBuffer::new(),
            motion: ReelMotion::new(),
            substate: FlightSubState::Entry,
            published_substate: FlightSubState::Entry,
            warmup_status: WarmupStatus::NotStarted,
            warmup_cycles: 0,
            lora_wait_start_ms: 0,
            time_valid: false,
            ecu_msg_since_report: false,
            v56_centivolts: 0,
            shutdown_done: false,
            tc_queue: Deque::new(),
            stats: ControllerStats::default(),
        }
    }

    /// (Re)initialize the flight-mode state on mode entry. The monotonic
    /// LoRa total and the TC-stored reel lengths survive; everything
    /// mode-scoped is recreated.
    pub fn begin_flight_mode(&mut self, now_ms: u64) {
        self.substate = FlightSubState::Entry;
        self.published_substate = FlightSubState::Entry;
        self.warmup_status = WarmupStatus::NotStarted;
        self.warmup_cycles = 0;
        self.lora_wait_start_ms = now_ms;
        self.shutdown_done = false;
        self.flags = ActionFlags::new();
        self.scheduler.clear();
        self.motion.finish();
        self.report.reset_period(now_ms);
        info!("flight mode initialized");
    }

    /// One cooperative scheduler tick. Canonical in-tick order:
    /// LoRa poll, MCB poll, telecommand drain, scheduler fire, state-machine
    /// step, report trigger check, flag staleness decay. Telecommands run
    /// before the state-machine step, so a TC-raised flag is observed in the
    /// same tick.
    pub fn tick(&mut self, now_ms: u64) {
        self.stats.ticks += 1;

        self.lora_rx();
        self.mcb_router();
        self.process_telecommands(now_ms);
        self.scheduler.fire_due(now_ms, &mut self.flags);
        self.handle_sim_lora();
        self.flight_mode_step(now_ms);
        self.rats_report_check(now_ms);
        self.flags.tick();
    }

    // Host framework hooks ---------------------------------------------------

    /// Raised by the host when a Zephyr GPS time message has set the clock.
    pub fn gps_time_received(&mut self) {
        if !self.time_valid {
            info!("GPS time valid");
        }
        self.time_valid = true;
    }

    /// Latest 56 V bus sample, carried in the RATS report header.
    pub fn set_bus_voltage(&mut self, volts: f32) {
        self.v56_centivolts = crate::report::v56_from_volts(volts);
    }

    pub fn queue_telecommand(&mut self, tc: Telecommand) -> Result<(), ControllerError> {
        self.tc_queue.push_back(tc).map_err(|_| {
            warn!("telecommand queue full, command dropped");
            self.zephyr.log_warn("TC dropped, queue full");
            ControllerError::TelecommandQueueFull
        })
    }

    pub(crate) fn pop_telecommand(&mut self) -> Option<Telecommand> {
        self.tc_queue.pop_front()
    }

    /// Host hook: schedule a one-shot action, e.g. a forced RATS_REPORT or a
    /// simulated LoRa message during ground testing.
    pub fn schedule_action(&mut self, action: ScheduleAction, delay_secs: u32, now_ms: u64) {
        self.scheduler.schedule(action, delay_secs, now_ms);
    }

    /// Host-commanded shutdown (top-level mode change pending).
    pub fn request_shutdown(&mut self) {
        self.substate = FlightSubState::Shutdown;
    }

    /// Host-commanded mode exit.
    pub fn request_exit(&mut self) {
        self.substate = FlightSubState::Exit;
    }

    // Tick steps -------------------------------------------------------------

    fn lora_rx(&mut self) {
        if let Some(record) = self.lora.poll(&mut self.lora_link) {
            self.ecu_msg_since_report = true;
            if self.report.accumulate(record).is_err() {
                // Count trigger fires strictly before capacity; reaching
                // here means the trigger path is broken, not the radio
                error!("ECU record lost to a full report buffer");
            }
        }
    }

    fn mcb_router(&mut self) {
        while let Some(event) = self.mcb.poll() {
            match event {
                McbEvent::Ack(McbAck::Motion) => {
                    debug!("MCB motion ack");
                    self.motion.on_motion_ack();
                }
                McbEvent::Ack(McbAck::Cancel) => {
                    debug!("MCB cancel ack");
                    self.motion.on_cancel_ack();
                }
                McbEvent::Ack(ack) => debug!(ack = ?ack, "MCB ack"),
                McbEvent::MotionFinished => {
                    info!("MCB reports motion complete");
                    self.motion.on_complete();
                }
                McbEvent::MotionFault(fault_word) => {
                    error!(fault = ?fault_word, "MCB motion fault");
                    self.motion.on_fault(fault_word);
                }
                McbEvent::Status { reel_pos, raw } => {
                    if self.motion.ongoing() {
                        self.motion.on_status(reel_pos);
                        let real_time = self.config.real_time_mcb();
                        let _ = self.motion_tm.add_chunk(&raw, real_time, &mut self.zephyr);
                    } else {
                        debug!(reel_pos, "MCB status outside motion");
                    }
                }
                McbEvent::EepromDump(bytes) => {
                    info!(len = bytes.len(), "MCB EEPROM dump received");
                    if !self.zephyr.send_tm(StateFlag::Fine, "MCB EEPROM", &bytes) {
                        warn!("MCB EEPROM TM refused");
                    }
                }
                McbEvent::Voltages(volts) => {
                    let msg = format!(
                        "MCB voltages: {:.2} {:.2} {:.2} {:.2}",
                        volts[0], volts[1], volts[2], volts[3]
                    );
                    info!("{}", msg);
                    self.zephyr.log_fine(&msg);
                }
                McbEvent::Line(line) => debug!(line = line.as_str(), "MCB"),
            }
        }
    }

    fn handle_sim_lora(&mut self) {
        if self.flags.check_and_clear(ScheduleAction::SimLoraMsg) {
            debug!("synthetic LoRa message injected");
            let record = self.lora.inject_synthetic();
            self.ecu_msg_since_report = true;
            let _ = self.report.accumulate(record);
        }
    }

    pub(crate) fn rats_report_check(&mut self, now_ms: u64) {
        let emitted = if self.flags.check_and_clear(ScheduleAction::RatsReport) {
            self.report.flush(
                now_ms,
                self.ecu_msg_since_report,
                self.v56_centivolts,
                ReportTrigger::Forced,
                &mut self.zephyr,
            );
            true
        } else {
            self.report
                .check(
                    now_ms,
                    self.ecu_msg_since_report,
                    self.v56_centivolts,
                    &mut self.zephyr,
                )
                .is_some()
        };
        if emitted {
            self.ecu_msg_since_report = false;
        }
    }

    // ECU control ------------------------------------------------------------

    pub(crate) fn ecu_control(&mut self, enable: bool) {
        info!(enable, "ECU power command");
        if !self.lora_link.send(&[ECU_CMD_POWER, u8::from(enable)]) {
            warn!("ECU power command TX failed");
        }
    }

    pub(crate) fn configure_ecu(&mut self) {
        let method = self.config.data_proc_method() as u8;
        info!(method, "configuring ECU");
        if !self.lora_link.send(&[ECU_CMD_CONFIG, method]) {
            warn!("ECU configure TX failed");
        }
    }

    /// Idempotent teardown used by the Error, Shutdown, and Exit sub-states.
    pub(crate) fn rats_shutdown(&mut self) {
        if self.shutdown_done {
            return;
        }
        if self.motion.ongoing() {
            if !self.mcb.send(crate::mcb::McbCommand::CancelMotion) {
                warn!("cancel TX failed during shutdown");
            }
            self.motion_tm
                .flush(StateFlag::Warn, "Motion cancelled at shutdown", &mut self.zephyr);
            self.scheduler.cancel(ScheduleAction::MotionTimeout);
            self.motion.finish();
        }
        self.ecu_control(false);
        self.scheduler.clear();
        self.shutdown_done = true;
        info!("RATS shutdown complete");
    }

    // Accessors --------------------------------------------------------------

    pub fn substate(&self) -> FlightSubState {
        self.substate
    }

    pub fn warmup_status(&self) -> WarmupStatus {
        self.warmup_status
    }

    pub fn warmup_cycles(&self) -> u8 {
        self.warmup_cycles
    }

    pub fn time_valid(&self) -> bool {
        self.time_valid
    }

    pub fn motion(&self) -> &ReelMotion {
        &self.motion
    }

    pub fn lora_counters(&self) -> &LoraCounters {
        self.lora.counters()
    }

    pub fn report_stats(&self) -> &ReportStats {
        self.report.stats()
    }

    pub fn records_buffered(&self) -> usize {
        self.report.records_buffered()
    }

    pub fn config(&self) -> &RatsConfig {
        &self.config
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    pub fn flag_raised(&self, action: ScheduleAction) -> bool {
        self.flags.is_raised(action)
    }

    pub fn action_scheduled(&self, action: ScheduleAction) -> bool {
        self.scheduler.is_scheduled(action)
    }

    /// Mutable access to the owned peripheral ports, for the host loop and
    /// test harnesses that script peripheral behavior between ticks.
    pub fn ports_mut(&mut self) -> (&mut M, &mut L, &mut Z) {
        (&mut self.mcb, &mut self.lora_link, &mut self.zephyr)
    }

    pub fn status(&self, now_ms: u64) -> ControllerStatus {
        ControllerStatus {
            substate: self.published_substate.label(),
            warmup_status: self.warmup_status,
            warmup_cycles: self.warmup_cycles,
            time_valid: self.time_valid,
            motion: self.motion.snapshot(now_ms),
            lora: *self.lora.counters(),
            reports: *self.report.stats(),
        }
    }
}
