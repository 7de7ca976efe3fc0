use crate::actions::ScheduleAction;
use crate::controller::FlightController;
use crate::lora::EcuLoraLink;
use crate::mcb::McbPort;
use crate::zephyr::ZephyrGateway;
use tracing::info;

/// Seconds between periodic status TMs.
pub const STATUS_MSG_PERIOD_SECS: u32 = 60;

impl<M, L, Z> FlightController<M, L, Z>
where
    M: McbPort,
    L: EcuLoraLink,
    Z: ZephyrGateway,
{
    /// Emit the periodic state-summary TM when the SEND_STATUS action fires,
    /// re-scheduling the next one as a post-condition of the run.
    pub(crate) fn status_msg_check(&mut self, now_ms: u64) {
        if !self.flags.check_and_clear(ScheduleAction::SendStatus) {
            return;
        }

        let motion = self.motion.snapshot(now_ms);
        let counters = self.lora.counters();
        let msg = format!(
            "RATS status: substate {} warmup {:?}/{} motion {:?}/{} reel {:.1} lora {}/{} reports {}",
            self.published_substate.label(),
            self.warmup_status,
            self.warmup_cycles,
            motion.state,
            motion.kind.map(|k| k.label()).unwrap_or("NONE"),
            motion.reel_pos,
            counters.warmup,
            counters.total,
            self.report.stats().reports_sent,
        );
        info!("{}", msg);
        self.zephyr.log_fine(&msg);

        self.scheduler
            .schedule(ScheduleAction::SendStatus, STATUS_MSG_PERIOD_SECS, now_ms);
    }
}
