use crate::actions::{ActionFlags, ScheduleAction};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::warn;

const MAX_SCHEDULED_ACTIONS: usize = 32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScheduledEntry {
    pub action: ScheduleAction,
    pub deadline_ms: u64,
    pub scheduled_at_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct SchedulerStats {
    pub total_scheduled: u32,
    pub total_fired: u32,
    pub total_cancelled: u32,
    pub total_rejected: u32,
    pub currently_scheduled: u8,
}

/// One-shot deadline queue: "raise action A in N seconds".
///
/// Entries are kept in chronological order; `fire_due` raises the flag for
/// every entry whose deadline has passed. Re-scheduling is explicit — a fired
/// entry is gone.
#[derive(Debug, Default)]
pub struct ActionScheduler {
    entries: Vec<ScheduledEntry, MAX_SCHEDULED_ACTIONS>,
    stats: SchedulerStats,
}

impl ActionScheduler {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            stats: SchedulerStats::default(),
        }
    }

    /// Schedule `action` to fire `delay_secs` from `now_ms`.
    pub fn schedule(&mut self, action: ScheduleAction, delay_secs: u32, now_ms: u64) {
        self.schedule_ms(action, u64::from(delay_secs) * 1000, now_ms);
    }

    pub fn schedule_ms(&mut self, action: ScheduleAction, delay_ms: u64, now_ms: u64) {
        let entry = ScheduledEntry {
            action,
            deadline_ms: now_ms + delay_ms,
            scheduled_at_ms: now_ms,
        };

        let insert_position = self
            .entries
            .iter()
            .position(|e| e.deadline_ms > entry.deadline_ms)
            .unwrap_or(self.entries.len());

        if self.entries.is_full() {
            self.stats.total_rejected += 1;
            warn!(action = action.label(), "scheduler queue full, action dropped");
            return;
        }

        if self.entries.insert(insert_position, entry).is_ok() {
            self.stats.total_scheduled += 1;
        }
        self.stats.currently_scheduled = self.entries.len() as u8;
    }

    /// Raise the flag for every due entry and drop it from the queue.
    pub fn fire_due(&mut self, now_ms: u64, flags: &mut ActionFlags) {
        while let Some(first) = self.entries.first() {
            if first.deadline_ms > now_ms {
                break;
            }
            let entry = self.entries.remove(0);
            flags.set(entry.action);
            self.stats.total_fired += 1;
        }
        self.stats.currently_scheduled = self.entries.len() as u8;
    }

    /// Remove every pending entry for `action`. Used when the condition the
    /// deadline guarded (e.g. a motion watchdog) resolved early.
    pub fn cancel(&mut self, action: ScheduleAction) {
        let before = self.entries.len();
        self.entries.retain(|e| e.action != action);
        self.stats.total_cancelled += (before - self.entries.len()) as u32;
        self.stats.currently_scheduled = self.entries.len() as u8;
    }

    pub fn is_scheduled(&self, action: ScheduleAction) -> bool {
        self.entries.iter().any(|e| e.action == action)
    }

    pub fn next_deadline(&self, action: ScheduleAction) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.action == action)
            .map(|e| e.deadline_ms)
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn pending(&self) -> &[ScheduledEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        let cleared = self.entries.len();
        self.entries.clear();
        self.stats.total_cancelled += cleared as u32;
        self.stats.currently_scheduled = 0;
    }
}
