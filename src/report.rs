use crate::zephyr::{StateFlag, ZephyrGateway, TM_PAYLOAD_MAX_BYTES};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Emit a report once this many ECU records are buffered.
pub const NUM_ECU_REPORTS: usize = 180;
/// Fixed size of one ECU measurement record.
pub const ECU_RECORD_SIZE_BYTES: usize = 45;
/// Emit a (possibly empty) report at least this often.
pub const RATS_REPORT_PERIOD_SECS: u32 = 360;

pub const RATS_HEADER_SIZE_BYTES: usize = 7;
pub const RATS_HEADER_SIZE_BITS: usize = 8 + 16 + 16 + 1 + 13;

/// One spare record slot beyond the count trigger.
pub const REPORT_RECORD_CAPACITY: usize = NUM_ECU_REPORTS + 1;
pub const RATS_REPORT_MAX_BYTES: usize =
    RATS_HEADER_SIZE_BYTES + REPORT_RECORD_CAPACITY * ECU_RECORD_SIZE_BYTES;

const_assert!(RATS_REPORT_MAX_BYTES <= TM_PAYLOAD_MAX_BYTES);
const_assert!(RATS_HEADER_SIZE_BITS <= RATS_HEADER_SIZE_BYTES * 8);

/// Largest value the 13-bit v56 field can carry (0.01 V units).
pub const V56_MAX_CENTIVOLTS: u16 = (1 << 13) - 1;

/// Aggregated MCB motion data cap for a single motion TM.
pub const MCB_TM_BUFFER_BYTES: usize = 8192;

pub type EcuRecordBytes = [u8; ECU_RECORD_SIZE_BYTES];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("record buffer full ({0} records)")]
    BufferFull(usize),
    #[error("motion TM buffer full")]
    MotionBufferFull,
    #[error("header size field mismatch")]
    BadHeaderSize,
    #[error("truncated header")]
    TruncatedHeader,
}

/// MSB-first bit cursor over the fixed header array. The 54-bit field mix is
/// not naturally aligned, so fields are packed explicitly.
struct BitWriter {
    bytes: [u8; RATS_HEADER_SIZE_BYTES],
    bit_pos: usize,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            bytes: [0; RATS_HEADER_SIZE_BYTES],
            bit_pos: 0,
        }
    }

    fn put(&mut self, value: u32, width: usize) {
        for i in (0..width).rev() {
            let bit = (value >> i) & 1;
            let byte = self.bit_pos / 8;
            let shift = 7 - (self.bit_pos % 8);
            self.bytes[byte] |= (bit as u8) << shift;
            self.bit_pos += 1;
        }
    }
}

struct BitReader<'a> {
    bytes: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, bit_pos: 0 }
    }

    fn take(&mut self, width: usize) -> u32 {
        let mut value = 0u32;
        for _ in 0..width {
            let byte = self.bit_pos / 8;
            let shift = 7 - (self.bit_pos % 8);
            value = (value << 1) | u32::from((self.bytes[byte] >> shift) & 1);
            self.bit_pos += 1;
        }
        value
    }
}

/// RATS report header, 54 bits packed big-endian into 7 bytes:
/// 8-bit header size, 16-bit record count, 16-bit record size, 1-bit ECU
/// power flag, 13-bit 56 V bus voltage in 0.01 V units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatsReportHeader {
    pub num_ecu_records: u16,
    pub ecu_record_size_bytes: u16,
    pub ecu_pwr_on: bool,
    pub v56_centivolts: u16,
}

impl RatsReportHeader {
    pub fn to_bytes(&self) -> [u8; RATS_HEADER_SIZE_BYTES] {
        let mut writer = BitWriter::new();
        writer.put(RATS_HEADER_SIZE_BYTES as u32, 8);
        writer.put(u32::from(self.num_ecu_records), 16);
        writer.put(u32::from(self.ecu_record_size_bytes), 16);
        writer.put(u32::from(self.ecu_pwr_on), 1);
        writer.put(u32::from(self.v56_centivolts.min(V56_MAX_CENTIVOLTS)), 13);
        writer.bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReportError> {
        if bytes.len() < RATS_HEADER_SIZE_BYTES {
            return Err(ReportError::TruncatedHeader);
        }
        let mut reader = BitReader::new(bytes);
        if reader.take(8) as usize != RATS_HEADER_SIZE_BYTES {
            return Err(ReportError::BadHeaderSize);
        }
        Ok(Self {
            num_ecu_records: reader.take(16) as u16,
            ecu_record_size_bytes: reader.take(16) as u16,
            ecu_pwr_on: reader.take(1) != 0,
            v56_centivolts: reader.take(13) as u16,
        })
    }
}

/// Convert a measured 56 V bus voltage to the 13-bit header field.
pub fn v56_from_volts(volts: f32) -> u16 {
    if !volts.is_finite() || volts <= 0.0 {
        return 0;
    }
    let centivolts = (volts * 100.0).round() as u32;
    centivolts.min(u32::from(V56_MAX_CENTIVOLTS)) as u16
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ReportStats {
    pub reports_sent: u32,
    pub records_buffered_total: u32,
    pub records_rejected: u32,
    pub count_triggered: u32,
    pub time_triggered: u32,
}

/// Which trigger fired an emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTrigger {
    RecordCount,
    Period,
    Forced,
}

/// Collects ECU records and emits them as a single TM with the packed
/// header. The count trigger fires strictly before the buffer can fill, so
/// an overflow attempt is a reportable error rather than a memory hazard.
#[derive(Debug, Default)]
pub struct RatsReportAggregator {
    records: Vec<EcuRecordBytes, REPORT_RECORD_CAPACITY>,
    tm_buffer: Vec<u8, RATS_REPORT_MAX_BYTES>,
    last_report_ms: u64,
    stats: ReportStats,
}

impl RatsReportAggregator {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            tm_buffer: Vec::new(),
            last_report_ms: 0,
            stats: ReportStats::default(),
        }
    }

    /// Restart the period clock, e.g. on flight-mode entry.
    pub fn reset_period(&mut self, now_ms: u64) {
        self.last_report_ms = now_ms;
    }

    pub fn accumulate(&mut self, record: EcuRecordBytes) -> Result<(), ReportError> {
        if self.records.push(record).is_err() {
            self.stats.records_rejected += 1;
            warn!("ECU record rejected, report buffer full");
            return Err(ReportError::BufferFull(self.records.len()));
        }
        self.stats.records_buffered_total += 1;
        Ok(())
    }

    pub fn records_buffered(&self) -> usize {
        self.records.len()
    }

    pub fn last_report_ms(&self) -> u64 {
        self.last_report_ms
    }

    pub fn stats(&self) -> &ReportStats {
        &self.stats
    }

    fn due_trigger(&self, now_ms: u64) -> Option<ReportTrigger> {
        if self.records.len() >= NUM_ECU_REPORTS {
            return Some(ReportTrigger::RecordCount);
        }
        if now_ms.saturating_sub(self.last_report_ms) >= u64::from(RATS_REPORT_PERIOD_SECS) * 1000 {
            return Some(ReportTrigger::Period);
        }
        None
    }

    /// Evaluate both emission triggers; emits at most one report per call.
    pub fn check<Z: ZephyrGateway>(
        &mut self,
        now_ms: u64,
        ecu_pwr_on: bool,
        v56_centivolts: u16,
        zephyr: &mut Z,
    ) -> Option<ReportTrigger> {
        let trigger = self.due_trigger(now_ms)?;
        self.flush(now_ms, ecu_pwr_on, v56_centivolts, trigger, zephyr);
        Some(trigger)
    }

    /// Serialize header + records, submit one TM, and reset the buffer.
    /// A partially full (or empty) buffer is a valid report.
    pub fn flush<Z: ZephyrGateway>(
        &mut self,
        now_ms: u64,
        ecu_pwr_on: bool,
        v56_centivolts: u16,
        trigger: ReportTrigger,
        zephyr: &mut Z,
    ) {
        let header = RatsReportHeader {
            num_ecu_records: self.records.len() as u16,
            ecu_record_size_bytes: ECU_RECORD_SIZE_BYTES as u16,
            ecu_pwr_on,
            v56_centivolts,
        };

        self.tm_buffer.clear();
        // Capacity is RATS_REPORT_MAX_BYTES, sized for header + full buffer
        let _ = self.tm_buffer.extend_from_slice(&header.to_bytes());
        for record in &self.records {
            let _ = self.tm_buffer.extend_from_slice(record);
        }

        if !zephyr.send_tm(StateFlag::Fine, "RATS report", &self.tm_buffer) {
            warn!("RATS report TM submission refused");
        }

        match trigger {
            ReportTrigger::RecordCount => self.stats.count_triggered += 1,
            ReportTrigger::Period => self.stats.time_triggered += 1,
            ReportTrigger::Forced => {}
        }
        self.stats.reports_sent += 1;
        info!(
            records = self.records.len(),
            trigger = ?trigger,
            "RATS report sent"
        );

        self.records.clear();
        self.last_report_ms = now_ms;
    }
}

/// Buffer for MCB binary data gathered during one reel motion.
///
/// In real-time mode each chunk goes out immediately as its own TM;
/// otherwise chunks accumulate and are flushed when the motion ends.
#[derive(Debug, Default)]
pub struct MotionTmBuffer {
    buffer: Vec<u8, MCB_TM_BUFFER_BYTES>,
    chunk_count: u16,
    chunks_dropped: u32,
}

impl MotionTmBuffer {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            chunk_count: 0,
            chunks_dropped: 0,
        }
    }

    pub fn start_motion(&mut self) {
        self.buffer.clear();
        self.chunk_count = 0;
    }

    pub fn add_chunk<Z: ZephyrGateway>(
        &mut self,
        chunk: &[u8],
        real_time: bool,
        zephyr: &mut Z,
    ) -> Result<(), ReportError> {
        if real_time {
            self.chunk_count = self.chunk_count.wrapping_add(1);
            if !zephyr.send_tm(StateFlag::Fine, "MCB motion data", chunk) {
                warn!("real-time MCB TM submission refused");
            }
            return Ok(());
        }

        if self.buffer.extend_from_slice(chunk).is_err() {
            self.chunks_dropped += 1;
            warn!("MCB chunk dropped, motion TM buffer full");
            return Err(ReportError::MotionBufferFull);
        }
        self.chunk_count += 1;
        debug!(chunks = self.chunk_count, "MCB chunk buffered");
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn chunk_count(&self) -> u16 {
        self.chunk_count
    }

    /// Emit the aggregated motion TM and reset. Sent even with an empty
    /// buffer so the ground always sees a motion-end summary.
    pub fn flush<Z: ZephyrGateway>(&mut self, flag: StateFlag, message: &str, zephyr: &mut Z) {
        if !zephyr.send_tm(flag, message, &self.buffer) {
            warn!("motion TM submission refused");
        }
        self.buffer.clear();
        self.chunk_count = 0;
    }
}
