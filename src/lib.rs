//! # StratoRATS Flight Controller
//!
//! Instrument-side flight controller for the RATS balloon-borne payload:
//! a reeled sensor driven by a motor control board (MCB), an environmental
//! control unit (ECU) streaming measurement records over a LoRa link, and a
//! ground-facing Zephyr gateway carrying telecommands down and telemetry up.
//!
//! ## Features
//!
//! - **Cooperative flight state machine**: GPS wait, LoRa warmup, ECU
//!   configuration, continuous measurement, and manual reel motions, all
//!   advanced one tick at a time
//! - **Action signalling**: edge-triggered flags with a staleness TTL as the
//!   substrate between scheduler, telecommands, and the state machine
//! - **Deadline scheduling**: one-shot "raise action A in N seconds" queue
//! - **RATS reporting**: bounded ECU record aggregation behind a bit-packed
//!   binary header, with count- and time-based emission
//! - **Telecommand dispatch**: sub-state-guarded commands with ACK semantics
//!   and one summary TM per command
//! - **Embedded-friendly**: no heap growth in the tick path, bounded buffers
//!   throughout
//!
//! ## Quick Start
//!
//! ```rust
//! use stratorats::config::MemoryEeprom;
//! use stratorats::mcb::{McbCommand, McbEvent, McbPort};
//! use stratorats::lora::{EcuLoraLink, EcuLoraMsg};
//! use stratorats::zephyr::{StateFlag, ZephyrGateway};
//! use stratorats::FlightController;
//!
//! struct NoMcb;
//! impl McbPort for NoMcb {
//!     fn send(&mut self, _command: McbCommand) -> bool { true }
//!     fn poll(&mut self) -> Option<McbEvent> { None }
//! }
//!
//! struct NoLora;
//! impl EcuLoraLink for NoLora {
//!     fn receive(&mut self) -> Option<EcuLoraMsg> { None }
//!     fn send(&mut self, _payload: &[u8]) -> bool { true }
//! }
//!
//! struct NoZephyr;
//! impl ZephyrGateway for NoZephyr {
//!     fn send_tm(&mut self, _flag: StateFlag, _message: &str, _payload: &[u8]) -> bool { true }
//! }
//!
//! let mut controller =
//!     FlightController::new(NoMcb, NoLora, NoZephyr, Box::new(MemoryEeprom::default()));
//! controller.begin_flight_mode(0);
//! for tick in 0..10u64 {
//!     controller.tick(tick * 1000);
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`controller`] - the `FlightController` aggregate and tick ordering
//! - [`flight`] - flight-mode sub-state machine
//! - [`motion`] - reel motion sub-machine
//! - [`actions`] / [`scheduler`] - signalling and deadlines
//! - [`report`] - RATS report aggregation and the packed header codec
//! - [`telecommand`] - telecommand surface and dispatcher
//! - [`mcb`] / [`lora`] / [`zephyr`] - peripheral contracts
//! - [`config`] - EEPROM-resident configuration

#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod actions;
pub mod config;
pub mod controller;
pub mod flight;
pub mod lora;
pub mod mcb;
pub mod motion;
pub mod report;
pub mod scheduler;
pub mod status;
pub mod telecommand;
pub mod zephyr;

// Re-export main public types for convenience
pub use actions::{ActionFlags, ScheduleAction, FLAG_STALE};
pub use controller::{ControllerError, FlightController};
pub use flight::{FlightSubState, WarmupStatus};
pub use motion::{MotionKind, MotionOutcome, MotionState};
pub use report::{RatsReportAggregator, RatsReportHeader};
pub use telecommand::Telecommand;
