#![allow(dead_code)]

use std::collections::VecDeque;
use stratorats::config::MemoryEeprom;
use stratorats::lora::{EcuLoraLink, EcuLoraMsg};
use stratorats::mcb::{McbCommand, McbEvent, McbPort};
use stratorats::report::ECU_RECORD_SIZE_BYTES;
use stratorats::zephyr::{StateFlag, ZephyrGateway};
use stratorats::{FlightController, FlightSubState};

/// MCB double: records every command, replays scripted events.
#[derive(Default)]
pub struct MockMcb {
    pub sent: Vec<McbCommand>,
    pub events: VecDeque<McbEvent>,
    pub fail_sends: bool,
}

impl McbPort for MockMcb {
    fn send(&mut self, command: McbCommand) -> bool {
        self.sent.push(command);
        !self.fail_sends
    }

    fn poll(&mut self) -> Option<McbEvent> {
        self.events.pop_front()
    }
}

/// LoRa double: hands out queued ECU messages one per tick.
#[derive(Default)]
pub struct MockLora {
    pub queue: VecDeque<EcuLoraMsg>,
    pub uplinks: Vec<Vec<u8>>,
}

impl EcuLoraLink for MockLora {
    fn receive(&mut self) -> Option<EcuLoraMsg> {
        self.queue.pop_front()
    }

    fn send(&mut self, payload: &[u8]) -> bool {
        self.uplinks.push(payload.to_vec());
        true
    }
}

/// Gateway double recording every TM for assertions.
#[derive(Default)]
pub struct RecordingZephyr {
    pub tms: Vec<(StateFlag, String, Vec<u8>)>,
}

impl RecordingZephyr {
    pub fn messages_with(&self, prefix: &str) -> Vec<&(StateFlag, String, Vec<u8>)> {
        self.tms.iter().filter(|(_, m, _)| m.starts_with(prefix)).collect()
    }

    pub fn count_with(&self, prefix: &str) -> usize {
        self.messages_with(prefix).len()
    }
}

impl ZephyrGateway for RecordingZephyr {
    fn send_tm(&mut self, flag: StateFlag, message: &str, payload: &[u8]) -> bool {
        self.tms.push((flag, message.to_string(), payload.to_vec()));
        true
    }
}

pub type TestController = FlightController<MockMcb, MockLora, RecordingZephyr>;

pub fn test_controller() -> TestController {
    let mut controller = FlightController::new(
        MockMcb::default(),
        MockLora::default(),
        RecordingZephyr::default(),
        Box::new(MemoryEeprom::default()),
    );
    controller.begin_flight_mode(0);
    controller
}

pub fn ecu_msg(id: u32) -> EcuLoraMsg {
    EcuLoraMsg {
        id,
        record: [id as u8; ECU_RECORD_SIZE_BYTES],
    }
}

pub fn push_lora(controller: &mut TestController, id: u32) {
    let (_, lora, _) = controller.ports_mut();
    lora.queue.push_back(ecu_msg(id));
}

pub fn push_mcb_event(controller: &mut TestController, event: McbEvent) {
    let (mcb, _, _) = controller.ports_mut();
    mcb.events.push_back(event);
}

/// Drive a fresh controller through the nominal warmup at 1 Hz:
/// GPS time valid before tick 5, LoRa messages on ticks 6-8 and 10-12,
/// then settle the first telemetry round-trip. Returns the tick count
/// consumed; the controller sits in MEASURE at `ticks * 1000` ms.
pub fn warmup_to_measure(controller: &mut TestController) -> u64 {
    let mut next_id = 1;
    for tick in 0..15u64 {
        if tick == 5 {
            controller.gps_time_received();
        }
        if (6..=8).contains(&tick) || (10..=12).contains(&tick) {
            push_lora(controller, next_id);
            next_id += 1;
        }
        controller.tick(tick * 1000);
    }
    assert_eq!(controller.substate(), FlightSubState::Measure);
    15
}
