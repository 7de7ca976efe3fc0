use clap::{App, Arg};
use colored::*;
use std::collections::VecDeque;
use std::time::Duration;
use stratorats::config::MemoryEeprom;
use stratorats::lora::{EcuLoraLink, EcuLoraMsg};
use stratorats::mcb::{McbAck, McbChunk, McbCommand, McbEvent, McbPort};
use stratorats::report::ECU_RECORD_SIZE_BYTES;
use stratorats::telecommand::Telecommand;
use stratorats::zephyr::{StateFlag, ZephyrGateway};
use stratorats::FlightController;
use tracing::info;

/// Scripted MCB: acks every command, then emits one status message per tick
/// during a motion and finishes it after a fixed number of ticks.
struct SimMcb {
    events: VecDeque<McbEvent>,
    motion_ticks_left: u32,
    reel_pos: f32,
    reel_step: f32,
}

impl SimMcb {
    fn new() -> Self {
        Self {
            events: VecDeque::new(),
            motion_ticks_left: 0,
            reel_pos: 0.0,
            reel_step: 0.0,
        }
    }

    /// Advance the scripted motion by one tick.
    fn step(&mut self) {
        if self.motion_ticks_left > 0 {
            self.motion_ticks_left -= 1;
            self.reel_pos += self.reel_step;
            let mut raw = McbChunk::new();
            let _ = raw.extend_from_slice(&self.reel_pos.to_be_bytes());
            self.events.push_back(McbEvent::Status {
                reel_pos: self.reel_pos,
                raw,
            });
            if self.motion_ticks_left == 0 {
                self.events.push_back(McbEvent::MotionFinished);
            }
        }
    }
}

impl McbPort for SimMcb {
    fn send(&mut self, command: McbCommand) -> bool {
        match command {
            McbCommand::ReelOut { revs, .. } => {
                self.events.push_back(McbEvent::Ack(McbAck::Motion));
                self.motion_ticks_left = 10;
                self.reel_step = revs / 10.0;
            }
            McbCommand::ReelIn { revs, .. } | McbCommand::InNoLw { revs, .. } => {
                self.events.push_back(McbEvent::Ack(McbAck::Motion));
                self.motion_ticks_left = 10;
                self.reel_step = -revs / 10.0;
            }
            McbCommand::CancelMotion => {
                self.events.push_back(McbEvent::Ack(McbAck::Cancel));
                self.motion_ticks_left = 0;
            }
            _ => self.events.push_back(McbEvent::Ack(McbAck::Limits)),
        }
        true
    }

    fn poll(&mut self) -> Option<McbEvent> {
        self.events.pop_front()
    }
}

/// Scripted ECU radio: once powered, one measurement record every
/// `interval` ticks.
struct SimLora {
    powered: bool,
    interval: u32,
    countdown: u32,
    next_id: u32,
    pending: Option<EcuLoraMsg>,
}

impl SimLora {
    fn new(interval: u32) -> Self {
        Self {
            powered: false,
            interval,
            countdown: interval,
            next_id: 1,
            pending: None,
        }
    }

    fn step(&mut self) {
        if !self.powered {
            return;
        }
        self.countdown -= 1;
        if self.countdown == 0 {
            self.countdown = self.interval;
            let id = self.next_id;
            self.next_id += 1;
            self.pending = Some(EcuLoraMsg {
                id,
                record: [id as u8; ECU_RECORD_SIZE_BYTES],
            });
        }
    }
}

impl EcuLoraLink for SimLora {
    fn receive(&mut self) -> Option<EcuLoraMsg> {
        self.pending.take()
    }

    fn send(&mut self, payload: &[u8]) -> bool {
        // Power and configuration frames from the controller
        if payload.first() == Some(&stratorats::lora::ECU_CMD_POWER) {
            self.powered = payload.get(1) == Some(&1);
        }
        info!(bytes = payload.len(), powered = self.powered, "LoRa uplink to ECU");
        true
    }
}

/// Console gateway: renders every TM the way the ground would see it.
struct ConsoleZephyr {
    tm_count: u32,
}

impl ZephyrGateway for ConsoleZephyr {
    fn send_tm(&mut self, flag: StateFlag, message: &str, payload: &[u8]) -> bool {
        self.tm_count += 1;
        let tag = match flag {
            StateFlag::Fine => "TM/FINE".green(),
            StateFlag::Warn => "TM/WARN".yellow(),
            StateFlag::Crit => "TM/CRIT".red(),
        };
        println!(
            "{} [{}] {} ({} bytes)",
            tag,
            self.tm_count,
            message.bold(),
            payload.len()
        );
        true
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let matches = App::new("stratorats-sim")
        .about("Drives the RATS flight controller against scripted peripherals")
        .arg(
            Arg::with_name("ticks")
                .long("ticks")
                .takes_value(true)
                .default_value("120")
                .help("Number of scheduler ticks to run"),
        )
        .arg(
            Arg::with_name("tick-ms")
                .long("tick-ms")
                .takes_value(true)
                .default_value("1000")
                .help("Simulated milliseconds per tick"),
        )
        .arg(
            Arg::with_name("deploy-at")
                .long("deploy-at")
                .takes_value(true)
                .help("Tick at which to inject a DEPLOY_LEN telecommand"),
        )
        .arg(
            Arg::with_name("deploy-revs")
                .long("deploy-revs")
                .takes_value(true)
                .default_value("12.5")
                .help("Revolutions for the injected deploy"),
        )
        .get_matches();

    let ticks: u64 = matches.value_of("ticks").unwrap().parse().expect("ticks");
    let tick_ms: u64 = matches.value_of("tick-ms").unwrap().parse().expect("tick-ms");
    let deploy_at: Option<u64> = matches
        .value_of("deploy-at")
        .map(|v| v.parse().expect("deploy-at"));
    let deploy_revs: f32 = matches
        .value_of("deploy-revs")
        .unwrap()
        .parse()
        .expect("deploy-revs");

    println!("{}", "StratoRATS flight controller simulator".bold());

    let mut controller = FlightController::new(
        SimMcb::new(),
        SimLora::new(2),
        ConsoleZephyr { tm_count: 0 },
        Box::new(MemoryEeprom::default()),
    );

    controller.begin_flight_mode(0);
    controller.set_bus_voltage(56.05);

    for tick in 0..ticks {
        let now_ms = tick * tick_ms;

        // GPS time becomes valid shortly after entry
        if tick == 5 {
            controller.gps_time_received();
        }

        if deploy_at == Some(tick) {
            let _ = controller.queue_telecommand(Telecommand::DeployLen { revs: deploy_revs });
        }

        // Advance the scripted peripherals, then the controller
        let (mcb, lora, _) = controller.ports_mut();
        mcb.step();
        lora.step();

        controller.tick(now_ms);

        if tick % 20 == 19 {
            let status = controller.status(now_ms);
            println!(
                "{} {}",
                "status".cyan(),
                serde_json::to_string(&status).unwrap_or_default()
            );
        }

        std::thread::sleep(Duration::from_millis(tick_ms / 20));
    }

    let status = controller.status(ticks * tick_ms);
    println!(
        "{} {}",
        "final".cyan().bold(),
        serde_json::to_string_pretty(&status).unwrap_or_default()
    );
}
