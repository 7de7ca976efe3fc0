mod common;

use common::*;
use stratorats::mcb::{McbAck, McbCommand, McbEvent};
use stratorats::zephyr::StateFlag;
use stratorats::{FlightSubState, MotionKind, ScheduleAction, Telecommand};

#[test]
fn test_nominal_warmup_trace() {
    let mut controller = test_controller();
    let mut trace = Vec::new();
    let mut next_id = 1;

    for tick in 0..13u64 {
        if tick == 5 {
            controller.gps_time_received();
        }
        if (6..=8).contains(&tick) || (10..=12).contains(&tick) {
            push_lora(&mut controller, next_id);
            next_id += 1;
        }
        controller.tick(tick * 1000);
        trace.push(controller.substate());
    }

    let expected = [
        FlightSubState::GpsWait, // tick 0 ran ENTRY
        FlightSubState::GpsWait,
        FlightSubState::GpsWait,
        FlightSubState::GpsWait,
        FlightSubState::GpsWait,
        FlightSubState::LoraWait1, // time became valid on tick 5
        FlightSubState::LoraWait1,
        FlightSubState::LoraWait1,
        FlightSubState::ConfigEcu, // third message on tick 8
        FlightSubState::LoraWait2,
        FlightSubState::LoraWait2,
        FlightSubState::LoraWait2,
        FlightSubState::Measure, // third message on tick 12
    ];
    assert_eq!(trace.as_slice(), expected.as_slice());

    assert_eq!(
        controller.warmup_status(),
        stratorats::WarmupStatus::Complete
    );
    assert!(controller.action_scheduled(ScheduleAction::StartTelemetry)
        || controller.flag_raised(ScheduleAction::StartTelemetry));
}

#[test]
fn test_warmup_substate_monotone() {
    fn phase(s: FlightSubState) -> u8 {
        match s {
            FlightSubState::Entry => 0,
            FlightSubState::GpsWait => 1,
            FlightSubState::LoraWait1 => 2,
            FlightSubState::ConfigEcu => 3,
            FlightSubState::LoraWait2 => 4,
            FlightSubState::Measure => 5,
            _ => 6,
        }
    }

    let mut controller = test_controller();
    let mut last = 0;
    let mut next_id = 1;

    for tick in 0..30u64 {
        if tick == 5 {
            controller.gps_time_received();
        }
        // Plenty of LoRa traffic keeps both warmup gates satisfied
        if tick >= 6 {
            push_lora(&mut controller, next_id);
            next_id += 1;
        }
        controller.tick(tick * 1000);

        if controller.substate() == FlightSubState::Measure {
            break;
        }
        let now = phase(controller.substate());
        assert!(now >= last, "sub-state went backwards during warmup");
        last = now;
    }
    assert_eq!(controller.substate(), FlightSubState::Measure);
}

#[test]
fn test_warmup_counter_relation_every_tick() {
    let mut controller = test_controller();
    let mut next_id = 1;

    for tick in 0..40u64 {
        if tick == 5 {
            controller.gps_time_received();
        }
        if tick % 2 == 0 {
            push_lora(&mut controller, next_id);
            next_id += 1;
        }
        controller.tick(tick * 1000);

        let counters = controller.lora_counters();
        assert!(counters.warmup <= counters.total);
    }
}

#[test]
fn test_warmup_timeout_reports_and_retries() {
    let mut controller = test_controller();

    // Reach LORA_WAIT1 but deliver no LoRa traffic
    for tick in 0..25u64 {
        if tick == 5 {
            controller.gps_time_received();
        }
        controller.tick(tick * 1000);
    }

    assert_eq!(controller.substate(), FlightSubState::LoraWait1);
    assert_eq!(controller.warmup_status(), stratorats::WarmupStatus::Failed);
    assert!(controller.warmup_cycles() >= 1);

    {
        let (_, _, zephyr) = controller.ports_mut();
        let warns = zephyr.messages_with("LoRa warmup timeout");
        assert!(!warns.is_empty());
        assert!(warns.iter().all(|(flag, _, _)| *flag == StateFlag::Warn));
    }

    // Traffic resumes: the gate opens on the next LORA_WAIT_MSG evaluation
    for tick in 25..32u64 {
        push_lora(&mut controller, tick as u32);
        controller.tick(tick * 1000);
    }
    assert!(matches!(
        controller.substate(),
        FlightSubState::LoraWait2 | FlightSubState::Measure | FlightSubState::ConfigEcu
    ));
}

#[test]
fn test_deploy_during_measure_starts_motion() {
    let mut controller = test_controller();
    let start = warmup_to_measure(&mut controller);

    controller
        .queue_telecommand(Telecommand::DeployLen { revs: 12.5 })
        .unwrap();
    controller.tick(start * 1000);

    assert_eq!(controller.substate(), FlightSubState::ManualMotion);
    assert_eq!(controller.motion().kind(), Some(MotionKind::ReelOut));
    assert!(controller.motion().ongoing());

    let (mcb, _, zephyr) = controller.ports_mut();
    assert!(mcb
        .sent
        .iter()
        .any(|c| matches!(c, McbCommand::ReelOut { revs, .. } if (*revs - 12.5).abs() < f32::EPSILON)));

    let summaries = zephyr.messages_with("TC Deploy Length");
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].1, "TC Deploy Length: 12.5 revs");
    assert_eq!(summaries[0].0, StateFlag::Fine);
}

#[test]
fn test_deploy_during_gps_wait_rejected() {
    let mut controller = test_controller();
    controller.tick(0); // ENTRY -> GPS_WAIT

    controller
        .queue_telecommand(Telecommand::DeployLen { revs: 12.5 })
        .unwrap();
    controller.tick(1000);

    assert_eq!(controller.substate(), FlightSubState::GpsWait);
    assert!(!controller.flag_raised(ScheduleAction::ReelOut));
    assert!(!controller.motion().ongoing());

    let (_, _, zephyr) = controller.ports_mut();
    let warns = zephyr.messages_with("Cannot deploy, not in MEASURE");
    assert_eq!(warns.len(), 1);
    assert_eq!(warns[0].0, StateFlag::Warn);
}

#[test]
fn test_reel_out_wins_tie_break() {
    let mut controller = test_controller();
    let start = warmup_to_measure(&mut controller);

    // Both lengths land in the same tick; REEL_OUT must win
    controller
        .queue_telecommand(Telecommand::DeployLen { revs: 5.0 })
        .unwrap();
    controller
        .queue_telecommand(Telecommand::RetractLen { revs: 3.0 })
        .unwrap();
    controller.tick(start * 1000);

    assert_eq!(controller.substate(), FlightSubState::ManualMotion);
    assert_eq!(controller.motion().kind(), Some(MotionKind::ReelOut));

    // The losing REEL_IN flag must not linger
    assert!(!controller.flag_raised(ScheduleAction::ReelIn));
}

#[test]
fn test_at_most_one_motion() {
    let mut controller = test_controller();
    let start = warmup_to_measure(&mut controller);

    controller
        .queue_telecommand(Telecommand::DeployLen { revs: 5.0 })
        .unwrap();
    controller.tick(start * 1000);
    assert!(controller.motion().ongoing());

    // A second deploy while the motion runs is rejected at source:
    // not in MEASURE any more
    controller
        .queue_telecommand(Telecommand::DeployLen { revs: 7.0 })
        .unwrap();
    controller.tick((start + 1) * 1000);

    assert_eq!(controller.motion().kind(), Some(MotionKind::ReelOut));
    assert_eq!(controller.stats().motions_started, 1);

    let (_, _, zephyr) = controller.ports_mut();
    assert_eq!(zephyr.count_with("Cannot deploy"), 1);
}

#[test]
fn test_motion_completes_back_to_measure() {
    let mut controller = test_controller();
    let start = warmup_to_measure(&mut controller);

    controller
        .queue_telecommand(Telecommand::RetractLen { revs: 4.0 })
        .unwrap();
    controller.tick(start * 1000);
    assert_eq!(controller.substate(), FlightSubState::ManualMotion);
    assert_eq!(controller.motion().kind(), Some(MotionKind::ReelIn));

    push_mcb_event(&mut controller, McbEvent::Ack(McbAck::Motion));
    controller.tick((start + 1) * 1000);
    assert_eq!(controller.substate(), FlightSubState::ManualMotion);

    push_mcb_event(&mut controller, McbEvent::MotionFinished);
    controller.tick((start + 2) * 1000);
    assert_eq!(controller.substate(), FlightSubState::ManualIdle);
    assert!(!controller.motion().ongoing());

    controller.tick((start + 3) * 1000);
    assert_eq!(controller.substate(), FlightSubState::Measure);

    let (_, _, zephyr) = controller.ports_mut();
    assert_eq!(zephyr.count_with("Motion complete"), 1);
}

#[test]
fn test_cancel_motion_scenario() {
    let mut controller = test_controller();
    let start = warmup_to_measure(&mut controller);

    controller
        .queue_telecommand(Telecommand::DeployLen { revs: 20.0 })
        .unwrap();
    controller.tick(start * 1000);
    push_mcb_event(&mut controller, McbEvent::Ack(McbAck::Motion));
    controller.tick((start + 1) * 1000);
    assert_eq!(controller.substate(), FlightSubState::ManualMotion);

    // CANCELMOTION: immediate MCB cancel TX plus the MOTION_STOP action
    controller
        .queue_telecommand(Telecommand::CancelMotion)
        .unwrap();
    controller.tick((start + 2) * 1000);
    {
        let (mcb, _, zephyr) = controller.ports_mut();
        let cancels = mcb
            .sent
            .iter()
            .filter(|c| matches!(c, McbCommand::CancelMotion))
            .count();
        assert!(cancels >= 1);
        assert_eq!(zephyr.count_with("TC Cancel Motion"), 1);
    }

    // MCB acknowledges the cancel; the sub-machine unwinds to MANUAL_IDLE
    push_mcb_event(&mut controller, McbEvent::Ack(McbAck::Cancel));
    controller.tick((start + 3) * 1000);
    assert_eq!(controller.substate(), FlightSubState::ManualIdle);
    assert!(!controller.motion().ongoing());

    controller.tick((start + 4) * 1000);
    assert_eq!(controller.substate(), FlightSubState::Measure);
}

#[test]
fn test_motion_timeout_enters_error() {
    let mut controller = test_controller();
    let start = warmup_to_measure(&mut controller);

    controller
        .queue_telecommand(Telecommand::DeployLen { revs: 10.0 })
        .unwrap();
    controller.tick(start * 1000);
    push_mcb_event(&mut controller, McbEvent::Ack(McbAck::Motion));

    let max_seconds = u64::from(controller.motion().max_seconds());
    // 10 revs at the default 0.5 rev/s plus margin
    assert_eq!(max_seconds, 50);

    let mut tick = start + 1;
    while controller.substate() == FlightSubState::ManualMotion && tick < start + max_seconds + 5 {
        controller.tick(tick * 1000);
        tick += 1;
    }

    assert_eq!(controller.substate(), FlightSubState::Error);
    assert_eq!(controller.stats().motions_failed, 1);
    assert!(!controller.motion().ongoing());

    let (_, _, zephyr) = controller.ports_mut();
    assert_eq!(zephyr.count_with("MCB motion timeout"), 1);
}

#[test]
fn test_motion_fault_enters_error() {
    let mut controller = test_controller();
    let start = warmup_to_measure(&mut controller);

    controller
        .queue_telecommand(Telecommand::DeployLen { revs: 10.0 })
        .unwrap();
    controller.tick(start * 1000);
    push_mcb_event(&mut controller, McbEvent::Ack(McbAck::Motion));
    controller.tick((start + 1) * 1000);

    push_mcb_event(&mut controller, McbEvent::MotionFault([1, 0, 0, 0, 0, 0, 0, 9]));
    controller.tick((start + 2) * 1000);

    assert_eq!(controller.substate(), FlightSubState::Error);
    let (_, _, zephyr) = controller.ports_mut();
    assert_eq!(zephyr.count_with("MCB motion fault"), 1);
}

#[test]
fn test_motion_tx_failure_aborts_without_error_state() {
    let mut controller = test_controller();
    let start = warmup_to_measure(&mut controller);

    {
        let (mcb, _, _) = controller.ports_mut();
        mcb.fail_sends = true;
    }
    controller
        .queue_telecommand(Telecommand::DeployLen { revs: 10.0 })
        .unwrap();
    controller.tick(start * 1000);

    // Rejected motion: still in MEASURE, nothing ongoing
    assert_eq!(controller.substate(), FlightSubState::Measure);
    assert!(!controller.motion().ongoing());

    let (_, _, zephyr) = controller.ports_mut();
    assert_eq!(zephyr.count_with("Error sending motion command to MCB"), 1);
}

#[test]
fn test_motion_command_resent_without_ack() {
    let mut controller = test_controller();
    let start = warmup_to_measure(&mut controller);

    controller
        .queue_telecommand(Telecommand::DeployLen { revs: 10.0 })
        .unwrap();
    controller.tick(start * 1000);

    // No ack: after MCB_RESEND_TIMEOUT the command goes out again
    for tick in 1..=11u64 {
        controller.tick((start + tick) * 1000);
    }

    let (mcb, _, _) = controller.ports_mut();
    let motion_sends = mcb
        .sent
        .iter()
        .filter(|c| matches!(c, McbCommand::ReelOut { .. }))
        .count();
    assert_eq!(motion_sends, 2);
}

#[test]
fn test_status_emitter_cadence() {
    let mut controller = test_controller();

    for tick in 0..130u64 {
        controller.tick(tick * 1000);
    }

    let (_, _, zephyr) = controller.ports_mut();
    // First status at +1 s, then every 60 s: ticks 1, 61, 121
    assert_eq!(zephyr.count_with("RATS status"), 3);
}

#[test]
fn test_host_shutdown_cancels_motion() {
    let mut controller = test_controller();
    let start = warmup_to_measure(&mut controller);

    controller
        .queue_telecommand(Telecommand::DeployLen { revs: 10.0 })
        .unwrap();
    controller.tick(start * 1000);
    assert!(controller.motion().ongoing());

    controller.request_shutdown();
    controller.tick((start + 1) * 1000);

    assert_eq!(controller.substate(), FlightSubState::Shutdown);
    assert!(!controller.motion().ongoing());
    let (mcb, _, zephyr) = controller.ports_mut();
    assert!(mcb.sent.iter().any(|c| matches!(c, McbCommand::CancelMotion)));
    assert_eq!(zephyr.count_with("Motion cancelled at shutdown"), 1);
}
