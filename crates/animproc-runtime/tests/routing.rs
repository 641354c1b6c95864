mod common;

use proptest::prelude::*;

use animproc_wire::{
    BackpackSetLayer, CliffEvent, DriveWheels, EngineToRobot, MicData, PlayAnim, RobotState,
    RobotToEngine, SetBackpackLights, SyncRobotAck,
};
use animproc_wire::{AnimName, BoundedVec};

use common::Harness;

fn drive(left: f32, right: f32) -> EngineToRobot {
    EngineToRobot::DriveWheels(DriveWheels {
        lwheel_speed_mmps: left,
        rwheel_speed_mmps: right,
        lwheel_accel_mmps2: 0.0,
        rwheel_accel_mmps2: 0.0,
    })
}

fn robot_state(status: u32) -> RobotToEngine {
    RobotToEngine::RobotState(RobotState {
        timestamp: 1234,
        status,
        pose_frame_id: 1,
        lift_height_mm: 32.0,
        head_angle_rad: 0.1,
        battery_voltage: 3.9,
        cliff_data_raw: [800; 4],
    })
}

#[test]
fn test_engine_frames_forwarded_verbatim() {
    let mut h = Harness::new();
    let bytes = drive(50.0, -50.0).encode().unwrap();
    h.engine.push(bytes.clone());
    h.tick();
    assert_eq!(h.robot.take_sent(), vec![bytes]);
    assert_eq!(h.process.router().counters().engine_to_router, 1);
    assert_eq!(h.process.router().counters().engine_to_robot, 1);
}

#[test]
fn test_robot_frames_forwarded_verbatim() {
    let mut h = Harness::new();
    h.tick();
    h.engine.take_sent();

    let bytes = RobotToEngine::CliffEvent(CliffEvent {
        timestamp: 99,
        detected_flags: 0b0101,
    })
    .encode()
    .unwrap();
    h.robot.push(bytes.clone());
    h.tick();
    assert!(h.engine.take_sent().contains(&bytes));
    assert_eq!(h.process.router().counters().robot_to_router, 1);
}

#[test]
fn test_malformed_frames_dropped_and_drain_continues() {
    let mut h = Harness::new();
    let good = drive(10.0, 10.0).encode().unwrap();

    let mut oversized = good.clone();
    oversized.push(0);
    h.engine.push(vec![0xEE, 1, 2]);
    h.engine.push(oversized);
    h.engine.push(good[..3].to_vec());
    h.engine.push(good.clone());
    h.tick();

    assert_eq!(h.robot.take_sent(), vec![good]);
    assert_eq!(h.process.stats().dropped_frames, 3);
}

#[test]
fn test_animation_messages_not_forwarded() {
    let mut h = Harness::new();
    h.from_engine(EngineToRobot::PlayAnim(PlayAnim {
        num_loops: 1,
        start_at_ms: 0,
        tag: 4,
        render_in_eye_hue: false,
        anim_name: AnimName::new("anim_missing").unwrap(),
    }));
    h.from_engine(EngineToRobot::SetBackpackLights(SetBackpackLights {
        on_colors: [1, 2, 3],
        off_colors: [0; 3],
        on_period_ms: [0; 3],
        off_period_ms: [0; 3],
    }));
    h.from_engine(EngineToRobot::BackpackSetLayer(BackpackSetLayer { layer: 1 }));
    h.tick();

    let sent = h.sent_to_robot();
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0], EngineToRobot::BackpackSetLayer(_)));
}

#[test]
fn test_mic_data_goes_to_mic_only() {
    let mut h = Harness::new();
    h.tick();
    h.engine.take_sent();

    h.from_robot(RobotToEngine::MicData(MicData {
        sequence_id: 77,
        robot_status_flags: 0,
        robot_angle: 0.0,
        data: BoundedVec::new(vec![0i16; 16]).unwrap(),
    }));
    h.tick();

    assert_eq!(*h.mic.0.lock(), vec![77]);
    assert!(!h
        .sent_to_engine()
        .iter()
        .any(|m| matches!(m, RobotToEngine::MicData(_))));
}

#[test]
fn test_robot_state_sets_charger_and_forwards() {
    let mut h = Harness::new();
    h.from_robot(robot_state(animproc_wire::robot_status::IS_ON_CHARGER));
    let mut version = [0u8; 16];
    version[..5].copy_from_slice(b"1.2.3");
    h.from_robot(RobotToEngine::SyncRobotAck(SyncRobotAck {
        syscon_version: version,
    }));
    h.tick();

    assert!(h.process.router().is_on_charger());
    let sent = h.sent_to_engine();
    assert!(sent.iter().any(|m| matches!(m, RobotToEngine::RobotState(_))));
    assert!(sent.iter().any(|m| matches!(m, RobotToEngine::SyncRobotAck(_))));
}

proptest! {
    #[test]
    fn prop_forwarding_is_byte_identical(
        left in -500.0f32..500.0,
        right in -500.0f32..500.0,
        timestamp in any::<u32>(),
        flags in any::<u8>(),
    ) {
        let mut h = Harness::new();
        h.tick();
        h.engine.take_sent();

        let to_robot = drive(left, right).encode().unwrap();
        let to_engine = RobotToEngine::CliffEvent(CliffEvent { timestamp, detected_flags: flags })
            .encode()
            .unwrap();
        h.engine.push(to_robot.clone());
        h.robot.push(to_engine.clone());
        h.tick();

        prop_assert_eq!(h.robot.take_sent(), vec![to_robot]);
        prop_assert!(h.engine.take_sent().contains(&to_engine));
    }
}
