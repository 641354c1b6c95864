mod common;

use animproc_core::{AnimationTag, FaultCode, TrackFlags};
use animproc_runtime::TickOutcome;
use animproc_wire::{
    AbortAnimation, AlterStreamingAnimationAtTime, AnimName, EngineToRobot, PlayAnim,
    PrepForShutdown, RobotState, RobotStopped, RobotToEngine, SetFullAnimTrackLockState,
};

use common::Harness;

fn play(name: &str, tag: u8) -> EngineToRobot {
    EngineToRobot::PlayAnim(PlayAnim {
        num_loops: 1,
        start_at_ms: 0,
        tag,
        render_in_eye_hue: false,
        anim_name: AnimName::new(name).unwrap(),
    })
}

fn robot_state() -> RobotToEngine {
    RobotToEngine::RobotState(RobotState {
        timestamp: 0,
        status: 0,
        pose_frame_id: 0,
        lift_height_mm: 32.0,
        head_angle_rad: 0.0,
        battery_voltage: 4.0,
        cliff_data_raw: [0; 4],
    })
}

fn count_available(msgs: &[RobotToEngine]) -> usize {
    msgs.iter()
        .filter(|m| matches!(m, RobotToEngine::RobotAvailable(_)))
        .count()
}

fn head_angles(msgs: &[EngineToRobot]) -> usize {
    msgs.iter()
        .filter(|m| matches!(m, EngineToRobot::SetHeadAngle(_)))
        .count()
}

#[test]
fn test_robot_available_once_per_engine_connect() {
    let mut h = Harness::with_engine(false);
    h.ticks(3);
    assert_eq!(count_available(&h.sent_to_engine()), 0);

    h.engine.set_connected(true);
    h.ticks(5);
    assert_eq!(count_available(&h.sent_to_engine()), 1);
}

#[test]
fn test_engine_fault_after_grace() {
    let mut h = Harness::new();
    h.tick();
    h.engine.set_connected(false);
    let dropped_at = h.now_ms;

    h.run_until(dropped_at + 4_900);
    assert_eq!(h.faults.count(FaultCode::NoEngineComms), 0);

    h.run_until(dropped_at + 5_100);
    assert_eq!(h.faults.count(FaultCode::NoEngineComms), 1);

    h.run_until(dropped_at + 8_000);
    assert_eq!(h.faults.count(FaultCode::NoEngineComms), 1);
}

#[test]
fn test_engine_reconnect_within_grace_skips_fault() {
    let mut h = Harness::new();
    h.tick();
    h.engine.take_sent();
    h.engine.set_connected(false);
    h.run_until(h.now_ms + 2_000);

    h.engine.set_connected(true);
    h.tick();
    assert_eq!(count_available(&h.sent_to_engine()), 1);

    h.run_until(h.now_ms + 6_000);
    assert_eq!(h.faults.count(FaultCode::NoEngineComms), 0);
}

#[test]
fn test_robot_silence_disconnects_and_faults_once() {
    let mut h = Harness::new();
    h.from_robot(robot_state());
    h.tick();

    h.run_until(1_900);
    assert!(h.robot.is_connected());

    h.run_until(2_200);
    assert!(!h.robot.is_connected());
    assert_eq!(h.faults.count(FaultCode::NoRobotComms), 1);

    h.run_until(5_000);
    assert_eq!(h.faults.count(FaultCode::NoRobotComms), 1);
}

#[test]
fn test_silent_robot_faults_once_across_reconnects() {
    let mut h = Harness::new();
    h.robot.set_reachable(true);
    h.from_robot(robot_state());
    h.tick();

    h.run_until(12_000);
    assert!(h.robot.reconnects() >= 3);
    assert_eq!(h.faults.count(FaultCode::NoRobotComms), 1);
}

#[test]
fn test_robot_frame_rearms_fault() {
    let mut h = Harness::new();
    h.from_robot(robot_state());
    h.tick();
    h.run_until(2_200);
    assert_eq!(h.faults.count(FaultCode::NoRobotComms), 1);

    h.robot.set_reachable(true);
    h.run_until(3_300);
    assert!(h.robot.is_connected());
    assert_eq!(h.robot.reconnects(), 1);

    // Reconnected but silent: dropped again without a second fault
    h.run_until(6_000);
    assert!(h.robot.reconnects() >= 2);
    assert_eq!(h.faults.count(FaultCode::NoRobotComms), 1);

    // A state frame clears the latch, so the next loss shows again
    assert!(h.robot.is_connected());
    h.from_robot(robot_state());
    h.tick();
    h.robot.set_reachable(false);
    h.run_until(9_000);
    assert!(!h.robot.is_connected());
    assert_eq!(h.faults.count(FaultCode::NoRobotComms), 2);
}

#[test]
fn test_still_alive_keeps_robot_connected() {
    let mut h = Harness::new();
    h.from_robot(robot_state());
    h.tick();
    for _ in 0..5 {
        h.run_until(h.now_ms + 1_000);
        h.from_robot(RobotToEngine::StillAlive(animproc_wire::StillAlive {}));
    }
    h.tick();
    assert!(h.robot.is_connected());
    assert_eq!(h.faults.count(FaultCode::NoRobotComms), 0);
}

#[test]
fn test_prep_for_shutdown_counts_down() {
    let mut h = Harness::new();
    h.from_robot(RobotToEngine::PrepForShutdown(PrepForShutdown { reason: 2 }));
    assert_eq!(h.tick(), TickOutcome::Continue);
    assert!(h.process.router().is_shutting_down());
    assert!(h
        .sent_to_engine()
        .iter()
        .any(|m| matches!(m, RobotToEngine::PrepForShutdown(_))));

    for _ in 0..4 {
        assert_eq!(h.tick(), TickOutcome::Continue);
    }
    assert_eq!(h.tick(), TickOutcome::ShutdownRequested);
}

#[test]
fn test_play_anim_from_engine_streams_to_robot() {
    let mut h = Harness::new();
    h.tick();
    h.engine.take_sent();

    h.from_engine(play("anim_nod", 9));
    h.ticks(10);

    assert_eq!(head_angles(&h.sent_to_robot()), 2);
    let to_engine = h.sent_to_engine();
    assert!(to_engine.iter().any(
        |m| matches!(m, RobotToEngine::AnimationStarted(s) if s.tag == 9 && s.anim_name.as_str() == "anim_nod")
    ));
    assert!(to_engine
        .iter()
        .any(|m| matches!(m, RobotToEngine::AnimationEnded(e) if e.tag == 9 && !e.was_aborted)));
}

#[test]
fn test_abort_from_engine_ends_animation() {
    let mut h = Harness::new();
    h.from_engine(play("anim_long", 5));
    h.ticks(2);
    assert_eq!(h.process.streamer().tag(), AnimationTag(5));

    h.from_engine(EngineToRobot::AbortAnimation(AbortAnimation { tag: 5 }));
    h.tick();

    assert!(h
        .sent_to_engine()
        .iter()
        .any(|m| matches!(m, RobotToEngine::AnimationEnded(e) if e.tag == 5 && e.was_aborted)));
    assert!(h
        .sent_to_robot()
        .iter()
        .any(|m| matches!(m, EngineToRobot::MoveHead(mv) if mv.speed_rad_per_sec == 0.0)));
}

#[test]
fn test_robot_stopped_aborts_animation() {
    let mut h = Harness::new();
    h.from_engine(play("anim_long", 6));
    h.ticks(2);

    h.from_robot(RobotToEngine::RobotStopped(RobotStopped { reason: 1 }));
    h.tick();

    let to_engine = h.sent_to_engine();
    assert!(to_engine
        .iter()
        .any(|m| matches!(m, RobotToEngine::AnimationEnded(e) if e.tag == 6 && e.was_aborted)));
    assert!(to_engine
        .iter()
        .any(|m| matches!(m, RobotToEngine::RobotStopped(_))));
}

#[test]
fn test_alteration_locks_head_mid_animation() {
    let mut h = Harness::new();
    h.from_engine(play("anim_long", 3));
    h.from_engine(EngineToRobot::AlterStreamingAnimationAtTime(
        AlterStreamingAnimationAtTime {
            relative_stream_time_ms: 66,
            apply_before_tick: true,
            alteration: Box::new(EngineToRobot::SetFullAnimTrackLockState(
                SetFullAnimTrackLockState {
                    track_lock_state: TrackFlags::HEAD,
                },
            )),
        },
    ));
    h.tick();
    assert_eq!(h.process.modifier().len(), 1);

    h.ticks(15);
    assert!(h.process.modifier().is_empty());
    assert!(h.process.streamer().locked_tracks().contains(TrackFlags::HEAD));
    // The keyframe at 330 ms lands after the lock
    assert_eq!(head_angles(&h.sent_to_robot()), 1);
}

#[test]
fn test_unsupported_alteration_is_not_scheduled() {
    let mut h = Harness::new();
    h.from_engine(play("anim_long", 3));
    h.from_engine(EngineToRobot::AlterStreamingAnimationAtTime(
        AlterStreamingAnimationAtTime {
            relative_stream_time_ms: 66,
            apply_before_tick: false,
            alteration: Box::new(EngineToRobot::AbortAnimation(AbortAnimation { tag: 3 })),
        },
    ));
    h.tick();
    assert!(h.process.modifier().is_empty());

    h.ticks(5);
    assert_eq!(h.process.streamer().tag(), AnimationTag(3));
}

#[test]
fn test_new_animation_discards_old_alterations() {
    let mut h = Harness::new();
    h.from_engine(play("anim_long", 3));
    h.from_engine(EngineToRobot::AlterStreamingAnimationAtTime(
        AlterStreamingAnimationAtTime {
            relative_stream_time_ms: 200,
            apply_before_tick: true,
            alteration: Box::new(EngineToRobot::SetFullAnimTrackLockState(
                SetFullAnimTrackLockState {
                    track_lock_state: TrackFlags::HEAD,
                },
            )),
        },
    ));
    h.tick();

    h.from_engine(play("anim_long", 4));
    h.ticks(12);
    assert!(!h.process.streamer().locked_tracks().contains(TrackFlags::HEAD));
}

#[test]
fn test_pending_animation_from_another_thread() {
    let mut h = Harness::new();
    h.tick();
    h.engine.take_sent();

    let handle = h.process.pending_handle();
    std::thread::spawn(move || handle.set("anim_nod", 1))
        .join()
        .unwrap();
    h.tick();

    assert_eq!(h.process.streamer().tag(), AnimationTag::PENDING);
    assert!(h.sent_to_engine().iter().any(
        |m| matches!(m, RobotToEngine::AnimationStarted(s) if s.tag == AnimationTag::PENDING.0)
    ));
}
