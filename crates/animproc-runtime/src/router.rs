//! Message router
//!
//! Relays frames between the engine and the robot, intercepting the ones
//! addressed to the animation process. Runs once per tick:
//! 1. Shutdown countdown
//! 2. Reset per-tick counters
//! 3. Engine connection monitor
//! 4. Robot connection watchdog
//! 5. Drain the engine
//! 6. Drain the robot
//!
//! Forwarded frames go out byte-for-byte as received.

use std::path::Path;
use std::time::Duration;

use animproc_core::{AnimationTag, ClockTime, FaultCode};
use animproc_stream::{
    AnimationLibrary, AnimationStreamer, MessageSink, ProceduralFace, StreamingAnimationModifier,
};
use animproc_transport::PeerLink;
use animproc_wire::{EngineToRobot, RobotAvailable, RobotToEngine, MAX_PACKET_BUFFER_SIZE};

use crate::config::RouterConfig;
use crate::services::Services;

/// What the caller should do after a tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    ShutdownRequested,
}

/// Frames seen during the current tick
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickCounters {
    pub engine_to_robot: u32,
    pub robot_to_engine: u32,
    pub robot_to_router: u32,
    pub engine_to_router: u32,
}

/// Cumulative counters
#[derive(Clone, Debug, Default)]
pub struct RuntimeStats {
    pub ticks: u64,
    pub frames_from_engine: u64,
    pub frames_from_robot: u64,
    pub frames_to_engine: u64,
    pub frames_to_robot: u64,
    pub dropped_frames: u64,
    pub send_failures: u64,
    pub last_tick_duration: Duration,
}

/// Both peer links plus frame accounting
pub struct Comms {
    robot: Box<dyn PeerLink>,
    engine: Box<dyn PeerLink>,
    counters: TickCounters,
    stats: RuntimeStats,
}

impl Comms {
    pub fn new(robot: Box<dyn PeerLink>, engine: Box<dyn PeerLink>) -> Self {
        Comms {
            robot,
            engine,
            counters: TickCounters::default(),
            stats: RuntimeStats::default(),
        }
    }

    pub fn is_robot_connected(&self) -> bool {
        self.robot.is_connected()
    }

    pub fn is_engine_connected(&self) -> bool {
        self.engine.is_connected()
    }

    pub fn disconnect_robot(&mut self) {
        self.robot.disconnect();
    }

    pub fn counters(&self) -> TickCounters {
        self.counters
    }

    pub fn stats(&self) -> &RuntimeStats {
        &self.stats
    }

    /// Send an encoded frame to the robot
    pub fn send_robot_bytes(&mut self, bytes: &[u8]) -> bool {
        self.counters.engine_to_robot += 1;
        let was_connected = self.robot.is_connected();
        if self.robot.try_send(bytes) {
            self.stats.frames_to_robot += 1;
            return true;
        }
        if was_connected {
            self.stats.send_failures += 1;
            tracing::error!(tag = bytes.first().copied(), "send to robot failed, robot disconnected");
        }
        false
    }

    /// Send an encoded frame to the engine
    pub fn send_engine_bytes(&mut self, bytes: &[u8]) -> bool {
        self.counters.robot_to_engine += 1;
        let was_connected = self.engine.is_connected();
        if self.engine.try_send(bytes) {
            self.stats.frames_to_engine += 1;
            return true;
        }
        if was_connected {
            self.stats.send_failures += 1;
            tracing::error!(tag = bytes.first().copied(), "send to engine failed, engine disconnected");
        }
        false
    }
}

impl MessageSink for Comms {
    fn send_to_robot(&mut self, msg: &EngineToRobot) -> bool {
        match msg.encode() {
            Ok(bytes) => self.send_robot_bytes(&bytes),
            Err(e) => {
                tracing::error!(name = msg.name(), "encode for robot failed: {}", e);
                false
            }
        }
    }

    fn send_to_engine(&mut self, msg: &RobotToEngine) -> bool {
        match msg.encode() {
            Ok(bytes) => self.send_engine_bytes(&bytes),
            Err(e) => {
                tracing::error!(name = msg.name(), "encode for engine failed: {}", e);
                false
            }
        }
    }
}

/// Routes engine and robot traffic for one animation process
pub struct MessageRouter {
    config: RouterConfig,
    comms: Comms,
    shutdown_countdown: u32,
    engine_was_connected: bool,
    engine_fault_deadline: Option<ClockTime>,
    robot_fault_shown: bool,
    robot_deadline: Option<ClockTime>,
    next_robot_reconnect: ClockTime,
    on_charger: bool,
    rx_buf: Vec<u8>,
}

impl MessageRouter {
    pub fn new(config: RouterConfig, comms: Comms) -> Self {
        MessageRouter {
            config,
            comms,
            shutdown_countdown: 0,
            engine_was_connected: false,
            engine_fault_deadline: None,
            robot_fault_shown: false,
            robot_deadline: None,
            next_robot_reconnect: ClockTime::ZERO,
            on_charger: false,
            rx_buf: vec![0u8; MAX_PACKET_BUFFER_SIZE],
        }
    }

    pub fn comms(&self) -> &Comms {
        &self.comms
    }

    pub fn comms_mut(&mut self) -> &mut Comms {
        &mut self.comms
    }

    pub fn counters(&self) -> TickCounters {
        self.comms.counters
    }

    pub fn stats(&self) -> &RuntimeStats {
        &self.comms.stats
    }

    pub(crate) fn record_tick_duration(&mut self, duration: Duration) {
        self.comms.stats.last_tick_duration = duration;
    }

    pub fn is_on_charger(&self) -> bool {
        self.on_charger
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_countdown > 0
    }

    /// Run the routing stages for one tick
    pub fn update(
        &mut self,
        now: ClockTime,
        streamer: &mut AnimationStreamer,
        modifier: &mut StreamingAnimationModifier,
        services: &mut Services,
    ) -> TickOutcome {
        // Stage 1: shutdown countdown
        if self.shutdown_countdown > 0 {
            self.shutdown_countdown -= 1;
            if self.shutdown_countdown == 0 {
                tracing::info!("shutdown countdown elapsed");
                return TickOutcome::ShutdownRequested;
            }
        }

        // Stage 2: counters
        self.comms.counters = TickCounters::default();
        self.comms.stats.ticks += 1;

        // Stage 3: engine connection
        self.monitor_engine(now, services);

        // Stage 4: robot connection
        self.monitor_robot(now, services);

        // Stages 5 and 6: drain both peers
        self.drain_engine(streamer, modifier, services);
        self.drain_robot(now, streamer, services);

        TickOutcome::Continue
    }

    /// Tick the loop-driven collaborators
    pub fn update_collaborators(&mut self, now: ClockTime, services: &mut Services) {
        services.update(now);
    }

    fn monitor_engine(&mut self, now: ClockTime, services: &mut Services) {
        let connected = self.comms.is_engine_connected();
        if connected && !self.engine_was_connected {
            tracing::info!("engine connected, robot available");
            self.comms
                .send_to_engine(&RobotToEngine::RobotAvailable(RobotAvailable {}));
            self.engine_fault_deadline = None;
        } else if !connected && self.engine_was_connected {
            tracing::warn!(
                grace_ms = self.config.engine_fault_grace.as_millis() as u64,
                "engine disconnected, fault pending"
            );
            self.engine_fault_deadline = Some(now.saturating_add(self.config.engine_fault_grace));
        }
        self.engine_was_connected = connected;

        if let Some(deadline) = self.engine_fault_deadline {
            if now > deadline {
                self.engine_fault_deadline = None;
                services.faults.display_fault(FaultCode::NoEngineComms);
            }
        }
    }

    fn monitor_robot(&mut self, now: ClockTime, services: &mut Services) {
        if !self.comms.is_robot_connected() {
            if !self.robot_fault_shown {
                tracing::warn!("no connection to robot");
                services.faults.display_fault(FaultCode::NoRobotComms);
                self.robot_fault_shown = true;
            }
            if now >= self.next_robot_reconnect {
                self.next_robot_reconnect = now.saturating_add(self.config.robot_reconnect_interval);
                match self.comms.robot.reconnect() {
                    Ok(()) => {
                        tracing::info!("robot reconnected");
                        self.robot_deadline = Some(now.saturating_add(self.config.robot_silence_timeout));
                    }
                    Err(e) => tracing::debug!("robot reconnect failed: {}", e),
                }
            }
            return;
        }

        if let Some(deadline) = self.robot_deadline {
            if now > deadline {
                tracing::warn!("robot state timeout, disconnecting robot");
                self.comms.disconnect_robot();
                self.robot_deadline = None;
            }
        }
    }

    fn drain_engine(
        &mut self,
        streamer: &mut AnimationStreamer,
        modifier: &mut StreamingAnimationModifier,
        services: &mut Services,
    ) {
        let mut buf = std::mem::take(&mut self.rx_buf);
        loop {
            let len = self.comms.engine.try_recv(&mut buf);
            if len == 0 {
                break;
            }
            self.comms.counters.engine_to_router += 1;
            self.comms.stats.frames_from_engine += 1;

            let frame = &buf[..len];
            match EngineToRobot::decode(frame) {
                Ok(msg) => {
                    if self.handle_engine_message(&msg, streamer, modifier, services) {
                        self.comms.send_robot_bytes(frame);
                    }
                }
                Err(e) => {
                    self.comms.stats.dropped_frames += 1;
                    tracing::warn!(len, tag = frame[0], "invalid frame from engine: {}", e);
                }
            }
        }
        self.rx_buf = buf;
    }

    fn drain_robot(&mut self, now: ClockTime, streamer: &mut AnimationStreamer, services: &mut Services) {
        let mut buf = std::mem::take(&mut self.rx_buf);
        loop {
            let len = self.comms.robot.try_recv(&mut buf);
            if len == 0 {
                break;
            }
            self.comms.counters.robot_to_router += 1;
            self.comms.stats.frames_from_robot += 1;

            let frame = &buf[..len];
            match RobotToEngine::decode(frame) {
                Ok(msg) => {
                    if self.handle_robot_message(now, &msg, streamer, services) {
                        self.comms.send_engine_bytes(frame);
                    }
                }
                Err(e) => {
                    self.comms.stats.dropped_frames += 1;
                    tracing::warn!(len, tag = frame[0], "invalid frame from robot: {}", e);
                }
            }
        }
        self.rx_buf = buf;
    }

    /// Act on an engine message. Returns whether to forward it to the robot.
    fn handle_engine_message(
        &mut self,
        msg: &EngineToRobot,
        streamer: &mut AnimationStreamer,
        modifier: &mut StreamingAnimationModifier,
        services: &mut Services,
    ) -> bool {
        let comms = &mut self.comms;
        match msg {
            EngineToRobot::AbsLocalizationUpdate(_) => {
                services.mic.reset_listen_direction();
                true
            }
            EngineToRobot::CalmPowerMode(m) => {
                services.screen.set_calm_power_mode_on_return(m);
                !services.screen.is_showing_screen()
            }
            EngineToRobot::SetBackpackLights(m) => {
                services.backpack.set_backpack_animation(m);
                false
            }
            EngineToRobot::SetFullAnimTrackLockState(m) => {
                streamer.set_locked_tracks(m.track_lock_state);
                false
            }
            EngineToRobot::AddAnim(m) => {
                let path = m.anim_path.as_str();
                match streamer.library_mut().load_animation_file(Path::new(path)) {
                    Ok(names) => tracing::info!(%path, count = names.len(), "animations added"),
                    Err(e) => tracing::warn!(%path, "add animation failed: {}", e),
                }
                false
            }
            EngineToRobot::PlayAnim(m) => {
                let name = m.anim_name.as_str();
                if let Err(e) = streamer.set_streaming_animation(
                    comms,
                    name,
                    AnimationTag(m.tag),
                    m.num_loops,
                    m.start_at_ms,
                    true,
                    m.render_in_eye_hue,
                ) {
                    tracing::warn!(%name, tag = m.tag, "play animation failed: {}", e);
                }
                false
            }
            EngineToRobot::AbortAnimation(m) => {
                streamer.abort(comms, AnimationTag(m.tag), true);
                false
            }
            EngineToRobot::DisplayProceduralFace(m) => {
                if let Err(e) = streamer.set_procedural_face(comms, ProceduralFace::from(&m.face), m.duration_ms) {
                    tracing::warn!("procedural face failed: {}", e);
                }
                false
            }
            EngineToRobot::DisplayFaceImageRgbChunk(m) => {
                streamer.handle_face_image_chunk(comms, m);
                false
            }
            EngineToRobot::EnableKeepFaceAlive(m) => {
                streamer.enable_keep_face_alive(comms, m.enable, m.disable_timeout_ms);
                false
            }
            EngineToRobot::SetKeepFaceAliveFocus(m) => {
                streamer.set_keep_face_alive_focus(m.enable);
                false
            }
            EngineToRobot::PlayAnimWithSpriteBoxRemaps(m) => {
                let remaps: Vec<(u16, u16)> = m
                    .remaps
                    .as_slice()
                    .iter()
                    .map(|r| (r.sprite_box, r.asset_id))
                    .collect();
                if let Err(e) = streamer.play_anim_with_sprite_box_remaps(
                    comms,
                    m.anim_name.as_str(),
                    AnimationTag(m.tag),
                    &remaps,
                    m.lock_face_at_end,
                ) {
                    tracing::warn!(tag = m.tag, "sprite box remap play failed: {}", e);
                }
                false
            }
            EngineToRobot::PlayAnimWithSpriteBoxKeyFrames(m) => {
                if let Err(e) = streamer.play_anim_with_sprite_box_keyframes(
                    comms,
                    m.anim_name.as_str(),
                    AnimationTag(m.tag),
                    m.keyframes.as_slice(),
                ) {
                    tracing::warn!(tag = m.tag, "sprite box keyframe play failed: {}", e);
                }
                false
            }
            EngineToRobot::AddSpriteBoxKeyFrames(m) => {
                if let Err(e) = streamer.add_sprite_box_keyframes(m.keyframes.as_slice()) {
                    tracing::warn!("sprite box keyframes dropped: {}", e);
                }
                false
            }
            EngineToRobot::AddOrUpdateEyeShift(m) => {
                streamer.add_or_update_eye_shift(m.name.as_str(), m.x_pix, m.y_pix, m.duration_ms);
                false
            }
            EngineToRobot::RemoveEyeShift(m) => {
                streamer.remove_eye_shift(m.name.as_str(), m.disable_timeout_ms);
                false
            }
            EngineToRobot::AddSquint(m) => {
                streamer.add_squint(m.name.as_str(), m.squint_scale_x, m.squint_scale_y, m.upper_lid_angle);
                false
            }
            EngineToRobot::RemoveSquint(m) => {
                streamer.remove_squint(m.name.as_str(), m.disable_timeout_ms);
                false
            }
            EngineToRobot::PostAudioEvent(m) => {
                services.audio_input.post_audio_event(m);
                false
            }
            EngineToRobot::StopAllAudioEvents(m) => {
                services.audio_input.stop_all_audio_events(m);
                false
            }
            EngineToRobot::TextToSpeechPlay(m) => {
                services.tts.play(m);
                false
            }
            EngineToRobot::TextToSpeechCancel(m) => {
                services.tts.cancel(m);
                false
            }
            EngineToRobot::AlterStreamingAnimationAtTime(m) => {
                if let Err(e) = modifier.handle(m, streamer.new_animation_epoch()) {
                    tracing::debug!(time_ms = m.relative_stream_time_ms, "alteration not scheduled: {}", e);
                }
                false
            }
            EngineToRobot::AcousticTestEnabled(m) => {
                streamer.set_frozen_on_charger(m.enabled);
                false
            }
            EngineToRobot::DriveWheels(_)
            | EngineToRobot::DriveWheelsCurvature(_)
            | EngineToRobot::MoveHead(_)
            | EngineToRobot::MoveLift(_)
            | EngineToRobot::SetHeadAngle(_)
            | EngineToRobot::SetLiftHeight(_)
            | EngineToRobot::RecordHeading(_)
            | EngineToRobot::TurnToRecordedHeading(_)
            | EngineToRobot::StopAllMotors(_)
            | EngineToRobot::BackpackSetLayer(_)
            | EngineToRobot::SyncRobot(_)
            | EngineToRobot::EnableStopOnCliff(_) => true,
        }
    }

    /// Act on a robot message. Returns whether to forward it to the engine.
    fn handle_robot_message(
        &mut self,
        now: ClockTime,
        msg: &RobotToEngine,
        streamer: &mut AnimationStreamer,
        services: &mut Services,
    ) -> bool {
        match msg {
            RobotToEngine::RobotServerDisconnect(_) => {
                tracing::info!("robot server disconnecting");
                self.comms.disconnect_robot();
                true
            }
            RobotToEngine::PrepForShutdown(m) => {
                tracing::info!(reason = m.reason, "robot preparing for shutdown");
                self.shutdown_countdown = self.config.shutdown_ticks.max(1);
                true
            }
            RobotToEngine::MicData(m) => {
                services.mic.process_mic_data(m);
                false
            }
            RobotToEngine::RobotState(state) => {
                self.robot_deadline = Some(now.saturating_add(self.config.robot_silence_timeout));
                self.robot_fault_shown = false;
                services.screen.on_robot_state(state);
                self.on_charger = state.is_on_charger();
                streamer.set_on_charger(self.on_charger);
                services.stream_state.set_on_charger(self.on_charger);
                true
            }
            RobotToEngine::StillAlive(_) => {
                self.robot_deadline = Some(now.saturating_add(self.config.robot_silence_timeout));
                self.robot_fault_shown = false;
                true
            }
            RobotToEngine::RobotStopped(m) => {
                tracing::info!(reason = m.reason, "robot stopped, aborting animation");
                streamer.abort(&mut self.comms, AnimationTag::NOT_ANIMATING, true);
                true
            }
            RobotToEngine::SyncRobotAck(m) => {
                services.screen.set_syscon_version(&m.syscon_version_string());
                true
            }
            RobotToEngine::CliffEvent(_)
            | RobotToEngine::FallingEvent(_)
            | RobotToEngine::ImuTemperature(_)
            | RobotToEngine::DebugString(_)
            | RobotToEngine::RobotAvailable(_)
            | RobotToEngine::AnimationStarted(_)
            | RobotToEngine::AnimationEnded(_)
            | RobotToEngine::AnimationEvent(_)
            | RobotToEngine::AnimationState(_) => true,
        }
    }
}
