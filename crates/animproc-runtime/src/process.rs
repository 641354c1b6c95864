//! Per-tick orchestration of the animation process
//!
//! Tick order:
//! 1. Router (shutdown, connection monitors, drain both peers)
//! 2. Alterations due before the tick
//! 3. Animation streamer
//! 4. Alterations due after the tick
//! 5. Loop-driven collaborators

use std::time::Instant;

use animproc_core::{AnimResult, AnimationTag, ClockTime};
use animproc_stream::{
    AnimationLibrary, AnimationStreamer, MessageSink, PendingAnimationHandle,
    StreamingAnimationModifier,
};
use animproc_wire::{EngineToRobot, RobotToEngine};

use crate::config::{AnimProcessConfig, RouterConfig};
use crate::router::{Comms, MessageRouter, RuntimeStats, TickOutcome};
use crate::services::Services;

/// Open the robot client and the engine server. Either failing is fatal.
#[cfg(unix)]
pub fn init_comms(config: &crate::config::TransportConfig) -> AnimResult<Comms> {
    use animproc_transport::{LocalClient, LocalServer};

    let endpoints = config.endpoints();
    let robot = LocalClient::connect(&endpoints.robot_client, &endpoints.robot_server)?;
    let engine = LocalServer::listen(&endpoints.engine_server)?;
    tracing::info!(
        robot = %endpoints.robot_server.display(),
        engine = %endpoints.engine_server.display(),
        "comms initialized"
    );
    Ok(Comms::new(Box::new(robot), Box::new(engine)))
}

/// Route a due alteration to whoever owns it
fn apply_alteration(msg: EngineToRobot, streamer: &mut AnimationStreamer, services: &mut Services) {
    match msg {
        EngineToRobot::SetFullAnimTrackLockState(m) => streamer.set_locked_tracks(m.track_lock_state),
        EngineToRobot::PostAudioEvent(m) => services.audio_input.post_audio_event(&m),
        EngineToRobot::TextToSpeechPlay(m) => services.tts.play(&m),
        other => tracing::error!(name = other.name(), "unexpected alteration"),
    }
}

/// The animation process core
pub struct AnimProcess {
    router: MessageRouter,
    streamer: AnimationStreamer,
    modifier: StreamingAnimationModifier,
    services: Services,
}

impl AnimProcess {
    pub fn new(
        config: &AnimProcessConfig,
        comms: Comms,
        library: Box<dyn AnimationLibrary>,
        services: Services,
    ) -> AnimResult<Self> {
        let streamer = AnimationStreamer::new(config.streamer.clone(), config.debug.clone(), library);
        Self::with_streamer(config.router.clone(), comms, streamer, services)
    }

    /// Build around a preconfigured streamer
    pub fn with_streamer(
        router_config: RouterConfig,
        comms: Comms,
        mut streamer: AnimationStreamer,
        services: Services,
    ) -> AnimResult<Self> {
        let mut router = MessageRouter::new(router_config, comms);
        streamer.init(router.comms_mut())?;
        Ok(AnimProcess {
            router,
            streamer,
            modifier: StreamingAnimationModifier::new(),
            services,
        })
    }

    /// Run one tick at `now`
    pub fn update(&mut self, now: ClockTime) -> TickOutcome {
        let started = Instant::now();

        let outcome = self
            .router
            .update(now, &mut self.streamer, &mut self.modifier, &mut self.services);
        if outcome == TickOutcome::ShutdownRequested {
            return outcome;
        }

        let streamer = &mut self.streamer;
        let services = &mut self.services;

        let epoch = streamer.new_animation_epoch();
        let before_time = streamer.stream_time();
        self.modifier
            .apply_before(epoch, before_time, |msg| apply_alteration(msg, streamer, services));

        let report = streamer.update(now, self.router.comms_mut());

        let epoch = streamer.new_animation_epoch();
        self.modifier.apply_after(epoch, report.stream_time, |msg| {
            apply_alteration(msg, streamer, services)
        });

        self.router.update_collaborators(now, services);
        self.router.record_tick_duration(started.elapsed());
        TickOutcome::Continue
    }

    pub fn send_to_robot(&mut self, msg: &EngineToRobot) -> bool {
        self.router.comms_mut().send_to_robot(msg)
    }

    pub fn send_to_engine(&mut self, msg: &RobotToEngine) -> bool {
        self.router.comms_mut().send_to_engine(msg)
    }

    pub fn set_streaming_animation(
        &mut self,
        name: &str,
        tag: AnimationTag,
        num_loops: u32,
        start_at_ms: u32,
        interrupt_running: bool,
        render_in_eye_hue: bool,
    ) -> AnimResult<()> {
        self.streamer.set_streaming_animation(
            self.router.comms_mut(),
            name,
            tag,
            num_loops,
            start_at_ms,
            interrupt_running,
            render_in_eye_hue,
        )
    }

    pub fn abort(&mut self, tag: AnimationTag) {
        self.streamer.abort(self.router.comms_mut(), tag, true);
    }

    pub fn set_locked_tracks(&mut self, tracks: u8) {
        self.streamer.set_locked_tracks(tracks);
    }

    pub fn enable_keep_face_alive(&mut self, enable: bool, disable_timeout_ms: u32) {
        self.streamer
            .enable_keep_face_alive(self.router.comms_mut(), enable, disable_timeout_ms);
    }

    pub fn pending_handle(&self) -> PendingAnimationHandle {
        self.streamer.pending_handle()
    }

    pub fn streamer(&self) -> &AnimationStreamer {
        &self.streamer
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn modifier(&self) -> &StreamingAnimationModifier {
        &self.modifier
    }

    pub fn stats(&self) -> &RuntimeStats {
        self.router.stats()
    }
}
