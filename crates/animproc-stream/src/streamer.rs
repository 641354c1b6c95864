//! Animation streamer
//!
//! Plays at most one animation at a time, turning its keyframe tracks plus
//! the procedural layers into per-tick robot commands, face frames and
//! engine notifications. The streamer never blocks; everything it emits goes
//! through a `MessageSink` supplied by the caller for each operation.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use animproc_core::{
    AnimError, AnimResult, AnimationTag, ClockTime, StreamTime, TrackFlags, ANIM_TIME_STEP_MS,
};
use animproc_wire::{
    AnimName, AnimationEnded, AnimationEvent, AnimationStarted, AnimationState, BackpackSetLayer,
    DisplayFaceImageRgbChunk, DriveWheels, EngineToRobot, MoveHead, MoveLift, RobotToEngine,
    SpriteBoxKeyFrameSpec,
};

use crate::animation::Animation;
use crate::audio::{AnimationAudioClient, AudioBackend};
use crate::config::{StreamerConfig, StreamerDebugConfig};
use crate::face::{FaceFrame, FaceImage, FaceImageAssembler, FaceSink, NullFaceSink, ProceduralFace};
use crate::keyframe::{AudioKeyFrame, ProceduralFaceKeyFrame, SpriteBoxKeyFrame, StreamingKeyFrame};
use crate::layers::{ProceduralLayers, TrackLayers};
use crate::library::AnimationLibrary;

/// Name given to procedurally built animations
pub const PROCEDURAL_ANIM_NAME: &str = "PROCEDURAL_ANIM";

/// Debug-viewer module the streamer reports to
const WEB_MODULE: &str = "animations";

/// Outbound message seam
pub trait MessageSink {
    fn send_to_robot(&mut self, msg: &EngineToRobot) -> bool;
    fn send_to_engine(&mut self, msg: &RobotToEngine) -> bool;
}

/// Best-effort debug event sink
pub trait WebSink: Send {
    fn send_event(&mut self, module: &str, data: serde_json::Value);
}

/// Drops every event
#[derive(Debug, Default)]
pub struct NullWebSink;

impl WebSink for NullWebSink {
    fn send_event(&mut self, _module: &str, _data: serde_json::Value) {}
}

/// Animation request posted from outside the tick thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAnimation {
    pub name: String,
    pub num_loops: u32,
}

/// Cross-thread slot for one pending animation; the latest request wins
#[derive(Debug, Clone, Default)]
pub struct PendingAnimationHandle(Arc<Mutex<Option<PendingAnimation>>>);

impl PendingAnimationHandle {
    pub fn set(&self, name: impl Into<String>, num_loops: u32) {
        *self.0.lock() = Some(PendingAnimation {
            name: name.into(),
            num_loops,
        });
    }

    pub fn take(&self) -> Option<PendingAnimation> {
        self.0.lock().take()
    }

    pub fn is_set(&self) -> bool {
        self.0.lock().is_some()
    }
}

/// Result of one streamer tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Stream time the tick's messages were extracted at
    pub stream_time: StreamTime,
}

/// Coarse lifecycle of the streaming slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Nothing active
    Idle,
    /// Active, nothing sent yet
    Initialized,
    /// Start sent, end not yet sent
    Playing,
    /// End sent; finishes or loops on the next tick
    Ended,
}

enum ActiveSlot {
    Canned(Box<Animation>),
    Procedural,
}

/// Messages gathered for one tick before locks are applied
#[derive(Default)]
struct TickMessages {
    head: Option<EngineToRobot>,
    lift: Option<EngineToRobot>,
    body: Option<EngineToRobot>,
    record_heading: Option<EngineToRobot>,
    turn_to_heading: Option<EngineToRobot>,
    backpack: Option<EngineToRobot>,
    audio: Option<AudioKeyFrame>,
    event: Option<AnimationEvent>,
    face: Option<FaceFrame>,
}

fn slot_animation<'a>(active: &'a Option<ActiveSlot>, procedural: &'a Animation) -> Option<&'a Animation> {
    match active {
        Some(ActiveSlot::Canned(anim)) => Some(anim.as_ref()),
        Some(ActiveSlot::Procedural) => Some(procedural),
        None => None,
    }
}

/// Merge the layers with `anim` and collect backpack, audio and face output.
/// Returns whether animation content reached the face.
fn layered_messages(
    layers: &mut dyn TrackLayers,
    anim: Option<&Animation>,
    locked: TrackFlags,
    time: StreamTime,
    store_face: bool,
    msgs: &mut TickMessages,
) -> bool {
    let layered = layers.apply_layers_to_anim(anim, time, store_face);

    if !locked.contains(TrackFlags::BACKPACK_LIGHTS) {
        msgs.backpack = layered.backpack.and_then(|kf| kf.stream_message(time));
    }
    if !locked.contains(TrackFlags::AUDIO) {
        msgs.audio = layered.audio;
    }

    if locked.contains(TrackFlags::FACE) {
        return false;
    }
    let composite = anim.and_then(|a| a.composite_image(time));
    let frame = FaceFrame {
        procedural: layered.face,
        composite,
    };
    if frame.is_empty() {
        return false;
    }
    msgs.face = Some(frame);
    anim.is_some()
}

/// Streams animations to the robot, one tick at a time
pub struct AnimationStreamer {
    config: StreamerConfig,
    debug: StreamerDebugConfig,
    library: Box<dyn AnimationLibrary>,
    layers: Box<dyn TrackLayers>,
    audio: AnimationAudioClient,
    face_sink: Box<dyn FaceSink>,
    web: Box<dyn WebSink>,
    pending: PendingAnimationHandle,
    face_assembler: FaceImageAssembler,

    active: Option<ActiveSlot>,
    /// Reused for every procedural animation
    procedural: Animation,
    tag: AnimationTag,
    num_loops: u32,
    loop_ctr: u32,
    playing_internal: bool,
    stream_time: StreamTime,
    start_sent: bool,
    end_sent: bool,
    increment_time_this_tick: bool,
    interrupted_with_nothing: bool,
    lock_face_at_end: bool,
    banned_warned: bool,

    locked_tracks: TrackFlags,
    tracks_in_use: TrackFlags,
    backpack_layer_enabled: bool,
    keep_face_alive_enabled: bool,
    on_charger: bool,
    frozen_on_charger: bool,

    now: ClockTime,
    last_stream_clock: Option<ClockTime>,
    next_procedural_face_allowed: ClockTime,
    ticks_to_anim_state: u32,
    new_animation_epoch: u64,
}

impl AnimationStreamer {
    pub fn new(config: StreamerConfig, debug: StreamerDebugConfig, library: Box<dyn AnimationLibrary>) -> Self {
        let layers = ProceduralLayers::new(config.keep_alive.clone(), config.audio_latency_offset_ms);
        AnimationStreamer {
            ticks_to_anim_state: config.anim_state_period_ticks.max(1),
            keep_face_alive_enabled: !debug.disable_keep_face_alive,
            layers: Box::new(layers),
            config,
            debug,
            library,
            audio: AnimationAudioClient::default(),
            face_sink: Box::new(NullFaceSink),
            web: Box::new(NullWebSink),
            pending: PendingAnimationHandle::default(),
            face_assembler: FaceImageAssembler::new(),
            active: None,
            procedural: Animation::new(PROCEDURAL_ANIM_NAME),
            tag: AnimationTag::NOT_ANIMATING,
            num_loops: 1,
            loop_ctr: 0,
            playing_internal: false,
            stream_time: StreamTime::ZERO,
            start_sent: false,
            end_sent: false,
            increment_time_this_tick: true,
            interrupted_with_nothing: false,
            lock_face_at_end: false,
            banned_warned: false,
            locked_tracks: TrackFlags::NONE,
            tracks_in_use: TrackFlags::NONE,
            backpack_layer_enabled: false,
            on_charger: false,
            frozen_on_charger: false,
            now: ClockTime::ZERO,
            last_stream_clock: None,
            next_procedural_face_allowed: ClockTime::ZERO,
            new_animation_epoch: 0,
        }
    }

    pub fn with_layers(mut self, layers: Box<dyn TrackLayers>) -> Self {
        self.layers = layers;
        self
    }

    pub fn with_audio_backend(mut self, backend: Box<dyn AudioBackend>) -> Self {
        self.audio = AnimationAudioClient::new(backend);
        self
    }

    pub fn with_face_sink(mut self, face_sink: Box<dyn FaceSink>) -> Self {
        self.face_sink = face_sink;
        self
    }

    pub fn with_web_sink(mut self, web: Box<dyn WebSink>) -> Self {
        self.web = web;
        self
    }

    /// Check the neutral face exists and start on a blank face until the
    /// engine sends something
    pub fn init(&mut self, sink: &mut dyn MessageSink) -> AnimResult<()> {
        if self.library.canned_animation(&self.config.neutral_face_anim).is_none() {
            tracing::error!(
                name = %self.config.neutral_face_anim,
                "neutral face animation not found"
            );
        }
        self.set_procedural_face(sink, ProceduralFace::blank(), u32::MAX)
    }

    // Accessors

    pub fn stream_time(&self) -> StreamTime {
        self.stream_time
    }

    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    pub fn streaming_animation_name(&self) -> Option<&str> {
        self.active_animation().map(Animation::name)
    }

    pub fn tag(&self) -> AnimationTag {
        self.tag
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_ctr
    }

    pub fn state(&self) -> StreamState {
        match (&self.active, self.start_sent, self.end_sent) {
            (None, _, _) => StreamState::Idle,
            (Some(_), _, true) => StreamState::Ended,
            (Some(_), true, false) => StreamState::Playing,
            (Some(_), false, false) => StreamState::Initialized,
        }
    }

    /// Bumped every time an animation is initialized, loops included
    pub fn new_animation_epoch(&self) -> u64 {
        self.new_animation_epoch
    }

    pub fn pending_handle(&self) -> PendingAnimationHandle {
        self.pending.clone()
    }

    pub fn locked_tracks(&self) -> TrackFlags {
        self.locked_tracks
    }

    pub fn tracks_in_use(&self) -> TrackFlags {
        self.tracks_in_use
    }

    pub fn is_keep_face_alive_enabled(&self) -> bool {
        self.keep_face_alive_enabled
    }

    pub fn library_mut(&mut self) -> &mut dyn AnimationLibrary {
        self.library.as_mut()
    }

    fn active_animation(&self) -> Option<&Animation> {
        slot_animation(&self.active, &self.procedural)
    }

    fn active_animation_mut(&mut self) -> Option<&mut Animation> {
        match &mut self.active {
            Some(ActiveSlot::Canned(anim)) => Some(anim.as_mut()),
            Some(ActiveSlot::Procedural) => Some(&mut self.procedural),
            None => None,
        }
    }

    // Starting and stopping

    /// Start streaming the canned animation `name`. An empty name aborts
    /// whatever is streaming.
    #[allow(clippy::too_many_arguments)]
    pub fn set_streaming_animation(
        &mut self,
        sink: &mut dyn MessageSink,
        name: &str,
        tag: AnimationTag,
        num_loops: u32,
        start_at_ms: u32,
        interrupt_running: bool,
        render_in_eye_hue: bool,
    ) -> AnimResult<()> {
        if name.is_empty() {
            self.abort(sink, AnimationTag::NOT_ANIMATING, true);
            return Ok(());
        }
        let anim = self
            .library
            .canned_animation(name)
            .ok_or_else(|| AnimError::AnimationNotFound(name.to_string()))?;
        self.interrupt_current(sink, interrupt_running, name)?;
        self.activate(
            ActiveSlot::Canned(Box::new((*anim).clone())),
            tag,
            num_loops,
            start_at_ms,
            render_in_eye_hue,
            false,
        );
        Ok(())
    }

    /// Abort the active animation if `tag` matches it or is the
    /// not-animating wildcard
    pub fn abort(&mut self, sink: &mut dyn MessageSink, tag: AnimationTag, clear_procedural: bool) {
        let Some(name) = self.streaming_animation_name().map(str::to_string) else {
            return;
        };
        if tag != self.tag && !tag.is_not_animating() {
            return;
        }
        tracing::info!(
            tag = %self.tag,
            %name,
            start_sent = self.start_sent,
            end_sent = self.end_sent,
            "aborting animation"
        );

        self.stop_tracks_in_use(sink, true);
        if self.start_sent {
            self.send_end_of_animation(sink, true);
        }
        self.enable_backpack_layer(sink, false);
        self.audio.abort_animation();

        match self.active.take() {
            Some(ActiveSlot::Procedural) if clear_procedural => self.procedural.clear(),
            Some(ActiveSlot::Procedural) => self.procedural.clear_overrides(),
            Some(ActiveSlot::Canned(mut anim)) => anim.clear_overrides(),
            None => {}
        }
        self.interrupted_with_nothing = true;
        self.stream_time = StreamTime::ZERO;
        self.lock_face_at_end = false;
    }

    fn interrupt_current(&mut self, sink: &mut dyn MessageSink, interrupt_running: bool, next: &str) -> AnimResult<()> {
        let Some(current) = self.streaming_animation_name().map(str::to_string) else {
            return Ok(());
        };
        if !interrupt_running {
            tracing::info!(%current, %next, "already streaming, not interrupting");
            return Err(AnimError::AlreadyStreaming {
                current,
                tag: self.tag,
            });
        }
        tracing::info!(%next, %current, "interrupting animation");
        self.abort(sink, AnimationTag::NOT_ANIMATING, true);
        Ok(())
    }

    fn activate(
        &mut self,
        slot: ActiveSlot,
        tag: AnimationTag,
        num_loops: u32,
        start_at_ms: u32,
        render_in_eye_hue: bool,
        internal: bool,
    ) {
        self.active = Some(slot);
        self.interrupted_with_nothing = false;
        self.loop_ctr = 0;
        self.num_loops = num_loops;
        self.playing_internal = internal;
        self.init_streaming_animation(tag, start_at_ms, render_in_eye_hue);
        tracing::debug!(
            name = self.streaming_animation_name().unwrap_or_default(),
            %tag,
            num_loops,
            "streaming animation"
        );
    }

    fn init_streaming_animation(&mut self, tag: AnimationTag, start_at_ms: u32, render_in_eye_hue: bool) {
        self.new_animation_epoch = self.new_animation_epoch.wrapping_add(1);
        self.layers.on_new_animation();

        let Some(anim) = self.active_animation_mut() else {
            return;
        };
        anim.init();
        if render_in_eye_hue {
            anim.set_render_in_eye_hue(true);
        }
        let face_track_empty = anim.face.is_empty();

        self.tag = tag;
        self.stream_time = StreamTime(start_at_ms);
        self.start_sent = false;
        self.end_sent = false;
        self.banned_warned = false;

        // Keep-alive must not fight the animation for the eyes
        self.layers
            .remove_keep_face_alive(self.stream_time, 3 * ANIM_TIME_STEP_MS);
        if !self.keep_face_alive_enabled && face_track_empty {
            self.layers.set_last_procedural_face_as_blank();
        }
    }

    /// Abort what is playing and stream the procedural animation built by
    /// `build`
    fn start_procedural<F>(
        &mut self,
        sink: &mut dyn MessageSink,
        tag: AnimationTag,
        render_in_eye_hue: bool,
        internal: bool,
        build: F,
    ) -> AnimResult<()>
    where
        F: FnOnce(&mut Animation) -> AnimResult<()>,
    {
        self.interrupt_current(sink, true, PROCEDURAL_ANIM_NAME)?;
        self.procedural.clear();
        self.procedural.set_name(PROCEDURAL_ANIM_NAME);
        if let Err(e) = build(&mut self.procedural) {
            self.procedural.clear();
            return Err(e);
        }
        self.activate(ActiveSlot::Procedural, tag, 1, 0, render_in_eye_hue, internal);
        Ok(())
    }

    /// Show `face` for `duration_ms` as an internal animation
    pub fn set_procedural_face(
        &mut self,
        sink: &mut dyn MessageSink,
        face: ProceduralFace,
        duration_ms: u32,
    ) -> AnimResult<()> {
        self.start_procedural(sink, AnimationTag::NOT_ANIMATING, false, true, |anim| {
            anim.face
                .add_keyframe_to_back(ProceduralFaceKeyFrame::new(0, ANIM_TIME_STEP_MS, face))?;
            // A second keyframe holds the face for the full duration
            if duration_ms > ANIM_TIME_STEP_MS {
                anim.face.add_keyframe_to_back(ProceduralFaceKeyFrame::new(
                    duration_ms - ANIM_TIME_STEP_MS,
                    ANIM_TIME_STEP_MS,
                    face,
                ))?;
            }
            Ok(())
        })
    }

    /// Overlay `image` on the procedural animation, starting one if needed
    pub fn set_face_image(
        &mut self,
        sink: &mut dyn MessageSink,
        image: FaceImage,
        render_in_eye_hue: bool,
        duration_ms: u32,
    ) -> AnimResult<()> {
        if matches!(self.active, Some(ActiveSlot::Procedural)) {
            self.procedural
                .set_face_image_override(image, self.stream_time, duration_ms)?;
            if render_in_eye_hue {
                self.procedural.set_render_in_eye_hue(true);
            }
            return Ok(());
        }
        self.start_procedural(sink, AnimationTag::NOT_ANIMATING, render_in_eye_hue, true, |anim| {
            anim.set_face_image_override(image, StreamTime::ZERO, duration_ms)
        })
    }

    /// Feed one face image chunk; a completed image goes on the face
    pub fn handle_face_image_chunk(&mut self, sink: &mut dyn MessageSink, chunk: &DisplayFaceImageRgbChunk) {
        match self.face_assembler.add_chunk(chunk) {
            Ok(Some(image)) => {
                self.enable_keep_face_alive(sink, false, chunk.duration_ms);
                if let Err(e) = self.set_face_image(sink, image, false, chunk.duration_ms) {
                    tracing::warn!("face image not shown: {}", e);
                }
                self.interrupted_with_nothing = true;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(face_id = chunk.face_id, "bad face image chunk: {}", e),
        }
    }

    /// Play a copy of a canned animation with some sprite boxes redirected
    pub fn play_anim_with_sprite_box_remaps(
        &mut self,
        sink: &mut dyn MessageSink,
        name: &str,
        tag: AnimationTag,
        remaps: &[(u16, u16)],
        lock_face_at_end: bool,
    ) -> AnimResult<()> {
        let canned = self.library.canned_animation(name);
        if canned.is_none() {
            tracing::warn!(%name, "sprite box remap target not found, playing remaps only");
        }
        self.start_procedural(sink, tag, false, false, |anim| {
            if let Some(canned) = canned {
                *anim = (*canned).clone();
            }
            for &(sprite_box, asset_id) in remaps {
                anim.add_sprite_box_remap(sprite_box, asset_id);
            }
            Ok(())
        })?;
        self.lock_face_at_end = lock_face_at_end;
        Ok(())
    }

    /// Play a copy of `name` (or nothing) with extra sprite box keyframes
    pub fn play_anim_with_sprite_box_keyframes(
        &mut self,
        sink: &mut dyn MessageSink,
        name: &str,
        tag: AnimationTag,
        keyframes: &[SpriteBoxKeyFrameSpec],
    ) -> AnimResult<()> {
        let canned = if name.is_empty() {
            None
        } else {
            let canned = self.library.canned_animation(name);
            if canned.is_none() {
                tracing::warn!(%name, "sprite box animation not found, starting empty");
            }
            canned
        };
        self.start_procedural(sink, tag, false, false, |anim| {
            if let Some(canned) = canned {
                *anim = (*canned).clone();
            }
            for spec in keyframes {
                anim.add_sprite_box_keyframe(SpriteBoxKeyFrame::from(spec))?;
            }
            Ok(())
        })
    }

    /// Add sprite box keyframes to the running procedural animation
    pub fn add_sprite_box_keyframes(&mut self, keyframes: &[SpriteBoxKeyFrameSpec]) -> AnimResult<()> {
        if !matches!(self.active, Some(ActiveSlot::Procedural)) {
            tracing::error!("no procedural animation running to add sprite box keyframes to");
            return Err(AnimError::AnimationNotFound(PROCEDURAL_ANIM_NAME.to_string()));
        }
        for spec in keyframes {
            self.procedural
                .add_sprite_box_keyframe(SpriteBoxKeyFrame::from(spec))?;
        }
        Ok(())
    }

    // Tracks and keep-alive

    pub fn set_locked_tracks(&mut self, tracks: u8) {
        self.locked_tracks = TrackFlags::new(tracks);
    }

    pub fn lock_track(&mut self, track: u8) {
        self.locked_tracks.insert(track);
    }

    pub fn unlock_track(&mut self, track: u8) {
        self.locked_tracks.remove(track);
    }

    pub fn enable_keep_face_alive(&mut self, sink: &mut dyn MessageSink, enable: bool, disable_timeout_ms: u32) {
        if self.keep_face_alive_enabled && !enable {
            self.layers
                .remove_keep_face_alive(self.stream_time, disable_timeout_ms);
        } else if enable && !self.keep_face_alive_enabled && self.interrupted_with_nothing {
            // Neutral eyes were skipped while keep-alive was off
            self.play_neutral_face(sink);
            self.interrupted_with_nothing = false;
        }
        self.keep_face_alive_enabled = enable;
    }

    pub fn set_keep_face_alive_focus(&mut self, focused: bool) {
        self.layers.set_keep_face_alive_focus(focused);
    }

    pub fn add_or_update_eye_shift(&mut self, name: &str, x_pix: f32, y_pix: f32, duration_ms: u32) {
        self.layers
            .add_or_update_eye_shift(name, x_pix, y_pix, duration_ms, self.stream_time);
    }

    pub fn remove_eye_shift(&mut self, name: &str, disable_timeout_ms: u32) {
        self.layers
            .remove_eye_shift(name, self.stream_time, disable_timeout_ms);
    }

    pub fn add_squint(&mut self, name: &str, scale_x: f32, scale_y: f32, upper_lid_angle: f32) {
        self.layers
            .add_squint(name, scale_x, scale_y, upper_lid_angle, self.stream_time);
    }

    pub fn remove_squint(&mut self, name: &str, disable_timeout_ms: u32) {
        self.layers
            .remove_squint(name, self.stream_time, disable_timeout_ms);
    }

    pub fn set_on_charger(&mut self, on_charger: bool) {
        let was_frozen = self.on_charger && self.frozen_on_charger;
        self.on_charger = on_charger;
        self.update_frozen(was_frozen);
    }

    pub fn set_frozen_on_charger(&mut self, frozen: bool) {
        let was_frozen = self.on_charger && self.frozen_on_charger;
        self.frozen_on_charger = frozen;
        self.update_frozen(was_frozen);
    }

    fn update_frozen(&mut self, was_frozen: bool) {
        let is_frozen = self.on_charger && self.frozen_on_charger;
        if was_frozen != is_frozen {
            self.layers.enable_procedural_audio(!is_frozen);
        }
    }

    fn play_neutral_face(&mut self, sink: &mut dyn MessageSink) {
        let name = self.config.neutral_face_anim.clone();
        match self.library.canned_animation(&name) {
            Some(anim) => {
                if self.interrupt_current(sink, true, &name).is_ok() {
                    self.activate(
                        ActiveSlot::Canned(Box::new((*anim).clone())),
                        AnimationTag::NOT_ANIMATING,
                        1,
                        0,
                        false,
                        true,
                    );
                }
            }
            None => tracing::warn!(%name, "neutral face animation missing"),
        }
    }

    // Tick

    /// Run one tick at wall-clock `now`
    pub fn update(&mut self, now: ClockTime, sink: &mut dyn MessageSink) -> TickReport {
        self.now = now;

        // Stage 1: pending request from another thread
        if let Some(pending) = self.pending.take() {
            if let Err(e) = self.set_streaming_animation(
                sink,
                &pending.name,
                AnimationTag::PENDING,
                pending.num_loops,
                0,
                true,
                false,
            ) {
                tracing::warn!("pending animation not started: {}", e);
            }
        }

        // Stage 2: worker completions
        self.audio.update();

        if self.debug.manual_mode {
            self.stream_time = StreamTime::from_ticks(self.debug.manual_frame);
        }

        // Stage 3: advance layers and the active animation
        self.layers.advance_tracks(self.stream_time);
        let stream_time = self.stream_time;
        let procedural_active = matches!(self.active, Some(ActiveSlot::Procedural));
        if let Some(anim) = self.active_animation_mut() {
            anim.advance_tracks(stream_time);
        }
        if procedural_active {
            self.procedural.clear_up_to_current();
        }

        // Stage 4: extract
        let mut msgs = TickMessages::default();
        let extracted_at;
        if !self.debug.manual_mode {
            self.set_keep_alive_if_appropriate(sink);
            extracted_at = self.stream_time;
            self.extract_animation_messages(sink, &mut msgs);

            if self.increment_time_this_tick {
                self.stream_time = self.stream_time.saturating_add_ms(ANIM_TIME_STEP_MS);
            }
            self.increment_time_this_tick = true;
        } else {
            extracted_at = self.stream_time;
            let anim = slot_animation(&self.active, &self.procedural);
            if anim.is_some() {
                layered_messages(
                    self.layers.as_mut(),
                    anim,
                    self.locked_tracks,
                    extracted_at,
                    true,
                    &mut msgs,
                );
            }
        }

        // Stage 5: drop what may not run right now, then send
        if let Some(name) = self.streaming_animation_name().map(str::to_string) {
            self.invalidate_banned_tracks(&name, &mut msgs);
        }
        self.send_animation_messages(sink, msgs);

        // Stage 6: periodic lock snapshot
        self.ticks_to_anim_state = self.ticks_to_anim_state.saturating_sub(1);
        if self.ticks_to_anim_state == 0 {
            sink.send_to_engine(&RobotToEngine::AnimationState(AnimationState {
                locked_tracks: self.locked_tracks.bits(),
                tracks_in_use: self.tracks_in_use.bits(),
            }));
            self.ticks_to_anim_state = self.config.anim_state_period_ticks.max(1);
        }

        TickReport {
            stream_time: extracted_at,
        }
    }

    fn set_keep_alive_if_appropriate(&mut self, sink: &mut dyn MessageSink) {
        let Some(last) = self.last_stream_clock else {
            return;
        };
        if self.active.is_some() || self.now - last <= self.config.keep_alive_cooldown {
            return;
        }
        if self.keep_face_alive_enabled {
            if self.interrupted_with_nothing {
                self.play_neutral_face(sink);
                self.interrupted_with_nothing = false;
            }
            self.layers.keep_face_alive(self.stream_time);
        } else {
            self.layers.keep_face_the_same();
        }
    }

    fn is_streaming_anim_finished(&self) -> bool {
        match self.active_animation() {
            Some(anim) => !anim.has_frames_left() && (self.end_sent || !self.start_sent),
            None => false,
        }
    }

    fn extract_animation_messages(&mut self, sink: &mut dyn MessageSink, msgs: &mut TickMessages) {
        let mut stream_updated = false;

        if self.active.is_some() {
            if self.is_streaming_anim_finished() {
                self.loop_ctr += 1;
                let can_loop = self.active_animation().map_or(false, |a| !a.is_empty());
                if can_loop && (self.num_loops == 0 || self.loop_ctr < self.num_loops) {
                    tracing::debug!(loop_ctr = self.loop_ctr, num_loops = self.num_loops, "looping");
                    self.init_streaming_animation(self.tag, 0, false);
                    self.increment_time_this_tick = false;
                    stream_updated = true;
                } else {
                    match self.active.take() {
                        Some(ActiveSlot::Procedural) => self.procedural.clear(),
                        Some(ActiveSlot::Canned(mut anim)) => anim.clear_overrides(),
                        None => {}
                    }
                }
            } else {
                self.extract_from_streaming_anim(sink, msgs);
                stream_updated = true;
                self.last_stream_clock = Some(self.now);

                let reached_end = self.active_animation().map_or(false, |a| {
                    !a.has_frames_left() && self.stream_time >= a.last_keyframe_end_time()
                });
                if reached_end && self.start_sent && !self.end_sent {
                    self.stop_tracks_in_use(sink, false);
                    self.send_end_of_animation(sink, false);
                    if self.lock_face_at_end {
                        self.locked_tracks.insert(TrackFlags::FACE);
                        self.lock_face_at_end = false;
                    }
                    if self.audio.has_active_events() {
                        tracing::warn!(
                            name = self.streaming_animation_name().unwrap_or_default(),
                            "animation ended with audio still playing"
                        );
                    }
                }
            }
        }

        if !stream_updated {
            self.extract_from_procedural_tracks(msgs);
        }
    }

    fn extract_from_streaming_anim(&mut self, sink: &mut dyn MessageSink, msgs: &mut TickMessages) {
        if !self.active_animation().map_or(false, Animation::has_frames_left) {
            return;
        }
        if !self.start_sent {
            self.send_start_of_animation(sink);
            self.audio.init_animation();
        }

        let t = self.stream_time;
        let Some(anim) = slot_animation(&self.active, &self.procedural) else {
            return;
        };
        msgs.head = anim.head.current_streaming_message(t);
        msgs.lift = anim.lift.current_streaming_message(t);
        msgs.body = anim.body.current_streaming_message(t);
        msgs.record_heading = anim.record_heading.current_streaming_message(t);
        msgs.turn_to_heading = anim.turn_to_heading.current_streaming_message(t);
        msgs.event = anim.event.current_if_due(t).map(|kf| AnimationEvent {
            timestamp: self.now.as_millis() as u32,
            event_id: kf.event_id,
            tag: self.tag.0,
        });

        let drew_animation_face =
            layered_messages(self.layers.as_mut(), Some(anim), self.locked_tracks, t, true, msgs);
        if drew_animation_face {
            self.next_procedural_face_allowed = self.now.saturating_add(std::time::Duration::from_millis(
                self.config.min_procedural_face_separation_ms as u64,
            ));
        }
    }

    fn extract_from_procedural_tracks(&mut self, msgs: &mut TickMessages) {
        if !self.layers.have_layers_to_send() {
            return;
        }
        let mut locked = self.locked_tracks;
        if self.now < self.next_procedural_face_allowed {
            locked.insert(TrackFlags::FACE);
        }
        layered_messages(self.layers.as_mut(), None, locked, self.stream_time, false, msgs);
    }

    fn invalidate_banned_tracks(&mut self, anim_name: &str, msgs: &mut TickMessages) {
        let check_allow_list = self.on_charger && !self.locked_tracks.contains(TrackFlags::BODY);

        if self.on_charger && self.frozen_on_charger {
            // Acoustic test mode: no motion and no audio
            msgs.body = None;
            msgs.record_heading = None;
            msgs.turn_to_heading = None;
            msgs.lift = None;
            msgs.head = None;
            msgs.audio = None;
        } else if check_allow_list && !self.config.charger_allow_list.allows(anim_name) {
            let dropped = msgs.body.take().is_some()
                | msgs.record_heading.take().is_some()
                | msgs.turn_to_heading.take().is_some();
            if dropped && !self.banned_warned {
                self.banned_warned = true;
                tracing::warn!(
                    name = %anim_name,
                    "body track not locked on the charger, dropping body motion"
                );
            }
        }
    }

    fn send_animation_messages(&mut self, sink: &mut dyn MessageSink, msgs: TickMessages) {
        self.send_if_track_unlocked(sink, msgs.head, TrackFlags::HEAD);
        self.send_if_track_unlocked(sink, msgs.lift, TrackFlags::LIFT);
        self.send_if_track_unlocked(sink, msgs.body, TrackFlags::BODY);
        self.send_if_track_unlocked(sink, msgs.record_heading, TrackFlags::BODY);
        self.send_if_track_unlocked(sink, msgs.turn_to_heading, TrackFlags::BODY);
        if self.send_if_track_unlocked(sink, msgs.backpack, TrackFlags::BACKPACK_LIGHTS) {
            self.enable_backpack_layer(sink, true);
        }

        if let Some(audio) = msgs.audio {
            self.audio.play_audio_keyframe(&audio);
        }
        if let Some(event) = msgs.event {
            sink.send_to_engine(&RobotToEngine::AnimationEvent(event));
        }
        if let Some(frame) = msgs.face {
            self.face_sink.display_face(frame);
        }
    }

    fn send_if_track_unlocked(&mut self, sink: &mut dyn MessageSink, msg: Option<EngineToRobot>, track: u8) -> bool {
        let Some(msg) = msg else {
            return false;
        };
        if self.locked_tracks.contains(track) {
            return false;
        }
        if track == TrackFlags::BACKPACK_LIGHTS && !self.debug.enable_backpack_lights_track {
            return false;
        }
        let sent = sink.send_to_robot(&msg);
        self.tracks_in_use.insert(track);
        sent
    }

    fn stop_tracks_in_use(&mut self, sink: &mut dyn MessageSink, aborting: bool) {
        if !aborting {
            // Head and lift settle on their own at a natural end
            self.tracks_in_use.remove(TrackFlags::HEAD | TrackFlags::LIFT);
        }
        self.stop_tracks(sink, self.tracks_in_use);
    }

    fn stop_tracks(&mut self, sink: &mut dyn MessageSink, which: TrackFlags) {
        if which.is_empty() {
            return;
        }
        if which.contains(TrackFlags::HEAD) {
            sink.send_to_robot(&EngineToRobot::MoveHead(MoveHead { speed_rad_per_sec: 0.0 }));
        }
        if which.contains(TrackFlags::LIFT) {
            sink.send_to_robot(&EngineToRobot::MoveLift(MoveLift { speed_rad_per_sec: 0.0 }));
        }
        if which.contains(TrackFlags::BODY) {
            sink.send_to_robot(&EngineToRobot::DriveWheels(DriveWheels {
                lwheel_speed_mmps: 0.0,
                rwheel_speed_mmps: 0.0,
                lwheel_accel_mmps2: 0.0,
                rwheel_accel_mmps2: 0.0,
            }));
        }
        self.tracks_in_use.remove(which.bits());
    }

    fn enable_backpack_layer(&mut self, sink: &mut dyn MessageSink, enable: bool) {
        if enable == self.backpack_layer_enabled {
            return;
        }
        self.backpack_layer_enabled = enable;
        sink.send_to_robot(&EngineToRobot::BackpackSetLayer(BackpackSetLayer {
            layer: enable as u8,
        }));
    }

    fn send_start_of_animation(&mut self, sink: &mut dyn MessageSink) {
        let name = self.streaming_animation_name().unwrap_or_default().to_string();
        if self.loop_ctr == 0 && !self.playing_internal {
            sink.send_to_engine(&RobotToEngine::AnimationStarted(AnimationStarted {
                tag: self.tag.0,
                anim_name: AnimName::truncated(&name),
            }));
        }
        self.start_sent = true;
        self.end_sent = false;
        self.web
            .send_event(WEB_MODULE, json!({ "type": "start", "animation": name }));
    }

    fn send_end_of_animation(&mut self, sink: &mut dyn MessageSink, aborting: bool) {
        let name = self.streaming_animation_name().unwrap_or_default().to_string();
        let last_loop = self.num_loops != 0 && self.loop_ctr + 1 == self.num_loops;
        if (aborting || last_loop) && !self.playing_internal {
            sink.send_to_engine(&RobotToEngine::AnimationEnded(AnimationEnded {
                tag: self.tag.0,
                was_aborted: aborting,
                stream_time_anim_ended: self.stream_time.as_millis(),
                anim_name: AnimName::truncated(&name),
            }));
        }
        self.end_sent = true;
        self.start_sent = false;
        self.web
            .send_event(WEB_MODULE, json!({ "type": "stop", "animation": name }));
        self.enable_backpack_layer(sink, false);
    }
}
