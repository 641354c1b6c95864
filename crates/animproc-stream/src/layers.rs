//! Procedural track layers
//!
//! Layers sit on top of whatever the active animation streams: named eye
//! shifts and squints requested by the engine, plus keep-alive blinks and
//! eye darts generated while the face is idle. All times are stream times.

use std::collections::BTreeMap;

use rand::Rng;

use animproc_core::{StreamTime, ANIM_TIME_STEP_MS};

use crate::animation::Animation;
use crate::config::KeepAliveConfig;
use crate::face::ProceduralFace;
use crate::keyframe::{AudioKeyFrame, BackpackLightsKeyFrame, KeyFrame};

const EYE_DART_LAYER: &str = "KeepAliveEyeDart";
const EYE_BLINK_LAYER: &str = "KeepAliveEyeBlink";

/// Blink shape as eye-height multipliers, one per tick
const BLINK_PROFILE: [f32; 5] = [0.6, 0.1, 0.0, 0.4, 0.85];

/// Backpack, audio and face output for one tick after layering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayeredKeyFrames {
    pub backpack: Option<BackpackLightsKeyFrame>,
    pub audio: Option<AudioKeyFrame>,
    pub face: Option<ProceduralFace>,
}

/// Track-layer component driven by the streamer every tick
pub trait TrackLayers: Send {
    /// Drop layers that have fully ended by `time`
    fn advance_tracks(&mut self, time: StreamTime);

    /// Merge `anim` (if any) with every active layer at `time`
    fn apply_layers_to_anim(
        &mut self,
        anim: Option<&Animation>,
        time: StreamTime,
        store_face: bool,
    ) -> LayeredKeyFrames;

    fn have_layers_to_send(&self) -> bool;

    /// Run keep-alive activities whose timers expired
    fn keep_face_alive(&mut self, time: StreamTime);

    /// Re-send the last face without keep-alive motion
    fn keep_face_the_same(&mut self);

    /// Fade out keep-alive layers over `duration_ms` from `time`
    fn remove_keep_face_alive(&mut self, time: StreamTime, duration_ms: u32);

    fn set_keep_face_alive_focus(&mut self, focused: bool);

    fn add_or_update_eye_shift(
        &mut self,
        name: &str,
        x_pix: f32,
        y_pix: f32,
        duration_ms: u32,
        time: StreamTime,
    );

    fn remove_eye_shift(&mut self, name: &str, time: StreamTime, duration_ms: u32);

    fn add_squint(&mut self, name: &str, scale_x: f32, scale_y: f32, upper_lid_angle: f32, time: StreamTime);

    fn remove_squint(&mut self, name: &str, time: StreamTime, duration_ms: u32);

    fn set_last_procedural_face_as_blank(&mut self);

    /// A new animation started streaming
    fn on_new_animation(&mut self);

    fn enable_procedural_audio(&mut self, enable: bool);
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LayerKind {
    Shift { x: f32, y: f32 },
    Squint { scale_x: f32, scale_y: f32, upper_lid_angle: f32 },
}

/// A named, persistent face modifier that ramps in and fades out
#[derive(Debug, Clone)]
struct FaceLayer {
    kind: LayerKind,
    /// Value the layer ramps from
    from: LayerKind,
    start: StreamTime,
    ramp_ms: u32,
    removal: Option<(StreamTime, u32)>,
}

impl FaceLayer {
    fn new(kind: LayerKind, start: StreamTime, ramp_ms: u32) -> Self {
        FaceLayer {
            kind,
            from: kind.identity(),
            start,
            ramp_ms,
            removal: None,
        }
    }

    fn weight(&self, time: StreamTime) -> f32 {
        let ramp_in = ramp(time.since(self.start), self.ramp_ms);
        match self.removal {
            Some((at, dur)) if time >= at => ramp_in * (1.0 - ramp(time.since(at), dur)),
            _ => ramp_in,
        }
    }

    fn is_finished(&self, time: StreamTime) -> bool {
        matches!(self.removal, Some((at, dur)) if time >= at.saturating_add_ms(dur))
    }

    fn apply(&self, face: ProceduralFace, time: StreamTime) -> ProceduralFace {
        let w = self.weight(time);
        self.from.blend(&self.kind, w).apply(face)
    }
}

/// Fraction of `ramp_ms` elapsed; a zero ramp is complete at once
fn ramp(elapsed_ms: u32, ramp_ms: u32) -> f32 {
    if ramp_ms == 0 {
        1.0
    } else {
        (elapsed_ms as f32 / ramp_ms as f32).min(1.0)
    }
}

impl LayerKind {
    fn identity(&self) -> LayerKind {
        match self {
            LayerKind::Shift { .. } => LayerKind::Shift { x: 0.0, y: 0.0 },
            LayerKind::Squint { .. } => LayerKind::Squint {
                scale_x: 1.0,
                scale_y: 1.0,
                upper_lid_angle: 0.0,
            },
        }
    }

    fn blend(&self, to: &LayerKind, w: f32) -> LayerKind {
        let mix = |a: f32, b: f32| a + (b - a) * w;
        match (*self, *to) {
            (LayerKind::Shift { x: x0, y: y0 }, LayerKind::Shift { x, y }) => LayerKind::Shift {
                x: mix(x0, x),
                y: mix(y0, y),
            },
            (
                LayerKind::Squint { scale_x: sx0, scale_y: sy0, upper_lid_angle: l0 },
                LayerKind::Squint { scale_x, scale_y, upper_lid_angle },
            ) => LayerKind::Squint {
                scale_x: mix(sx0, scale_x),
                scale_y: mix(sy0, scale_y),
                upper_lid_angle: mix(l0, upper_lid_angle),
            },
            (_, to) => to.identity().blend(&to, w),
        }
    }

    fn apply(&self, face: ProceduralFace) -> ProceduralFace {
        match *self {
            LayerKind::Shift { x, y } => face.shifted(x, y),
            LayerKind::Squint { scale_x, scale_y, upper_lid_angle } => {
                face.squinted(scale_x, scale_y, upper_lid_angle)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Blink {
    start: StreamTime,
    audio_sent: bool,
}

/// Default layer component: eye shifts, squints and keep-alive
pub struct ProceduralLayers {
    config: KeepAliveConfig,
    layers: BTreeMap<String, FaceLayer>,
    blink: Option<Blink>,
    /// Re-send the last face on the next apply
    hold_face: bool,
    focused: bool,
    procedural_audio: bool,
    next_blink_ms: i64,
    next_dart_ms: i64,
    last_face: ProceduralFace,
    /// Trigger of the last audio keyframe handed out for the current animation
    last_audio_trigger: Option<StreamTime>,
    audio_latency_offset_ms: u32,
}

impl ProceduralLayers {
    pub fn new(config: KeepAliveConfig, audio_latency_offset_ms: u32) -> Self {
        ProceduralLayers {
            config,
            layers: BTreeMap::new(),
            blink: None,
            hold_face: false,
            focused: false,
            procedural_audio: true,
            next_blink_ms: 0,
            next_dart_ms: 0,
            last_face: ProceduralFace::neutral(),
            last_audio_trigger: None,
            audio_latency_offset_ms,
        }
    }

    pub fn last_procedural_face(&self) -> &ProceduralFace {
        &self.last_face
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    fn remove_layer(&mut self, name: &str, time: StreamTime, duration_ms: u32) {
        if duration_ms == 0 {
            self.layers.remove(name);
        } else if let Some(layer) = self.layers.get_mut(name) {
            layer.removal = Some((time, duration_ms));
        }
    }

    fn spacing(range: (u32, u32)) -> i64 {
        let (lo, hi) = range;
        rand::thread_rng().gen_range(lo.min(hi)..=hi.max(lo)) as i64
    }

    fn eye_dart(&mut self, time: StreamTime) {
        let max = if self.focused {
            self.config.max_focused_dart_px
        } else {
            self.config.max_dart_px
        };
        let mut rng = rand::thread_rng();
        let x = rng.gen_range(-max..=max);
        let y = rng.gen_range(-max..=max) * 0.5;
        // Darts are quick: two ticks to reach the new gaze
        self.add_or_update_eye_shift(EYE_DART_LAYER, x, y, 2 * ANIM_TIME_STEP_MS, time);
    }

    fn blink_face(&self, face: ProceduralFace, time: StreamTime) -> ProceduralFace {
        match self.blink {
            Some(blink) => {
                let tick = (time.since(blink.start) / ANIM_TIME_STEP_MS) as usize;
                let scale = BLINK_PROFILE.get(tick).copied().unwrap_or(1.0);
                face.squinted(1.0, scale, 0.0)
            }
            None => face,
        }
    }

    /// Animation face at `time`, interpolated toward the next face keyframe
    fn animation_face(anim: &Animation, time: StreamTime) -> Option<ProceduralFace> {
        let remaining = anim.face.remaining();
        let current = remaining.first().filter(|f| f.is_time_to_play(time))?;
        let face = match remaining.get(1) {
            Some(next) if next.trigger_time() > current.trigger_time() => {
                let span = next.trigger_time().since(current.trigger_time());
                let frac = time.since(current.trigger_time()) as f32 / span as f32;
                current.face.lerp(&next.face, frac)
            }
            _ => current.face,
        };
        Some(face)
    }

    fn next_audio(&mut self, anim: &Animation, time: StreamTime) -> Option<AudioKeyFrame> {
        let audio_time = time.saturating_add_ms(self.audio_latency_offset_ms);
        let next = anim
            .audio
            .frames()
            .iter()
            .find(|f| self.last_audio_trigger.map_or(true, |last| f.trigger_time() > last))?;
        if !next.is_time_to_play(audio_time) {
            return None;
        }
        self.last_audio_trigger = Some(next.trigger_time());
        Some(next.clone())
    }
}

impl TrackLayers for ProceduralLayers {
    fn advance_tracks(&mut self, time: StreamTime) {
        self.layers.retain(|_, layer| !layer.is_finished(time));
        if let Some(blink) = self.blink {
            if time.since(blink.start) >= BLINK_PROFILE.len() as u32 * ANIM_TIME_STEP_MS {
                self.blink = None;
            }
        }
    }

    fn apply_layers_to_anim(
        &mut self,
        anim: Option<&Animation>,
        time: StreamTime,
        store_face: bool,
    ) -> LayeredKeyFrames {
        let mut out = LayeredKeyFrames::default();
        let mut face = self.last_face;
        let mut have_face = false;

        if let Some(anim) = anim {
            out.backpack = anim.backpack.current_if_due(time).cloned();
            out.audio = self.next_audio(anim, time);
            if let Some(anim_face) = Self::animation_face(anim, time) {
                face = anim_face;
                have_face = true;
                if store_face {
                    self.last_face = anim_face;
                }
            }
        }

        if self.have_layers_to_send() {
            for layer in self.layers.values() {
                face = layer.apply(face, time);
            }
            face = self.blink_face(face, time);
            have_face = true;
            self.hold_face = false;

            if let Some(blink) = self.blink.as_mut() {
                if !blink.audio_sent && self.procedural_audio {
                    blink.audio_sent = true;
                    if let Some(event) = self.config.blink_audio_event {
                        let frame = out.audio.get_or_insert_with(|| AudioKeyFrame {
                            trigger_time_ms: time.as_millis(),
                            event_ids: Vec::new(),
                            volume: 1.0,
                        });
                        frame.event_ids.push(event);
                    }
                }
            }
        }

        if have_face {
            out.face = Some(face);
        }
        out
    }

    fn have_layers_to_send(&self) -> bool {
        !self.layers.is_empty() || self.blink.is_some() || self.hold_face
    }

    fn keep_face_alive(&mut self, time: StreamTime) {
        let mut acted = false;

        self.next_blink_ms -= ANIM_TIME_STEP_MS as i64;
        if self.next_blink_ms <= 0 {
            if self.blink.is_none() {
                self.blink = Some(Blink { start: time, audio_sent: false });
                acted = true;
            }
            self.next_blink_ms = Self::spacing(self.config.blink_spacing_ms);
        }

        self.next_dart_ms -= ANIM_TIME_STEP_MS as i64;
        if self.next_dart_ms <= 0 {
            self.eye_dart(time);
            acted = true;
            let range = if self.focused {
                self.config.focused_dart_spacing_ms
            } else {
                self.config.dart_spacing_ms
            };
            self.next_dart_ms = Self::spacing(range);
        }

        if !acted {
            self.hold_face = true;
        }
    }

    fn keep_face_the_same(&mut self) {
        self.hold_face = true;
    }

    fn remove_keep_face_alive(&mut self, time: StreamTime, duration_ms: u32) {
        self.remove_layer(EYE_DART_LAYER, time, duration_ms);
        self.blink = None;
        self.hold_face = false;
        tracing::trace!(layer = EYE_BLINK_LAYER, ?time, "keep-alive removed");
    }

    fn set_keep_face_alive_focus(&mut self, focused: bool) {
        self.focused = focused;
    }

    fn add_or_update_eye_shift(
        &mut self,
        name: &str,
        x_pix: f32,
        y_pix: f32,
        duration_ms: u32,
        time: StreamTime,
    ) {
        let kind = LayerKind::Shift { x: x_pix, y: y_pix };
        match self.layers.get_mut(name) {
            Some(layer) => {
                // Continue from wherever the layer currently sits
                let current = layer.from.blend(&layer.kind, layer.weight(time));
                layer.from = current;
                layer.kind = kind;
                layer.start = time;
                layer.ramp_ms = duration_ms;
                layer.removal = None;
            }
            None => {
                self.layers
                    .insert(name.to_string(), FaceLayer::new(kind, time, duration_ms));
            }
        }
    }

    fn remove_eye_shift(&mut self, name: &str, time: StreamTime, duration_ms: u32) {
        self.remove_layer(name, time, duration_ms);
    }

    fn add_squint(&mut self, name: &str, scale_x: f32, scale_y: f32, upper_lid_angle: f32, time: StreamTime) {
        let kind = LayerKind::Squint {
            scale_x,
            scale_y,
            upper_lid_angle,
        };
        self.layers
            .insert(name.to_string(), FaceLayer::new(kind, time, 3 * ANIM_TIME_STEP_MS));
    }

    fn remove_squint(&mut self, name: &str, time: StreamTime, duration_ms: u32) {
        self.remove_layer(name, time, duration_ms);
    }

    fn set_last_procedural_face_as_blank(&mut self) {
        self.last_face = ProceduralFace::blank();
    }

    fn on_new_animation(&mut self) {
        self.last_audio_trigger = None;
    }

    fn enable_procedural_audio(&mut self, enable: bool) {
        self.procedural_audio = enable;
    }
}
