//! Keyframes - one timed command per animation channel
//!
//! Trigger times are relative to the start of the animation. A keyframe is
//! "current" on its track from its trigger time until its action completes
//! (`trigger + duration`).

use rand::Rng;
use serde::Deserialize;

use animproc_core::{StreamTime, ANIM_TIME_STEP_MS};
use animproc_wire::{
    DriveWheelsCurvature, EngineToRobot, RecordHeading, SetBackpackLights, SetHeadAngle,
    SetLiftHeight, TurnToRecordedHeading,
};

use crate::face::{FaceImage, ProceduralFace};

/// Timing shared by every keyframe type
pub trait KeyFrame: Clone + std::fmt::Debug {
    fn trigger_time(&self) -> StreamTime;

    fn set_trigger_time(&mut self, time: StreamTime);

    /// How long the keyframe stays current on its track
    fn duration_ms(&self) -> u32 {
        ANIM_TIME_STEP_MS
    }

    #[inline]
    fn action_complete_time(&self) -> StreamTime {
        self.trigger_time().saturating_add_ms(self.duration_ms())
    }

    #[inline]
    fn is_time_to_play(&self, time: StreamTime) -> bool {
        self.trigger_time() <= time
    }

    #[inline]
    fn is_first_tick(&self, time: StreamTime) -> bool {
        time.since(self.trigger_time()) < ANIM_TIME_STEP_MS
    }

    /// Whether `other` may not share a track slot with `self`
    fn conflicts_with(&self, other: &Self) -> bool {
        self.trigger_time() == other.trigger_time()
    }

    /// Called on the previous keyframe when `next` is added after it
    fn before_append(&mut self, _next: &Self) {}
}

/// Keyframes that stream a robot command
pub trait StreamingKeyFrame: KeyFrame {
    fn stream_message(&self, time: StreamTime) -> Option<EngineToRobot>;
}

macro_rules! keyframe_timing {
    ($ty:ty) => {
        #[inline]
        fn trigger_time(&self) -> StreamTime {
            StreamTime(self.trigger_time_ms)
        }

        #[inline]
        fn set_trigger_time(&mut self, time: StreamTime) {
            self.trigger_time_ms = time.as_millis();
        }
    };
}

fn default_duration() -> u32 {
    ANIM_TIME_STEP_MS
}

fn default_true() -> bool {
    true
}

fn default_volume() -> f32 {
    1.0
}

/// Draw `base ± variability` uniformly
fn vary(base: i32, variability: u8) -> i32 {
    if variability == 0 {
        return base;
    }
    let v = variability as i32;
    rand::thread_rng().gen_range(base - v..=base + v)
}

/// Head angle keyframe
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HeadAngleKeyFrame {
    pub trigger_time_ms: u32,
    #[serde(default = "default_duration")]
    pub duration_ms: u32,
    pub angle_deg: i8,
    #[serde(default)]
    pub angle_variability_deg: u8,
}

impl KeyFrame for HeadAngleKeyFrame {
    keyframe_timing!(HeadAngleKeyFrame);

    fn duration_ms(&self) -> u32 {
        self.duration_ms
    }
}

impl StreamingKeyFrame for HeadAngleKeyFrame {
    fn stream_message(&self, time: StreamTime) -> Option<EngineToRobot> {
        if !self.is_first_tick(time) {
            return None;
        }
        let angle_deg = vary(self.angle_deg as i32, self.angle_variability_deg)
            .clamp(i8::MIN as i32, i8::MAX as i32);
        Some(EngineToRobot::SetHeadAngle(SetHeadAngle {
            angle_rad: (angle_deg as f32).to_radians(),
            max_speed_rad_per_sec: 0.0,
            accel_rad_per_sec2: 0.0,
            duration_sec: self.duration_ms as f32 / 1000.0,
            action_id: 0,
        }))
    }
}

/// Lift height keyframe
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LiftHeightKeyFrame {
    pub trigger_time_ms: u32,
    #[serde(default = "default_duration")]
    pub duration_ms: u32,
    pub height_mm: u8,
    #[serde(default)]
    pub height_variability_mm: u8,
}

impl KeyFrame for LiftHeightKeyFrame {
    keyframe_timing!(LiftHeightKeyFrame);

    fn duration_ms(&self) -> u32 {
        self.duration_ms
    }
}

impl StreamingKeyFrame for LiftHeightKeyFrame {
    fn stream_message(&self, time: StreamTime) -> Option<EngineToRobot> {
        if !self.is_first_tick(time) {
            return None;
        }
        let height = vary(self.height_mm as i32, self.height_variability_mm).clamp(0, u8::MAX as i32);
        Some(EngineToRobot::SetLiftHeight(SetLiftHeight {
            height_mm: height as f32,
            max_speed_rad_per_sec: 0.0,
            accel_rad_per_sec2: 0.0,
            duration_sec: self.duration_ms as f32 / 1000.0,
            action_id: 0,
        }))
    }
}

/// Body motion keyframe; drives at a speed along a curvature for a duration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BodyMotionKeyFrame {
    pub trigger_time_ms: u32,
    pub duration_ms: u32,
    pub speed_mmps: i16,
    /// `i16::MAX` drives straight
    #[serde(default = "straight")]
    pub curvature_radius_mm: i16,
    #[serde(skip, default = "default_true")]
    pub enable_stop_message: bool,
}

fn straight() -> i16 {
    i16::MAX
}

impl BodyMotionKeyFrame {
    pub fn new(trigger_time_ms: u32, duration_ms: u32, speed_mmps: i16, curvature_radius_mm: i16) -> Self {
        BodyMotionKeyFrame {
            trigger_time_ms,
            duration_ms,
            speed_mmps,
            curvature_radius_mm,
            enable_stop_message: true,
        }
    }

    fn stop_message() -> EngineToRobot {
        EngineToRobot::DriveWheelsCurvature(DriveWheelsCurvature {
            speed_mmps: 0,
            accel_mmps2: 0,
            curvature_radius_mm: i16::MAX,
        })
    }
}

impl KeyFrame for BodyMotionKeyFrame {
    keyframe_timing!(BodyMotionKeyFrame);

    /// One extra tick leaves room for the stop message
    fn duration_ms(&self) -> u32 {
        if self.enable_stop_message {
            self.duration_ms.saturating_add(ANIM_TIME_STEP_MS)
        } else {
            self.duration_ms
        }
    }

    fn before_append(&mut self, next: &Self) {
        // The next command supersedes the stop when it starts within a tick
        let next_start = next.trigger_time().saturating_sub_ms(ANIM_TIME_STEP_MS);
        if self.action_complete_time() > next_start {
            self.enable_stop_message = false;
        }
    }
}

impl StreamingKeyFrame for BodyMotionKeyFrame {
    fn stream_message(&self, time: StreamTime) -> Option<EngineToRobot> {
        if self.is_first_tick(time) {
            Some(EngineToRobot::DriveWheelsCurvature(DriveWheelsCurvature {
                speed_mmps: self.speed_mmps,
                accel_mmps2: 0,
                curvature_radius_mm: self.curvature_radius_mm,
            }))
        } else if self.enable_stop_message && time.since(self.trigger_time()) >= self.duration_ms {
            Some(Self::stop_message())
        } else {
            None
        }
    }
}

/// Record the current heading for a later turn-back
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordHeadingKeyFrame {
    pub trigger_time_ms: u32,
}

impl KeyFrame for RecordHeadingKeyFrame {
    keyframe_timing!(RecordHeadingKeyFrame);
}

impl StreamingKeyFrame for RecordHeadingKeyFrame {
    fn stream_message(&self, time: StreamTime) -> Option<EngineToRobot> {
        self.is_first_tick(time)
            .then(|| EngineToRobot::RecordHeading(RecordHeading {}))
    }
}

/// Turn back to the recorded heading plus an offset
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TurnToRecordedHeadingKeyFrame {
    pub trigger_time_ms: u32,
    pub duration_ms: u32,
    #[serde(default)]
    pub offset_deg: i16,
    pub speed_deg_per_sec: i16,
    pub accel_deg_per_sec2: i16,
    pub decel_deg_per_sec2: i16,
    #[serde(default)]
    pub tolerance_deg: u16,
    #[serde(default)]
    pub num_half_revolutions: u16,
    #[serde(default)]
    pub use_shortest_direction: bool,
}

impl KeyFrame for TurnToRecordedHeadingKeyFrame {
    keyframe_timing!(TurnToRecordedHeadingKeyFrame);

    fn duration_ms(&self) -> u32 {
        self.duration_ms
    }
}

impl StreamingKeyFrame for TurnToRecordedHeadingKeyFrame {
    fn stream_message(&self, time: StreamTime) -> Option<EngineToRobot> {
        self.is_first_tick(time).then(|| {
            EngineToRobot::TurnToRecordedHeading(TurnToRecordedHeading {
                offset_deg: self.offset_deg,
                speed_deg_per_sec: self.speed_deg_per_sec,
                accel_deg_per_sec2: self.accel_deg_per_sec2,
                decel_deg_per_sec2: self.decel_deg_per_sec2,
                tolerance_deg: self.tolerance_deg,
                num_half_revolutions: self.num_half_revolutions,
                use_shortest_direction: self.use_shortest_direction,
            })
        })
    }
}

/// Backpack light colors
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BackpackLightsKeyFrame {
    pub trigger_time_ms: u32,
    #[serde(default = "default_duration")]
    pub duration_ms: u32,
    pub colors: [u32; 3],
}

impl KeyFrame for BackpackLightsKeyFrame {
    keyframe_timing!(BackpackLightsKeyFrame);

    fn duration_ms(&self) -> u32 {
        self.duration_ms.max(1)
    }
}

impl StreamingKeyFrame for BackpackLightsKeyFrame {
    fn stream_message(&self, time: StreamTime) -> Option<EngineToRobot> {
        self.is_first_tick(time).then(|| {
            EngineToRobot::SetBackpackLights(SetBackpackLights {
                on_colors: self.colors,
                off_colors: self.colors,
                on_period_ms: [0; 3],
                off_period_ms: [0; 3],
            })
        })
    }
}

/// Audio events posted when the keyframe triggers
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AudioKeyFrame {
    pub trigger_time_ms: u32,
    pub event_ids: Vec<u32>,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

impl KeyFrame for AudioKeyFrame {
    keyframe_timing!(AudioKeyFrame);
}

/// Named event reported to the engine
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventKeyFrame {
    pub trigger_time_ms: u32,
    pub event_id: u32,
}

impl KeyFrame for EventKeyFrame {
    keyframe_timing!(EventKeyFrame);
}

/// Procedural eyes, held until the next face keyframe
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProceduralFaceKeyFrame {
    pub trigger_time_ms: u32,
    #[serde(default = "default_duration")]
    pub duration_ms: u32,
    #[serde(default)]
    pub face: ProceduralFace,
}

impl ProceduralFaceKeyFrame {
    pub fn new(trigger_time_ms: u32, duration_ms: u32, face: ProceduralFace) -> Self {
        ProceduralFaceKeyFrame {
            trigger_time_ms,
            duration_ms,
            face,
        }
    }
}

impl KeyFrame for ProceduralFaceKeyFrame {
    keyframe_timing!(ProceduralFaceKeyFrame);

    fn duration_ms(&self) -> u32 {
        self.duration_ms.max(1)
    }

    fn before_append(&mut self, next: &Self) {
        // Face keyframes tile the timeline so interpolation never has a gap
        self.duration_ms = next.trigger_time().since(self.trigger_time());
    }
}

/// Sprite drawn into a sprite box on the face
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpriteBoxKeyFrame {
    pub trigger_time_ms: u32,
    #[serde(default = "default_duration")]
    pub duration_ms: u32,
    pub sprite_box: u16,
    pub asset_id: u16,
    #[serde(default)]
    pub x_pos: i16,
    #[serde(default)]
    pub y_pos: i16,
    #[serde(default = "opaque")]
    pub alpha: u8,
}

fn opaque() -> u8 {
    u8::MAX
}

impl KeyFrame for SpriteBoxKeyFrame {
    keyframe_timing!(SpriteBoxKeyFrame);

    fn duration_ms(&self) -> u32 {
        self.duration_ms.max(1)
    }

    /// Different sprite boxes may change at the same time
    fn conflicts_with(&self, other: &Self) -> bool {
        self.trigger_time_ms == other.trigger_time_ms && self.sprite_box == other.sprite_box
    }
}

impl From<&animproc_wire::SpriteBoxKeyFrameSpec> for SpriteBoxKeyFrame {
    fn from(spec: &animproc_wire::SpriteBoxKeyFrameSpec) -> Self {
        SpriteBoxKeyFrame {
            trigger_time_ms: spec.trigger_time_ms,
            duration_ms: ANIM_TIME_STEP_MS,
            sprite_box: spec.sprite_box,
            asset_id: spec.asset_id,
            x_pos: spec.x_pos,
            y_pos: spec.y_pos,
            alpha: spec.alpha,
        }
    }
}

/// Full-screen image shown on the face for a while
#[derive(Debug, Clone, PartialEq)]
pub struct FaceImageKeyFrame {
    pub trigger_time_ms: u32,
    pub duration_ms: u32,
    pub image: FaceImage,
}

impl KeyFrame for FaceImageKeyFrame {
    keyframe_timing!(FaceImageKeyFrame);

    fn duration_ms(&self) -> u32 {
        self.duration_ms.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_streams_on_first_tick_only() {
        let kf = HeadAngleKeyFrame {
            trigger_time_ms: 66,
            duration_ms: 200,
            angle_deg: 20,
            angle_variability_deg: 0,
        };
        assert!(!kf.is_time_to_play(StreamTime(33)));
        assert!(kf.is_time_to_play(StreamTime(66)));
        match kf.stream_message(StreamTime(66)) {
            Some(EngineToRobot::SetHeadAngle(msg)) => {
                assert!((msg.angle_rad - 20f32.to_radians()).abs() < 1e-6);
                assert!((msg.duration_sec - 0.2).abs() < 1e-6);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(kf.stream_message(StreamTime(99)).is_none());
        assert_eq!(kf.action_complete_time(), StreamTime(266));
    }

    #[test]
    fn test_head_variability_stays_in_range() {
        let kf = HeadAngleKeyFrame {
            trigger_time_ms: 0,
            duration_ms: 33,
            angle_deg: 10,
            angle_variability_deg: 5,
        };
        for _ in 0..50 {
            let Some(EngineToRobot::SetHeadAngle(msg)) = kf.stream_message(StreamTime(0)) else {
                panic!("expected head message");
            };
            let deg = msg.angle_rad.to_degrees().round() as i32;
            assert!((5..=15).contains(&deg));
        }
    }

    #[test]
    fn test_body_motion_stop_message() {
        let kf = BodyMotionKeyFrame::new(0, 99, 50, i16::MAX);
        assert_eq!(kf.duration_ms(), 99 + ANIM_TIME_STEP_MS);
        assert!(matches!(
            kf.stream_message(StreamTime(0)),
            Some(EngineToRobot::DriveWheelsCurvature(DriveWheelsCurvature { speed_mmps: 50, .. }))
        ));
        assert!(kf.stream_message(StreamTime(33)).is_none());
        assert!(matches!(
            kf.stream_message(StreamTime(99)),
            Some(EngineToRobot::DriveWheelsCurvature(DriveWheelsCurvature { speed_mmps: 0, .. }))
        ));
    }

    #[test]
    fn test_body_motion_huge_duration_saturates() {
        let kf: BodyMotionKeyFrame = serde_json::from_str(
            r#"{"trigger_time_ms": 0, "duration_ms": 4294967290, "speed_mmps": 20}"#,
        )
        .unwrap();
        assert!(kf.enable_stop_message);
        assert_eq!(kf.duration_ms(), u32::MAX);
    }

    #[test]
    fn test_body_motion_back_to_back_drops_stop() {
        let mut first = BodyMotionKeyFrame::new(0, 99, 50, i16::MAX);
        let second = BodyMotionKeyFrame::new(99, 99, -50, i16::MAX);
        first.before_append(&second);
        assert!(!first.enable_stop_message);
        assert_eq!(first.duration_ms(), 99);

        let mut spaced = BodyMotionKeyFrame::new(0, 99, 50, i16::MAX);
        let later = BodyMotionKeyFrame::new(500, 99, -50, i16::MAX);
        spaced.before_append(&later);
        assert!(spaced.enable_stop_message);
    }

    #[test]
    fn test_face_keyframes_tile() {
        let mut a = ProceduralFaceKeyFrame::new(0, 33, ProceduralFace::neutral());
        let b = ProceduralFaceKeyFrame::new(165, 33, ProceduralFace::blank());
        a.before_append(&b);
        assert_eq!(a.action_complete_time(), b.trigger_time());
    }

    #[test]
    fn test_sprite_boxes_share_time() {
        let a = SpriteBoxKeyFrame {
            trigger_time_ms: 0,
            duration_ms: 33,
            sprite_box: 1,
            asset_id: 10,
            x_pos: 0,
            y_pos: 0,
            alpha: 255,
        };
        let mut b = a.clone();
        b.sprite_box = 2;
        assert!(!a.conflicts_with(&b));
        assert!(a.conflicts_with(&a.clone()));
    }

    #[test]
    fn test_keyframe_from_json() {
        let kf: BodyMotionKeyFrame =
            serde_json::from_str(r#"{"trigger_time_ms": 33, "duration_ms": 66, "speed_mmps": 80}"#)
                .unwrap();
        assert_eq!(kf.curvature_radius_mm, i16::MAX);
        assert!(kf.enable_stop_message);
    }
}
