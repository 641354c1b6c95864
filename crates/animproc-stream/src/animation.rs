//! Animation - one track per output channel plus per-instance overrides

use std::collections::HashMap;

use serde::Deserialize;

use animproc_core::{AnimResult, StreamTime};

use crate::face::{CompositeImage, FaceImage, SpriteLayer};
use crate::keyframe::{
    AudioKeyFrame, BackpackLightsKeyFrame, BodyMotionKeyFrame, EventKeyFrame, FaceImageKeyFrame,
    HeadAngleKeyFrame, KeyFrame, LiftHeightKeyFrame, ProceduralFaceKeyFrame, RecordHeadingKeyFrame,
    SpriteBoxKeyFrame, TurnToRecordedHeadingKeyFrame,
};
use crate::track::Track;

/// Apply `$op` to every track of an animation
macro_rules! for_each_track {
    ($anim:expr, $track:ident => $op:expr) => {{
        { let $track = &mut $anim.head; $op; }
        { let $track = &mut $anim.lift; $op; }
        { let $track = &mut $anim.body; $op; }
        { let $track = &mut $anim.record_heading; $op; }
        { let $track = &mut $anim.turn_to_heading; $op; }
        { let $track = &mut $anim.backpack; $op; }
        { let $track = &mut $anim.audio; $op; }
        { let $track = &mut $anim.event; $op; }
        { let $track = &mut $anim.face; $op; }
        { let $track = &mut $anim.sprite_boxes; $op; }
        { let $track = &mut $anim.face_images; $op; }
    }};
}

/// Keyframe tracks of one animation
#[derive(Debug, Clone, Default)]
pub struct Animation {
    name: String,
    pub head: Track<HeadAngleKeyFrame>,
    pub lift: Track<LiftHeightKeyFrame>,
    pub body: Track<BodyMotionKeyFrame>,
    pub record_heading: Track<RecordHeadingKeyFrame>,
    pub turn_to_heading: Track<TurnToRecordedHeadingKeyFrame>,
    pub backpack: Track<BackpackLightsKeyFrame>,
    pub audio: Track<AudioKeyFrame>,
    pub event: Track<EventKeyFrame>,
    pub face: Track<ProceduralFaceKeyFrame>,
    pub sprite_boxes: Track<SpriteBoxKeyFrame>,
    /// Face image overrides; never loaded from storage
    pub face_images: Track<FaceImageKeyFrame>,
    sprite_box_remaps: HashMap<u16, u16>,
    render_in_eye_hue: bool,
    initialized: bool,
}

impl Animation {
    pub fn new(name: impl Into<String>) -> Self {
        Animation {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Rewind every track
    pub fn init(&mut self) {
        for_each_track!(self, track => track.move_to_start());
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Advance every track to `time`
    pub fn advance_tracks(&mut self, time: StreamTime) {
        for_each_track!(self, track => track.advance(time));
    }

    /// Whether any track still has keyframes ahead of its cursor
    pub fn has_frames_left(&self) -> bool {
        self.head.has_frames_left()
            || self.lift.has_frames_left()
            || self.body.has_frames_left()
            || self.record_heading.has_frames_left()
            || self.turn_to_heading.has_frames_left()
            || self.backpack.has_frames_left()
            || self.audio.has_frames_left()
            || self.event.has_frames_left()
            || self.face.has_frames_left()
            || self.sprite_boxes.has_frames_left()
            || self.face_images.has_frames_left()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_empty()
            && self.lift.is_empty()
            && self.body.is_empty()
            && self.record_heading.is_empty()
            && self.turn_to_heading.is_empty()
            && self.backpack.is_empty()
            && self.audio.is_empty()
            && self.event.is_empty()
            && self.face.is_empty()
            && self.sprite_boxes.is_empty()
            && self.face_images.is_empty()
    }

    /// Time at which the last keyframe of any track completes
    pub fn last_keyframe_end_time(&self) -> StreamTime {
        fn end<F: KeyFrame>(track: &Track<F>) -> StreamTime {
            track
                .last_keyframe()
                .map(|f| f.action_complete_time())
                .unwrap_or(StreamTime::ZERO)
        }
        [
            end(&self.head),
            end(&self.lift),
            end(&self.body),
            end(&self.record_heading),
            end(&self.turn_to_heading),
            end(&self.backpack),
            end(&self.audio),
            end(&self.event),
            end(&self.face),
            end(&self.sprite_boxes),
            end(&self.face_images),
        ]
        .into_iter()
        .max()
        .unwrap_or(StreamTime::ZERO)
    }

    /// Drop keyframes that have already played
    pub fn clear_up_to_current(&mut self) {
        for_each_track!(self, track => track.clear_up_to_current());
    }

    /// Remove all content and overrides, keeping the name
    pub fn clear(&mut self) {
        for_each_track!(self, track => track.clear());
        self.clear_overrides();
        self.initialized = false;
    }

    /// Drop per-play overrides
    pub fn clear_overrides(&mut self) {
        self.sprite_box_remaps.clear();
        self.face_images.clear();
        self.render_in_eye_hue = false;
    }

    /// Draw `asset_id` wherever `sprite_box` is used
    pub fn add_sprite_box_remap(&mut self, sprite_box: u16, asset_id: u16) {
        self.sprite_box_remaps.insert(sprite_box, asset_id);
    }

    pub fn add_sprite_box_keyframe(&mut self, keyframe: SpriteBoxKeyFrame) -> AnimResult<()> {
        self.sprite_boxes.add_keyframe_by_time(keyframe)
    }

    /// Show `image` from `start` for `duration_ms`
    pub fn set_face_image_override(
        &mut self,
        image: FaceImage,
        start: StreamTime,
        duration_ms: u32,
    ) -> AnimResult<()> {
        self.face_images.clear();
        self.face_images.add_keyframe_to_back(FaceImageKeyFrame {
            trigger_time_ms: start.as_millis(),
            duration_ms,
            image,
        })
    }

    pub fn set_render_in_eye_hue(&mut self, enable: bool) {
        self.render_in_eye_hue = enable;
    }

    pub fn render_in_eye_hue(&self) -> bool {
        self.render_in_eye_hue
    }

    /// Sprite and image content on the face at `time`
    pub fn composite_image(&self, time: StreamTime) -> Option<CompositeImage> {
        let sprites: Vec<SpriteLayer> = self
            .sprite_boxes
            .remaining()
            .iter()
            .take_while(|f| f.is_time_to_play(time))
            .filter(|f| time < f.action_complete_time())
            .map(|f| SpriteLayer {
                sprite_box: f.sprite_box,
                asset_id: self
                    .sprite_box_remaps
                    .get(&f.sprite_box)
                    .copied()
                    .unwrap_or(f.asset_id),
                x_pos: f.x_pos,
                y_pos: f.y_pos,
                alpha: f.alpha,
            })
            .collect();

        let image = self
            .face_images
            .current_if_due(time)
            .filter(|f| time < f.action_complete_time())
            .map(|f| f.image.clone());

        let composite = CompositeImage {
            sprites,
            image,
            render_in_eye_hue: self.render_in_eye_hue,
        };
        (!composite.is_empty()).then_some(composite)
    }
}

/// Serialized form of an animation file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnimationDefinition {
    pub name: String,
    pub head: Vec<HeadAngleKeyFrame>,
    pub lift: Vec<LiftHeightKeyFrame>,
    pub body: Vec<BodyMotionKeyFrame>,
    pub record_heading: Vec<RecordHeadingKeyFrame>,
    pub turn_to_heading: Vec<TurnToRecordedHeadingKeyFrame>,
    pub backpack: Vec<BackpackLightsKeyFrame>,
    pub audio: Vec<AudioKeyFrame>,
    pub event: Vec<EventKeyFrame>,
    pub face: Vec<ProceduralFaceKeyFrame>,
    pub sprite_boxes: Vec<SpriteBoxKeyFrame>,
}

fn fill<F: KeyFrame>(track: &mut Track<F>, mut frames: Vec<F>) -> AnimResult<()> {
    frames.sort_by_key(|f| f.trigger_time());
    for frame in frames {
        track.add_keyframe_to_back(frame)?;
    }
    Ok(())
}

impl TryFrom<AnimationDefinition> for Animation {
    type Error = animproc_core::AnimError;

    fn try_from(def: AnimationDefinition) -> AnimResult<Self> {
        let mut anim = Animation::new(def.name);
        fill(&mut anim.head, def.head)?;
        fill(&mut anim.lift, def.lift)?;
        fill(&mut anim.body, def.body)?;
        fill(&mut anim.record_heading, def.record_heading)?;
        fill(&mut anim.turn_to_heading, def.turn_to_heading)?;
        fill(&mut anim.backpack, def.backpack)?;
        fill(&mut anim.audio, def.audio)?;
        fill(&mut anim.event, def.event)?;
        fill(&mut anim.face, def.face)?;
        fill(&mut anim.sprite_boxes, def.sprite_boxes)?;
        Ok(anim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::FACE_DISPLAY_PIXELS;

    fn sample() -> Animation {
        let def: AnimationDefinition = serde_json::from_str(
            r#"{
                "name": "anim_test_01",
                "head": [{"trigger_time_ms": 0, "duration_ms": 99, "angle_deg": 10}],
                "event": [{"trigger_time_ms": 165, "event_id": 3}],
                "sprite_boxes": [
                    {"trigger_time_ms": 33, "duration_ms": 66, "sprite_box": 1, "asset_id": 5},
                    {"trigger_time_ms": 33, "sprite_box": 2, "asset_id": 6}
                ]
            }"#,
        )
        .unwrap();
        Animation::try_from(def).unwrap()
    }

    #[test]
    fn test_last_keyframe_end_time() {
        let anim = sample();
        assert_eq!(anim.name(), "anim_test_01");
        // event at 165 lasts one tick
        assert_eq!(anim.last_keyframe_end_time(), StreamTime(198));
    }

    #[test]
    fn test_frames_left_is_or_over_tracks() {
        let mut anim = sample();
        anim.init();
        anim.advance_tracks(StreamTime(150));
        assert!(anim.has_frames_left());
        assert!(!anim.head.has_frames_left());
        anim.advance_tracks(StreamTime(198));
        assert!(!anim.has_frames_left());
        anim.init();
        assert!(anim.has_frames_left());
    }

    #[test]
    fn test_composite_applies_remaps() {
        let mut anim = sample();
        anim.init();
        assert!(anim.composite_image(StreamTime(0)).is_none());

        anim.add_sprite_box_remap(2, 60);
        let composite = anim.composite_image(StreamTime(33)).unwrap();
        let assets: Vec<u16> = composite.sprites.iter().map(|s| s.asset_id).collect();
        assert_eq!(assets, vec![5, 60]);

        // Box 2 only lasts one tick
        anim.advance_tracks(StreamTime(66));
        let composite = anim.composite_image(StreamTime(66)).unwrap();
        assert_eq!(composite.sprites.len(), 1);

        anim.clear_overrides();
        anim.init();
        let composite = anim.composite_image(StreamTime(33)).unwrap();
        assert_eq!(composite.sprites[1].asset_id, 6);
    }

    #[test]
    fn test_face_image_override_window() {
        let mut anim = Animation::new("proc");
        let image = FaceImage::new(vec![1; FACE_DISPLAY_PIXELS]).unwrap();
        anim.set_face_image_override(image.clone(), StreamTime(33), 66).unwrap();
        anim.init();
        assert!(anim.composite_image(StreamTime(0)).is_none());
        let composite = anim.composite_image(StreamTime(66)).unwrap();
        assert!(composite.image.unwrap().same_buffer(&image));
        assert!(anim.composite_image(StreamTime(99)).is_none());
        assert_eq!(anim.last_keyframe_end_time(), StreamTime(99));

        anim.clear_overrides();
        assert!(anim.is_empty());
    }
}
