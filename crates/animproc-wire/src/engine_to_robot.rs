//! Messages flowing from the engine process towards the robot
//!
//! Tags below `0x50` are robot-bound and normally forwarded untouched.
//! Tags from `0x50` up are addressed to the animation process itself.

use crate::codec::{BoundedVec, FixedString};

/// Animation names on the wire
pub type AnimName = FixedString<64>;

/// Named procedural layers (eye shifts, squints)
pub type LayerName = FixedString<32>;

/// Pixels per face image chunk (RGB565)
pub const FACE_CHUNK_MAX_PIXELS: usize = 600;

/// Sprite boxes per sprite-box message
pub const MAX_SPRITE_BOX_KEYFRAMES: usize = 32;

/// Sprite box remaps per message
pub const MAX_SPRITE_BOX_REMAPS: usize = 16;

wire_struct! {
    pub struct DriveWheels {
        pub lwheel_speed_mmps: f32,
        pub rwheel_speed_mmps: f32,
        pub lwheel_accel_mmps2: f32,
        pub rwheel_accel_mmps2: f32,
    }

    pub struct DriveWheelsCurvature {
        pub speed_mmps: i16,
        pub accel_mmps2: i16,
        pub curvature_radius_mm: i16,
    }

    pub struct MoveHead {
        pub speed_rad_per_sec: f32,
    }

    pub struct MoveLift {
        pub speed_rad_per_sec: f32,
    }

    pub struct SetHeadAngle {
        pub angle_rad: f32,
        pub max_speed_rad_per_sec: f32,
        pub accel_rad_per_sec2: f32,
        pub duration_sec: f32,
        pub action_id: u8,
    }

    pub struct SetLiftHeight {
        pub height_mm: f32,
        pub max_speed_rad_per_sec: f32,
        pub accel_rad_per_sec2: f32,
        pub duration_sec: f32,
        pub action_id: u8,
    }

    pub struct RecordHeading {}

    pub struct TurnToRecordedHeading {
        pub offset_deg: i16,
        pub speed_deg_per_sec: i16,
        pub accel_deg_per_sec2: i16,
        pub decel_deg_per_sec2: i16,
        pub tolerance_deg: u16,
        pub num_half_revolutions: u16,
        pub use_shortest_direction: bool,
    }

    pub struct StopAllMotors {}

    pub struct AbsLocalizationUpdate {
        pub timestamp: u32,
        pub pose_frame_id: u32,
        pub origin_id: u32,
        pub x_mm: f32,
        pub y_mm: f32,
        pub heading_rad: f32,
    }

    pub struct CalmPowerMode {
        pub enable: bool,
        pub calib_on_disable: bool,
    }

    /// Per-LED colors for the three backpack lights
    pub struct SetBackpackLights {
        pub on_colors: [u32; 3],
        pub off_colors: [u32; 3],
        pub on_period_ms: [u16; 3],
        pub off_period_ms: [u16; 3],
    }

    pub struct BackpackSetLayer {
        pub layer: u8,
    }

    pub struct SyncRobot {
        pub sync_id: u32,
    }

    pub struct EnableStopOnCliff {
        pub enable: bool,
    }

    pub struct SetFullAnimTrackLockState {
        pub track_lock_state: u8,
    }

    pub struct AddAnim {
        pub anim_path: FixedString<256>,
    }

    pub struct PlayAnim {
        pub num_loops: u32,
        pub start_at_ms: u32,
        pub tag: u8,
        pub render_in_eye_hue: bool,
        pub anim_name: AnimName,
    }

    pub struct AbortAnimation {
        pub tag: u8,
    }

    pub struct ProceduralFaceParams {
        pub angle_deg: f32,
        pub center_x: f32,
        pub center_y: f32,
        pub scale_x: f32,
        pub scale_y: f32,
    }

    pub struct DisplayProceduralFace {
        pub face: ProceduralFaceParams,
        pub duration_ms: u32,
    }

    /// One slice of an RGB565 face image; `num_chunks` slices make an image
    pub struct DisplayFaceImageRgbChunk {
        pub face_id: u16,
        pub chunk_index: u8,
        pub num_chunks: u8,
        pub duration_ms: u32,
        pub pixels: BoundedVec<u16, FACE_CHUNK_MAX_PIXELS>,
    }

    pub struct EnableKeepFaceAlive {
        pub enable: bool,
        pub disable_timeout_ms: u32,
    }

    pub struct SetKeepFaceAliveFocus {
        pub enable: bool,
    }

    pub struct SpriteBoxRemap {
        pub sprite_box: u16,
        pub asset_id: u16,
    }

    pub struct SpriteBoxKeyFrameSpec {
        pub trigger_time_ms: u32,
        pub sprite_box: u16,
        pub asset_id: u16,
        pub x_pos: i16,
        pub y_pos: i16,
        pub alpha: u8,
    }

    pub struct PlayAnimWithSpriteBoxRemaps {
        pub tag: u8,
        pub lock_face_at_end: bool,
        pub anim_name: AnimName,
        pub remaps: BoundedVec<SpriteBoxRemap, MAX_SPRITE_BOX_REMAPS>,
    }

    pub struct PlayAnimWithSpriteBoxKeyFrames {
        pub tag: u8,
        pub anim_name: AnimName,
        pub keyframes: BoundedVec<SpriteBoxKeyFrameSpec, MAX_SPRITE_BOX_KEYFRAMES>,
    }

    pub struct AddSpriteBoxKeyFrames {
        pub keyframes: BoundedVec<SpriteBoxKeyFrameSpec, MAX_SPRITE_BOX_KEYFRAMES>,
    }

    pub struct AddOrUpdateEyeShift {
        pub name: LayerName,
        pub x_pix: f32,
        pub y_pix: f32,
        pub duration_ms: u32,
    }

    pub struct RemoveEyeShift {
        pub name: LayerName,
        pub disable_timeout_ms: u32,
    }

    pub struct AddSquint {
        pub name: LayerName,
        pub squint_scale_x: f32,
        pub squint_scale_y: f32,
        pub upper_lid_angle: f32,
    }

    pub struct RemoveSquint {
        pub name: LayerName,
        pub disable_timeout_ms: u32,
    }

    pub struct PostAudioEvent {
        pub audio_event: u32,
        pub game_object: u32,
        pub callback_id: u16,
    }

    pub struct StopAllAudioEvents {
        pub game_object: u32,
    }

    pub struct TextToSpeechPlay {
        pub tts_id: u8,
    }

    pub struct TextToSpeechCancel {
        pub tts_id: u8,
    }

    /// Apply `alteration` when the streaming animation reaches the given time
    pub struct AlterStreamingAnimationAtTime {
        pub relative_stream_time_ms: u32,
        pub apply_before_tick: bool,
        pub alteration: Box<EngineToRobot>,
    }

    pub struct AcousticTestEnabled {
        pub enabled: bool,
    }
}

message_catalog! {
    /// Engine-to-robot catalog
    pub enum EngineToRobot {
        DriveWheels = 0x01,
        DriveWheelsCurvature = 0x02,
        MoveHead = 0x03,
        MoveLift = 0x04,
        SetHeadAngle = 0x05,
        SetLiftHeight = 0x06,
        RecordHeading = 0x07,
        TurnToRecordedHeading = 0x08,
        StopAllMotors = 0x09,
        AbsLocalizationUpdate = 0x0A,
        CalmPowerMode = 0x0B,
        SetBackpackLights = 0x0C,
        BackpackSetLayer = 0x0D,
        SyncRobot = 0x0E,
        EnableStopOnCliff = 0x0F,
        SetFullAnimTrackLockState = 0x50,
        AddAnim = 0x51,
        PlayAnim = 0x52,
        AbortAnimation = 0x53,
        DisplayProceduralFace = 0x54,
        DisplayFaceImageRgbChunk = 0x55,
        EnableKeepFaceAlive = 0x56,
        SetKeepFaceAliveFocus = 0x57,
        PlayAnimWithSpriteBoxRemaps = 0x58,
        PlayAnimWithSpriteBoxKeyFrames = 0x59,
        AddSpriteBoxKeyFrames = 0x5A,
        AddOrUpdateEyeShift = 0x5B,
        RemoveEyeShift = 0x5C,
        AddSquint = 0x5D,
        RemoveSquint = 0x5E,
        PostAudioEvent = 0x5F,
        StopAllAudioEvents = 0x60,
        TextToSpeechPlay = 0x61,
        TextToSpeechCancel = 0x62,
        AlterStreamingAnimationAtTime = 0x63,
        AcousticTestEnabled = 0x64,
    }
}

/// First tag addressed to the animation process rather than the robot
pub const ANIM_PROCESS_TAG_START: u8 = 0x50;

#[cfg(test)]
mod tests {
    use super::*;
    use animproc_core::AnimError;
    use proptest::prelude::*;

    fn play_anim(name: &str) -> EngineToRobot {
        EngineToRobot::PlayAnim(PlayAnim {
            num_loops: 2,
            start_at_ms: 0,
            tag: 9,
            render_in_eye_hue: false,
            anim_name: AnimName::new(name).unwrap(),
        })
    }

    #[test]
    fn test_play_anim_layout() {
        let bytes = play_anim("hi").encode().unwrap();
        assert_eq!(bytes[0], 0x52);
        // loops(4) + start(4) + tag(1) + hue(1) + len(2) + "hi"
        assert_eq!(bytes.len(), 1 + 4 + 4 + 1 + 1 + 2 + 2);
        assert_eq!(&bytes[1..5], &2u32.to_le_bytes());
        assert_eq!(bytes[9], 9);
        assert_eq!(&bytes[11..13], &[2, 0]);
        assert_eq!(&bytes[13..], b"hi");
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = EngineToRobot::MoveHead(MoveHead {
            speed_rad_per_sec: 1.5,
        })
        .encode()
        .unwrap();
        bytes.push(0);
        assert!(matches!(
            EngineToRobot::decode(&bytes),
            Err(AnimError::SizeMismatch {
                decoded: 5,
                received: 6
            })
        ));
    }

    #[test]
    fn test_decode_rejects_short_frame() {
        let bytes = play_anim("walk").encode().unwrap();
        assert!(matches!(
            EngineToRobot::decode(&bytes[..bytes.len() - 1]),
            Err(AnimError::BufferTooShort { .. })
        ));
        assert!(EngineToRobot::decode(&[]).is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        assert!(matches!(
            EngineToRobot::decode(&[0xEE, 1, 2]),
            Err(AnimError::UnknownTag(0xEE))
        ));
        assert!(!EngineToRobot::is_known_tag(0xEE));
        assert!(EngineToRobot::is_known_tag(0x52));
    }

    #[test]
    fn test_nested_alteration() {
        let msg = EngineToRobot::AlterStreamingAnimationAtTime(AlterStreamingAnimationAtTime {
            relative_stream_time_ms: 66,
            apply_before_tick: true,
            alteration: Box::new(EngineToRobot::SetFullAnimTrackLockState(
                SetFullAnimTrackLockState {
                    track_lock_state: 0x05,
                },
            )),
        });
        let bytes = msg.encode().unwrap();
        assert_eq!(bytes.len(), 1 + 4 + 1 + 1 + 1);
        assert_eq!(EngineToRobot::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_oversized_chunk_rejected() {
        let mut bytes = vec![0x55];
        bytes.extend_from_slice(&1u16.to_le_bytes()); // face id
        bytes.push(0); // chunk index
        bytes.push(1); // num chunks
        bytes.extend_from_slice(&30u32.to_le_bytes());
        bytes.extend_from_slice(&((FACE_CHUNK_MAX_PIXELS + 1) as u16).to_le_bytes());
        assert!(matches!(
            EngineToRobot::decode(&bytes),
            Err(AnimError::FieldTooLong { .. })
        ));
    }

    #[test]
    fn test_anim_process_tags_partition() {
        assert!(play_anim("x").tag() >= ANIM_PROCESS_TAG_START);
        let fwd = EngineToRobot::StopAllMotors(StopAllMotors {});
        assert!(fwd.tag() < ANIM_PROCESS_TAG_START);
        assert_eq!(fwd.name(), "StopAllMotors");
    }

    fn arb_message() -> impl Strategy<Value = EngineToRobot> {
        let drive = (-500.0f32..500.0, -500.0f32..500.0).prop_map(|(l, r)| {
            EngineToRobot::DriveWheels(DriveWheels {
                lwheel_speed_mmps: l,
                rwheel_speed_mmps: r,
                lwheel_accel_mmps2: 0.0,
                rwheel_accel_mmps2: 0.0,
            })
        });
        let head = (-0.5f32..0.8, any::<u8>()).prop_map(|(angle, action_id)| {
            EngineToRobot::SetHeadAngle(SetHeadAngle {
                angle_rad: angle,
                max_speed_rad_per_sec: 10.0,
                accel_rad_per_sec2: 20.0,
                duration_sec: 0.0,
                action_id,
            })
        });
        let play = ("[a-z_0-9]{0,64}", any::<u32>(), any::<u8>()).prop_map(|(name, loops, tag)| {
            EngineToRobot::PlayAnim(PlayAnim {
                num_loops: loops,
                start_at_ms: 0,
                tag,
                render_in_eye_hue: false,
                anim_name: AnimName::new(name).unwrap(),
            })
        });
        let alter = (any::<u32>(), any::<bool>(), any::<u8>()).prop_map(|(time, before, locks)| {
            EngineToRobot::AlterStreamingAnimationAtTime(AlterStreamingAnimationAtTime {
                relative_stream_time_ms: time,
                apply_before_tick: before,
                alteration: Box::new(EngineToRobot::SetFullAnimTrackLockState(
                    SetFullAnimTrackLockState {
                        track_lock_state: locks,
                    },
                )),
            })
        });
        prop_oneof![drive, head, play, alter]
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(msg in arb_message()) {
            let bytes = msg.encode().unwrap();
            prop_assert_eq!(EngineToRobot::decode(&bytes).unwrap(), msg);
        }

        #[test]
        fn prop_size_must_match_exactly(
            msg in arb_message(),
            cut in any::<prop::sample::Index>(),
            extra in prop::collection::vec(any::<u8>(), 1..8),
        ) {
            let bytes = msg.encode().unwrap();
            let short = &bytes[..cut.index(bytes.len())];
            prop_assert!(EngineToRobot::decode(short).is_err());

            let mut long = bytes.clone();
            long.extend_from_slice(&extra);
            prop_assert!(EngineToRobot::decode(&long).is_err());
        }
    }
}
