//! Messages flowing from the robot process towards the engine
//!
//! The animation process also originates a few of these (availability,
//! animation lifecycle and state snapshots).

use crate::codec::{BoundedVec, FixedString};
use crate::engine_to_robot::AnimName;

/// Mic samples per `MicData` message
pub const MIC_SAMPLES_PER_MESSAGE: usize = 640;

/// Robot status bits carried in `RobotState::status`
pub mod robot_status {
    pub const IS_MOVING: u32 = 0x0000_0001;
    pub const IS_CARRYING_BLOCK: u32 = 0x0000_0002;
    pub const IS_PICKED_UP: u32 = 0x0000_0008;
    pub const IS_FALLING: u32 = 0x0000_0020;
    pub const IS_ON_CHARGER: u32 = 0x0000_0040;
    pub const IS_CHARGING: u32 = 0x0000_0080;
    pub const CLIFF_DETECTED: u32 = 0x0000_0100;
    pub const IS_BUTTON_PRESSED: u32 = 0x0000_0400;
}

wire_struct! {
    pub struct RobotState {
        pub timestamp: u32,
        pub status: u32,
        pub pose_frame_id: u32,
        pub lift_height_mm: f32,
        pub head_angle_rad: f32,
        pub battery_voltage: f32,
        pub cliff_data_raw: [u16; 4],
    }

    pub struct StillAlive {}

    pub struct RobotServerDisconnect {}

    pub struct PrepForShutdown {
        pub reason: u8,
    }

    pub struct MicData {
        pub sequence_id: u32,
        pub robot_status_flags: u32,
        pub robot_angle: f32,
        pub data: BoundedVec<i16, MIC_SAMPLES_PER_MESSAGE>,
    }

    pub struct RobotStopped {
        pub reason: u8,
    }

    pub struct SyncRobotAck {
        pub syscon_version: [u8; 16],
    }

    pub struct CliffEvent {
        pub timestamp: u32,
        pub detected_flags: u8,
    }

    pub struct FallingEvent {
        pub timestamp: u32,
        pub duration_ms: u32,
    }

    pub struct ImuTemperature {
        pub temperature_c: f32,
    }

    pub struct RobotAvailable {}

    pub struct AnimationStarted {
        pub tag: u8,
        pub anim_name: AnimName,
    }

    pub struct AnimationEnded {
        pub tag: u8,
        pub was_aborted: bool,
        pub stream_time_anim_ended: u32,
        pub anim_name: AnimName,
    }

    pub struct AnimationEvent {
        pub timestamp: u32,
        pub event_id: u32,
        pub tag: u8,
    }

    pub struct AnimationState {
        pub locked_tracks: u8,
        pub tracks_in_use: u8,
    }

    pub struct DebugString {
        pub text: FixedString<255>,
    }
}

message_catalog! {
    /// Robot-to-engine catalog
    pub enum RobotToEngine {
        RobotState = 0x01,
        StillAlive = 0x02,
        RobotServerDisconnect = 0x03,
        PrepForShutdown = 0x04,
        MicData = 0x05,
        RobotStopped = 0x06,
        SyncRobotAck = 0x07,
        CliffEvent = 0x08,
        FallingEvent = 0x09,
        ImuTemperature = 0x0A,
        DebugString = 0x0B,
        RobotAvailable = 0x40,
        AnimationStarted = 0x41,
        AnimationEnded = 0x42,
        AnimationEvent = 0x43,
        AnimationState = 0x44,
    }
}

impl RobotState {
    #[inline]
    pub fn is_on_charger(&self) -> bool {
        self.status & robot_status::IS_ON_CHARGER != 0
    }
}

impl SyncRobotAck {
    /// Firmware version as text, stopping at the first NUL
    pub fn syscon_version_string(&self) -> String {
        let end = self
            .syscon_version
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.syscon_version.len());
        String::from_utf8_lossy(&self.syscon_version[..end]).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use animproc_core::AnimError;

    #[test]
    fn test_on_charger_flag() {
        let mut state = RobotState {
            timestamp: 10,
            status: robot_status::IS_MOVING,
            pose_frame_id: 0,
            lift_height_mm: 32.0,
            head_angle_rad: 0.1,
            battery_voltage: 4.0,
            cliff_data_raw: [0; 4],
        };
        assert!(!state.is_on_charger());
        state.status |= robot_status::IS_ON_CHARGER;
        assert!(state.is_on_charger());

        let bytes = RobotToEngine::RobotState(state.clone()).encode().unwrap();
        assert_eq!(bytes.len(), 1 + 4 * 6 + 2 * 4);
        assert_eq!(
            RobotToEngine::decode(&bytes).unwrap(),
            RobotToEngine::RobotState(state)
        );
    }

    #[test]
    fn test_syscon_version_string() {
        let mut version = [0u8; 16];
        version[..6].copy_from_slice(b"v1.2.3");
        let ack = SyncRobotAck {
            syscon_version: version,
        };
        assert_eq!(ack.syscon_version_string(), "v1.2.3");
    }

    #[test]
    fn test_empty_payload_messages() {
        let bytes = RobotToEngine::StillAlive(StillAlive {}).encode().unwrap();
        assert_eq!(bytes, vec![0x02]);
        assert!(matches!(
            RobotToEngine::decode(&[0x02, 0x00]),
            Err(AnimError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_mic_data_fits_packet() {
        let msg = RobotToEngine::MicData(MicData {
            sequence_id: 1,
            robot_status_flags: 0,
            robot_angle: 0.0,
            data: BoundedVec::new(vec![0i16; MIC_SAMPLES_PER_MESSAGE]).unwrap(),
        });
        let bytes = msg.encode().unwrap();
        assert!(bytes.len() <= crate::MAX_PACKET_BUFFER_SIZE);
    }
}
