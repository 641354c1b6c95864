//! Streamer configuration

use std::time::Duration;

use serde::Deserialize;

use animproc_core::ANIM_TIME_STEP_MS;

/// Animation played when an interrupted stream leaves nothing on the face
pub const NEUTRAL_FACE_ANIM: &str = "anim_neutral_eyes_01";

/// Animations that may drive the wheels while on the charger without the
/// body track being locked. Entries are name prefixes. The engine keeps its
/// own copy of this list.
pub const BUILTIN_CHARGER_ALLOW_LIST: &[&str] = &[
    "anim_chargerdocking_comeoff_",
    "anim_chargerdocking_settle_",
    "anim_movement_forward_",
    "anim_onboarding_driveoff_charger_",
    "anim_onboarding_wakeup_",
];

/// Serde adapter for humantime strings such as `"500ms"` or `"2s"`
pub mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

/// Name prefixes allowed to move the body while on the charger
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChargerAllowList {
    prefixes: Vec<String>,
}

impl Default for ChargerAllowList {
    fn default() -> Self {
        ChargerAllowList {
            prefixes: BUILTIN_CHARGER_ALLOW_LIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ChargerAllowList {
    /// Use `prefixes`, warning when they drift from the built-in list
    pub fn from_prefixes(prefixes: Vec<String>) -> Self {
        let list = ChargerAllowList { prefixes };
        if list != Self::default() {
            tracing::warn!(
                configured = ?list.prefixes,
                "charger allow-list differs from the built-in list"
            );
        }
        list
    }

    pub fn allows(&self, anim_name: &str) -> bool {
        self.prefixes.iter().any(|p| anim_name.starts_with(p.as_str()))
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

impl<'de> Deserialize<'de> for ChargerAllowList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Vec::<String>::deserialize(deserializer).map(ChargerAllowList::from_prefixes)
    }
}

/// Keep-alive timing for blinks and eye darts
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct KeepAliveConfig {
    /// Spacing between blinks, inclusive range in ms
    pub blink_spacing_ms: (u32, u32),
    /// Spacing between eye darts when not focused
    pub dart_spacing_ms: (u32, u32),
    /// Spacing between eye darts when focused
    pub focused_dart_spacing_ms: (u32, u32),
    /// Largest dart offset in pixels
    pub max_dart_px: f32,
    /// Largest dart offset in pixels when focused
    pub max_focused_dart_px: f32,
    /// Audio event posted with each blink
    pub blink_audio_event: Option<u32>,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        KeepAliveConfig {
            blink_spacing_ms: (2500, 4500),
            dart_spacing_ms: (1000, 4000),
            focused_dart_spacing_ms: (3000, 6000),
            max_dart_px: 6.0,
            max_focused_dart_px: 2.0,
            blink_audio_event: None,
        }
    }
}

/// Animation streamer configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    /// Idle time after the last stream before keep-alive takes over
    #[serde(with = "humantime_duration")]
    pub keep_alive_cooldown: Duration,
    /// Ticks between lock-state reports to the engine
    pub anim_state_period_ticks: u32,
    /// Hold-off for procedural faces after a non-procedural face frame
    pub min_procedural_face_separation_ms: u32,
    /// Audio keyframes play this far ahead of the other tracks
    pub audio_latency_offset_ms: u32,
    /// Animation that puts neutral eyes back on the face
    pub neutral_face_anim: String,
    pub charger_allow_list: ChargerAllowList,
    pub keep_alive: KeepAliveConfig,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        StreamerConfig {
            keep_alive_cooldown: Duration::from_millis(500),
            anim_state_period_ticks: 2,
            min_procedural_face_separation_ms: 2 * ANIM_TIME_STEP_MS,
            audio_latency_offset_ms: 0,
            neutral_face_anim: NEUTRAL_FACE_ANIM.to_string(),
            charger_allow_list: ChargerAllowList::default(),
            keep_alive: KeepAliveConfig::default(),
        }
    }
}

/// Developer switches, kept apart from the shipping config
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct StreamerDebugConfig {
    /// Scrub to `manual_frame` instead of advancing time
    pub manual_mode: bool,
    pub manual_frame: u32,
    /// Let animations drive the backpack lights
    pub enable_backpack_lights_track: bool,
    /// Start with keep-alive disabled
    pub disable_keep_face_alive: bool,
}
