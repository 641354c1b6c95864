//! Process configuration
//!
//! Loaded from an optional JSON file; every field has a default, so an empty
//! object (or no file) gives the shipping setup. Durations are humantime
//! strings such as `"2s"` or `"500ms"`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use animproc_core::{AnimError, AnimResult, RobotId};
use animproc_stream::{humantime_duration, StreamerConfig, StreamerDebugConfig};
use animproc_transport::{
    Endpoints, ANIM_ROBOT_CLIENT_PATH, ANIM_ROBOT_SERVER_PATH, ENGINE_ANIM_SERVER_PATH,
};

/// Socket rendezvous configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Base path of our robot-facing client endpoint
    pub robot_client_base: String,
    /// Base path of the robot process server
    pub robot_server_base: String,
    /// Base path of the server the engine connects to
    pub engine_server_base: String,
    /// Appended to every base path
    pub robot_id: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            robot_client_base: ANIM_ROBOT_CLIENT_PATH.to_string(),
            robot_server_base: ANIM_ROBOT_SERVER_PATH.to_string(),
            engine_server_base: ENGINE_ANIM_SERVER_PATH.to_string(),
            robot_id: 0,
        }
    }
}

impl TransportConfig {
    pub fn endpoints(&self) -> Endpoints {
        Endpoints::with_bases(
            &self.robot_client_base,
            &self.robot_server_base,
            &self.engine_server_base,
            RobotId::new(self.robot_id),
        )
    }
}

/// Message router timing
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Ticks between the robot's shutdown notice and exiting, so the
    /// notice still reaches the engine
    pub shutdown_ticks: u32,
    /// Robot silence (no state, no heartbeat) before it is disconnected
    #[serde(with = "humantime_duration")]
    pub robot_silence_timeout: Duration,
    /// Engine absence before the no-engine fault shows
    #[serde(with = "humantime_duration")]
    pub engine_fault_grace: Duration,
    /// How often to try the robot again while it is disconnected
    #[serde(with = "humantime_duration")]
    pub robot_reconnect_interval: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            shutdown_ticks: 5,
            robot_silence_timeout: Duration::from_secs(2),
            engine_fault_grace: Duration::from_secs(5),
            robot_reconnect_interval: Duration::from_secs(1),
        }
    }
}

/// Log output
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset
    pub filter: String,
    /// Emit JSON lines instead of text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level configuration
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AnimProcessConfig {
    pub transport: TransportConfig,
    pub router: RouterConfig,
    pub streamer: StreamerConfig,
    pub debug: StreamerDebugConfig,
    pub log: LogConfig,
    /// Directory of canned animation JSON files loaded at startup
    pub animation_dir: Option<PathBuf>,
}

impl AnimProcessConfig {
    pub fn from_json(json: &str) -> AnimResult<Self> {
        serde_json::from_str(json).map_err(|e| AnimError::Config(e.to_string()))
    }

    /// Read `path`, or use the defaults when there is none
    pub fn load(path: Option<&Path>) -> AnimResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let json = std::fs::read_to_string(path)
            .map_err(|e| AnimError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnimProcessConfig::from_json("{}").unwrap();
        assert_eq!(config.router.shutdown_ticks, 5);
        assert_eq!(config.router.robot_silence_timeout, Duration::from_secs(2));
        assert_eq!(config.router.engine_fault_grace, Duration::from_secs(5));
        assert_eq!(config.log.filter, "info");
        assert!(config.animation_dir.is_none());
    }

    #[test]
    fn test_nested_overrides() {
        let config = AnimProcessConfig::from_json(
            r#"{
                "transport": {"robot_id": 3, "engine_server_base": "/tmp/engine_"},
                "router": {"robot_silence_timeout": "750ms"},
                "streamer": {"anim_state_period_ticks": 4},
                "debug": {"enable_backpack_lights_track": true}
            }"#,
        )
        .unwrap();
        assert_eq!(config.router.robot_silence_timeout, Duration::from_millis(750));
        assert_eq!(config.router.shutdown_ticks, 5);
        assert_eq!(config.streamer.anim_state_period_ticks, 4);
        assert!(config.debug.enable_backpack_lights_track);
        assert_eq!(
            config.transport.endpoints().engine_server,
            PathBuf::from("/tmp/engine_3")
        );
    }

    #[test]
    fn test_bad_config_is_config_error() {
        let result = AnimProcessConfig::from_json(r#"{"router": {"shutdown_ticks": "five"}}"#);
        assert!(matches!(result, Err(AnimError::Config(_))));
        assert!(AnimProcessConfig::load(Some(Path::new("/nonexistent/animproc.json"))).is_err());
    }
}
