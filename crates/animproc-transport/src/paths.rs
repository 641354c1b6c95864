//! Socket rendezvous paths

use std::path::PathBuf;

use animproc_core::RobotId;

/// Animation process side of the robot connection
pub const ANIM_ROBOT_CLIENT_PATH: &str = "/dev/socket/_anim_robot_client_";

/// Robot process server the animation process connects to
pub const ANIM_ROBOT_SERVER_PATH: &str = "/dev/socket/_anim_robot_server_";

/// Server the animation process listens on for the engine
pub const ENGINE_ANIM_SERVER_PATH: &str = "/dev/socket/_engine_anim_server_";

/// Append the robot id to a base path
pub fn endpoint_path(base: &str, robot_id: RobotId) -> PathBuf {
    PathBuf::from(format!("{}{}", base, robot_id))
}

/// The three endpoints of one animation process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    pub robot_client: PathBuf,
    pub robot_server: PathBuf,
    pub engine_server: PathBuf,
}

impl Endpoints {
    /// Default endpoints for `robot_id`
    pub fn for_robot(robot_id: RobotId) -> Self {
        Self::with_bases(
            ANIM_ROBOT_CLIENT_PATH,
            ANIM_ROBOT_SERVER_PATH,
            ENGINE_ANIM_SERVER_PATH,
            robot_id,
        )
    }

    pub fn with_bases(
        robot_client: &str,
        robot_server: &str,
        engine_server: &str,
        robot_id: RobotId,
    ) -> Self {
        Endpoints {
            robot_client: endpoint_path(robot_client, robot_id),
            robot_server: endpoint_path(robot_server, robot_id),
            engine_server: endpoint_path(engine_server, robot_id),
        }
    }
}
