//! User-visible fault codes

use std::fmt;

/// Fault code shown on the robot's display when a peer process goes missing
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum FaultCode {
    /// Robot process stopped talking to us
    NoRobotComms,
    /// Engine process disconnected for longer than the grace period
    NoEngineComms,
}

impl FaultCode {
    /// Numeric code as rendered on the display
    pub fn code(self) -> u16 {
        match self {
            FaultCode::NoRobotComms => 914,
            FaultCode::NoEngineComms => 915,
        }
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
