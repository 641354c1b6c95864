//! Animation process wire protocol - binary message envelope
//!
//! Every message on the wire is a one-byte tag followed by its payload:
//! - Fixed-width little-endian scalar fields
//! - Variable-length fields as an explicit `u16` length followed by the data,
//!   bounded by a per-field capacity
//!
//! Two disjoint catalogs exist: `EngineToRobot` and `RobotToEngine`.

#[macro_use]
mod macros;

pub mod codec;
pub mod engine_to_robot;
pub mod robot_to_engine;

pub use codec::*;
pub use engine_to_robot::*;
pub use robot_to_engine::*;

/// Largest datagram either catalog may produce or accept
pub const MAX_PACKET_BUFFER_SIZE: usize = 2048;
