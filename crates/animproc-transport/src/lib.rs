//! Animation process transport layer - local datagram sockets
//!
//! This crate provides:
//! - `PeerLink`, the non-blocking send/receive contract the router drives
//! - `LocalServer`: listening endpoint that serves exactly one client
//! - `LocalClient`: endpoint attached to a fixed remote
//! - `MemoryLink`: in-process link for simulation and tests
//! - Endpoint path helpers

pub mod link;
#[cfg(unix)]
pub mod local;
pub mod memory;
pub mod paths;

pub use link::*;
#[cfg(unix)]
pub use local::*;
pub use memory::*;
pub use paths::*;
