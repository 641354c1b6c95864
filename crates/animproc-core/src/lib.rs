//! Animation process core - fundamental types and primitives
//!
//! This crate defines the types shared by every layer of the animation process:
//! - Identifiers (RobotId, AnimationTag)
//! - Time primitives (StreamTime, ClockTime) and the animation tick
//! - Track selection bitmask (TrackFlags)
//! - User-visible fault codes
//! - Error types

pub mod error;
pub mod fault;
pub mod id;
pub mod time;
pub mod track;

pub use error::*;
pub use fault::*;
pub use id::*;
pub use time::*;
pub use track::*;
