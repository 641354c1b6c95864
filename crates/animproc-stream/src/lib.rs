//! Animation process streaming engine
//!
//! This crate provides:
//! - Keyframe types and time-ordered tracks
//! - `Animation`, a set of tracks plus runtime overrides, and its JSON form
//! - `AnimationLibrary` for canned animations
//! - `TrackLayers`: procedural eye layers and keep-alive
//! - `AnimationStreamer`, the per-tick streaming state machine
//! - `StreamingAnimationModifier` for alterations scheduled at a stream time

pub mod animation;
pub mod audio;
pub mod config;
pub mod face;
pub mod keyframe;
pub mod layers;
pub mod library;
pub mod modifier;
pub mod streamer;
pub mod track;

pub use animation::*;
pub use audio::*;
pub use config::*;
pub use face::*;
pub use keyframe::*;
pub use layers::*;
pub use library::*;
pub use modifier::*;
pub use streamer::*;
pub use track::*;
