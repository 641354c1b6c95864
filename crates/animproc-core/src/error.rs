//! Error types for the animation process

use thiserror::Error;

use crate::{AnimationTag, StreamTime};

/// Core animation process errors
#[derive(Error, Debug)]
pub enum AnimError {
    // Wire errors
    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Size mismatch: decoded {decoded} bytes, received {received}")]
    SizeMismatch { decoded: usize, received: usize },

    #[error("Unknown message tag: 0x{0:02x}")]
    UnknownTag(u8),

    #[error("Field {field} length {len} exceeds capacity {capacity}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        capacity: usize,
    },

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not connected")]
    NotConnected,

    // Animation errors
    #[error("Animation not found: {0}")]
    AnimationNotFound(String),

    #[error("Animation {current} is streaming (tag {tag}) and interrupt was not allowed")]
    AlreadyStreaming { current: String, tag: AnimationTag },

    #[error("Too many keyframes in track (max {0})")]
    TooManyKeyFrames(usize),

    #[error("Keyframe at {0:?} is out of order")]
    KeyFrameOutOfOrder(StreamTime),

    #[error("Duplicate keyframe at {0:?}")]
    DuplicateKeyFrame(StreamTime),

    #[error("Alteration of type 0x{0:02x} is not supported")]
    UnsupportedAlteration(u8),

    #[error("Animation file {path}: {reason}")]
    AnimationFile { path: String, reason: String },

    #[error("Invalid face image: {0}")]
    InvalidFaceImage(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for animation process operations
pub type AnimResult<T> = Result<T, AnimError>;
