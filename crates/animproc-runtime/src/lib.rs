//! Animation process runtime
//!
//! Ties the transport, the message router and the animation streamer into
//! the fixed-tick process loop:
//! - `MessageRouter` relays and intercepts engine and robot frames
//! - `AnimProcess` runs the router, the alteration scheduler and the
//!   streamer in tick order
//! - `Services` holds the collaborator seams (mic, audio, TTS, screens)
//! - `AnimProcessConfig` and tracing setup for the `animproc` binary

pub mod config;
pub mod process;
pub mod router;
pub mod services;
pub mod telemetry;

pub use config::*;
pub use process::*;
pub use router::*;
pub use services::*;
pub use telemetry::*;
