//! Flowcam Common Utilities
//!
//! Shared infrastructure for all Flowcam crates:
//! - Error types and result aliases
//! - Virtual frame clock for deterministic export and playback ticks
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
