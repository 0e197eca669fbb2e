//! Flowcam Processing Core: the camera-motion engine
//!
//! Turns recorded pointer telemetry into editing decisions:
//! - **Telemetry:** Interpolate sparse pointer samples onto any time base
//! - **Camera Path:** Spring-driven virtual camera with framing heuristics
//! - **Camera Resolution:** Per-instant camera from a dense path or keyframes
//! - **Cursor Smoothing:** Resampled, filtered trajectory for the cursor overlay
//!
//! This crate is pure computation: no I/O, no async.
//! All inputs are data; all outputs are data.

pub mod camera_path;
pub mod camera_resolve;
pub mod cursor_smooth;
pub mod spring;
pub mod telemetry;

pub use camera_path::{CameraPath, CameraPathConfig, CameraPathGenerator};
pub use camera_resolve::{influence_at, resolve_camera_state, sample_camera_states};
pub use cursor_smooth::{CursorSmoothConfig, CursorSmoother, ResolvedCursor, SmoothedCursor};
pub use telemetry::TelemetrySampler;
