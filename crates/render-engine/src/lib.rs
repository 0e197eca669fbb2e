//! Flowcam Render Engine
//!
//! Composites source frames with editing decisions (crop, camera motion,
//! background, cursor, text) and drives deterministic exports into a frame
//! sink.
//!
//! # Pipeline Architecture
//!
//! ```text
//! FrameSource ──seek(t)──┐
//!                        ├── Background ── Shadow ── Content (camera, rounded clip)
//! VideoSegment ──────────┤                                      │
//!                        │                       Cursor (squish) ── Text overlays
//! MousePosition[] ───────┘                                      │
//!                                                               ▼
//!                                                         JPEG still
//!                                                               │
//!                                                               ▼
//!                                               FrameSink (ffmpeg / directory)
//! ```
//!
//! Exports walk a virtual clock one frame at a time; interactive playback is
//! driven by display ticks and drops ticks that arrive mid-render.

pub mod background;
pub mod compositor;
pub mod cursor;
pub mod export;
pub mod ffmpeg;
pub mod playback;
pub mod presets;
pub mod raster;
pub mod session;
pub mod sink;
pub mod source;
pub mod text;

pub use compositor::{Compositor, FrameInputs, FrameLayout, RenderOptions, RenderQuality};
pub use export::*;
pub use playback::{PlaybackSession, TickOutcome};
pub use presets::{resolve_output_dimensions, DimensionPreset};
pub use session::RendererSession;
pub use sink::{DirectorySink, FfmpegSink, FrameSink, SinkConfig, SinkHandle, SinkReport};
pub use source::{
    AudioRef, FfmpegFrameSource, FrameSource, MemoryFrameSource, SourceFrame, SourceRef,
};
