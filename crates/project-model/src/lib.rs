//! Flowcam Project Model
//!
//! Defines the data contracts shared by the camera engine, the compositor
//! and the export driver:
//! - **Events:** Recorded pointer samples and the editor's mouse-position wire format
//! - **Segment:** The edit unit (trim, crop, keyframes, influence curve, text overlays)
//! - **Camera:** Resolved camera state and viewport math
//! - **Background:** Canvas styling around the content
//! - **Project:** Bundle metadata, dimension presets and the sink configuration
//!
//! Camera coordinates are normalized to `[0.0, 1.0]` relative to the cropped
//! source frame; pointer samples stay in source pixels.

pub mod background;
pub mod camera;
pub mod event;
pub mod project;
pub mod segment;

pub use background::*;
pub use camera::*;
pub use event::*;
pub use project::*;
pub use segment::*;
