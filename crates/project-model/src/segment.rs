//! The edit unit: a trimmed, cropped span of the source with camera and
//! overlay decisions attached.
//!
//! Field names follow the editor's camelCase JSON.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::camera::{clamp_zoom, CameraState};
use crate::project::ProjectError;

/// A segment of the recording plus its editing decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSegment {
    /// Start of the segment on the source timeline (seconds).
    pub trim_start: f64,

    /// End of the segment on the source timeline (seconds).
    pub trim_end: f64,

    /// Crop rectangle, normalized to the source frame. `None` keeps the full frame.
    #[serde(default)]
    pub crop: Option<CropRect>,

    /// Playback speed multiplier.
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// User-authored camera pins, ordered by time.
    #[serde(default)]
    pub zoom_keyframes: Vec<ZoomKeyframe>,

    /// Global fade of automatic framing, ordered by time.
    #[serde(default)]
    pub zoom_influence_points: Vec<InfluencePoint>,

    /// Precomputed dense camera path.
    #[serde(default)]
    pub smooth_motion_path: Option<Vec<MotionPoint>>,

    /// Text overlays.
    #[serde(default)]
    pub text_segments: Vec<TextOverlay>,
}

fn default_speed() -> f64 {
    1.0
}

/// Crop rectangle normalized to `[0, 1]` of the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A crop rectangle resolved to whole source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Easing applied when transitioning into a keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum KeyframeEasing {
    Linear,
    #[default]
    #[serde(alias = "ease_out", alias = "easeout")]
    EaseOut,
}

impl KeyframeEasing {
    /// Apply the easing curve to a progress value in `[0, 1]`.
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseOut => 1.0 - (1.0 - t).powi(3),
        }
    }
}

/// A user-authored camera pin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoomKeyframe {
    /// Time on the source timeline (seconds).
    pub time: f64,

    /// Suggested transition length authored in the editor.
    #[serde(default, rename = "duration")]
    pub duration_hint: f64,

    /// Zoom factor (≥ 1.0).
    pub zoom_factor: f64,

    /// Camera center, normalized.
    pub position_x: f64,
    pub position_y: f64,

    #[serde(default, rename = "easingType")]
    pub easing: KeyframeEasing,
}

impl ZoomKeyframe {
    pub fn new(time: f64, zoom_factor: f64, position_x: f64, position_y: f64) -> Self {
        Self {
            time,
            duration_hint: 0.0,
            zoom_factor,
            position_x,
            position_y,
            easing: KeyframeEasing::EaseOut,
        }
    }

    /// The camera this keyframe pins, clamped.
    pub fn camera_state(&self) -> CameraState {
        CameraState::new(self.time, self.zoom_factor, self.position_x, self.position_y)
    }
}

/// One point on the influence curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InfluencePoint {
    pub time: f64,
    /// Influence in `[0, 1]`; 0 = neutral camera, 1 = full automatic framing.
    pub value: f64,
}

/// One sample of a precomputed dense camera path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionPoint {
    pub time: f64,
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl From<&MotionPoint> for CameraState {
    fn from(p: &MotionPoint) -> Self {
        CameraState::new(p.time, p.zoom, p.x, p.y)
    }
}

impl From<&CameraState> for MotionPoint {
    fn from(s: &CameraState) -> Self {
        MotionPoint {
            time: s.time,
            x: s.position_x,
            y: s.position_y,
            zoom: s.zoom_factor,
        }
    }
}

/// A text overlay shown during `[start_time, end_time]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextOverlay {
    pub id: String,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub style: TextStyle,
}

impl TextOverlay {
    /// Whether the overlay is visible at `time`.
    pub fn is_active(&self, time: f64) -> bool {
        time >= self.start_time && time <= self.end_time
    }
}

/// Text overlay styling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextStyle {
    /// Font size in output pixels.
    pub font_size: f64,
    /// Hex color (`#RRGGBB` or `#RRGGBBAA`).
    pub color: String,
    /// Anchor position as a percentage of canvas width.
    pub x: f64,
    /// Anchor position as a percentage of canvas height.
    pub y: f64,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 48.0,
            color: "#ffffff".to_string(),
            x: 50.0,
            y: 50.0,
        }
    }
}

impl CropRect {
    /// The whole source frame.
    pub const FULL: CropRect = CropRect {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    /// Clamp into the unit square with a minimum 1% extent.
    pub fn clamped(&self) -> CropRect {
        let x = self.x.clamp(0.0, 0.99);
        let y = self.y.clamp(0.0, 0.99);
        CropRect {
            x,
            y,
            width: self.width.clamp(0.01, 1.0 - x),
            height: self.height.clamp(0.01, 1.0 - y),
        }
    }

    /// Whether the rectangle lies inside `[0,1]²` with a positive area.
    pub fn is_valid(&self) -> bool {
        const EPS: f64 = 1e-9;
        self.width > 0.0
            && self.height > 0.0
            && self.x >= -EPS
            && self.y >= -EPS
            && self.x + self.width <= 1.0 + EPS
            && self.y + self.height <= 1.0 + EPS
    }

    /// Resolve to source pixels, keeping at least one pixel in each direction.
    pub fn to_pixels(&self, source_width: u32, source_height: u32) -> PixelRect {
        let c = self.clamped();
        let sw = source_width.max(1) as f64;
        let sh = source_height.max(1) as f64;
        let x = (c.x * sw).round().min(sw - 1.0) as u32;
        let y = (c.y * sh).round().min(sh - 1.0) as u32;
        let width = ((c.width * sw).round() as u32).clamp(1, source_width.max(1) - x);
        let height = ((c.height * sh).round() as u32).clamp(1, source_height.max(1) - y);
        PixelRect {
            x,
            y,
            width,
            height,
        }
    }
}

impl Default for CropRect {
    fn default() -> Self {
        Self::FULL
    }
}

impl VideoSegment {
    /// A segment over `[trim_start, trim_end]` with no decisions.
    pub fn new(trim_start: f64, trim_end: f64) -> Self {
        Self {
            trim_start,
            trim_end,
            crop: None,
            speed: 1.0,
            zoom_keyframes: vec![],
            zoom_influence_points: vec![],
            smooth_motion_path: None,
            text_segments: vec![],
        }
    }

    /// Segment length on the source timeline.
    pub fn duration(&self) -> f64 {
        (self.trim_end - self.trim_start).max(0.0)
    }

    /// Crop rectangle, defaulting to the full frame.
    pub fn crop_or_full(&self) -> CropRect {
        self.crop.unwrap_or(CropRect::FULL)
    }

    /// Check the segment invariants.
    pub fn validate(&self) -> Result<(), ProjectError> {
        let invalid = |message: String| Err(ProjectError::ValidationError { message });

        if !(self.trim_start.is_finite() && self.trim_end.is_finite()) {
            return invalid("trim bounds must be finite".to_string());
        }
        if self.trim_start >= self.trim_end {
            return invalid(format!(
                "trimStart ({}) must be before trimEnd ({})",
                self.trim_start, self.trim_end
            ));
        }
        if !(self.speed > 0.0 && self.speed.is_finite()) {
            return invalid(format!("speed must be positive, got {}", self.speed));
        }
        if let Some(crop) = &self.crop {
            if !crop.is_valid() {
                return invalid(format!("crop {crop:?} is outside the unit frame"));
            }
        }
        if let Some(kf) = self.zoom_keyframes.iter().find(|kf| kf.zoom_factor < 1.0) {
            return invalid(format!(
                "keyframe at {}s has zoom {} below 1.0",
                kf.time, kf.zoom_factor
            ));
        }
        if let Some(text) = self
            .text_segments
            .iter()
            .find(|t| t.end_time < t.start_time)
        {
            return invalid(format!("text overlay '{}' ends before it starts", text.id));
        }
        Ok(())
    }

    /// Sort keyframes and influence points by time and clamp their values.
    pub fn normalize(&mut self) {
        self.zoom_keyframes
            .sort_by(|a, b| a.time.total_cmp(&b.time));
        for kf in &mut self.zoom_keyframes {
            kf.zoom_factor = clamp_zoom(kf.zoom_factor);
            kf.position_x = kf.position_x.clamp(0.0, 1.0);
            kf.position_y = kf.position_y.clamp(0.0, 1.0);
        }

        self.zoom_influence_points
            .sort_by(|a, b| a.time.total_cmp(&b.time));
        for p in &mut self.zoom_influence_points {
            p.value = p.value.clamp(0.0, 1.0);
        }

        if let Some(path) = &mut self.smooth_motion_path {
            path.sort_by(|a, b| a.time.total_cmp(&b.time));
        }

        self.crop = self.crop.map(|c| c.clamped());
    }

    /// Text overlays visible at `time`, in declaration order.
    pub fn active_text_at(&self, time: f64) -> impl Iterator<Item = &TextOverlay> {
        self.text_segments.iter().filter(move |t| t.is_active(time))
    }

    /// Stable hash of the camera-relevant fields, used as a cache key.
    pub fn camera_fingerprint(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.trim_start.to_bits().hash(&mut hasher);
        self.trim_end.to_bits().hash(&mut hasher);
        let crop = self.crop_or_full();
        for v in [crop.x, crop.y, crop.width, crop.height] {
            v.to_bits().hash(&mut hasher);
        }
        for kf in &self.zoom_keyframes {
            for v in [kf.time, kf.zoom_factor, kf.position_x, kf.position_y] {
                v.to_bits().hash(&mut hasher);
            }
            kf.easing.hash(&mut hasher);
        }
        hasher.finish()
    }
}
