//! Pointer telemetry types.
//!
//! The editor hands over cursor telemetry as [`MousePosition`] records
//! (source-pixel coordinates, loosely typed cursor name). They are converted
//! once into [`PointerSample`]s, where the cursor shape is a closed enum and
//! samples are ordered by timestamp.

use serde::{Deserialize, Serialize};

/// Shape of the cursor glyph at a given sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CursorKind {
    #[default]
    Default,
    Text,
    Pointer,
}

impl CursorKind {
    /// Resolve a cursor name as recorded by the editor.
    ///
    /// Unknown names fall back to [`CursorKind::Default`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "text" | "ibeam" | "i-beam" => Self::Text,
            "pointer" | "hand" => Self::Pointer,
            _ => Self::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Text => "text",
            Self::Pointer => "pointer",
        }
    }
}

/// One recorded pointer sample in source-pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerSample {
    /// Seconds since recording start.
    pub timestamp: f64,
    /// Horizontal position in source pixels.
    pub x: f64,
    /// Vertical position in source pixels.
    pub y: f64,
    /// Whether a mouse button is held.
    pub is_clicked: bool,
    /// Cursor glyph shape.
    #[serde(default)]
    pub cursor_kind: CursorKind,
}

impl PointerSample {
    pub fn new(timestamp: f64, x: f64, y: f64) -> Self {
        Self {
            timestamp,
            x,
            y,
            is_clicked: false,
            cursor_kind: CursorKind::Default,
        }
    }

    /// Same sample with the click flag set.
    pub fn clicked(mut self) -> Self {
        self.is_clicked = true;
        self
    }

    /// Euclidean distance to another sample in pixels.
    pub fn distance_to(&self, other: &PointerSample) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Mouse position as produced by the editor (wire format).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MousePosition {
    pub x: f64,
    pub y: f64,
    pub timestamp: f64,
    #[serde(rename = "isClicked", default)]
    pub is_clicked: bool,
    #[serde(alias = "cursorType", default = "default_cursor_type")]
    pub cursor_type: String,
}

fn default_cursor_type() -> String {
    "default".to_string()
}

impl From<&MousePosition> for PointerSample {
    fn from(pos: &MousePosition) -> Self {
        Self {
            timestamp: pos.timestamp,
            x: pos.x,
            y: pos.y,
            is_clicked: pos.is_clicked,
            cursor_kind: CursorKind::from_name(&pos.cursor_type),
        }
    }
}

impl From<&PointerSample> for MousePosition {
    fn from(sample: &PointerSample) -> Self {
        Self {
            x: sample.x,
            y: sample.y,
            timestamp: sample.timestamp,
            is_clicked: sample.is_clicked,
            cursor_type: sample.cursor_kind.as_str().to_string(),
        }
    }
}

/// Convert editor mouse positions into ordered pointer samples.
///
/// Non-finite records are dropped. The sort is stable, so duplicates keep
/// their recorded order.
pub fn ingest_mouse_positions(positions: &[MousePosition]) -> Vec<PointerSample> {
    let mut samples: Vec<PointerSample> = positions
        .iter()
        .filter(|p| p.timestamp.is_finite() && p.x.is_finite() && p.y.is_finite())
        .map(PointerSample::from)
        .collect();
    samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    samples
}
