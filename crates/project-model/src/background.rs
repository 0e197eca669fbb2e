//! Canvas styling around the recorded content.

use serde::{Deserialize, Serialize};

/// Fill style drawn underneath the video content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum BackgroundType {
    #[default]
    Solid,
    Gradient1,
    Gradient2,
    Gradient3,
    Custom,
    None,
}

impl BackgroundType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Solid => "solid",
            Self::Gradient1 => "gradient1",
            Self::Gradient2 => "gradient2",
            Self::Gradient3 => "gradient3",
            Self::Custom => "custom",
            Self::None => "none",
        }
    }
}

impl From<String> for BackgroundType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "gradient1" => Self::Gradient1,
            "gradient2" => Self::Gradient2,
            "gradient3" => Self::Gradient3,
            "custom" => Self::Custom,
            "none" | "transparent" => Self::None,
            _ => Self::Solid,
        }
    }
}

impl From<BackgroundType> for String {
    fn from(value: BackgroundType) -> Self {
        value.as_str().to_string()
    }
}

/// Background, framing and cursor styling for one export or playback run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackgroundConfig {
    /// Content size as a percentage of the canvas (100 = edge to edge).
    pub scale: f64,

    /// Corner radius of the content box in output pixels.
    pub border_radius: f64,

    pub background_type: BackgroundType,

    /// Custom background image: a file path or a `data:image/...;base64,` URL.
    pub custom_background: Option<String>,

    /// Drop shadow blur size in output pixels (0 disables the shadow).
    pub shadow: f64,

    /// Cursor glyph scale relative to its native size.
    pub cursor_scale: f64,

    /// Cursor smoothing level in `[0, 1]`.
    pub cursor_smoothness: f64,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            scale: 90.0,
            border_radius: 16.0,
            background_type: BackgroundType::Solid,
            custom_background: None,
            shadow: 20.0,
            cursor_scale: 1.0,
            cursor_smoothness: 0.5,
        }
    }
}

impl BackgroundConfig {
    /// Content scale as a fraction in `(0, 1]`.
    pub fn scale_fraction(&self) -> f64 {
        (self.scale / 100.0).clamp(0.05, 1.0)
    }
}
