//! Project bundle and export configuration types.
//!
//! A project bundle is a directory that ties together the source media,
//! the edited segment, background styling and the recorded cursor trace:
//!
//! ```text
//! <root>/
//!   sources/            source video and audio
//!   meta/project.json   metadata and export settings
//!   meta/segment.json   VideoSegment
//!   meta/background.json BackgroundConfig
//!   meta/mouse.json     MousePosition[]
//!   exports/            default output location
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::background::BackgroundConfig;
use crate::event::MousePosition;
use crate::segment::VideoSegment;

/// Top-level project file (`meta/project.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Schema version.
    pub version: String,

    /// Human-readable project name.
    pub name: String,

    /// Unique project identifier.
    pub id: String,

    /// Creation timestamp (ISO 8601).
    pub created_at: String,

    /// Last modified timestamp (ISO 8601).
    pub modified_at: String,

    /// Source video track.
    pub source: Option<TrackRef>,

    /// Separate audio track, if any.
    #[serde(default)]
    pub audio: Option<TrackRef>,

    /// Export settings.
    #[serde(default)]
    pub export: ExportSettings,
}

/// Reference to a media file (relative to project root).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRef {
    /// Relative path from project root to the media file.
    pub path: String,

    /// Duration in seconds (0 when unknown).
    #[serde(default)]
    pub duration_secs: f64,

    /// Frame size in pixels, when known.
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// Output size presets applied at export start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DimensionPreset {
    /// Cropped source size.
    #[default]
    #[serde(rename = "original")]
    Original,
    /// 1080 pixels tall, width from the cropped aspect ratio.
    #[serde(rename = "1080p")]
    P1080,
    /// 720 pixels tall, width from the cropped aspect ratio.
    #[serde(rename = "720p")]
    P720,
}

impl DimensionPreset {
    /// Fixed output height, or `None` to keep the cropped source size.
    pub fn target_height(&self) -> Option<u32> {
        match self {
            Self::Original => None,
            Self::P1080 => Some(1080),
            Self::P720 => Some(720),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::P1080 => "1080p",
            Self::P720 => "720p",
        }
    }
}

impl FromStr for DimensionPreset {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "original" | "source" => Ok(Self::Original),
            "1080p" | "1080" => Ok(Self::P1080),
            "720p" | "720" => Ok(Self::P720),
            other => Err(ProjectError::ValidationError {
                message: format!("Unknown dimension preset: {other}. Use: original, 1080p, 720p"),
            }),
        }
    }
}

/// Export settings stored with the project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Output size preset.
    pub dimensions: DimensionPreset,

    /// Output frame rate.
    pub fps: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            dimensions: DimensionPreset::Original,
            fps: 60,
        }
    }
}

/// Configuration handed to a frame sink when it is started.
///
/// Field names follow the encoder's camelCase control protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportConfig {
    /// Output width in pixels (even).
    pub width: u32,

    /// Output height in pixels (even).
    pub height: u32,

    /// Output frame rate.
    pub framerate: u32,

    /// Audio file to mux, if any.
    pub audio_path: Option<PathBuf>,

    /// Segment start on the source timeline.
    pub trim_start: f64,

    /// Segment length on the source timeline.
    pub duration: f64,

    /// Playback speed multiplier.
    pub speed: f64,

    pub segment: VideoSegment,

    pub background_config: BackgroundConfig,

    pub mouse_positions: Vec<MousePosition>,
}

impl ExportConfig {
    /// Check what a sink needs to accept this configuration.
    pub fn validate(&self) -> Result<(), ProjectError> {
        let invalid = |message: String| Err(ProjectError::ValidationError { message });

        if self.width == 0 || self.height == 0 {
            return invalid(format!(
                "output size must be non-zero, got {}x{}",
                self.width, self.height
            ));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return invalid(format!(
                "output size must be even, got {}x{}",
                self.width, self.height
            ));
        }
        if self.framerate == 0 {
            return invalid("framerate must be positive".to_string());
        }
        if !(self.speed > 0.0 && self.speed.is_finite()) {
            return invalid(format!("speed must be positive, got {}", self.speed));
        }
        if !(self.duration > 0.0) {
            return invalid(format!("duration must be positive, got {}", self.duration));
        }
        Ok(())
    }
}

/// The complete in-memory representation of a loaded project bundle.
#[derive(Debug, Clone)]
pub struct LoadedProject {
    /// Filesystem path to the project directory.
    pub root: PathBuf,

    /// Project metadata.
    pub project: Project,

    /// Edited segment.
    pub segment: VideoSegment,

    /// Canvas styling.
    pub background: BackgroundConfig,

    /// Recorded cursor trace.
    pub mouse_positions: Vec<MousePosition>,
}

impl Project {
    /// Create a new project with defaults.
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            version: "1.0".to_string(),
            name: name.into(),
            id: project_id(),
            created_at: now.clone(),
            modified_at: now,
            source: None,
            audio: None,
            export: ExportSettings::default(),
        }
    }
}

impl LoadedProject {
    /// Load a project from a directory.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let root = root.as_ref().to_path_buf();
        let meta = root.join("meta");

        let project: Project = read_json(&meta.join("project.json"))?;
        let segment: VideoSegment = read_json(&meta.join("segment.json"))?;

        let background_path = meta.join("background.json");
        let background = if background_path.exists() {
            read_json(&background_path)?
        } else {
            BackgroundConfig::default()
        };

        let mouse_path = meta.join("mouse.json");
        let mouse_positions = if mouse_path.exists() {
            read_json(&mouse_path)?
        } else {
            vec![]
        };

        Ok(Self {
            root,
            project,
            segment,
            background,
            mouse_positions,
        })
    }

    /// Save all metadata files to disk.
    pub fn save(&self) -> Result<(), ProjectError> {
        let meta_dir = self.root.join("meta");
        std::fs::create_dir_all(&meta_dir).map_err(|e| ProjectError::IoError {
            path: meta_dir.clone(),
            source: e,
        })?;

        write_json(&meta_dir.join("project.json"), &self.project)?;
        write_json(&meta_dir.join("segment.json"), &self.segment)?;
        write_json(&meta_dir.join("background.json"), &self.background)?;
        write_json(&meta_dir.join("mouse.json"), &self.mouse_positions)?;
        Ok(())
    }

    /// Create a new project on disk with the standard directory structure.
    pub fn create(
        root: impl AsRef<Path>,
        name: impl Into<String>,
        segment: VideoSegment,
    ) -> Result<Self, ProjectError> {
        let root = root.as_ref().to_path_buf();

        for subdir in &["sources", "meta", "exports"] {
            std::fs::create_dir_all(root.join(subdir)).map_err(|e| ProjectError::IoError {
                path: root.join(subdir),
                source: e,
            })?;
        }

        let loaded = Self {
            root,
            project: Project::new(name),
            segment,
            background: BackgroundConfig::default(),
            mouse_positions: vec![],
        };
        loaded.save()?;
        Ok(loaded)
    }

    /// Absolute path of the source video, if one is referenced.
    pub fn source_path(&self) -> Option<PathBuf> {
        self.project.source.as_ref().map(|t| self.root.join(&t.path))
    }

    /// Absolute path of the audio track, if one is referenced.
    pub fn audio_path(&self) -> Option<PathBuf> {
        self.project.audio.as_ref().map(|t| self.root.join(&t.path))
    }

    /// Validate segment invariants and that all referenced files exist.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = vec![];

        if let Err(e) = self.segment.validate() {
            errors.push(e.to_string());
        }

        match &self.project.source {
            Some(track) => {
                if !self.root.join(&track.path).exists() {
                    errors.push(format!("Source missing: {}", track.path));
                }
            }
            None => errors.push("No source video referenced".to_string()),
        }

        if let Some(track) = &self.project.audio {
            if !self.root.join(&track.path).exists() {
                errors.push(format!("Audio missing: {}", track.path));
            }
        }

        errors
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ProjectError> {
    let content = std::fs::read_to_string(path).map_err(|e| ProjectError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| ProjectError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ProjectError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| ProjectError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    std::fs::write(path, json).map_err(|e| ProjectError::IoError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Errors that can occur when working with projects.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid project: {message}")]
    ValidationError { message: String },
}

impl From<ProjectError> for flowcam_common::FlowcamError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::IoError { path, source } if source.kind() == std::io::ErrorKind::NotFound => {
                flowcam_common::FlowcamError::FileNotFound { path }
            }
            other => flowcam_common::FlowcamError::project(other.to_string()),
        }
    }
}

/// Time-derived project identifier.
fn project_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!(
        "{:08x}-{:04x}-{:04x}",
        (nanos & 0xFFFF_FFFF) as u32,
        ((nanos >> 32) & 0xFFFF) as u16,
        ((nanos >> 48) & 0xFFFF) as u16
    )
}
