//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Export defaults.
    pub export: ExportDefaults,

    /// Automatic camera defaults.
    pub camera: CameraDefaults,

    /// Compositor defaults.
    pub render: RenderDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Virtual frame rate of the export loop.
    pub fps: u32,

    /// JPEG quality used for frames handed to the sink (1-100).
    pub jpeg_quality: u8,

    /// Upper bound on a single source seek before falling back.
    pub seek_timeout_ms: u64,

    /// Encoder binary name or path.
    pub ffmpeg_binary: String,

    /// Probe binary name or path.
    pub ffprobe_binary: String,

    /// x264 preset.
    pub video_preset: String,

    /// x264 constant rate factor.
    pub video_crf: u32,

    /// AAC bitrate in kbps.
    pub audio_bitrate_kbps: u32,
}

/// Default camera motion parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraDefaults {
    /// Resting zoom when no rule applies.
    pub base_zoom: f64,

    /// Zoom floor reached at the velocity ceiling.
    pub min_zoom: f64,

    /// Zoom ceiling reached after a long dwell.
    pub max_zoom: f64,

    /// Pointer speed (source px/s) at which zoom bottoms out.
    pub velocity_ceiling: f64,
}

/// Default compositor parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderDefaults {
    /// Font used for text overlays. Common system locations are tried when unset.
    pub font_path: Option<PathBuf>,

    /// Drop shadow opacity [0.0, 1.0].
    pub shadow_opacity: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "flowcam=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            fps: 60,
            jpeg_quality: 95,
            seek_timeout_ms: 2000,
            ffmpeg_binary: "ffmpeg".to_string(),
            ffprobe_binary: "ffprobe".to_string(),
            video_preset: "fast".to_string(),
            video_crf: 20,
            audio_bitrate_kbps: 192,
        }
    }
}

impl Default for CameraDefaults {
    fn default() -> Self {
        Self {
            base_zoom: 1.4,
            min_zoom: 1.0,
            max_zoom: 2.2,
            velocity_ceiling: 400.0,
        }
    }
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            font_path: None,
            shadow_opacity: 0.5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("flowcam").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let raw = r#"{ "export": { "fps": 30 }, "logging": { "level": "debug" } }"#;
        let config: AppConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.export.fps, 30);
        assert_eq!(config.export.jpeg_quality, 95);
        assert_eq!(config.logging.level, "debug");
        assert!((config.camera.base_zoom - 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_load_from_invalid_file_falls_back() {
        let path = std::env::temp_dir().join("flowcam_test_bad_config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = AppConfig::load_from(&path);
        assert_eq!(config.export.fps, 60);
        std::fs::remove_file(&path).ok();
    }
}
