//! Frame sinks: consumers of the encoded export frames.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

use flowcam_common::error::{FlowcamError, FlowcamResult};

use crate::ffmpeg::{self, EncoderSettings};

/// Start configuration handed to a sink.
pub use flowcam_project_model::ExportConfig as SinkConfig;

/// Acknowledgement returned by a started sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkHandle {
    /// Human-readable description of where frames go.
    pub destination: String,
}

/// Summary returned once a sink has finalized its output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub frames_received: u64,
    pub bytes_received: u64,
    pub output: Option<PathBuf>,
}

/// Consumer of JPEG frames produced by the export driver.
///
/// Frames are submitted in order; `finish` marks end of stream.
#[async_trait]
pub trait FrameSink: Send {
    async fn start(&mut self, config: &SinkConfig) -> FlowcamResult<SinkHandle>;

    async fn submit(&mut self, jpeg: &[u8]) -> FlowcamResult<()>;

    async fn finish(&mut self) -> FlowcamResult<SinkReport>;
}

fn check_config(config: &SinkConfig) -> FlowcamResult<()> {
    config
        .validate()
        .map_err(|e| FlowcamError::sink_unavailable(format!("Rejected sink config: {e}")))
}

struct EncoderProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_task: JoinHandle<String>,
}

/// H.264 encoder fed with MJPEG frames over stdin.
pub struct FfmpegSink {
    output: PathBuf,
    settings: EncoderSettings,
    process: Option<EncoderProcess>,
    frames: u64,
    bytes: u64,
}

impl FfmpegSink {
    pub fn new(output: impl Into<PathBuf>, settings: EncoderSettings) -> Self {
        Self {
            output: output.into(),
            settings,
            process: None,
            frames: 0,
            bytes: 0,
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }
}

#[async_trait]
impl FrameSink for FfmpegSink {
    async fn start(&mut self, config: &SinkConfig) -> FlowcamResult<SinkHandle> {
        check_config(config)?;
        if self.process.is_some() {
            return Err(FlowcamError::invalid_state("Encoder already started"));
        }

        if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                FlowcamError::sink_unavailable(format!(
                    "Cannot create output directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let args = ffmpeg::encoder_args(
            config,
            &self.settings,
            config.audio_path.as_deref(),
            &self.output,
        );
        tracing::debug!(args = ?args, "Running ffmpeg");

        let mut child = Command::new(&self.settings.ffmpeg_binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FlowcamError::sink_unavailable(format!("Failed to start ffmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FlowcamError::sink_unavailable("Failed to capture ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| FlowcamError::sink_unavailable("Failed to capture ffmpeg stderr"))?;

        // Drain stderr so ffmpeg never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match stderr.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        tracing::info!(
            pid = child.id(),
            width = config.width,
            height = config.height,
            framerate = config.framerate,
            audio = config.audio_path.is_some(),
            output = %self.output.display(),
            "ffmpeg process started"
        );

        self.process = Some(EncoderProcess {
            child,
            stdin: Some(stdin),
            stderr_task,
        });
        self.frames = 0;
        self.bytes = 0;

        Ok(SinkHandle {
            destination: self.output.display().to_string(),
        })
    }

    async fn submit(&mut self, jpeg: &[u8]) -> FlowcamResult<()> {
        let stdin = self
            .process
            .as_mut()
            .and_then(|p| p.stdin.as_mut())
            .ok_or_else(|| FlowcamError::sink_unavailable("Encoder is not running"))?;
        stdin
            .write_all(jpeg)
            .await
            .map_err(|e| FlowcamError::sink_unavailable(format!("Failed writing frame to ffmpeg: {e}")))?;
        self.frames += 1;
        self.bytes += jpeg.len() as u64;
        Ok(())
    }

    async fn finish(&mut self) -> FlowcamResult<SinkReport> {
        let mut process = self
            .process
            .take()
            .ok_or_else(|| FlowcamError::sink_unavailable("Encoder is not running"))?;

        if let Some(mut stdin) = process.stdin.take() {
            if let Err(e) = stdin.shutdown().await {
                tracing::debug!(error = %e, "Closing ffmpeg stdin failed");
            }
        }

        let status = process
            .child
            .wait()
            .await
            .map_err(|e| FlowcamError::sink_unavailable(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = process
            .stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(FlowcamError::sink_unavailable(format!(
                "ffmpeg export failed (status {}): {}",
                status,
                stderr_output.trim()
            )));
        }

        tracing::info!(
            frames = self.frames,
            output = %self.output.display(),
            "ffmpeg finished"
        );

        Ok(SinkReport {
            frames_received: self.frames,
            bytes_received: self.bytes,
            output: Some(self.output.clone()),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FrameManifest {
    width: u32,
    height: u32,
    framerate: u32,
    frames: u64,
    trim_start: f64,
    duration: f64,
    speed: f64,
    audio_path: Option<PathBuf>,
    created_at: String,
}

/// Writes every frame as a numbered JPEG plus a `manifest.json`.
pub struct DirectorySink {
    dir: PathBuf,
    config: Option<SinkConfig>,
    frames: u64,
    bytes: u64,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            config: None,
            frames: 0,
            bytes: 0,
        }
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{index:06}.jpg"))
    }
}

#[async_trait]
impl FrameSink for DirectorySink {
    async fn start(&mut self, config: &SinkConfig) -> FlowcamResult<SinkHandle> {
        check_config(config)?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            FlowcamError::sink_unavailable(format!(
                "Cannot create frame directory {}: {e}",
                self.dir.display()
            ))
        })?;
        self.config = Some(config.clone());
        self.frames = 0;
        self.bytes = 0;
        tracing::info!(dir = %self.dir.display(), "Frame directory sink started");
        Ok(SinkHandle {
            destination: self.dir.display().to_string(),
        })
    }

    async fn submit(&mut self, jpeg: &[u8]) -> FlowcamResult<()> {
        if self.config.is_none() {
            return Err(FlowcamError::sink_unavailable("Frame directory sink is not started"));
        }
        let path = self.frame_path(self.frames);
        tokio::fs::write(&path, jpeg).await.map_err(|e| {
            FlowcamError::sink_unavailable(format!("Failed writing {}: {e}", path.display()))
        })?;
        self.frames += 1;
        self.bytes += jpeg.len() as u64;
        Ok(())
    }

    async fn finish(&mut self) -> FlowcamResult<SinkReport> {
        let config = self
            .config
            .take()
            .ok_or_else(|| FlowcamError::sink_unavailable("Frame directory sink is not started"))?;

        let manifest = FrameManifest {
            width: config.width,
            height: config.height,
            framerate: config.framerate,
            frames: self.frames,
            trim_start: config.trim_start,
            duration: config.duration,
            speed: config.speed,
            audio_path: config.audio_path.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let manifest_path = self.dir.join("manifest.json");
        let json = serde_json::to_string_pretty(&manifest)?;
        tokio::fs::write(&manifest_path, json).await.map_err(|e| {
            FlowcamError::sink_unavailable(format!("Failed writing {}: {e}", manifest_path.display()))
        })?;

        Ok(SinkReport {
            frames_received: self.frames,
            bytes_received: self.bytes,
            output: Some(self.dir.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcam_project_model::{BackgroundConfig, VideoSegment};

    fn sink_config(width: u32, height: u32) -> SinkConfig {
        SinkConfig {
            width,
            height,
            framerate: 30,
            audio_path: None,
            trim_start: 0.0,
            duration: 1.0,
            speed: 1.0,
            segment: VideoSegment::new(0.0, 1.0),
            background_config: BackgroundConfig::default(),
            mouse_positions: vec![],
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("flowcam-sink-{name}-{}", std::process::id()))
    }

    #[tokio::test]
    async fn test_directory_sink_writes_frames_and_manifest() {
        let dir = temp_dir("frames");
        let _ = std::fs::remove_dir_all(&dir);

        let mut sink = DirectorySink::new(&dir);
        sink.start(&sink_config(64, 36)).await.unwrap();
        sink.submit(b"frame-a").await.unwrap();
        sink.submit(b"frame-b").await.unwrap();
        let report = sink.finish().await.unwrap();

        assert_eq!(report.frames_received, 2);
        assert_eq!(report.bytes_received, 14);
        assert_eq!(std::fs::read(dir.join("frame_000001.jpg")).unwrap(), b"frame-b");

        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("manifest.json")).unwrap())
                .unwrap();
        assert_eq!(manifest["frames"], 2);
        assert_eq!(manifest["framerate"], 30);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_sinks_reject_odd_dimensions() {
        let mut sink = DirectorySink::new(temp_dir("odd"));
        let err = sink.start(&sink_config(63, 36)).await.unwrap_err();
        assert!(matches!(err, FlowcamError::SinkUnavailable { .. }));

        let mut encoder = FfmpegSink::new("/tmp/never.mp4", EncoderSettings::default());
        let err = encoder.start(&sink_config(64, 0)).await.unwrap_err();
        assert!(matches!(err, FlowcamError::SinkUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_submit_before_start_is_sink_unavailable() {
        let mut sink = DirectorySink::new(temp_dir("unstarted"));
        let err = sink.submit(b"x").await.unwrap_err();
        assert!(matches!(err, FlowcamError::SinkUnavailable { .. }));
        assert!(!err.is_frame_recoverable());
    }

    #[tokio::test]
    async fn test_encoder_not_running_is_sink_unavailable() {
        let mut encoder = FfmpegSink::new("/tmp/never.mp4", EncoderSettings::default());
        let err = encoder.submit(b"x").await.unwrap_err();
        assert!(matches!(err, FlowcamError::SinkUnavailable { .. }));
        let err = encoder.finish().await.unwrap_err();
        assert!(matches!(err, FlowcamError::SinkUnavailable { .. }));
    }
}
