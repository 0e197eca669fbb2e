//! Source media references and frame sources.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

use flowcam_common::error::{FlowcamError, FlowcamResult};

use crate::ffmpeg;

/// Forward seeks further than this restart the decoder instead of reading through.
const FAR_SEEK_SECS: f64 = 2.0;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Where the recorded video comes from.
#[derive(Debug, Clone)]
pub enum SourceRef {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

/// Where the voice-over audio comes from.
#[derive(Debug, Clone, Default)]
pub enum AudioRef {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
    #[default]
    None,
}

/// A file on disk backing a source, removed on drop when it was written by us.
#[derive(Debug)]
pub struct MaterializedFile {
    path: PathBuf,
    temporary: bool,
}

impl MaterializedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MaterializedFile {
    fn drop(&mut self) {
        if self.temporary {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::debug!(path = %self.path.display(), error = %e, "Temp media cleanup failed");
            }
        }
    }
}

fn write_temp_file(label: &str, bytes: &[u8]) -> FlowcamResult<MaterializedFile> {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let path = std::env::temp_dir().join(format!(
        "flowcam-{label}-{}-{nanos}-{}.bin",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::write(&path, bytes).map_err(|e| {
        FlowcamError::data_extraction(format!(
            "Failed to materialize {label} at {}: {e}",
            path.display()
        ))
    })?;
    Ok(MaterializedFile {
        path,
        temporary: true,
    })
}

impl SourceRef {
    /// Resolve to a readable file.
    ///
    /// Byte payloads are written to a uniquely named temp file.
    pub fn materialize(&self) -> FlowcamResult<MaterializedFile> {
        match self {
            Self::Path(path) => {
                if !path.is_file() {
                    return Err(FlowcamError::data_extraction(format!(
                        "Source video not found: {}",
                        path.display()
                    )));
                }
                Ok(MaterializedFile {
                    path: path.clone(),
                    temporary: false,
                })
            }
            Self::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(FlowcamError::data_extraction("Source video payload is empty"));
                }
                write_temp_file("source", bytes)
            }
        }
    }
}

impl AudioRef {
    /// Resolve to a readable file, or `None` when there is no usable audio.
    ///
    /// Failures are logged and treated as "no audio".
    pub fn materialize(&self) -> Option<MaterializedFile> {
        let result = match self {
            Self::None => return None,
            Self::Path(path) if path.is_file() => Ok(MaterializedFile {
                path: path.clone(),
                temporary: false,
            }),
            Self::Path(path) => Err(FlowcamError::data_extraction(format!(
                "Audio file not found: {}",
                path.display()
            ))),
            Self::Bytes(bytes) if bytes.is_empty() => {
                Err(FlowcamError::data_extraction("Audio payload is empty"))
            }
            Self::Bytes(bytes) => write_temp_file("audio", bytes),
        };

        match result {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!(error = %e, "Audio extraction failed, exporting without audio");
                None
            }
        }
    }
}

/// One decoded source frame.
#[derive(Debug, Clone)]
pub struct SourceFrame {
    /// Source timeline position in seconds.
    pub time: f64,
    pub image: Arc<RgbaImage>,
}

impl SourceFrame {
    pub fn new(time: f64, image: RgbaImage) -> Self {
        Self {
            time,
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Whether the frame carries decodable pixels.
    pub fn is_ready(&self) -> bool {
        self.image.width() > 0 && self.image.height() > 0
    }
}

/// A seekable stream of decoded frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Frame size in source pixels.
    fn dimensions(&self) -> (u32, u32);

    fn duration_secs(&self) -> f64;

    /// Position the source at `time`. Completion means `current_frame`
    /// reflects the new position.
    async fn seek(&mut self, time: f64) -> FlowcamResult<()>;

    /// The frame at the current position, or `None` when not ready.
    fn current_frame(&self) -> Option<SourceFrame>;
}

/// Frames held in memory with nearest-not-after lookup.
pub struct MemoryFrameSource {
    width: u32,
    height: u32,
    frames: Vec<SourceFrame>,
    position: Option<usize>,
    seek_delay: Option<Duration>,
}

impl MemoryFrameSource {
    pub fn new(width: u32, height: u32, mut frames: Vec<SourceFrame>) -> Self {
        frames.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            width,
            height,
            frames,
            position: None,
            seek_delay: None,
        }
    }

    /// Build a source from equally spaced images starting at t = 0.
    pub fn from_image_sequence(images: Vec<RgbaImage>, fps: u32) -> Self {
        let (width, height) = images
            .first()
            .map(|img| img.dimensions())
            .unwrap_or((0, 0));
        let step = 1.0 / fps.max(1) as f64;
        let frames = images
            .into_iter()
            .enumerate()
            .map(|(i, image)| SourceFrame::new(i as f64 * step, image))
            .collect();
        Self::new(width, height, frames)
    }

    /// Make every seek take at least `delay` before it completes.
    pub fn with_seek_delay(mut self, delay: Duration) -> Self {
        self.seek_delay = Some(delay);
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[async_trait]
impl FrameSource for MemoryFrameSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn duration_secs(&self) -> f64 {
        self.frames.last().map(|f| f.time).unwrap_or(0.0)
    }

    async fn seek(&mut self, time: f64) -> FlowcamResult<()> {
        if let Some(delay) = self.seek_delay {
            tokio::time::sleep(delay).await;
        }
        let idx = self.frames.partition_point(|f| f.time <= time + 1e-9);
        self.position = idx.checked_sub(1);
        Ok(())
    }

    fn current_frame(&self) -> Option<SourceFrame> {
        self.position.and_then(|idx| self.frames.get(idx)).cloned()
    }
}

struct Decoder {
    _child: Child,
    stdout: ChildStdout,
    start_secs: f64,
    next_index: u64,
    eof: bool,
}

/// Streaming rawvideo decoder backed by an ffmpeg child process.
///
/// Reads forward from the last position; backward or far seeks restart the
/// decoder at the requested time.
pub struct FfmpegFrameSource {
    file: MaterializedFile,
    ffmpeg: String,
    width: u32,
    height: u32,
    duration_secs: f64,
    decode_fps: u32,
    decoder: Option<Decoder>,
    current: Option<SourceFrame>,
}

impl FfmpegFrameSource {
    /// Probe `file` and prepare a decoder producing `decode_fps` frames per second.
    pub fn open(
        file: MaterializedFile,
        ffmpeg_binary: &str,
        ffprobe_binary: &str,
        decode_fps: u32,
    ) -> FlowcamResult<Self> {
        let (width, height) = ffmpeg::probe_video_dimensions(ffprobe_binary, file.path())
            .ok_or_else(|| {
                FlowcamError::data_extraction(format!(
                    "Could not probe video dimensions of {}",
                    file.path().display()
                ))
            })?;
        let duration_secs = ffmpeg::probe_duration_secs(ffprobe_binary, file.path()).unwrap_or(0.0);

        tracing::info!(
            path = %file.path().display(),
            width,
            height,
            duration_secs,
            "Opened video source"
        );

        Ok(Self {
            file,
            ffmpeg: ffmpeg_binary.to_string(),
            width,
            height,
            duration_secs,
            decode_fps: decode_fps.max(1),
            decoder: None,
            current: None,
        })
    }

    fn step_secs(&self) -> f64 {
        1.0 / self.decode_fps as f64
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    fn spawn_decoder(&self, start_secs: f64) -> FlowcamResult<Decoder> {
        let args = ffmpeg::decoder_args(self.file.path(), start_secs, self.decode_fps);
        tracing::debug!(start_secs, args = ?args, "Starting decoder");
        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FlowcamError::data_extraction(format!("Failed to start decoder: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FlowcamError::data_extraction("Failed to capture decoder stdout"))?;
        Ok(Decoder {
            _child: child,
            stdout,
            start_secs,
            next_index: 0,
            eof: false,
        })
    }

    fn needs_restart(&self, time: f64) -> bool {
        let half_step = self.step_secs() / 2.0;
        let Some(decoder) = &self.decoder else {
            return true;
        };
        let next_time = decoder.start_secs + decoder.next_index as f64 * self.step_secs();
        let behind = match &self.current {
            Some(frame) => time < frame.time - half_step,
            None => time < next_time - half_step,
        };
        behind || time > next_time + FAR_SEEK_SECS
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    async fn seek(&mut self, time: f64) -> FlowcamResult<()> {
        if self.needs_restart(time) {
            self.current = None;
            self.decoder = Some(self.spawn_decoder(time)?);
        }

        let step = self.step_secs();
        let frame_len = self.frame_len();
        let (width, height) = (self.width, self.height);
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(());
        };

        while !decoder.eof {
            let next_time = decoder.start_secs + decoder.next_index as f64 * step;
            if next_time > time + step / 2.0 {
                break;
            }

            let mut buf = vec![0u8; frame_len];
            match decoder.stdout.read_exact(&mut buf).await {
                Ok(_) => {
                    decoder.next_index += 1;
                    if let Some(image) = RgbaImage::from_raw(width, height, buf) {
                        self.current = Some(SourceFrame::new(next_time, image));
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::debug!(time_secs = next_time, "Decoder reached end of stream");
                    decoder.eof = true;
                }
                Err(e) => {
                    return Err(FlowcamError::data_extraction(format!(
                        "Failed reading decoded frame: {e}"
                    )));
                }
            }
        }

        if self.current.is_none() {
            return Err(FlowcamError::source_not_ready(format!(
                "No decoded frame at {time:.3}s"
            )));
        }
        Ok(())
    }

    fn current_frame(&self) -> Option<SourceFrame> {
        self.current.clone()
    }
}
