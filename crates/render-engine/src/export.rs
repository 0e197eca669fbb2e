//! Export driver: the deterministic seek-render-submit loop.
//!
//! One export runs at a time per [`ExportDriver`]. The loop walks a virtual
//! [`FrameClock`], seeks the source to each timestamp, renders through the
//! [`Compositor`] in export mode and pushes JPEG stills to a [`FrameSink`]
//! strictly in order. Cancellation is a cooperative flag checked once per
//! frame.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::{RgbImage, RgbaImage};
use tokio::task::JoinHandle;

use flowcam_common::clock::{FrameClock, RunClock};
use flowcam_common::config::AppConfig;
use flowcam_common::error::{FlowcamError, FlowcamResult};
use flowcam_processing_core::camera_path::CameraPathConfig;
use flowcam_project_model::background::BackgroundConfig;
use flowcam_project_model::camera::CameraState;
use flowcam_project_model::event::MousePosition;
use flowcam_project_model::project::LoadedProject;
use flowcam_project_model::segment::VideoSegment;

use crate::compositor::{Compositor, FrameInputs, RenderOptions};
use crate::ffmpeg::{command_exists, EncoderSettings};
use crate::presets::{resolve_output_dimensions, DimensionPreset};
use crate::session::RendererSession;
use crate::sink::{FfmpegSink, FrameSink, SinkConfig, SinkReport};
use crate::source::{AudioRef, FfmpegFrameSource, FrameSource, SourceRef};

/// Progress is held below this until the sink confirms the flush.
const MAX_STREAMING_PROGRESS: f64 = 0.99;

/// Progress callback for export rendering.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send>;

/// Export progress report.
#[derive(Debug, Clone)]
pub struct ExportProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Frames handled so far (submitted, skipped or failed).
    pub frames_rendered: u64,

    /// Total frames to render.
    pub total_frames: u64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    /// Current stage.
    pub stage: ExportStage,
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    Rendering,
    Finalizing,
    Complete,
    Cancelled,
    Failed,
}

/// Driver lifecycle.
///
/// `Idle -> Starting -> Streaming -> Finishing -> Idle`, with `Cancelling`
/// reachable from `Streaming` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExportState {
    Idle = 0,
    Starting = 1,
    Streaming = 2,
    Finishing = 3,
    Cancelling = 4,
}

impl ExportState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Streaming,
            3 => Self::Finishing,
            4 => Self::Cancelling,
            _ => Self::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Finishing => "finishing",
            Self::Cancelling => "cancelling",
        }
    }
}

/// Driver-level settings that do not change between exports.
#[derive(Debug, Clone)]
pub struct ExportDriverConfig {
    /// JPEG quality of frames handed to the sink (1-100).
    pub jpeg_quality: u8,

    /// Upper bound on one source seek. `None` waits indefinitely.
    pub seek_timeout: Option<Duration>,

    pub camera: CameraPathConfig,

    pub font_path: Option<PathBuf>,

    pub shadow_opacity: f64,

    /// Encoder used by [`export_to_file`].
    pub encoder: EncoderSettings,

    /// Probe binary used by [`export_to_file`].
    pub ffprobe_binary: String,
}

impl Default for ExportDriverConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 95,
            seek_timeout: Some(Duration::from_secs(2)),
            camera: CameraPathConfig::default(),
            font_path: None,
            shadow_opacity: 0.5,
            encoder: EncoderSettings::default(),
            ffprobe_binary: "ffprobe".to_string(),
        }
    }
}

impl ExportDriverConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let timeout_ms = config.export.seek_timeout_ms;
        Self {
            jpeg_quality: config.export.jpeg_quality.clamp(1, 100),
            seek_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            camera: CameraPathConfig::from_defaults(&config.camera),
            font_path: config.render.font_path.clone(),
            shadow_opacity: config.render.shadow_opacity,
            encoder: EncoderSettings::from_app_config(config),
            ffprobe_binary: config.export.ffprobe_binary.clone(),
        }
    }
}

/// Everything one export needs from the editor.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub source: SourceRef,
    pub audio: AudioRef,
    pub dimensions: DimensionPreset,
    pub fps: u32,
    pub speed: f64,
    pub segment: VideoSegment,
    pub background: BackgroundConfig,
    pub mouse_positions: Vec<MousePosition>,
    pub output_path: PathBuf,
}

impl ExportRequest {
    /// Request with the segment's own speed, original dimensions and 60 fps.
    pub fn new(
        source: SourceRef,
        segment: VideoSegment,
        background: BackgroundConfig,
        mouse_positions: Vec<MousePosition>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            audio: AudioRef::None,
            dimensions: DimensionPreset::Original,
            fps: 60,
            speed: segment.speed,
            segment,
            background,
            mouse_positions,
            output_path: output_path.into(),
        }
    }

    /// Request built from a loaded project bundle and its export settings.
    ///
    /// Fails when the bundle has no source video.
    pub fn from_project(project: &LoadedProject, output_path: impl Into<PathBuf>) -> FlowcamResult<Self> {
        let source = project
            .source_path()
            .ok_or_else(|| FlowcamError::project("Project has no source video"))?;
        let settings = &project.project.export;

        let mut request = Self::new(
            SourceRef::Path(source),
            project.segment.clone(),
            project.background.clone(),
            project.mouse_positions.clone(),
            output_path,
        );
        request.audio = project.audio_path().map(AudioRef::Path).unwrap_or_default();
        request.dimensions = settings.dimensions;
        request.fps = settings.fps;
        Ok(request)
    }

    /// Source decode rate that yields one decoded frame per output frame.
    pub fn decode_fps(&self) -> u32 {
        (self.fps as f64 / self.speed.max(0.01)).ceil().clamp(1.0, 240.0) as u32
    }
}

/// Summary of one finished (or cancelled) export.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub output_width: u32,
    pub output_height: u32,
    pub frames_total: u64,
    pub frames_submitted: u64,
    /// Frames whose source was not ready.
    pub frames_skipped: u64,
    /// Frames dropped after a recoverable render error.
    pub frames_failed: u64,
    /// Camera resolved at every visited timestamp, in order.
    pub camera_states: Vec<CameraState>,
    pub cancelled: bool,
    pub sink: SinkReport,
    /// Wall-clock start of the run (RFC 3339).
    pub started_at: String,
    pub elapsed_secs: f64,
}

struct DriverShared {
    state: AtomicU8,
    cancel: AtomicBool,
}

impl DriverShared {
    fn state(&self) -> ExportState {
        ExportState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ExportState) -> ExportState {
        let previous = ExportState::from_u8(self.state.swap(state as u8, Ordering::SeqCst));
        tracing::debug!(from = previous.as_str(), to = state.as_str(), "Export state changed");
        previous
    }
}

/// Returns the driver to `Idle` however the run ends.
struct IdleGuard(Arc<DriverShared>);

impl Drop for IdleGuard {
    fn drop(&mut self) {
        self.0.cancel.store(false, Ordering::SeqCst);
        self.0.set_state(ExportState::Idle);
    }
}

/// Runs exports one at a time.
pub struct ExportDriver {
    config: ExportDriverConfig,
    shared: Arc<DriverShared>,
}

impl ExportDriver {
    pub fn new(config: ExportDriverConfig) -> Self {
        Self {
            config,
            shared: Arc::new(DriverShared {
                state: AtomicU8::new(ExportState::Idle as u8),
                cancel: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &ExportDriverConfig {
        &self.config
    }

    pub fn state(&self) -> ExportState {
        self.shared.state()
    }

    /// Start an export on a background task.
    ///
    /// Fails immediately with `InvalidState` unless the driver is idle; the
    /// running export is not affected.
    pub fn start(
        &self,
        request: ExportRequest,
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
        progress: Option<ProgressCallback>,
    ) -> FlowcamResult<ExportHandle> {
        self.shared
            .state
            .compare_exchange(
                ExportState::Idle as u8,
                ExportState::Starting as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|current| {
                FlowcamError::invalid_state(format!(
                    "An export is already in progress (state: {})",
                    ExportState::from_u8(current).as_str()
                ))
            })?;
        self.shared.cancel.store(false, Ordering::SeqCst);

        tracing::info!(
            output = %request.output_path.display(),
            dimensions = request.dimensions.as_str(),
            fps = request.fps,
            speed = request.speed,
            "Starting export"
        );

        let run = ExportRun {
            shared: Arc::clone(&self.shared),
            config: self.config.clone(),
            request,
            source,
            sink,
            progress,
        };
        Ok(ExportHandle {
            join: tokio::spawn(run.execute()),
        })
    }

    /// Request cooperative cancellation.
    ///
    /// Returns `false` unless the driver is streaming.
    pub fn cancel(&self) -> bool {
        let accepted = self
            .shared
            .state
            .compare_exchange(
                ExportState::Streaming as u8,
                ExportState::Cancelling as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if accepted {
            self.shared.cancel.store(true, Ordering::SeqCst);
            tracing::info!("Export cancellation requested");
        } else {
            tracing::debug!(state = self.state().as_str(), "Cancel ignored, export not streaming");
        }
        accepted
    }
}

/// Handle to a running export.
pub struct ExportHandle {
    join: JoinHandle<FlowcamResult<ExportReport>>,
}

impl ExportHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the export to complete.
    pub async fn wait(self) -> FlowcamResult<ExportReport> {
        self.join
            .await
            .map_err(|e| FlowcamError::processing(format!("Export task failed: {e}")))?
    }
}

struct ExportRun {
    shared: Arc<DriverShared>,
    config: ExportDriverConfig,
    request: ExportRequest,
    source: Box<dyn FrameSource>,
    sink: Box<dyn FrameSink>,
    progress: Option<ProgressCallback>,
}

impl ExportRun {
    async fn execute(self) -> FlowcamResult<ExportReport> {
        let _idle = IdleGuard(Arc::clone(&self.shared));
        let ExportRun {
            shared,
            config,
            request,
            mut source,
            mut sink,
            progress,
        } = self;
        let mut reporter = ProgressReporter::new(progress);

        let result = stream_frames(
            &shared,
            &config,
            request,
            source.as_mut(),
            sink.as_mut(),
            &mut reporter,
        )
        .await;

        match &result {
            Ok(report) => tracing::info!(
                frames_submitted = report.frames_submitted,
                frames_skipped = report.frames_skipped,
                frames_failed = report.frames_failed,
                cancelled = report.cancelled,
                elapsed_secs = report.elapsed_secs,
                "Export finished"
            ),
            Err(e) => {
                tracing::error!(error = %e, "Export failed");
                reporter.emit_failed();
            }
        }
        result
    }
}

struct ProgressReporter {
    callback: Option<ProgressCallback>,
    clock: RunClock,
    last: (f64, u64, u64),
}

impl ProgressReporter {
    fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            clock: RunClock::start(),
            last: (0.0, 0, 0),
        }
    }

    fn emit(&mut self, stage: ExportStage, progress: f64, frames_rendered: u64, total_frames: u64) {
        self.last = (progress, frames_rendered, total_frames);
        if let Some(cb) = &self.callback {
            cb(progress_report(stage, progress, frames_rendered, total_frames, &self.clock));
        }
    }

    /// Report failure at the last reached progress.
    fn emit_failed(&mut self) {
        let (progress, frames_rendered, total_frames) = self.last;
        self.emit(ExportStage::Failed, progress, frames_rendered, total_frames);
    }
}

fn progress_report(
    stage: ExportStage,
    progress: f64,
    frames_rendered: u64,
    total_frames: u64,
    clock: &RunClock,
) -> ExportProgress {
    let progress = match stage {
        ExportStage::Complete => 1.0,
        _ => progress.clamp(0.0, MAX_STREAMING_PROGRESS),
    };
    let eta_secs = match stage {
        ExportStage::Rendering | ExportStage::Finalizing => clock.eta_secs(progress),
        _ => 0.0,
    };
    ExportProgress {
        progress,
        frames_rendered,
        total_frames,
        eta_secs,
        stage,
    }
}

async fn stream_frames(
    shared: &DriverShared,
    config: &ExportDriverConfig,
    request: ExportRequest,
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    reporter: &mut ProgressReporter,
) -> FlowcamResult<ExportReport> {
    reporter.emit(ExportStage::Preparing, 0.0, 0, 0);

    let ExportRequest {
        source: _,
        audio,
        dimensions,
        fps,
        speed,
        mut segment,
        background,
        mouse_positions,
        output_path: _,
    } = request;

    segment.speed = speed;
    segment.normalize();
    segment.validate().map_err(|e| FlowcamError::project(e.to_string()))?;

    let clock = FrameClock::new(segment.trim_start, segment.trim_end, fps, speed).ok_or_else(|| {
        FlowcamError::config(format!(
            "Cannot export {}s..{}s at {fps} fps and speed {speed}",
            segment.trim_start, segment.trim_end
        ))
    })?;

    let (source_width, source_height) = source.dimensions();
    if source_width == 0 || source_height == 0 {
        return Err(FlowcamError::data_extraction("Source video has no frames"));
    }
    let (width, height) =
        resolve_output_dimensions(dimensions, source_width, source_height, &segment.crop_or_full());
    let total_frames = clock.frame_count();

    // Optional: a failed extraction only drops the audio track.
    let audio_file = audio.materialize();
    let sink_config = SinkConfig {
        width,
        height,
        framerate: fps,
        audio_path: audio_file.as_ref().map(|f| f.path().to_path_buf()),
        trim_start: segment.trim_start,
        duration: segment.duration(),
        speed,
        segment: segment.clone(),
        background_config: background.clone(),
        mouse_positions: mouse_positions.clone(),
    };
    let handle = sink.start(&sink_config).await?;

    tracing::info!(
        source_width,
        source_height,
        width,
        height,
        total_frames,
        step_secs = clock.step_secs(),
        destination = %handle.destination,
        "Export streaming"
    );
    shared.set_state(ExportState::Streaming);

    let inputs = FrameInputs::new(segment, background, &mouse_positions);
    let mut session = RendererSession::new(width, height)
        .with_camera_config(config.camera.clone())
        .with_font_path(config.font_path.clone())
        .with_shadow_opacity(config.shadow_opacity);
    let frame_size = (source_width, source_height);

    let streamed = render_frames(
        shared,
        config,
        &clock,
        frame_size,
        &inputs,
        &mut session,
        source,
        sink,
        reporter,
    )
    .await;
    let mut totals = match streamed {
        Ok(totals) => totals,
        Err(e) => {
            // Release the encoder before surfacing the error.
            if let Err(finish_err) = sink.finish().await {
                tracing::warn!(error = %finish_err, "Sink finish after failure also failed");
            }
            return Err(e);
        }
    };

    if shared.set_state(ExportState::Finishing) == ExportState::Cancelling {
        totals.cancelled = true;
    }
    let frames_done = totals.submitted + totals.skipped + totals.failed;
    reporter.emit(ExportStage::Finalizing, totals.progress, frames_done, total_frames);
    let sink_report = sink.finish().await?;
    drop(audio_file);

    if totals.cancelled {
        reporter.emit(ExportStage::Cancelled, totals.progress, frames_done, total_frames);
    } else {
        reporter.emit(ExportStage::Complete, 1.0, frames_done, total_frames);
    }

    Ok(ExportReport {
        output_width: width,
        output_height: height,
        frames_total: total_frames,
        frames_submitted: totals.submitted,
        frames_skipped: totals.skipped,
        frames_failed: totals.failed,
        camera_states: totals.camera_states,
        cancelled: totals.cancelled,
        sink: sink_report,
        started_at: reporter.clock.started_wall().to_string(),
        elapsed_secs: reporter.clock.elapsed_secs(),
    })
}

#[derive(Default)]
struct StreamTotals {
    camera_states: Vec<CameraState>,
    submitted: u64,
    skipped: u64,
    failed: u64,
    cancelled: bool,
    progress: f64,
}

/// The streaming loop: one seek, render, encode and submit per frame.
#[allow(clippy::too_many_arguments)]
async fn render_frames(
    shared: &DriverShared,
    config: &ExportDriverConfig,
    clock: &FrameClock,
    (source_width, source_height): (u32, u32),
    inputs: &FrameInputs,
    session: &mut RendererSession,
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    reporter: &mut ProgressReporter,
) -> FlowcamResult<StreamTotals> {
    let total_frames = clock.frame_count();
    let options = RenderOptions::export();
    let mut totals = StreamTotals {
        camera_states: Vec::with_capacity(total_frames as usize),
        ..StreamTotals::default()
    };

    for (index, time) in clock.frames() {
        if shared.cancel.load(Ordering::SeqCst) {
            totals.cancelled = true;
            tracing::info!(frame = index, time_secs = time, "Export cancelled");
            break;
        }

        totals.camera_states.push(Compositor::camera_at(
            session,
            inputs,
            source_width,
            source_height,
            time,
        ));

        match seek_source(source, time, config.seek_timeout).await {
            Ok(()) => {}
            Err(e) if e.is_frame_recoverable() => {
                tracing::debug!(frame = index, time_secs = time, error = %e, "Seek failed, skipping frame");
                totals.skipped += 1;
                totals.progress = clock.progress_at(index);
                reporter.emit(ExportStage::Rendering, totals.progress, index + 1, total_frames);
                continue;
            }
            Err(e) => return Err(e),
        }

        let rendered = match source.current_frame() {
            Some(frame) => Compositor::render_frame(session, &frame, inputs, time, options),
            None => Ok(None),
        };

        match rendered.and_then(|image| image.map(|i| encode_jpeg(&i, config.jpeg_quality)).transpose()) {
            Ok(Some(jpeg)) => {
                sink.submit(&jpeg).await?;
                totals.submitted += 1;
            }
            Ok(None) => {
                tracing::debug!(frame = index, time_secs = time, "Source frame not ready, skipping");
                totals.skipped += 1;
            }
            Err(e) if e.is_frame_recoverable() => {
                tracing::warn!(frame = index, time_secs = time, error = %e, "Frame dropped");
                totals.failed += 1;
            }
            Err(e) => return Err(e),
        }

        totals.progress = clock.progress_at(index);
        reporter.emit(ExportStage::Rendering, totals.progress, index + 1, total_frames);
    }

    Ok(totals)
}

/// Seek and wait for completion, bounded by `timeout` when set.
///
/// A timed out seek is not an error: the source keeps whatever frame it had.
async fn seek_source(
    source: &mut dyn FrameSource,
    time: f64,
    timeout: Option<Duration>,
) -> FlowcamResult<()> {
    let Some(limit) = timeout else {
        return source.seek(time).await;
    };
    match tokio::time::timeout(limit, source.seek(time)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                time_secs = time,
                timeout_ms = limit.as_millis() as u64,
                "Seek timed out, using nearest decoded frame"
            );
            Ok(())
        }
    }
}

/// Encode a rendered frame as a baseline JPEG.
pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> FlowcamResult<Vec<u8>> {
    let rgb: RgbImage = image.convert();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| FlowcamError::render(format!("JPEG encoding failed: {e}")))?;
    Ok(bytes)
}

/// Export `request` to an MP4 file using ffmpeg for decode and encode.
pub async fn export_to_file(
    request: ExportRequest,
    config: ExportDriverConfig,
    progress: Option<ProgressCallback>,
) -> FlowcamResult<PathBuf> {
    if !command_exists(&config.encoder.ffmpeg_binary) {
        return Err(FlowcamError::sink_unavailable(format!(
            "Encoder binary '{}' not found in PATH",
            config.encoder.ffmpeg_binary
        )));
    }
    if let Some(parent) = request.output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = request.source.materialize()?;
    let source = FfmpegFrameSource::open(
        file,
        &config.encoder.ffmpeg_binary,
        &config.ffprobe_binary,
        request.decode_fps(),
    )?;
    let sink = FfmpegSink::new(request.output_path.clone(), config.encoder.clone());
    let output = request.output_path.clone();

    let driver = ExportDriver::new(config);
    let report = driver
        .start(request, Box::new(source), Box::new(sink), progress)?
        .wait()
        .await?;

    tracing::info!(
        output = %output.display(),
        frames = report.frames_submitted,
        "Export written"
    );
    Ok(output)
}
