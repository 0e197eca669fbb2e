//! Export driver runs against in-memory sources and a recording sink.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use tokio::sync::Notify;

use flowcam_common::error::{FlowcamError, FlowcamResult};
use flowcam_project_model::background::BackgroundConfig;
use flowcam_project_model::event::MousePosition;
use flowcam_project_model::segment::VideoSegment;
use flowcam_render_engine::{
    DimensionPreset, ExportDriver, ExportDriverConfig, ExportProgress, ExportReport,
    ExportRequest, ExportStage, ExportState, FrameSink, MemoryFrameSource, SinkConfig,
    SinkHandle, SinkReport, SourceRef,
};

#[derive(Default)]
struct Recorded {
    config: Option<SinkConfig>,
    frames: Vec<Vec<u8>>,
    finished: bool,
}

#[derive(Clone, Default)]
struct RecordingSink {
    recorded: Arc<Mutex<Recorded>>,
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn start(&mut self, config: &SinkConfig) -> FlowcamResult<SinkHandle> {
        self.recorded.lock().unwrap().config = Some(config.clone());
        Ok(SinkHandle {
            destination: "memory".to_string(),
        })
    }

    async fn submit(&mut self, jpeg: &[u8]) -> FlowcamResult<()> {
        self.recorded.lock().unwrap().frames.push(jpeg.to_vec());
        Ok(())
    }

    async fn finish(&mut self) -> FlowcamResult<SinkReport> {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.finished = true;
        Ok(SinkReport {
            frames_received: recorded.frames.len() as u64,
            bytes_received: recorded.frames.iter().map(|f| f.len() as u64).sum(),
            output: None,
        })
    }
}

/// Accepts `accept` frames, then reports the encoder gone.
#[derive(Clone)]
struct FailingSink {
    accept: usize,
    recorded: Arc<Mutex<Recorded>>,
}

#[async_trait]
impl FrameSink for FailingSink {
    async fn start(&mut self, config: &SinkConfig) -> FlowcamResult<SinkHandle> {
        self.recorded.lock().unwrap().config = Some(config.clone());
        Ok(SinkHandle {
            destination: "memory".to_string(),
        })
    }

    async fn submit(&mut self, jpeg: &[u8]) -> FlowcamResult<()> {
        let mut recorded = self.recorded.lock().unwrap();
        if recorded.frames.len() >= self.accept {
            return Err(FlowcamError::sink_unavailable("encoder exited"));
        }
        recorded.frames.push(jpeg.to_vec());
        Ok(())
    }

    async fn finish(&mut self) -> FlowcamResult<SinkReport> {
        self.recorded.lock().unwrap().finished = true;
        Err(FlowcamError::sink_unavailable("encoder exited"))
    }
}

/// Signals when the final frame arrives and holds it briefly.
#[derive(Clone)]
struct SlowLastFrameSink {
    expected: usize,
    reached_last: Arc<Notify>,
    inner: RecordingSink,
}

#[async_trait]
impl FrameSink for SlowLastFrameSink {
    async fn start(&mut self, config: &SinkConfig) -> FlowcamResult<SinkHandle> {
        self.inner.start(config).await
    }

    async fn submit(&mut self, jpeg: &[u8]) -> FlowcamResult<()> {
        let is_last = self.inner.recorded.lock().unwrap().frames.len() + 1 == self.expected;
        if is_last {
            self.reached_last.notify_one();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.inner.submit(jpeg).await
    }

    async fn finish(&mut self) -> FlowcamResult<SinkReport> {
        self.inner.finish().await
    }
}

struct RefusingSink;

#[async_trait]
impl FrameSink for RefusingSink {
    async fn start(&mut self, _config: &SinkConfig) -> FlowcamResult<SinkHandle> {
        Err(FlowcamError::sink_unavailable("encoder is offline"))
    }

    async fn submit(&mut self, _jpeg: &[u8]) -> FlowcamResult<()> {
        Err(FlowcamError::sink_unavailable("encoder is offline"))
    }

    async fn finish(&mut self) -> FlowcamResult<SinkReport> {
        Err(FlowcamError::sink_unavailable("encoder is offline"))
    }
}

fn source(width: u32, height: u32, secs: f64, fps: u32) -> MemoryFrameSource {
    let count = (secs * fps as f64).round() as usize;
    let images = (0..count)
        .map(|i| RgbaImage::from_pixel(width, height, Rgba([(i % 256) as u8, 90, 180, 255])))
        .collect();
    MemoryFrameSource::from_image_sequence(images, fps)
}

fn sweeping_cursor(secs: f64) -> Vec<MousePosition> {
    (0..=(secs * 20.0) as usize)
        .map(|i| {
            let t = i as f64 / 20.0;
            MousePosition {
                x: 4.0 + t * 10.0,
                y: 9.0,
                timestamp: t,
                is_clicked: (0.4..0.5).contains(&t),
                cursor_type: "default".to_string(),
            }
        })
        .collect()
}

fn request(trim_end: f64, fps: u32) -> ExportRequest {
    let mut request = ExportRequest::new(
        SourceRef::Bytes(Arc::from(Vec::from(&b"unused"[..]))),
        VideoSegment::new(0.0, trim_end),
        BackgroundConfig::default(),
        sweeping_cursor(trim_end),
        PathBuf::from("out.mp4"),
    );
    request.fps = fps;
    request
}

async fn run(
    driver: &ExportDriver,
    request: ExportRequest,
    source: MemoryFrameSource,
    sink: RecordingSink,
) -> ExportReport {
    driver
        .start(request, Box::new(source), Box::new(sink), None)
        .unwrap()
        .wait()
        .await
        .unwrap()
}

async fn wait_for_state(driver: &ExportDriver, state: ExportState) {
    for _ in 0..2000 {
        if driver.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("driver never reached {state:?}");
}

#[tokio::test]
async fn exports_every_frame_in_order() {
    let driver = ExportDriver::new(ExportDriverConfig::default());
    let sink = RecordingSink::default();
    let report = run(&driver, request(1.0, 10), source(32, 18, 1.0, 30), sink.clone()).await;

    assert_eq!(report.frames_total, 10);
    assert_eq!(report.frames_submitted, 10);
    assert_eq!(report.frames_skipped, 0);
    assert!(!report.cancelled);
    assert!(!report.started_at.is_empty());
    assert_eq!((report.output_width, report.output_height), (32, 18));
    assert_eq!(driver.state(), ExportState::Idle);

    let recorded = sink.recorded.lock().unwrap();
    assert!(recorded.finished);
    assert_eq!(recorded.frames.len(), 10);
    let first = image::load_from_memory(&recorded.frames[0]).unwrap();
    assert_eq!((first.width(), first.height()), (32, 18));

    let times: Vec<f64> = report.camera_states.iter().map(|s| s.time).collect();
    assert!(times.windows(2).all(|w| w[1] > w[0]));
}

#[tokio::test]
async fn repeated_exports_resolve_identical_cameras() {
    let driver = ExportDriver::new(ExportDriverConfig::default());
    let a = run(&driver, request(1.0, 15), source(32, 18, 1.0, 30), RecordingSink::default()).await;
    let b = run(&driver, request(1.0, 15), source(32, 18, 1.0, 30), RecordingSink::default()).await;

    assert_eq!(a.camera_states.len(), 15);
    assert_eq!(a.camera_states, b.camera_states);
}

#[tokio::test]
async fn second_start_while_running_is_invalid_state() {
    let driver = ExportDriver::new(ExportDriverConfig::default());
    let slow = source(32, 18, 1.0, 30).with_seek_delay(Duration::from_millis(5));
    let first = driver
        .start(request(0.5, 10), Box::new(slow), Box::new(RecordingSink::default()), None)
        .unwrap();

    let second = driver.start(
        request(0.5, 10),
        Box::new(source(32, 18, 1.0, 30)),
        Box::new(RecordingSink::default()),
        None,
    );
    assert!(matches!(second, Err(FlowcamError::InvalidState { .. })));

    let report = first.wait().await.unwrap();
    assert_eq!(report.frames_submitted, 5);
    assert_eq!(driver.state(), ExportState::Idle);
}

#[tokio::test]
async fn preset_1080p_scales_sixteen_by_nine_source() {
    let driver = ExportDriver::new(ExportDriverConfig::default());
    let sink = RecordingSink::default();
    let mut req = request(0.1, 10);
    req.dimensions = DimensionPreset::P1080;
    req.background.shadow = 0.0;
    let report = run(&driver, req, source(64, 36, 0.2, 30), sink.clone()).await;

    assert_eq!((report.output_width, report.output_height), (1920, 1080));
    let recorded = sink.recorded.lock().unwrap();
    let config = recorded.config.as_ref().unwrap();
    assert_eq!((config.width, config.height), (1920, 1080));
    assert_eq!(config.framerate, 10);
    assert!((config.duration - 0.1).abs() < 1e-9);
}

#[tokio::test]
async fn cancel_stops_streaming_and_still_finishes_sink() {
    let driver = ExportDriver::new(ExportDriverConfig::default());
    let sink = RecordingSink::default();
    let stages = Arc::new(Mutex::new(Vec::<ExportProgress>::new()));
    let seen = Arc::clone(&stages);

    let slow = source(32, 18, 2.0, 30).with_seek_delay(Duration::from_millis(10));
    let handle = driver
        .start(
            request(2.0, 30),
            Box::new(slow),
            Box::new(sink.clone()),
            Some(Box::new(move |p: ExportProgress| seen.lock().unwrap().push(p))),
        )
        .unwrap();

    assert!(!driver.cancel(), "cancel is only accepted while streaming");
    wait_for_state(&driver, ExportState::Streaming).await;
    assert!(driver.cancel());

    let report = handle.wait().await.unwrap();
    assert!(report.cancelled);
    assert!(report.frames_submitted < report.frames_total);
    assert!(sink.recorded.lock().unwrap().finished);
    assert_eq!(driver.state(), ExportState::Idle);

    let stages = stages.lock().unwrap();
    assert_eq!(stages.last().map(|p| p.stage), Some(ExportStage::Cancelled));
    assert!(stages.iter().all(|p| p.progress < 1.0));
}

#[tokio::test]
async fn progress_is_monotonic_and_completes_after_finish() {
    let driver = ExportDriver::new(ExportDriverConfig::default());
    let stages = Arc::new(Mutex::new(Vec::<ExportProgress>::new()));
    let seen = Arc::clone(&stages);

    driver
        .start(
            request(0.5, 20),
            Box::new(source(32, 18, 0.5, 30)),
            Box::new(RecordingSink::default()),
            Some(Box::new(move |p: ExportProgress| seen.lock().unwrap().push(p))),
        )
        .unwrap()
        .wait()
        .await
        .unwrap();

    let stages = stages.lock().unwrap();
    assert_eq!(stages.first().map(|p| p.stage), Some(ExportStage::Preparing));
    let last = stages.last().unwrap();
    assert_eq!(last.stage, ExportStage::Complete);
    assert_eq!(last.progress, 1.0);

    let before_complete = &stages[..stages.len() - 1];
    assert!(before_complete.iter().all(|p| p.progress <= 0.99));
    assert!(before_complete
        .windows(2)
        .all(|w| w[1].progress >= w[0].progress));
}

#[tokio::test]
async fn stalled_seeks_time_out_and_skip_frames() {
    let config = ExportDriverConfig {
        seek_timeout: Some(Duration::from_millis(10)),
        ..ExportDriverConfig::default()
    };
    let driver = ExportDriver::new(config);
    let stalled = source(32, 18, 1.0, 30).with_seek_delay(Duration::from_millis(500));

    let report = run(&driver, request(0.3, 10), stalled, RecordingSink::default()).await;
    assert_eq!(report.frames_total, 3);
    assert_eq!(report.frames_submitted, 0);
    assert_eq!(report.frames_skipped, 3);
    assert_eq!(report.camera_states.len(), 3);
}

#[tokio::test]
async fn sink_start_failure_releases_driver() {
    let driver = ExportDriver::new(ExportDriverConfig::default());
    let result = driver
        .start(
            request(0.5, 10),
            Box::new(source(32, 18, 0.5, 30)),
            Box::new(RefusingSink),
            None,
        )
        .unwrap()
        .wait()
        .await;

    assert!(matches!(result, Err(FlowcamError::SinkUnavailable { .. })));
    assert_eq!(driver.state(), ExportState::Idle);

    // The driver accepts a new export afterwards.
    let report = run(&driver, request(0.2, 10), source(32, 18, 0.5, 30), RecordingSink::default()).await;
    assert_eq!(report.frames_submitted, 2);
}

#[tokio::test]
async fn sink_failure_mid_stream_reports_failed_and_releases_driver() {
    let driver = ExportDriver::new(ExportDriverConfig::default());
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let sink = FailingSink {
        accept: 3,
        recorded: Arc::clone(&recorded),
    };
    let stages = Arc::new(Mutex::new(Vec::<ExportProgress>::new()));
    let seen = Arc::clone(&stages);

    let result = driver
        .start(
            request(1.0, 10),
            Box::new(source(32, 18, 1.0, 30)),
            Box::new(sink),
            Some(Box::new(move |p: ExportProgress| seen.lock().unwrap().push(p))),
        )
        .unwrap()
        .wait()
        .await;

    assert!(matches!(result, Err(FlowcamError::SinkUnavailable { .. })));
    assert_eq!(driver.state(), ExportState::Idle);
    {
        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.frames.len(), 3);
        assert!(recorded.finished, "encoder is released after a failed submit");
    }

    {
        let stages = stages.lock().unwrap();
        let last = stages.last().unwrap();
        assert_eq!(last.stage, ExportStage::Failed);
        let before = &stages[stages.len() - 2];
        assert_eq!(last.progress, before.progress);
        assert!(last.progress > 0.0);
        assert_eq!(last.frames_rendered, 3);
    }

    let report = run(&driver, request(0.2, 10), source(32, 18, 0.5, 30), RecordingSink::default()).await;
    assert_eq!(report.frames_submitted, 2);
}

#[tokio::test]
async fn cancel_during_final_frame_is_reported() {
    let driver = ExportDriver::new(ExportDriverConfig::default());
    let reached_last = Arc::new(Notify::new());
    let sink = SlowLastFrameSink {
        expected: 5,
        reached_last: Arc::clone(&reached_last),
        inner: RecordingSink::default(),
    };

    let handle = driver
        .start(request(0.5, 10), Box::new(source(32, 18, 0.5, 30)), Box::new(sink), None)
        .unwrap();
    reached_last.notified().await;
    assert!(driver.cancel());

    let report = handle.wait().await.unwrap();
    assert_eq!(report.frames_submitted, 5);
    assert!(report.cancelled);
    assert_eq!(driver.state(), ExportState::Idle);
}
