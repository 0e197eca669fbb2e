//! Interactive playback driven by display refresh ticks.
//!
//! A tick that arrives while the previous one is still rendering is dropped,
//! never queued. Seeks wait without a timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use image::RgbaImage;

use flowcam_common::clock::RateController;
use flowcam_common::error::FlowcamResult;

use crate::compositor::{Compositor, FrameInputs, RenderOptions, RenderQuality};
use crate::session::RendererSession;
use crate::source::FrameSource;

/// Result of one display tick.
#[derive(Debug)]
pub enum TickOutcome {
    Rendered(RgbaImage),
    /// The source had no decodable frame at the requested time.
    Skipped,
    /// Another tick was still rendering.
    Dropped,
    /// The refresh arrived before the target interval elapsed.
    Throttled,
}

impl TickOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered(_))
    }
}

struct PlaybackInner {
    source: Box<dyn FrameSource>,
    session: RendererSession,
    inputs: FrameInputs,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the preview source and renderer state for one editor view.
pub struct PlaybackSession {
    busy: AtomicBool,
    inner: tokio::sync::Mutex<PlaybackInner>,
    rate: Mutex<RateController>,
    quality: RenderQuality,
}

impl PlaybackSession {
    pub fn new(source: Box<dyn FrameSource>, session: RendererSession, inputs: FrameInputs) -> Self {
        Self {
            busy: AtomicBool::new(false),
            inner: tokio::sync::Mutex::new(PlaybackInner {
                source,
                session,
                inputs,
            }),
            rate: Mutex::new(RateController::new(60)),
            quality: RenderQuality::High,
        }
    }

    pub fn with_quality(mut self, quality: RenderQuality) -> Self {
        self.quality = quality;
        self
    }

    /// Cap display-driven renders at `hz`.
    pub fn with_refresh_rate(mut self, hz: u32) -> Self {
        self.rate = Mutex::new(RateController::new(hz));
        self
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Replace the edit inputs, e.g. after the user moved a keyframe.
    pub async fn set_inputs(&self, inputs: FrameInputs) {
        let mut inner = self.inner.lock().await;
        inner.inputs = inputs;
        inner.session.reset_animation();
    }

    /// Render the frame at source time `time`.
    pub async fn on_display_tick(&self, time: f64) -> FlowcamResult<TickOutcome> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!(time_secs = time, "Render in progress, tick dropped");
            return Ok(TickOutcome::Dropped);
        }
        let _busy = BusyGuard(&self.busy);

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if let Err(e) = inner.source.seek(time).await {
            if e.is_frame_recoverable() {
                tracing::debug!(time_secs = time, error = %e, "Seek failed, tick skipped");
                return Ok(TickOutcome::Skipped);
            }
            return Err(e);
        }

        let Some(frame) = inner.source.current_frame() else {
            return Ok(TickOutcome::Skipped);
        };
        let options = RenderOptions::interactive(self.quality);
        match Compositor::render_frame(&mut inner.session, &frame, &inner.inputs, time, options) {
            Ok(Some(image)) => Ok(TickOutcome::Rendered(image)),
            Ok(None) => Ok(TickOutcome::Skipped),
            Err(e) if e.is_frame_recoverable() => {
                tracing::warn!(time_secs = time, error = %e, "Preview frame dropped");
                Ok(TickOutcome::Skipped)
            }
            Err(e) => Err(e),
        }
    }

    /// Display refresh callback at monotonic `now_ns`, gated by the refresh rate.
    pub async fn on_refresh(&self, now_ns: u64, time: f64) -> FlowcamResult<TickOutcome> {
        let due = self
            .rate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .should_tick(now_ns);
        if !due {
            return Ok(TickOutcome::Throttled);
        }
        self.on_display_tick(time).await
    }

    /// Id of the text overlay under canvas point (`x`, `y`) at `time`.
    pub async fn hit_test(&self, time: f64, x: f64, y: f64) -> Option<String> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let overlays = &inner.inputs.segment().text_segments;
        inner
            .session
            .hit_tester(false)
            .hit_test(overlays, time, x, y)
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use flowcam_project_model::background::BackgroundConfig;
    use flowcam_project_model::segment::{TextOverlay, TextStyle, VideoSegment};
    use image::Rgba;

    use crate::source::MemoryFrameSource;

    fn frames() -> Vec<RgbaImage> {
        (0..10)
            .map(|i| RgbaImage::from_pixel(32, 18, Rgba([i * 20, 80, 160, 255])))
            .collect()
    }

    fn playback(source: MemoryFrameSource) -> PlaybackSession {
        let inputs = FrameInputs::from_samples(
            VideoSegment::new(0.0, 1.0),
            BackgroundConfig::default(),
            vec![],
        );
        PlaybackSession::new(Box::new(source), RendererSession::new(32, 18), inputs)
            .with_quality(RenderQuality::Draft)
    }

    #[tokio::test]
    async fn test_tick_renders_output_size() {
        let session = playback(MemoryFrameSource::from_image_sequence(frames(), 10));
        match session.on_display_tick(0.35).await.unwrap() {
            TickOutcome::Rendered(image) => assert_eq!(image.dimensions(), (32, 18)),
            other => panic!("expected a rendered frame, got {other:?}"),
        }
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_tick_before_first_frame_is_skipped() {
        let session = playback(MemoryFrameSource::from_image_sequence(frames(), 10));
        let outcome = session.on_display_tick(-1.0).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Skipped));
    }

    #[tokio::test]
    async fn test_tick_during_render_is_dropped() {
        let source = MemoryFrameSource::from_image_sequence(frames(), 10)
            .with_seek_delay(Duration::from_millis(50));
        let session = playback(source);

        let (first, second) = tokio::join!(session.on_display_tick(0.1), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            session.on_display_tick(0.2).await
        });

        assert!(first.unwrap().is_rendered());
        assert!(matches!(second.unwrap(), TickOutcome::Dropped));

        // The flag is released afterwards.
        assert!(session.on_display_tick(0.3).await.unwrap().is_rendered());
    }

    #[tokio::test]
    async fn test_refresh_is_rate_gated() {
        let session = playback(MemoryFrameSource::from_image_sequence(frames(), 10))
            .with_refresh_rate(30);
        assert!(session.on_refresh(0, 0.0).await.unwrap().is_rendered());
        let early = session.on_refresh(1_000_000, 0.0).await.unwrap();
        assert!(matches!(early, TickOutcome::Throttled));
        assert!(session.on_refresh(40_000_000, 0.0).await.unwrap().is_rendered());
    }

    #[tokio::test]
    async fn test_hit_test_finds_active_overlay() {
        let session = playback(MemoryFrameSource::from_image_sequence(frames(), 10));
        let mut segment = VideoSegment::new(0.0, 1.0);
        segment.text_segments.push(TextOverlay {
            id: "title".to_string(),
            text: "Hi".to_string(),
            start_time: 0.0,
            end_time: 1.0,
            style: TextStyle {
                font_size: 8.0,
                x: 50.0,
                y: 50.0,
                ..Default::default()
            },
        });
        session
            .set_inputs(FrameInputs::from_samples(segment, BackgroundConfig::default(), vec![]))
            .await;

        assert_eq!(session.hit_test(0.5, 16.0, 9.0).await.as_deref(), Some("title"));
        assert_eq!(session.hit_test(0.5, 0.0, 0.0).await, None);
        assert_eq!(session.hit_test(2.0, 16.0, 9.0).await, None);
    }
}
