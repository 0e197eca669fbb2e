//! Per-run renderer state and caches.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use image::RgbaImage;
use tiny_skia::Pixmap;

use flowcam_processing_core::camera_path::{CameraPath, CameraPathConfig, CameraPathGenerator};
use flowcam_processing_core::cursor_smooth::{CursorSmoothConfig, CursorSmoother, SmoothedCursor};
use flowcam_processing_core::telemetry::TelemetrySampler;
use flowcam_project_model::background::{BackgroundConfig, BackgroundType};
use flowcam_project_model::camera::CameraState;
use flowcam_project_model::event::CursorKind;

use crate::background::render_background;
use crate::compositor::{build_shadow_layer, FrameInputs, FrameLayout};
use crate::cursor::{CursorGlyph, CursorSquish};
use crate::text::{TextHitTester, TextRenderer};

/// Largest animation step applied in one frame (seconds).
const MAX_ANIMATION_STEP_SECS: f64 = 0.25;

/// Blurred black shadow positioned in unzoomed canvas coordinates.
#[derive(Debug, Clone)]
pub struct ShadowLayer {
    pub pixmap: Pixmap,
    pub origin_x: f64,
    pub origin_y: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct BackgroundKey {
    kind: BackgroundType,
    custom: Option<String>,
    width: u32,
    height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ShadowKey {
    x: i64,
    y: i64,
    width: i64,
    height: i64,
    radius: i64,
    blur: i64,
}

impl ShadowKey {
    fn new(layout: &FrameLayout, blur: f64) -> Self {
        let q = |v: f64| (v * 100.0).round() as i64;
        Self {
            x: q(layout.content_x),
            y: q(layout.content_y),
            width: q(layout.content_width),
            height: q(layout.content_height),
            radius: q(layout.corner_radius),
            blur: q(blur),
        }
    }
}

/// State owned by one playback or export run.
///
/// Caches everything that is identical from frame to frame and carries the
/// cursor animation between frames.
pub struct RendererSession {
    width: u32,
    height: u32,
    camera_config: CameraPathConfig,
    shadow_opacity: f64,
    font_path: Option<PathBuf>,

    text: Option<TextRenderer>,
    background: Option<(BackgroundKey, RgbaImage)>,
    shadow: Option<(ShadowKey, Option<ShadowLayer>)>,
    camera_path: Option<(u64, Option<Arc<[CameraState]>>)>,
    cursor: Option<(u64, Arc<SmoothedCursor>)>,
    glyph: Option<((CursorKind, u32), CursorGlyph)>,

    squish: CursorSquish,
    last_frame_time: Option<f64>,
    last_wall: Option<Instant>,
}

impl RendererSession {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            camera_config: CameraPathConfig::default(),
            shadow_opacity: 0.5,
            font_path: None,
            text: None,
            background: None,
            shadow: None,
            camera_path: None,
            cursor: None,
            glyph: None,
            squish: CursorSquish::default(),
            last_frame_time: None,
            last_wall: None,
        }
    }

    pub fn with_camera_config(mut self, config: CameraPathConfig) -> Self {
        self.camera_config = config;
        self.camera_path = None;
        self
    }

    pub fn with_font_path(mut self, font_path: Option<PathBuf>) -> Self {
        self.font_path = font_path;
        self.text = None;
        self
    }

    pub fn with_shadow_opacity(mut self, opacity: f64) -> Self {
        self.shadow_opacity = opacity.clamp(0.0, 1.0);
        self
    }

    /// Output canvas size.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn shadow_opacity(&self) -> f64 {
        self.shadow_opacity
    }

    pub fn squish_mut(&mut self) -> &mut CursorSquish {
        &mut self.squish
    }

    /// Restart animations, as at the start of an export.
    pub fn reset_animation(&mut self) {
        self.squish.reset();
        self.last_frame_time = None;
        self.last_wall = None;
    }

    /// Seconds to advance animations for a frame at `time`.
    ///
    /// Export mode steps by the virtual timeline so runs are repeatable;
    /// interactive mode uses the wall clock since the previous render.
    pub fn animation_step(&mut self, time: f64, export_mode: bool) -> f64 {
        let step = if export_mode {
            let step = self.last_frame_time.map(|last| (time - last).abs()).unwrap_or(0.0);
            self.last_frame_time = Some(time);
            step
        } else {
            let now = Instant::now();
            let step = self
                .last_wall
                .map(|last| now.duration_since(last).as_secs_f64())
                .unwrap_or(0.0);
            self.last_wall = Some(now);
            step
        };
        step.min(MAX_ANIMATION_STEP_SECS)
    }

    /// Dense camera path for `inputs`, generated once per distinct input set.
    ///
    /// A stored `smoothMotionPath` wins over generation; `None` means the
    /// keyframe fallback applies.
    pub fn camera_path(
        &mut self,
        inputs: &FrameInputs,
        source_width: u32,
        source_height: u32,
    ) -> Option<Arc<[CameraState]>> {
        let key = inputs.cache_key() ^ ((source_width as u64) << 32 | source_height as u64);
        if let Some((cached, path)) = &self.camera_path {
            if *cached == key {
                return path.clone();
            }
        }

        let segment = inputs.segment();
        let path: Option<Arc<[CameraState]>> = match segment.smooth_motion_path.as_deref() {
            Some(points) if !points.is_empty() => {
                Some(CameraPath::from_motion_points(points).states.into())
            }
            _ => {
                let sampler =
                    TelemetrySampler::new(inputs.samples().to_vec(), source_width, source_height);
                CameraPathGenerator::new(self.camera_config.clone())
                    .generate(&sampler, segment)
                    .map(|path| path.states.into())
            }
        };

        tracing::debug!(
            states = path.as_ref().map(|p| p.len()).unwrap_or(0),
            stored = segment.smooth_motion_path.is_some(),
            "Camera path cached"
        );
        self.camera_path = Some((key, path.clone()));
        path
    }

    /// Smoothed cursor trajectory for the inputs' current smoothness.
    pub fn smoothed_cursor(&mut self, inputs: &FrameInputs) -> Arc<SmoothedCursor> {
        let smoothness = inputs.background().cursor_smoothness;
        let key = inputs.cache_key() ^ smoothness.to_bits().rotate_left(17);
        if let Some((cached, smoothed)) = &self.cursor {
            if *cached == key {
                return Arc::clone(smoothed);
            }
        }

        let smoother = CursorSmoother::new(CursorSmoothConfig::from_smoothness(smoothness));
        let smoothed = Arc::new(smoother.smooth(inputs.samples()));
        self.cursor = Some((key, Arc::clone(&smoothed)));
        smoothed
    }

    /// Background canvas at output size.
    pub fn background_canvas(&mut self, config: &BackgroundConfig) -> &RgbaImage {
        let key = BackgroundKey {
            kind: config.background_type,
            custom: config.custom_background.clone(),
            width: self.width,
            height: self.height,
        };
        if !matches!(&self.background, Some((cached, _)) if *cached == key) {
            self.background = None;
        }
        let (width, height) = (self.width, self.height);
        let (_, canvas) = self
            .background
            .get_or_insert_with(|| (key, render_background(config, width, height)));
        canvas
    }

    /// Shadow layer for the content box of `layout`, if it has any area.
    pub fn shadow_layer(&mut self, layout: &FrameLayout, blur: f64) -> Option<&ShadowLayer> {
        let key = ShadowKey::new(layout, blur);
        if !matches!(&self.shadow, Some((cached, _)) if *cached == key) {
            self.shadow = None;
        }
        let (_, layer) = self
            .shadow
            .get_or_insert_with(|| (key, build_shadow_layer(layout, blur)));
        layer.as_ref()
    }

    /// Cursor glyph rasterized at `scale` (quantized to 1/100).
    pub fn cursor_glyph(&mut self, kind: CursorKind, scale: f64) -> &CursorGlyph {
        let quantized = (scale * 100.0).round().max(1.0) as u32;
        let key = (kind, quantized);
        if !matches!(&self.glyph, Some((cached, _)) if *cached == key) {
            self.glyph = None;
        }
        let (_, glyph) = self
            .glyph
            .get_or_insert_with(|| (key, CursorGlyph::render(kind, quantized as f64 / 100.0)));
        glyph
    }

    /// Text renderer, loading the font on first use.
    pub fn text_renderer(&mut self) -> &mut TextRenderer {
        let font_path = self.font_path.clone();
        self.text
            .get_or_insert_with(|| TextRenderer::load(font_path.as_deref()))
    }

    /// Hit tester over the current canvas size.
    pub fn hit_tester(&mut self, export_mode: bool) -> TextHitTester<'_> {
        let (width, height) = (self.width, self.height);
        TextHitTester::new(self.text_renderer(), width, height, export_mode)
    }
}
