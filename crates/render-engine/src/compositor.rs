//! Frame compositor: background, shadow, zoomed content, cursor and text.
//!
//! Every output frame is built on the CPU in this order:
//!
//! 1. Background canvas (cached per session)
//! 2. Drop shadow of the content box (High quality only)
//! 3. Cropped source frame inside a rounded content box, transformed by the
//!    camera around its focus point
//! 4. Cursor glyph at the smoothed pointer position, squished on click
//! 5. Text overlays, untransformed
//!
//! The camera transform maps a layout point `p` to the canvas as
//! `(p − C)·z + canvas_centre`, where `C` is the camera focus inside the
//! content box and `z` the zoom factor.

use std::hash::{Hash, Hasher};

use image::{imageops, Rgba, RgbaImage};
use tiny_skia::{
    FillRule, FilterQuality, Paint, Pixmap, PixmapPaint, Pattern, SpreadMode, Transform,
};

use flowcam_common::error::{FlowcamError, FlowcamResult};
use flowcam_processing_core::camera_resolve::resolve_camera_state;
use flowcam_project_model::background::BackgroundConfig;
use flowcam_project_model::camera::CameraState;
use flowcam_project_model::event::{ingest_mouse_positions, MousePosition, PointerSample};
use flowcam_project_model::segment::{PixelRect, TextOverlay, VideoSegment};

use crate::raster::{alpha_mask, pixmap_from_rgba, rgba_from_pixmap, rounded_rect_path, tinted_mask};
use crate::session::{RendererSession, ShadowLayer};
use crate::source::SourceFrame;

/// Sampling and effect quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderQuality {
    /// Nearest-neighbour sampling, no shadow.
    Draft,
    /// Bilinear sampling with a blurred shadow.
    #[default]
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOptions {
    /// Export rendering: virtual-time animation, no interactive affordances.
    pub export_mode: bool,
    pub quality: RenderQuality,
}

impl RenderOptions {
    pub fn export() -> Self {
        Self {
            export_mode: true,
            quality: RenderQuality::High,
        }
    }

    pub fn interactive(quality: RenderQuality) -> Self {
        Self {
            export_mode: false,
            quality,
        }
    }
}

/// Per-run inputs shared by every frame.
#[derive(Debug, Clone)]
pub struct FrameInputs {
    segment: VideoSegment,
    background: BackgroundConfig,
    samples: Vec<PointerSample>,
    key: u64,
}

impl FrameInputs {
    /// Normalize the segment and ingest the editor's mouse positions.
    pub fn new(
        segment: VideoSegment,
        background: BackgroundConfig,
        mouse_positions: &[MousePosition],
    ) -> Self {
        Self::from_samples(segment, background, ingest_mouse_positions(mouse_positions))
    }

    pub fn from_samples(
        mut segment: VideoSegment,
        background: BackgroundConfig,
        samples: Vec<PointerSample>,
    ) -> Self {
        segment.normalize();
        let key = inputs_key(&segment, &samples);
        Self {
            segment,
            background,
            samples,
            key,
        }
    }

    pub fn segment(&self) -> &VideoSegment {
        &self.segment
    }

    pub fn background(&self) -> &BackgroundConfig {
        &self.background
    }

    pub fn samples(&self) -> &[PointerSample] {
        &self.samples
    }

    /// Identity of the camera-relevant inputs, for cache keys.
    pub fn cache_key(&self) -> u64 {
        self.key
    }
}

fn inputs_key(segment: &VideoSegment, samples: &[PointerSample]) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    segment.camera_fingerprint().hash(&mut hasher);
    if let Some(path) = &segment.smooth_motion_path {
        path.len().hash(&mut hasher);
        for p in path {
            for v in [p.time, p.x, p.y, p.zoom] {
                v.to_bits().hash(&mut hasher);
            }
        }
    }
    samples.len().hash(&mut hasher);
    for s in samples {
        for v in [s.timestamp, s.x, s.y] {
            v.to_bits().hash(&mut hasher);
        }
        s.is_clicked.hash(&mut hasher);
    }
    hasher.finish()
}

/// Geometry of one output frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameLayout {
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Content box in unzoomed canvas coordinates.
    pub content_x: f64,
    pub content_y: f64,
    pub content_width: f64,
    pub content_height: f64,
    /// Corner radius in unzoomed canvas pixels.
    pub corner_radius: f64,
    /// Source pixels shown in the content box.
    pub crop: PixelRect,
    pub camera: CameraState,
}

impl FrameLayout {
    /// Fit the cropped source into `scale%` of the canvas, centred.
    pub fn new(
        canvas_width: u32,
        canvas_height: u32,
        crop: PixelRect,
        background: &BackgroundConfig,
        camera: CameraState,
    ) -> Self {
        let scale = background.scale_fraction();
        let avail_w = (canvas_width as f64 * scale).max(1.0);
        let avail_h = (canvas_height as f64 * scale).max(1.0);
        let aspect = crop.width.max(1) as f64 / crop.height.max(1) as f64;

        let (content_width, content_height) = if avail_w / avail_h > aspect {
            (avail_h * aspect, avail_h)
        } else {
            (avail_w, avail_w / aspect)
        };

        let radius = background
            .border_radius
            .max(0.0)
            .min(content_width.min(content_height) / 2.0);

        Self {
            canvas_width,
            canvas_height,
            content_x: (canvas_width as f64 - content_width) / 2.0,
            content_y: (canvas_height as f64 - content_height) / 2.0,
            content_width,
            content_height,
            corner_radius: radius,
            crop,
            camera: camera.clamped(),
        }
    }

    fn focus(&self) -> (f64, f64) {
        (
            self.content_x + self.camera.position_x * self.content_width,
            self.content_y + self.camera.position_y * self.content_height,
        )
    }

    fn zoom(&self) -> f64 {
        self.camera.zoom_factor
    }

    /// Layout point to canvas point.
    pub fn to_canvas(&self, x: f64, y: f64) -> (f64, f64) {
        let (fx, fy) = self.focus();
        (
            (x - fx) * self.zoom() + self.canvas_width as f64 / 2.0,
            (y - fy) * self.zoom() + self.canvas_height as f64 / 2.0,
        )
    }

    /// Canvas point back to layout point.
    pub fn to_layout(&self, x: f64, y: f64) -> (f64, f64) {
        let (fx, fy) = self.focus();
        (
            (x - self.canvas_width as f64 / 2.0) / self.zoom() + fx,
            (y - self.canvas_height as f64 / 2.0) / self.zoom() + fy,
        )
    }

    /// Canvas position of a source pixel, or `None` outside the crop.
    pub fn source_to_canvas(&self, source_x: f64, source_y: f64) -> Option<(f64, f64)> {
        let u = (source_x - self.crop.x as f64) / self.crop.width.max(1) as f64;
        let v = (source_y - self.crop.y as f64) / self.crop.height.max(1) as f64;
        if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
            return None;
        }
        Some(self.to_canvas(
            self.content_x + u * self.content_width,
            self.content_y + v * self.content_height,
        ))
    }

    /// Output pixels per source pixel, zoom included.
    pub fn content_scale(&self) -> f64 {
        self.content_width / self.crop.width.max(1) as f64 * self.zoom()
    }

    /// Canvas-space rectangle (x0, y0, x1, y1) of a layout rectangle.
    pub fn canvas_rect(&self, x: f64, y: f64, width: f64, height: f64) -> (f64, f64, f64, f64) {
        let (x0, y0) = self.to_canvas(x, y);
        let (x1, y1) = self.to_canvas(x + width, y + height);
        (x0, y0, x1, y1)
    }
}

/// Build the blurred shadow layer for the content box of `layout`.
///
/// `None` when the content box has no area.
pub(crate) fn build_shadow_layer(layout: &FrameLayout, blur: f64) -> Option<ShadowLayer> {
    let pad = (blur * 2.0).ceil() + 2.0;
    let width = (layout.content_width + 2.0 * pad).ceil() as u32;
    let height = (layout.content_height + 2.0 * pad).ceil() as u32;

    let mut shape = Pixmap::new(width, height)?;
    let path = rounded_rect_path(
        pad as f32,
        pad as f32,
        layout.content_width as f32,
        layout.content_height as f32,
        layout.corner_radius as f32,
    )?;
    let mut paint = Paint {
        anti_alias: true,
        ..Paint::default()
    };
    paint.set_color_rgba8(0, 0, 0, 255);
    shape.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);

    let mask = imageops::blur(&alpha_mask(&shape), (blur / 2.0).max(0.5) as f32);
    let pixmap = pixmap_from_rgba(&tinted_mask(&mask, Rgba([0, 0, 0, 255])))?;

    Some(ShadowLayer {
        pixmap,
        origin_x: layout.content_x - pad,
        origin_y: layout.content_y - pad + blur * 0.25,
    })
}

fn draw_shadow(canvas: &mut Pixmap, layout: &FrameLayout, shadow: &ShadowLayer, opacity: f64) {
    let (x, y) = layout.to_canvas(shadow.origin_x, shadow.origin_y);
    let zoom = layout.zoom() as f32;
    let paint = PixmapPaint {
        opacity: opacity.clamp(0.0, 1.0) as f32,
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    canvas.draw_pixmap(
        0,
        0,
        shadow.pixmap.as_ref(),
        &paint,
        Transform::from_row(zoom, 0.0, 0.0, zoom, x as f32, y as f32),
        None,
    );
}

fn draw_content(canvas: &mut Pixmap, layout: &FrameLayout, source: &RgbaImage, quality: RenderQuality) {
    let crop = &layout.crop;
    let cropped = imageops::crop_imm(source, crop.x, crop.y, crop.width, crop.height).to_image();
    let Some(content) = pixmap_from_rgba(&cropped) else {
        return;
    };

    let (x0, y0, x1, y1) = layout.canvas_rect(
        layout.content_x,
        layout.content_y,
        layout.content_width,
        layout.content_height,
    );
    let Some(clip) = rounded_rect_path(
        x0 as f32,
        y0 as f32,
        (x1 - x0) as f32,
        (y1 - y0) as f32,
        (layout.corner_radius * layout.zoom()) as f32,
    ) else {
        return;
    };

    let filter = match quality {
        RenderQuality::Draft => FilterQuality::Nearest,
        RenderQuality::High => FilterQuality::Bilinear,
    };
    let to_canvas = Transform::from_row(
        ((x1 - x0) / content.width() as f64) as f32,
        0.0,
        0.0,
        ((y1 - y0) / content.height() as f64) as f32,
        x0 as f32,
        y0 as f32,
    );
    let paint = Paint {
        shader: Pattern::new(content.as_ref(), SpreadMode::Pad, filter, 1.0, to_canvas),
        anti_alias: true,
        ..Paint::default()
    };
    canvas.fill_path(&clip, &paint, FillRule::Winding, Transform::identity(), None);
}

/// Stateless frame compositor; all caches live in the [`RendererSession`].
pub struct Compositor;

impl Compositor {
    /// Camera resolved at `time` for a source of the given size.
    pub fn camera_at(
        session: &mut RendererSession,
        inputs: &FrameInputs,
        source_width: u32,
        source_height: u32,
        time: f64,
    ) -> CameraState {
        let path = session.camera_path(inputs, source_width, source_height);
        resolve_camera_state(inputs.segment(), path.as_deref(), time)
    }

    /// Render one output frame at source time `time`.
    ///
    /// Returns `Ok(None)` when the source frame is not decodable yet.
    pub fn render_frame(
        session: &mut RendererSession,
        frame: &SourceFrame,
        inputs: &FrameInputs,
        time: f64,
        options: RenderOptions,
    ) -> FlowcamResult<Option<RgbaImage>> {
        if !frame.is_ready() {
            return Ok(None);
        }
        let (width, height) = session.dimensions();
        if width == 0 || height == 0 {
            return Err(FlowcamError::render(format!(
                "Invalid output size {width}x{height}"
            )));
        }

        let source = frame.image.as_ref();
        let crop = inputs
            .segment()
            .crop_or_full()
            .to_pixels(source.width(), source.height());
        let camera = Self::camera_at(session, inputs, source.width(), source.height(), time);
        let layout = FrameLayout::new(width, height, crop, inputs.background(), camera);

        let mut scene = pixmap_from_rgba(session.background_canvas(inputs.background()))
            .ok_or_else(|| FlowcamError::render(format!("Invalid output size {width}x{height}")))?;

        let shadow_blur = inputs.background().shadow;
        if options.quality == RenderQuality::High && shadow_blur > 0.0 {
            let opacity = session.shadow_opacity();
            if let Some(shadow) = session.shadow_layer(&layout, shadow_blur) {
                draw_shadow(&mut scene, &layout, shadow, opacity);
            }
        }

        draw_content(&mut scene, &layout, source, options.quality);
        let mut canvas = rgba_from_pixmap(&scene);

        let dt = session.animation_step(time, options.export_mode);
        let cursor = session.smoothed_cursor(inputs).resolve_position(time);
        if let Some(cursor) = cursor {
            let squish = session.squish_mut().update(cursor.is_clicked, dt);
            if let Some((cx, cy)) = layout.source_to_canvas(cursor.x, cursor.y) {
                let scale = inputs.background().cursor_scale.max(0.0) * squish * layout.content_scale();
                if scale > 0.0 {
                    session.cursor_glyph(cursor.kind, scale).draw(&mut canvas, cx, cy);
                }
            }
        }

        let overlays: Vec<&TextOverlay> = inputs.segment().active_text_at(time).collect();
        if !overlays.is_empty() {
            session.text_renderer().draw(&mut canvas, overlays);
        }

        Ok(Some(canvas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcam_project_model::background::BackgroundType;
    use flowcam_project_model::segment::CropRect;

    fn layout(zoom: f64, x: f64, y: f64) -> FrameLayout {
        let background = BackgroundConfig {
            scale: 50.0,
            border_radius: 0.0,
            ..Default::default()
        };
        let crop = CropRect::FULL.to_pixels(200, 100);
        FrameLayout::new(200, 100, crop, &background, CameraState::new(0.0, zoom, x, y))
    }

    fn bare_background() -> BackgroundConfig {
        BackgroundConfig {
            scale: 100.0,
            border_radius: 0.0,
            shadow: 0.0,
            background_type: BackgroundType::Solid,
            ..Default::default()
        }
    }

    #[test]
    fn test_content_box_is_centred_and_aspect_fit() {
        let l = layout(1.0, 0.5, 0.5);
        assert!((l.content_width - 100.0).abs() < 1e-9);
        assert!((l.content_height - 50.0).abs() < 1e-9);
        assert!((l.content_x - 50.0).abs() < 1e-9);
        assert!((l.content_y - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_identity_camera_is_identity_transform() {
        let l = layout(1.0, 0.5, 0.5);
        let (x, y) = l.to_canvas(60.0, 30.0);
        assert!((x - 60.0).abs() < 1e-9 && (y - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_keeps_focus_at_canvas_centre() {
        let l = layout(2.0, 0.25, 0.25);
        let (fx, fy) = (l.content_x + 0.25 * l.content_width, l.content_y + 0.25 * l.content_height);
        let (x, y) = l.to_canvas(fx, fy);
        assert!((x - 100.0).abs() < 1e-9 && (y - 50.0).abs() < 1e-9);

        let (bx, by) = l.to_layout(x + 10.0, y);
        assert!((bx - (fx + 5.0)).abs() < 1e-9 && (by - fy).abs() < 1e-9);
    }

    #[test]
    fn test_source_outside_crop_has_no_canvas_position() {
        let background = bare_background();
        let crop = CropRect {
            x: 0.5,
            y: 0.0,
            width: 0.5,
            height: 1.0,
        }
        .to_pixels(200, 100);
        let l = FrameLayout::new(100, 100, crop, &background, CameraState::identity(0.0));
        assert!(l.source_to_canvas(50.0, 50.0).is_none());
        let (x, _) = l.source_to_canvas(100.0, 50.0).unwrap();
        assert!(x.abs() < 1e-9);
    }

    #[test]
    fn test_not_ready_frame_is_skipped() {
        let mut session = RendererSession::new(64, 36);
        let inputs = FrameInputs::new(VideoSegment::new(0.0, 1.0), bare_background(), &[]);
        let rendered = Compositor::render_frame(
            &mut session,
            &SourceFrame::new(0.0, image::RgbaImage::new(0, 0)),
            &inputs,
            0.0,
            RenderOptions::export(),
        )
        .unwrap();
        assert!(rendered.is_none());
    }

    #[test]
    fn test_full_scale_identity_reproduces_source() {
        let source = RgbaImage::from_fn(64, 36, |x, y| Rgba([(x * 4) as u8, (y * 7) as u8, 90, 255]));
        let frame = SourceFrame::new(0.0, source.clone());
        let inputs = FrameInputs::new(VideoSegment::new(0.0, 1.0), bare_background(), &[]);
        let mut session = RendererSession::new(64, 36);

        let out = Compositor::render_frame(
            &mut session,
            &frame,
            &inputs,
            0.0,
            RenderOptions::interactive(RenderQuality::Draft),
        )
        .unwrap()
        .unwrap();
        assert_eq!(out.dimensions(), source.dimensions());
        for (got, want) in out.pixels().zip(source.pixels()) {
            for c in 0..4 {
                assert!((got[c] as i16 - want[c] as i16).abs() <= 1, "{got:?} vs {want:?}");
            }
        }
    }

    #[test]
    fn test_rounded_corners_show_background() {
        let background = BackgroundConfig {
            border_radius: 12.0,
            ..bare_background()
        };
        let source = RgbaImage::from_pixel(64, 36, Rgba([250, 250, 250, 255]));
        let frame = SourceFrame::new(0.0, source);
        let inputs = FrameInputs::new(VideoSegment::new(0.0, 1.0), background.clone(), &[]);
        let mut session = RendererSession::new(64, 36);
        let backdrop = session.background_canvas(&background).clone();

        let out = Compositor::render_frame(
            &mut session,
            &frame,
            &inputs,
            0.0,
            RenderOptions::interactive(RenderQuality::Draft),
        )
        .unwrap()
        .unwrap();
        assert_eq!(out.get_pixel(0, 0), backdrop.get_pixel(0, 0));
        assert_eq!(out.get_pixel(63, 35), backdrop.get_pixel(63, 35));
        assert!(out.get_pixel(32, 18).0.iter().take(3).all(|&c| c >= 249));
        // The arc is anti-aliased: some corner pixel lies strictly between.
        let blended = (0..12).map(|i| out.get_pixel(i, i)[0]).any(|v| {
            v > backdrop.get_pixel(0, 0)[0] && v < 250
        });
        assert!(blended);
    }

    #[test]
    fn test_shadow_darkens_around_content() {
        let background = BackgroundConfig {
            scale: 50.0,
            shadow: 8.0,
            ..bare_background()
        };
        let source = RgbaImage::from_pixel(64, 36, Rgba([250, 250, 250, 255]));
        let frame = SourceFrame::new(0.0, source);
        let mut session = RendererSession::new(128, 72);
        let backdrop = session.background_canvas(&background).clone();

        let render = |session: &mut RendererSession, quality| {
            let inputs = FrameInputs::new(VideoSegment::new(0.0, 1.0), background.clone(), &[]);
            Compositor::render_frame(session, &frame, &inputs, 0.0, RenderOptions::interactive(quality))
                .unwrap()
                .unwrap()
        };
        let draft = render(&mut session, RenderQuality::Draft);
        let high = render(&mut session, RenderQuality::High);

        // Just below the content box bottom edge (y = 54).
        let (x, y) = (64, 56);
        assert_eq!(draft.get_pixel(x, y), backdrop.get_pixel(x, y));
        let lum = |p: &Rgba<u8>| p[0] as u32 + p[1] as u32 + p[2] as u32;
        assert!(lum(high.get_pixel(x, y)) < lum(backdrop.get_pixel(x, y)));
    }

    #[test]
    fn test_cursor_is_drawn_over_content() {
        let source = RgbaImage::from_pixel(64, 36, Rgba([200, 30, 30, 255]));
        let frame = SourceFrame::new(0.5, source);
        let positions = vec![
            MousePosition {
                x: 20.0,
                y: 10.0,
                timestamp: 0.0,
                is_clicked: false,
                cursor_type: "default".to_string(),
            },
            MousePosition {
                x: 20.0,
                y: 10.0,
                timestamp: 1.0,
                is_clicked: false,
                cursor_type: "default".to_string(),
            },
        ];
        let inputs = FrameInputs::new(VideoSegment::new(0.0, 1.0), bare_background(), &positions);
        let mut session = RendererSession::new(64, 36);

        let out = Compositor::render_frame(
            &mut session,
            &frame,
            &inputs,
            0.5,
            RenderOptions::interactive(RenderQuality::Draft),
        )
        .unwrap()
        .unwrap();
        let dark = out.pixels().filter(|p| p.0 == [0, 0, 0, 255]).count();
        assert!(dark > 0, "cursor glyph missing");
    }
}
