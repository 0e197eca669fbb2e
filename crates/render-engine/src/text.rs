//! Text overlay rendering and hit testing.

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{imageops, GrayImage, Luma, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};

use flowcam_project_model::segment::TextOverlay;

use crate::background::parse_hex_color;
use crate::raster::tinted_mask;

/// Fonts tried when no font path is configured.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const SHADOW_OFFSET: i64 = 2;
const SHADOW_COLOR: Rgba<u8> = Rgba([0, 0, 0, 153]);

/// Pixel bounds of a laid out overlay on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextBounds {
    pub left: i64,
    pub top: i64,
    pub width: u32,
    pub height: u32,
}

impl TextBounds {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left as f64
            && y >= self.top as f64
            && x < (self.left + self.width as i64) as f64
            && y < (self.top + self.height as i64) as f64
    }
}

/// Draws text overlays with a loaded font.
///
/// Without a font, overlays are skipped with one warning per renderer.
pub struct TextRenderer {
    font: Option<FontVec>,
    source: Option<PathBuf>,
    warned: bool,
}

impl TextRenderer {
    /// Load the configured font, or the first readable system font.
    pub fn load(font_path: Option<&Path>) -> Self {
        let candidates = font_path
            .map(|p| p.to_path_buf())
            .into_iter()
            .chain(FONT_CANDIDATES.iter().map(PathBuf::from));

        for path in candidates {
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            match FontVec::try_from_vec(bytes) {
                Ok(font) => {
                    tracing::debug!(path = %path.display(), "Loaded overlay font");
                    return Self {
                        font: Some(font),
                        source: Some(path),
                        warned: false,
                    };
                }
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Unusable font file");
                }
            }
        }

        Self::without_font()
    }

    pub fn without_font() -> Self {
        Self {
            font: None,
            source: None,
            warned: false,
        }
    }

    pub fn font_source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Rendered size of `text` at `font_size` pixels.
    ///
    /// Falls back to an estimate when no font is loaded.
    pub fn measure(&self, text: &str, font_size: f64) -> (u32, u32) {
        let size = font_size.max(1.0) as f32;
        match &self.font {
            Some(font) => text_size(PxScale::from(size), font, text),
            None => (
                (text.chars().count() as f32 * size * 0.6).ceil() as u32,
                size.ceil() as u32,
            ),
        }
    }

    /// Canvas bounds of `overlay`, centred on its anchor.
    pub fn bounds(&self, overlay: &TextOverlay, canvas_width: u32, canvas_height: u32) -> TextBounds {
        let (width, height) = self.measure(&overlay.text, overlay.style.font_size);
        let anchor_x = overlay.style.x / 100.0 * canvas_width as f64;
        let anchor_y = overlay.style.y / 100.0 * canvas_height as f64;
        TextBounds {
            left: (anchor_x - width as f64 / 2.0).round() as i64,
            top: (anchor_y - height as f64 / 2.0).round() as i64,
            width,
            height,
        }
    }

    /// Draw each overlay with its drop shadow.
    pub fn draw<'a>(
        &mut self,
        canvas: &mut RgbaImage,
        overlays: impl IntoIterator<Item = &'a TextOverlay>,
    ) {
        let mut overlays = overlays.into_iter().peekable();
        if overlays.peek().is_none() {
            return;
        }
        let Some(font) = &self.font else {
            if !self.warned {
                tracing::warn!("No usable font found, text overlays are skipped");
                self.warned = true;
            }
            return;
        };

        for overlay in overlays {
            if overlay.text.trim().is_empty() {
                continue;
            }
            let size = overlay.style.font_size.max(1.0) as f32;
            let scale = PxScale::from(size);
            let (width, height) = text_size(scale, font, &overlay.text);
            let pad = (size / 4.0).ceil() as u32;

            let mut mask = GrayImage::new(width + 2 * pad, height + 2 * pad);
            draw_text_mut(
                &mut mask,
                Luma([255]),
                pad as i32,
                pad as i32,
                scale,
                font,
                &overlay.text,
            );

            let bounds = self.bounds(overlay, canvas.width(), canvas.height());
            let origin_x = bounds.left - pad as i64;
            let origin_y = bounds.top - pad as i64;
            let color = parse_hex_color(&overlay.style.color).unwrap_or(Rgba([255, 255, 255, 255]));

            stamp_mask(
                canvas,
                &mask,
                origin_x + SHADOW_OFFSET,
                origin_y + SHADOW_OFFSET,
                SHADOW_COLOR,
            );
            stamp_mask(canvas, &mask, origin_x, origin_y, color);
        }
    }
}

fn stamp_mask(canvas: &mut RgbaImage, mask: &GrayImage, left: i64, top: i64, color: Rgba<u8>) {
    imageops::overlay(canvas, &tinted_mask(mask, color), left, top);
}

/// Finds the overlay under a canvas point during interactive editing.
pub struct TextHitTester<'a> {
    renderer: &'a TextRenderer,
    canvas_width: u32,
    canvas_height: u32,
    enabled: bool,
}

impl<'a> TextHitTester<'a> {
    pub fn new(renderer: &'a TextRenderer, canvas_width: u32, canvas_height: u32, export_mode: bool) -> Self {
        Self {
            renderer,
            canvas_width,
            canvas_height,
            enabled: !export_mode,
        }
    }

    /// Id of the top-most overlay visible at `time` that contains (`x`, `y`).
    ///
    /// Always `None` in export mode.
    pub fn hit_test<'o>(&self, overlays: &'o [TextOverlay], time: f64, x: f64, y: f64) -> Option<&'o str> {
        if !self.enabled {
            return None;
        }
        overlays
            .iter()
            .rev()
            .filter(|overlay| overlay.is_active(time))
            .find(|overlay| {
                self.renderer
                    .bounds(overlay, self.canvas_width, self.canvas_height)
                    .contains(x, y)
            })
            .map(|overlay| overlay.id.as_str())
    }
}
