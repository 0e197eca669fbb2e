//! Vector cursor glyphs and the click squish animation.

use image::{imageops, RgbaImage};
use tiny_skia::{FillRule, LineJoin, Paint, Path, PathBuilder, Pixmap, Stroke, Transform};

use flowcam_project_model::event::CursorKind;

use crate::raster::rgba_from_pixmap;

/// Scale held while the button is down.
pub const SQUISH_TARGET: f64 = 0.75;

/// Time the squish is held after release so short clicks still register.
pub const SQUISH_FUSE_SECS: f64 = 0.12;

/// Approach rate toward the squished scale (1/s).
pub const SQUISH_SPEED: f64 = 30.0;

/// Approach rate back to full size (1/s).
pub const RELEASE_SPEED: f64 = 12.0;

/// Glyph design box edge in glyph units.
const GLYPH_UNITS: f64 = 24.0;

const ARROW: &[&[(f64, f64)]] = &[
    &[(8.2, 4.9), (19.8, 16.5), (13.0, 16.5), (12.6, 16.6), (8.2, 20.9)],
    &[(17.3, 21.6), (13.7, 23.1), (9.0, 12.0), (12.7, 10.5)],
];

const IBEAM: &[&[(f64, f64)]] = &[&[
    (5.0, 3.0),
    (13.0, 3.0),
    (13.0, 5.0),
    (10.0, 5.0),
    (10.0, 19.0),
    (13.0, 19.0),
    (13.0, 21.0),
    (5.0, 21.0),
    (5.0, 19.0),
    (8.0, 19.0),
    (8.0, 5.0),
    (5.0, 5.0),
]];

const HAND: &[&[(f64, f64)]] = &[&[
    (10.0, 3.0),
    (12.0, 3.0),
    (13.0, 4.0),
    (13.0, 10.0),
    (16.0, 10.0),
    (19.0, 11.0),
    (20.0, 12.5),
    (20.0, 18.0),
    (18.0, 22.0),
    (11.0, 22.0),
    (7.0, 18.0),
    (5.0, 15.0),
    (5.5, 13.5),
    (7.0, 13.5),
    (9.0, 15.0),
    (9.0, 4.0),
]];

fn outline(kind: CursorKind) -> (&'static [&'static [(f64, f64)]], (f64, f64)) {
    match kind {
        CursorKind::Default => (ARROW, (8.2, 4.9)),
        CursorKind::Text => (IBEAM, (9.0, 12.0)),
        CursorKind::Pointer => (HAND, (11.0, 3.0)),
    }
}

/// Outline width around the glyph, in glyph units.
const OUTLINE_UNITS: f32 = 2.0;

fn glyph_path(polygons: &[&[(f64, f64)]]) -> Option<Path> {
    let mut pb = PathBuilder::new();
    for polygon in polygons {
        let mut points = polygon.iter();
        let Some(&(x, y)) = points.next() else {
            continue;
        };
        pb.move_to(x as f32, y as f32);
        for &(x, y) in points {
            pb.line_to(x as f32, y as f32);
        }
        pb.close();
    }
    pb.finish()
}

/// A rasterized cursor glyph with its hotspot in image pixels.
#[derive(Debug, Clone)]
pub struct CursorGlyph {
    pub image: RgbaImage,
    pub hotspot: (f64, f64),
}

impl CursorGlyph {
    /// Rasterize the glyph for `kind` at `scale`, black with a white outline.
    pub fn render(kind: CursorKind, scale: f64) -> Self {
        let scale = scale.clamp(0.25, 16.0);
        let pad = (OUTLINE_UNITS as f64 * scale / 2.0).ceil() + 1.0;
        let edge = (GLYPH_UNITS * scale + 2.0 * pad).ceil() as u32;
        let (polygons, (hx, hy)) = outline(kind);

        let image = match (Pixmap::new(edge, edge), glyph_path(polygons)) {
            (Some(mut pixmap), Some(path)) => {
                let transform =
                    Transform::from_row(scale as f32, 0.0, 0.0, scale as f32, pad as f32, pad as f32);
                let mut paint = Paint {
                    anti_alias: true,
                    ..Paint::default()
                };
                paint.set_color_rgba8(255, 255, 255, 255);
                let stroke = Stroke {
                    width: OUTLINE_UNITS,
                    line_join: LineJoin::Round,
                    ..Stroke::default()
                };
                pixmap.stroke_path(&path, &paint, &stroke, transform, None);
                paint.set_color_rgba8(0, 0, 0, 255);
                pixmap.fill_path(&path, &paint, FillRule::Winding, transform, None);
                rgba_from_pixmap(&pixmap)
            }
            _ => RgbaImage::new(edge, edge),
        };

        Self {
            image,
            hotspot: (hx * scale + pad, hy * scale + pad),
        }
    }

    /// Composite the glyph onto `canvas` with its hotspot at (`x`, `y`).
    pub fn draw(&self, canvas: &mut RgbaImage, x: f64, y: f64) {
        let left = (x - self.hotspot.0).round() as i64;
        let top = (y - self.hotspot.1).round() as i64;
        imageops::overlay(canvas, &self.image, left, top);
    }
}

/// Click squish animator.
///
/// Approaches `SQUISH_TARGET` while pressed (and during the fuse window after
/// release), then relaxes back to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorSquish {
    scale: f64,
    release_timer: f64,
}

impl Default for CursorSquish {
    fn default() -> Self {
        Self {
            scale: 1.0,
            release_timer: 0.0,
        }
    }
}

impl CursorSquish {
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advance by `dt` seconds and return the new scale.
    pub fn update(&mut self, clicked: bool, dt: f64) -> f64 {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        if clicked {
            self.release_timer = SQUISH_FUSE_SECS;
        } else {
            self.release_timer = (self.release_timer - dt).max(0.0);
        }

        let pressed = clicked || self.release_timer > 0.0;
        let (target, speed) = if pressed {
            (SQUISH_TARGET, SQUISH_SPEED)
        } else {
            (1.0, RELEASE_SPEED)
        };
        self.scale += (target - self.scale) * (1.0 - (-speed * dt).exp());
        self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_squish_approaches_target_while_pressed() {
        let mut squish = CursorSquish::default();
        for _ in 0..30 {
            squish.update(true, 1.0 / 60.0);
        }
        assert!((squish.scale() - SQUISH_TARGET).abs() < 0.01);
    }

    #[test]
    fn test_short_click_is_held_by_fuse() {
        let mut squish = CursorSquish::default();
        squish.update(true, 1.0 / 60.0);
        let after_press = squish.scale();
        // Still inside the fuse window: keeps squishing.
        let held = squish.update(false, 0.05);
        assert!(held < after_press);
        // Past the fuse: relaxes back toward 1.0.
        squish.update(false, 0.1);
        let mut last = squish.scale();
        for _ in 0..120 {
            let next = squish.update(false, 1.0 / 60.0);
            assert!(next >= last - 1e-12);
            last = next;
        }
        assert!((last - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_zero_dt_is_stationary() {
        let mut squish = CursorSquish::default();
        assert_eq!(squish.update(true, 0.0), 1.0);
    }

    #[test]
    fn test_glyph_has_black_fill_and_white_outline() {
        let glyph = CursorGlyph::render(CursorKind::Default, 2.0);
        let has_black = glyph.image.pixels().any(|p| p.0 == [0, 0, 0, 255]);
        let has_white = glyph.image.pixels().any(|p| p.0 == [255, 255, 255, 255]);
        assert!(has_black && has_white);

        // The hotspot sits on the drawn glyph (arrow tip) with room for the outline.
        let (hx, hy) = glyph.hotspot;
        assert!(hx > 0.0 && hy > 0.0);
        assert!(hx < glyph.image.width() as f64 && hy < glyph.image.height() as f64);
    }

    #[test]
    fn test_glyph_edges_are_anti_aliased() {
        let glyph = CursorGlyph::render(CursorKind::Default, 1.5);
        let partial = glyph.image.pixels().filter(|p| p[3] > 0 && p[3] < 255).count();
        assert!(partial > 0);
        // Corners of the padded box stay clear.
        assert_eq!(glyph.image.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_glyph_draw_places_hotspot() {
        let glyph = CursorGlyph::render(CursorKind::Text, 1.0);
        let mut canvas = RgbaImage::from_pixel(48, 48, Rgba([40, 40, 40, 255]));
        glyph.draw(&mut canvas, 24.0, 24.0);
        // The I-beam hotspot sits on its black stem.
        assert_eq!(canvas.get_pixel(24, 24).0, [0, 0, 0, 255]);
        assert!(canvas.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_glyph_draw_clips_at_canvas_edge() {
        let glyph = CursorGlyph::render(CursorKind::Pointer, 1.0);
        let mut canvas = RgbaImage::from_pixel(8, 8, Rgba([40, 40, 40, 255]));
        glyph.draw(&mut canvas, 7.0, 7.0);
        glyph.draw(&mut canvas, -100.0, -100.0);
        assert_eq!(canvas.dimensions(), (8, 8));
    }
}
