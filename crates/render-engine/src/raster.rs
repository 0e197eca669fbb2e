//! Bridges between `image` buffers and tiny-skia pixmaps, plus shared paths.
//!
//! tiny-skia stores premultiplied RGBA; `image` buffers are straight alpha.

use image::{GrayImage, Rgba, RgbaImage};
use tiny_skia::{IntSize, Path, PathBuilder, Pixmap, Rect};

/// Cubic Bézier handle length for a quarter circle, as a fraction of the radius.
const KAPPA: f32 = 0.552_284_8;

/// Closed rounded rectangle path; `None` for an empty or non-finite box.
pub fn rounded_rect_path(x: f32, y: f32, width: f32, height: f32, radius: f32) -> Option<Path> {
    if !(width > 0.0 && height > 0.0) || !x.is_finite() || !y.is_finite() {
        return None;
    }
    let radius = if radius.is_finite() {
        radius.clamp(0.0, width.min(height) / 2.0)
    } else {
        0.0
    };
    if radius <= 0.0 {
        return Rect::from_xywh(x, y, width, height).map(PathBuilder::from_rect);
    }

    let k = radius * (1.0 - KAPPA);
    let (right, bottom) = (x + width, y + height);
    let mut pb = PathBuilder::new();
    pb.move_to(x + radius, y);
    pb.line_to(right - radius, y);
    pb.cubic_to(right - k, y, right, y + k, right, y + radius);
    pb.line_to(right, bottom - radius);
    pb.cubic_to(right, bottom - k, right - k, bottom, right - radius, bottom);
    pb.line_to(x + radius, bottom);
    pb.cubic_to(x + k, bottom, x, bottom - k, x, bottom - radius);
    pb.line_to(x, y + radius);
    pb.cubic_to(x, y + k, x + k, y, x + radius, y);
    pb.close();
    pb.finish()
}

/// Premultiplied copy of `image`; `None` when it has no pixels.
pub fn pixmap_from_rgba(image: &RgbaImage) -> Option<Pixmap> {
    let size = IntSize::from_wh(image.width(), image.height())?;
    let mut data = image.as_raw().clone();
    for px in data.chunks_exact_mut(4) {
        let alpha = px[3] as u16;
        if alpha < 255 {
            for c in &mut px[..3] {
                *c = ((*c as u16 * alpha + 127) / 255) as u8;
            }
        }
    }
    Pixmap::from_vec(data, size)
}

/// Straight-alpha copy of `pixmap`.
pub fn rgba_from_pixmap(pixmap: &Pixmap) -> RgbaImage {
    let (width, height) = (pixmap.width(), pixmap.height());
    let mut data = Vec::with_capacity(pixmap.data().len());
    for px in pixmap.pixels() {
        let c = px.demultiply();
        data.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    RgbaImage::from_raw(width, height, data).unwrap_or_else(|| RgbaImage::new(width, height))
}

/// Alpha channel of `pixmap` as a coverage mask.
pub fn alpha_mask(pixmap: &Pixmap) -> GrayImage {
    let alpha = pixmap.pixels().iter().map(|px| px.alpha()).collect();
    GrayImage::from_raw(pixmap.width(), pixmap.height(), alpha)
        .unwrap_or_else(|| GrayImage::new(pixmap.width(), pixmap.height()))
}

/// Solid `color` layer whose alpha is `mask` coverage times the color alpha.
pub fn tinted_mask(mask: &GrayImage, color: Rgba<u8>) -> RgbaImage {
    RgbaImage::from_fn(mask.width(), mask.height(), |x, y| {
        let coverage = mask.get_pixel(x, y)[0] as u16;
        let alpha = ((coverage * color[3] as u16 + 127) / 255) as u8;
        Rgba([color[0], color[1], color[2], alpha])
    })
}
