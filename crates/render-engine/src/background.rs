//! Canvas background fills.

use std::io::Cursor;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageReader, Rgba, RgbaImage};

use flowcam_project_model::background::{BackgroundConfig, BackgroundType};

/// Near-black fill used for `Solid` and as the fallback for broken custom images.
pub const SOLID_COLOR: Rgba<u8> = Rgba([0x0A, 0x0A, 0x0A, 255]);

/// Start and end colours of the diagonal gradient presets.
pub fn gradient_stops(kind: BackgroundType) -> Option<(Rgba<u8>, Rgba<u8>)> {
    match kind {
        BackgroundType::Gradient1 => Some((
            Rgba([0x25, 0x63, 0xEB, 255]),
            Rgba([0x7C, 0x3A, 0xED, 255]),
        )),
        BackgroundType::Gradient2 => Some((
            Rgba([0xFB, 0x71, 0x85, 255]),
            Rgba([0xFB, 0x92, 0x3C, 255]),
        )),
        BackgroundType::Gradient3 => Some((
            Rgba([0x10, 0xB9, 0x81, 255]),
            Rgba([0x14, 0xB8, 0xA6, 255]),
        )),
        _ => None,
    }
}

/// Parse `#RRGGBB` or `#RRGGBBAA`.
pub fn parse_hex_color(value: &str) -> Option<Rgba<u8>> {
    let hex = value.trim().strip_prefix('#')?;
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        6 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255])),
        8 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, channel(6)?])),
        _ => None,
    }
}

/// Decode a custom background given as a `data:` URL or a file path.
///
/// Returns `None` (after logging) when the image cannot be read.
pub fn decode_custom_background(reference: &str) -> Option<RgbaImage> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    let bytes = if let Some(rest) = reference.strip_prefix("data:") {
        let Some((_, payload)) = rest.split_once(";base64,") else {
            tracing::warn!("Custom background data URL is not base64 encoded");
            return None;
        };
        match STANDARD.decode(payload.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode custom background base64");
                return None;
            }
        }
    } else {
        match std::fs::read(Path::new(reference)) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = reference, error = %e, "Failed to read custom background");
                return None;
            }
        }
    };

    let reader = match ImageReader::new(Cursor::new(bytes)).with_guessed_format() {
        Ok(reader) => reader,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read custom background image");
            return None;
        }
    };
    match reader.decode() {
        Ok(image) => Some(image.to_rgba8()),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to decode custom background image");
            None
        }
    }
}

/// Render the background canvas for `config` at the output size.
pub fn render_background(config: &BackgroundConfig, width: u32, height: u32) -> RgbaImage {
    match config.background_type {
        BackgroundType::None => RgbaImage::new(width, height),
        BackgroundType::Solid => RgbaImage::from_pixel(width, height, SOLID_COLOR),
        BackgroundType::Custom => config
            .custom_background
            .as_deref()
            .and_then(decode_custom_background)
            .map(|image| cover(&image, width, height))
            .unwrap_or_else(|| {
                tracing::warn!("Custom background unavailable, using solid fill");
                RgbaImage::from_pixel(width, height, SOLID_COLOR)
            }),
        kind => match gradient_stops(kind) {
            Some((from, to)) => diagonal_gradient(width, height, from, to),
            None => RgbaImage::from_pixel(width, height, SOLID_COLOR),
        },
    }
}

fn diagonal_gradient(width: u32, height: u32, from: Rgba<u8>, to: Rgba<u8>) -> RgbaImage {
    let span = (width + height).saturating_sub(2).max(1) as f32;
    RgbaImage::from_fn(width, height, |x, y| {
        let t = (x + y) as f32 / span;
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Rgba([
            mix(from[0], to[0]),
            mix(from[1], to[1]),
            mix(from[2], to[2]),
            mix(from[3], to[3]),
        ])
    })
}

/// Scale `image` to cover `width`×`height` and crop the centre.
fn cover(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let (iw, ih) = image.dimensions();
    if iw == 0 || ih == 0 || width == 0 || height == 0 {
        return RgbaImage::from_pixel(width, height, SOLID_COLOR);
    }

    let scale = (width as f64 / iw as f64).max(height as f64 / ih as f64);
    let scaled_w = ((iw as f64 * scale).ceil() as u32).max(width);
    let scaled_h = ((ih as f64 * scale).ceil() as u32).max(height);
    let scaled = imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);

    let x = (scaled_w - width) / 2;
    let y = (scaled_h - height) / 2;
    imageops::crop_imm(&scaled, x, y, width, height).to_image()
}
