//! Output size presets.

use flowcam_project_model::segment::CropRect;

pub use flowcam_project_model::DimensionPreset;

/// Resolve the output size for `preset` from the cropped source size.
///
/// Fixed-height presets derive the width from the cropped aspect ratio.
/// Both sides are forced even (rounding down) with a floor of 2.
pub fn resolve_output_dimensions(
    preset: DimensionPreset,
    source_width: u32,
    source_height: u32,
    crop: &CropRect,
) -> (u32, u32) {
    let cropped = crop.to_pixels(source_width, source_height);
    let (width, height) = match preset.target_height() {
        None => (cropped.width, cropped.height),
        Some(target) => {
            let aspect = cropped.width as f64 / cropped.height.max(1) as f64;
            ((target as f64 * aspect).round() as u32, target)
        }
    };
    (force_even(width), force_even(height))
}

fn force_even(value: u32) -> u32 {
    (value - value % 2).max(2)
}
