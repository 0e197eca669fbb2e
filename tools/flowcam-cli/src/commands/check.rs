//! Check encoder availability.

use flowcam_common::config::{config_file_path, AppConfig};
use flowcam_render_engine::ffmpeg::command_exists;
use flowcam_render_engine::text::TextRenderer;

pub fn run() -> anyhow::Result<()> {
    let config = AppConfig::load();

    println!("Flowcam System Check");
    println!("{}", "=".repeat(50));
    println!("Config: {}", config_file_path().display());

    let tools = [
        ("Encoder", config.export.ffmpeg_binary.as_str()),
        ("Probe", config.export.ffprobe_binary.as_str()),
    ];
    let mut all_ok = true;
    for (label, binary) in tools {
        if command_exists(binary) {
            println!("[OK] {label}: {binary}");
        } else {
            println!("[MISSING] {label}: {binary} not found in PATH");
            all_ok = false;
        }
    }

    let text = TextRenderer::load(config.render.font_path.as_deref());
    match (text.font_source(), &config.render.font_path) {
        (Some(loaded), Some(configured)) if loaded != configured.as_path() => println!(
            "[WARN] Overlay font {} unusable, falling back to {}",
            configured.display(),
            loaded.display()
        ),
        (Some(loaded), _) => println!("[OK] Overlay font: {}", loaded.display()),
        (None, _) => println!("[WARN] No overlay font found, text overlays are skipped"),
    }

    println!();
    if all_ok {
        println!("All required tools are available. Flowcam is ready.");
    } else {
        println!("Install ffmpeg (with ffprobe) to export video.");
    }

    Ok(())
}
