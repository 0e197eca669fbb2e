//! Show project information.

use std::path::PathBuf;

use flowcam_project_model::LoadedProject;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let project =
        LoadedProject::load(&path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))?;

    let p = &project.project;
    let segment = &project.segment;

    println!("Project: {}", p.name);
    println!("  ID: {}", p.id);
    println!("  Created: {}", p.created_at);
    println!("  Modified: {}", p.modified_at);
    println!();

    println!("Tracks:");
    match &p.source {
        Some(t) => println!(
            "  Source: {} ({}x{}, {:.1}s)",
            t.path, t.width, t.height, t.duration_secs
        ),
        None => println!("  Source: (none)"),
    }
    if let Some(t) = &p.audio {
        println!("  Audio: {} ({:.1}s)", t.path, t.duration_secs);
    }
    println!();

    println!("Segment:");
    println!(
        "  Trim: {:.2}s - {:.2}s ({:.2}s at {}x)",
        segment.trim_start,
        segment.trim_end,
        segment.duration(),
        segment.speed
    );
    match &segment.crop {
        Some(c) => println!(
            "  Crop: x={:.3} y={:.3} w={:.3} h={:.3}",
            c.x, c.y, c.width, c.height
        ),
        None => println!("  Crop: full frame"),
    }
    println!("  Zoom keyframes: {}", segment.zoom_keyframes.len());
    println!("  Influence points: {}", segment.zoom_influence_points.len());
    println!(
        "  Motion path: {}",
        segment
            .smooth_motion_path
            .as_ref()
            .map(|path| format!("{} samples", path.len()))
            .unwrap_or_else(|| "not generated".to_string())
    );
    println!("  Text overlays: {}", segment.text_segments.len());
    println!();

    let bg = &project.background;
    println!("Background:");
    println!("  Type: {}", bg.background_type.as_str());
    println!(
        "  Scale: {}%  Radius: {}px  Shadow: {}px",
        bg.scale, bg.border_radius, bg.shadow
    );
    println!(
        "  Cursor: scale {} smoothness {}",
        bg.cursor_scale, bg.cursor_smoothness
    );
    println!();

    println!("Cursor trace: {} samples", project.mouse_positions.len());
    println!();

    println!("Export settings:");
    println!("  Dimensions: {}", p.export.dimensions.as_str());
    println!("  FPS: {}", p.export.fps);

    Ok(())
}
