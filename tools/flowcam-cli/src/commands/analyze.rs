//! Generate the camera path for a project.

use std::path::PathBuf;

use serde::Serialize;

use flowcam_common::config::AppConfig;
use flowcam_processing_core::camera_path::{CameraPathConfig, CameraPathGenerator};
use flowcam_processing_core::camera_resolve::sample_camera_states;
use flowcam_processing_core::telemetry::TelemetrySampler;
use flowcam_project_model::LoadedProject;
use flowcam_render_engine::ffmpeg::probe_video_dimensions;

/// Fallback frame size when neither the bundle nor ffprobe knows it.
const DEFAULT_FRAME: (u32, u32) = (1920, 1080);

#[derive(Debug, Serialize)]
struct AnalysisSummary {
    frame_width: u32,
    frame_height: u32,
    cursor_samples: usize,
    path_states: usize,
    min_zoom: f64,
    max_zoom: f64,
    mean_zoom: f64,
    zoomed_secs: f64,
    export_frames: usize,
}

pub fn run(path: PathBuf, fps: u32, write: bool, json: bool) -> anyhow::Result<()> {
    let app = AppConfig::load();
    let mut project =
        LoadedProject::load(&path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))?;

    let (width, height) = frame_size(&project, &app.export.ffprobe_binary);
    let mut segment = project.segment.clone();
    segment.normalize();
    segment
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid segment: {e}"))?;

    let config = CameraPathConfig {
        tick_secs: 1.0 / fps.max(1) as f64,
        ..CameraPathConfig::from_defaults(&app.camera)
    };
    let sampler = TelemetrySampler::from_mouse_positions(&project.mouse_positions, width, height);

    if !json {
        println!("Analyzing project at: {}", path.display());
        println!("  Frame: {width}x{height}");
        println!("  Loaded {} cursor samples", sampler.len());
    }

    let Some(camera_path) = CameraPathGenerator::new(config).generate(&sampler, &segment) else {
        println!("  No cursor motion in the segment; keyframes will drive the camera.");
        return Ok(());
    };

    let (min_zoom, max_zoom) = camera_path.zoom_range().unwrap_or((1.0, 1.0));
    let mean_zoom = camera_path.states.iter().map(|s| s.zoom_factor).sum::<f64>()
        / camera_path.len().max(1) as f64;
    let tick = 1.0 / fps.max(1) as f64;
    let zoomed_secs = camera_path
        .states
        .iter()
        .filter(|s| s.zoom_factor > 1.05)
        .count() as f64
        * tick;
    let resolved = sample_camera_states(&segment, Some(&camera_path.states), fps);

    let summary = AnalysisSummary {
        frame_width: width,
        frame_height: height,
        cursor_samples: sampler.len(),
        path_states: camera_path.len(),
        min_zoom,
        max_zoom,
        mean_zoom,
        zoomed_secs,
        export_frames: resolved.len(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("  Generated {} camera states", summary.path_states);
        println!(
            "  Zoom: min {:.2}  max {:.2}  mean {:.2}",
            summary.min_zoom, summary.max_zoom, summary.mean_zoom
        );
        println!("  Zoomed in for {:.1}s", summary.zoomed_secs);
        println!("  Export frames at {fps} fps: {}", summary.export_frames);
    }

    if write {
        project.segment.smooth_motion_path = Some(camera_path.to_motion_points());
        project
            .save()
            .map_err(|e| anyhow::anyhow!("Failed to save segment: {e}"))?;
        if !json {
            println!(
                "  Motion path saved to: {}",
                path.join("meta/segment.json").display()
            );
        }
    }

    Ok(())
}

fn frame_size(project: &LoadedProject, ffprobe: &str) -> (u32, u32) {
    if let Some(track) = &project.project.source {
        if track.width > 0 && track.height > 0 {
            return (track.width, track.height);
        }
    }
    project
        .source_path()
        .filter(|p| p.exists())
        .and_then(|p| probe_video_dimensions(ffprobe, &p))
        .unwrap_or_else(|| {
            tracing::warn!("Source size unknown, assuming 1920x1080");
            DEFAULT_FRAME
        })
}
