//! Initialize a new Flowcam project bundle.

use std::path::PathBuf;

use flowcam_common::config::AppConfig;
use flowcam_project_model::project::TrackRef;
use flowcam_project_model::segment::VideoSegment;
use flowcam_project_model::LoadedProject;
use flowcam_render_engine::ffmpeg::{probe_duration_secs, probe_video_dimensions};

pub fn run(
    path: PathBuf,
    name: Option<String>,
    source: Option<PathBuf>,
    duration: f64,
) -> anyhow::Result<()> {
    let name = name.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording".to_string())
    });
    println!("Creating project '{}' at {}", name, path.display());

    let ffprobe = AppConfig::load().export.ffprobe_binary;
    let mut track = None;
    let mut segment_secs = duration;

    if let Some(source) = &source {
        let file_name = source
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Source has no file name: {}", source.display()))?;
        let relative = PathBuf::from("sources").join(file_name);

        std::fs::create_dir_all(path.join("sources"))?;
        std::fs::copy(source, path.join(&relative))
            .map_err(|e| anyhow::anyhow!("Failed to copy {}: {e}", source.display()))?;

        let copied = path.join(&relative);
        let (width, height) = probe_video_dimensions(&ffprobe, &copied).unwrap_or((0, 0));
        let duration_secs = probe_duration_secs(&ffprobe, &copied).unwrap_or(0.0);
        if duration_secs > 0.0 {
            segment_secs = duration_secs;
        }
        track = Some(TrackRef {
            path: relative.to_string_lossy().into_owned(),
            duration_secs,
            width,
            height,
        });
    }

    if !(segment_secs > 0.0) {
        anyhow::bail!("Segment duration must be positive, got {segment_secs}");
    }

    let mut project = LoadedProject::create(&path, &name, VideoSegment::new(0.0, segment_secs))
        .map_err(|e| anyhow::anyhow!("Failed to create project: {e}"))?;
    if track.is_some() {
        project.project.source = track;
        project
            .save()
            .map_err(|e| anyhow::anyhow!("Failed to save project: {e}"))?;
    }

    println!("Project created successfully:");
    println!("  Directory: {}", project.root.display());
    println!("  Segment: 0.0s - {segment_secs:.2}s");
    println!();
    println!("Directory structure:");
    println!("  {}/", name);
    println!("  ├── sources/     (recorded video and audio)");
    println!("  ├── meta/        (project.json, segment.json, background.json, mouse.json)");
    println!("  └── exports/     (rendered output)");

    Ok(())
}
