//! Export a project to video.

use std::path::PathBuf;

use flowcam_common::config::AppConfig;
use flowcam_project_model::{DimensionPreset, LoadedProject};
use flowcam_render_engine::export::{
    export_to_file, ExportDriver, ExportDriverConfig, ExportProgress, ExportRequest, ExportStage,
    ProgressCallback,
};
use flowcam_render_engine::sink::DirectorySink;
use flowcam_render_engine::source::FfmpegFrameSource;

pub async fn run(
    path: PathBuf,
    output: Option<PathBuf>,
    dimensions: Option<DimensionPreset>,
    fps: Option<u32>,
    speed: Option<f64>,
    frames_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("Exporting project at: {}", path.display());

    let project =
        LoadedProject::load(&path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))?;
    let output_path = output.unwrap_or_else(|| path.join("exports").join("output.mp4"));

    let mut request = ExportRequest::from_project(&project, &output_path)?;
    if let Some(dimensions) = dimensions {
        request.dimensions = dimensions;
    }
    if let Some(fps) = fps {
        request.fps = fps;
    }
    if let Some(speed) = speed {
        request.speed = speed;
    }
    let config = ExportDriverConfig::from_app_config(&AppConfig::load());

    println!("  Dimensions: {}", request.dimensions.as_str());
    println!("  Frame rate: {} fps at {}x", request.fps, request.speed);

    let progress_cb: ProgressCallback = Box::new(|p: ExportProgress| match p.stage {
        ExportStage::Rendering | ExportStage::Finalizing => print!(
            "\r  Progress: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
            p.progress * 100.0,
            p.frames_rendered,
            p.total_frames,
            p.eta_secs,
        ),
        _ => {}
    });

    match frames_dir {
        Some(dir) => {
            println!("  Frames: {}", dir.display());
            let file = request.source.materialize()?;
            let source = FfmpegFrameSource::open(
                file,
                &config.encoder.ffmpeg_binary,
                &config.ffprobe_binary,
                request.decode_fps(),
            )?;
            let driver = ExportDriver::new(config);
            let handle = driver.start(
                request,
                Box::new(source),
                Box::new(DirectorySink::new(&dir)),
                Some(progress_cb),
            )?;

            let mut wait = Box::pin(handle.wait());
            let report = tokio::select! {
                report = &mut wait => report?,
                _ = tokio::signal::ctrl_c() => {
                    println!("\n  Cancelling...");
                    driver.cancel();
                    wait.await?
                }
            };

            println!(
                "\nWrote {} frames ({} skipped, {} failed) to {}{}",
                report.frames_submitted,
                report.frames_skipped,
                report.frames_failed,
                dir.display(),
                if report.cancelled { " (cancelled)" } else { "" }
            );
        }
        None => {
            println!("  Output: {}", output_path.display());
            match export_to_file(request, config, Some(progress_cb)).await {
                Ok(written) => println!("\nExport complete: {}", written.display()),
                Err(e) => {
                    println!("\nExport failed: {e}");
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}
