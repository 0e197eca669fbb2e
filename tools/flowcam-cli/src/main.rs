//! Flowcam CLI: inspect, analyze, and export project bundles.
//!
//! Usage:
//!   flowcam init <PATH>        Create a project bundle skeleton
//!   flowcam info <PATH>        Show project information
//!   flowcam validate <PATH>    Validate a project bundle
//!   flowcam analyze <PATH>     Generate the camera path for a project
//!   flowcam export <PATH>      Export a project to video
//!   flowcam check              Check encoder availability

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use flowcam_project_model::DimensionPreset;

mod commands;

#[derive(Parser)]
#[command(
    name = "flowcam",
    about = "Screen recording editor with automatic camera motion",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project bundle
    Init {
        /// Project directory to create
        path: PathBuf,

        /// Project name (defaults to the directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// Source video to copy into the bundle
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Segment length when no source is given (seconds)
        #[arg(long, default_value = "10.0")]
        duration: f64,
    },

    /// Show project information
    Info {
        /// Path to the project directory
        path: PathBuf,
    },

    /// Validate a project bundle
    Validate {
        /// Path to the project directory
        path: PathBuf,
    },

    /// Generate the camera path from the recorded cursor
    Analyze {
        /// Path to the project directory
        path: PathBuf,

        /// Simulation rate of the generated path
        #[arg(long, default_value = "60")]
        fps: u32,

        /// Store the path in the segment as smoothMotionPath
        #[arg(long)]
        write: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export a project to video
    Export {
        /// Path to the project directory
        path: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output size: original, 1080p or 720p
        #[arg(long, value_parser = parse_dimensions)]
        dimensions: Option<DimensionPreset>,

        /// Output frame rate
        #[arg(long)]
        fps: Option<u32>,

        /// Playback speed multiplier
        #[arg(long)]
        speed: Option<f64>,

        /// Write numbered JPEG frames to this directory instead of encoding
        #[arg(long)]
        frames_dir: Option<PathBuf>,
    },

    /// Check encoder availability
    Check,
}

fn parse_dimensions(value: &str) -> Result<DimensionPreset, String> {
    match value {
        "original" => Ok(DimensionPreset::Original),
        "1080p" => Ok(DimensionPreset::P1080),
        "720p" => Ok(DimensionPreset::P720),
        other => Err(format!("unknown preset '{other}', use: original, 1080p, 720p")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logging = flowcam_common::config::AppConfig::load().logging;
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    flowcam_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Init {
            path,
            name,
            source,
            duration,
        } => commands::init::run(path, name, source, duration),
        Commands::Info { path } => commands::info::run(path),
        Commands::Validate { path } => commands::validate::run(path),
        Commands::Analyze {
            path,
            fps,
            write,
            json,
        } => commands::analyze::run(path, fps, write, json),
        Commands::Export {
            path,
            output,
            dimensions,
            fps,
            speed,
            frames_dir,
        } => commands::export::run(path, output, dimensions, fps, speed, frames_dir).await,
        Commands::Check => commands::check::run(),
    }
}
