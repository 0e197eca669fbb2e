//! ffmpeg and ffprobe helpers shared by the decoding source and the encoding sink.

use std::path::Path;
use std::process::{Command, Stdio};

use flowcam_project_model::ExportConfig;

/// Lowest tempo factor a single `atempo` stage accepts.
const ATEMPO_MIN: f64 = 0.5;

/// Highest tempo factor a single `atempo` stage accepts.
const ATEMPO_MAX: f64 = 2.0;

/// Encoder parameters that are not part of the per-export sink config.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    pub ffmpeg_binary: String,
    pub preset: String,
    pub crf: u32,
    pub audio_bitrate_kbps: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_binary: "ffmpeg".to_string(),
            preset: "fast".to_string(),
            crf: 20,
            audio_bitrate_kbps: 192,
        }
    }
}

impl EncoderSettings {
    pub fn from_app_config(config: &flowcam_common::config::AppConfig) -> Self {
        Self {
            ffmpeg_binary: config.export.ffmpeg_binary.clone(),
            preset: config.export.video_preset.clone(),
            crf: config.export.video_crf,
            audio_bitrate_kbps: config.export.audio_bitrate_kbps,
        }
    }
}

/// Whether `binary` resolves on `PATH` (or is an executable path).
///
/// The binary is spawned directly with `-version`; any exit status counts.
pub fn command_exists(binary: &str) -> bool {
    if binary.trim().is_empty() {
        return false;
    }
    Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// Width and height of the first video stream.
pub fn probe_video_dimensions(ffprobe: &str, path: &Path) -> Option<(u32, u32)> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=p=0:s=x",
        ])
        .arg(path)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let raw = String::from_utf8(output.stdout).ok()?;
    parse_dimensions(raw.lines().next()?)
}

/// Container duration in seconds.
pub fn probe_duration_secs(ffprobe: &str, path: &Path) -> Option<f64> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let raw = String::from_utf8(output.stdout).ok()?;
    let secs = raw.lines().next()?.trim().parse::<f64>().ok()?;
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

fn parse_dimensions(line: &str) -> Option<(u32, u32)> {
    let (w, h) = line.trim().split_once('x')?;
    let width = w.parse::<u32>().ok()?;
    let height = h.parse::<u32>().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

/// Decompose a playback speed into `atempo` stages within `[0.5, 2.0]`.
///
/// The product of the returned factors equals `speed`.
pub fn atempo_chain(speed: f64) -> Vec<f64> {
    if !speed.is_finite() || speed <= 0.0 {
        return vec![1.0];
    }

    let mut remaining = speed;
    let mut stages = Vec::new();
    while remaining > ATEMPO_MAX {
        stages.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        stages.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    stages.push(remaining);
    stages
}

/// Audio filter that trims to the exported range and retimes it.
pub fn audio_filter(trim_start: f64, duration: f64, speed: f64) -> String {
    let tempo = atempo_chain(speed)
        .into_iter()
        .map(|factor| format!("atempo={}", format_number(factor)))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "atrim=start={}:duration={},asetpts=PTS-STARTPTS,{tempo}",
        format_number(trim_start.max(0.0)),
        format_number(duration.max(0.0)),
    )
}

fn format_number(value: f64) -> String {
    let text = format!("{value:.6}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() || text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// Arguments for an encoder reading MJPEG frames from stdin.
pub fn encoder_args(
    config: &ExportConfig,
    settings: &EncoderSettings,
    audio: Option<&Path>,
    output: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "image2pipe".into(),
        "-vcodec".into(),
        "mjpeg".into(),
        "-framerate".into(),
        config.framerate.to_string(),
        "-i".into(),
        "pipe:0".into(),
    ];

    if let Some(audio) = audio {
        args.push("-i".into());
        args.push(audio.to_string_lossy().into_owned());
        args.extend(["-map".into(), "0:v:0".into(), "-map".into(), "1:a:0".into()]);
        args.push("-af".into());
        args.push(audio_filter(config.trim_start, config.duration, config.speed));
    }

    args.extend([
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        settings.preset.clone(),
        "-crf".into(),
        settings.crf.to_string(),
        "-pix_fmt".into(),
        "yuv420p".into(),
    ]);

    if audio.is_some() {
        args.extend([
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            format!("{}k", settings.audio_bitrate_kbps.max(64)),
            "-shortest".into(),
        ]);
    }

    args.extend(["-movflags".into(), "+faststart".into()]);
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Arguments for a decoder writing raw RGBA frames to stdout.
pub fn decoder_args(input: &Path, start_secs: f64, fps: u32) -> Vec<String> {
    vec![
        "-v".into(),
        "error".into(),
        "-ss".into(),
        format_number(start_secs.max(0.0)),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-an".into(),
        "-vf".into(),
        format!("fps={}", fps.max(1)),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "pipe:1".into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcam_project_model::{BackgroundConfig, VideoSegment};
    use std::path::PathBuf;

    #[test]
    fn test_command_exists_does_not_go_through_a_shell() {
        let marker = std::env::temp_dir().join(format!("flowcam-cmd-{}", std::process::id()));
        let _ = std::fs::remove_file(&marker);
        let hostile = format!("true; touch {}", marker.display());

        assert!(!command_exists(&hostile));
        assert!(!marker.exists());
        assert!(!command_exists(""));
        assert!(!command_exists("flowcam-no-such-binary"));
    }

    fn export_config(speed: f64) -> ExportConfig {
        ExportConfig {
            width: 1920,
            height: 1080,
            framerate: 60,
            audio_path: None,
            trim_start: 1.5,
            duration: 4.0,
            speed,
            segment: VideoSegment::new(1.5, 5.5),
            background_config: BackgroundConfig::default(),
            mouse_positions: vec![],
        }
    }

    #[test]
    fn test_atempo_chain_in_range_is_single_stage() {
        assert_eq!(atempo_chain(1.5), vec![1.5]);
        assert_eq!(atempo_chain(0.5), vec![0.5]);
    }

    #[test]
    fn test_atempo_chain_decomposes_extremes() {
        let fast = atempo_chain(5.0);
        assert_eq!(fast, vec![2.0, 2.0, 1.25]);
        let slow = atempo_chain(0.2);
        assert_eq!(slow.len(), 3);
        let product: f64 = slow.iter().product();
        assert!((product - 0.2).abs() < 1e-12);
        assert!(slow.iter().all(|s| (0.5..=2.0).contains(s)));
    }

    #[test]
    fn test_audio_filter_format() {
        assert_eq!(
            audio_filter(1.5, 4.0, 2.0),
            "atrim=start=1.5:duration=4,asetpts=PTS-STARTPTS,atempo=2"
        );
        assert!(audio_filter(0.0, 1.0, 4.0).ends_with("atempo=2,atempo=2"));
    }

    #[test]
    fn test_encoder_args_without_audio() {
        let args = encoder_args(
            &export_config(1.0),
            &EncoderSettings::default(),
            None,
            Path::new("/tmp/out.mp4"),
        );
        assert!(args.windows(2).any(|w| w == ["-f", "image2pipe"]));
        assert!(args.windows(2).any(|w| w == ["-framerate", "60"]));
        assert!(args.windows(2).any(|w| w == ["-crf", "20"]));
        assert!(!args.iter().any(|a| a == "-shortest"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
    }

    #[test]
    fn test_encoder_args_with_audio() {
        let audio = PathBuf::from("/tmp/voice.wav");
        let args = encoder_args(
            &export_config(2.0),
            &EncoderSettings::default(),
            Some(&audio),
            Path::new("out.mp4"),
        );
        assert!(args.windows(2).any(|w| w == ["-b:a", "192k"]));
        assert!(args.iter().any(|a| a == "-shortest"));
        assert!(args
            .iter()
            .any(|a| a == "atrim=start=1.5:duration=4,asetpts=PTS-STARTPTS,atempo=2"));
    }

    #[test]
    fn test_parse_dimensions() {
        assert_eq!(parse_dimensions("1920x1080\n"), Some((1920, 1080)));
        assert_eq!(parse_dimensions("0x1080"), None);
        assert_eq!(parse_dimensions("garbage"), None);
    }

    #[test]
    fn test_decoder_args_start_offset() {
        let args = decoder_args(Path::new("in.mp4"), 2.25, 30);
        assert!(args.windows(2).any(|w| w == ["-ss", "2.25"]));
        assert!(args.windows(2).any(|w| w == ["-vf", "fps=30"]));
        assert!(args.windows(2).any(|w| w == ["-pix_fmt", "rgba"]));
    }
}
