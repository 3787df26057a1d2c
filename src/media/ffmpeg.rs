use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info};

use crate::error::MediaError;
use crate::media::backend::{FrameStream, MediaBackend};
use crate::media::types::{Frame, MediaInfo, SourceFile};

/// Decode backend driving the system `ffprobe` and `ffmpeg` executables.
///
/// Probing runs `ffprobe` to completion; each opened stream is one long-lived
/// `ffmpeg` process seeking to the clip start and piping raw RGB24 frames.
/// Every child is spawned with `kill_on_drop`, so dropping a probe future on
/// timeout or dropping a stream releases the decoder.
#[derive(Debug, Clone)]
pub struct FfmpegMedia {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegMedia {
    pub fn new() -> Result<Self, MediaError> {
        let media = Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        };

        for tool in [&media.ffmpeg, &media.ffprobe] {
            if tool_version(tool).is_none() {
                return Err(MediaError::ToolMissing { tool: tool.display().to_string() });
            }
        }

        info!("Initialized ffmpeg decode backend");
        Ok(media)
    }

    /// First line of `ffmpeg -version`, if ffmpeg runs at all
    pub fn version_line(&self) -> Option<String> {
        tool_version(&self.ffmpeg)
    }
}

impl MediaBackend for FfmpegMedia {
    type Stream = FfmpegStream;

    async fn probe(&self, source: &SourceFile) -> Result<MediaInfo, MediaError> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams", "-select_streams", "v:0"])
            .arg(source.path())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MediaError::OpenFailed {
                name: source.name().to_string(),
                reason: format!("ffprobe execution failed: {}", e),
            })?;

        if !output.status.success() {
            return Err(MediaError::OpenFailed {
                name: source.name().to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let json = String::from_utf8_lossy(&output.stdout);
        let info = parse_probe_output(&json).map_err(|reason| MediaError::OpenFailed {
            name: source.name().to_string(),
            reason,
        })?;

        debug!(
            "{}: {}x{} @ {:.1}fps, {:.2}s",
            source.name(),
            info.width,
            info.height,
            info.fps.unwrap_or(0.0),
            info.duration
        );
        Ok(info)
    }

    async fn open(
        &self,
        source: &SourceFile,
        info: &MediaInfo,
        start: f64,
        fps: u32,
    ) -> Result<FfmpegStream, MediaError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error"]);

        // Hardware decoding before the input, as on macOS VideoToolbox is always there
        if cfg!(target_os = "macos") {
            cmd.args(["-hwaccel", "videotoolbox"]);
        }

        cmd.args(["-ss", &format!("{:.3}", start), "-i"])
            .arg(source.path())
            .args([
                "-an",
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "-r", &fps.to_string(),
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| MediaError::OpenFailed {
            name: source.name().to_string(),
            reason: format!("failed to spawn ffmpeg: {}", e),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| MediaError::OpenFailed {
            name: source.name().to_string(),
            reason: "ffmpeg stdout was not captured".to_string(),
        })?;

        Ok(FfmpegStream {
            name: source.name().to_string(),
            width: info.width,
            height: info.height,
            frame_len: info.width as usize * info.height as usize * 3,
            _child: child,
            stdout,
        })
    }
}

/// One running `ffmpeg` decode process
pub struct FfmpegStream {
    name: String,
    width: u32,
    height: u32,
    frame_len: usize,
    _child: Child,
    stdout: ChildStdout,
}

impl FrameStream for FfmpegStream {
    async fn next_frame(&mut self) -> Result<Option<Frame>, MediaError> {
        let mut data = vec![0u8; self.frame_len];

        match self.stdout.read_exact(&mut data).await {
            Ok(_) => Frame::from_rgb_bytes(self.width, self.height, data)
                .map(Some)
                .ok_or_else(|| MediaError::DecodeFailed {
                    name: self.name.clone(),
                    reason: "frame buffer size mismatch".to_string(),
                }),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(MediaError::DecodeFailed {
                name: self.name.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    avg_frame_rate: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

impl ProbeStream {
    /// Display rotation in degrees, normalized to 0..360.
    ///
    /// Newer ffprobe reports it as display-matrix side data, older builds as a
    /// `rotate` tag.
    fn rotation(&self) -> i64 {
        let degrees = self
            .side_data_list
            .iter()
            .find_map(|side| side.rotation)
            .or_else(|| self.tags.get("rotate").and_then(|r| r.trim().parse::<f64>().ok()))
            .unwrap_or(0.0);
        (degrees.round() as i64).rem_euclid(360)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Extract duration, dimensions and frame rate from `ffprobe -print_format json`
fn parse_probe_output(json: &str) -> Result<MediaInfo, String> {
    let probe: ProbeOutput =
        serde_json::from_str(json).map_err(|e| format!("invalid ffprobe output: {}", e))?;

    let stream = probe.streams.first().ok_or("no video stream")?;
    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err("video stream has no dimensions".to_string()),
    };
    // ffmpeg autorotates while decoding, so frames arrive in display orientation
    let (width, height) = match stream.rotation() {
        90 | 270 => (height, width),
        _ => (width, height),
    };

    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .or_else(|| {
            stream
                .duration
                .as_deref()
                .and_then(|d| d.parse::<f64>().ok())
                .filter(|d| d.is_finite() && *d > 0.0)
        })
        .ok_or("duration unknown")?;

    let fps = stream.avg_frame_rate.as_deref().and_then(parse_frame_rate);

    Ok(MediaInfo { duration, width, height, fps })
}

/// Parse an ffprobe rational like `30000/1001`
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    (den != 0.0 && num > 0.0).then(|| num / den)
}

fn tool_version(tool: &Path) -> Option<String> {
    let output = std::process::Command::new(tool)
        .arg("-version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output_prefers_format_duration() {
        let json = r#"{
            "streams": [{"width": 1920, "height": 1080, "duration": "9.90", "avg_frame_rate": "30000/1001"}],
            "format": {"duration": "10.010000"}
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.dimensions(), (1920, 1080));
        assert!((info.duration - 10.01).abs() < 1e-9);
        assert!((info.fps.unwrap() - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_probe_output_falls_back_to_stream_duration() {
        let json = r#"{
            "streams": [{"width": 640, "height": 480, "duration": "4.5", "avg_frame_rate": "0/0"}],
            "format": {"duration": "N/A"}
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.duration, 4.5);
        assert_eq!(info.fps, None);
    }

    #[test]
    fn test_parse_probe_output_uses_display_orientation() {
        let json = r#"{
            "streams": [{
                "width": 1920, "height": 1080, "avg_frame_rate": "30/1",
                "side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}]
            }],
            "format": {"duration": "12.0"}
        }"#;
        assert_eq!(parse_probe_output(json).unwrap().dimensions(), (1080, 1920));

        let legacy = r#"{
            "streams": [{"width": 1280, "height": 720, "tags": {"rotate": "270"}}],
            "format": {"duration": "3.0"}
        }"#;
        assert_eq!(parse_probe_output(legacy).unwrap().dimensions(), (720, 1280));
    }

    #[test]
    fn test_parse_probe_output_keeps_half_turns() {
        let json = r#"{
            "streams": [{"width": 640, "height": 480, "side_data_list": [{"rotation": 180}]}],
            "format": {"duration": "3.0"}
        }"#;
        assert_eq!(parse_probe_output(json).unwrap().dimensions(), (640, 480));
    }

    #[test]
    fn test_parse_probe_output_rejects_audio_only() {
        let json = r#"{"streams": [], "format": {"duration": "3.0"}}"#;
        assert!(parse_probe_output(json).is_err());
    }

    #[test]
    fn test_parse_probe_output_rejects_unknown_duration() {
        let json = r#"{"streams": [{"width": 640, "height": 480}], "format": {}}"#;
        assert!(parse_probe_output(json).is_err());
    }
}
