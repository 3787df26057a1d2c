use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::EncodingError;
use crate::media::Frame;
use crate::video::encoder::{ContainerFormat, EncodeSettings, EncoderBackend, FrameEncoder};

const READ_CHUNK: usize = 64 * 1024;

/// Encoder backend driving the system `ffmpeg`.
///
/// Raw RGB frames go in on stdin; container bytes come back on stdout and are
/// handed out as chunks as soon as ffmpeg produces them.
#[derive(Debug, Clone)]
pub struct FfmpegEncoderBackend {
    ffmpeg: PathBuf,
    encoders: HashSet<String>,
    muxers: HashSet<String>,
}

impl FfmpegEncoderBackend {
    /// Query ffmpeg once for the encoders and muxers it was built with
    pub fn new() -> Result<Self, EncodingError> {
        let ffmpeg = PathBuf::from("ffmpeg");
        let encoders = capability_list(&ffmpeg, "-encoders")?;
        let muxers = capability_list(&ffmpeg, "-muxers")?;

        info!("Encoder backend: {} encoders, {} muxers", encoders.len(), muxers.len());
        Ok(Self { ffmpeg, encoders, muxers })
    }
}

impl EncoderBackend for FfmpegEncoderBackend {
    type Encoder = FfmpegEncoder;

    fn supports(&self, format: &ContainerFormat) -> bool {
        let codec_ok = format
            .video_codec
            .as_ref()
            .map_or(true, |codec| self.encoders.contains(codec));
        codec_ok && self.muxers.contains(&format.muxer)
    }

    async fn open(&self, format: &ContainerFormat, settings: &EncodeSettings) -> Result<FfmpegEncoder, EncodingError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y"])
            .args([
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "-s", &format!("{}x{}", settings.width, settings.height),
                "-r", &settings.fps.to_string(),
                "-i", "pipe:0",
            ]);

        if let Some(codec) = &format.video_codec {
            cmd.args(["-c:v", codec]);
        }

        // Requests are validated to even sizes, so no scaling or padding here
        cmd.args([
            "-pix_fmt", "yuv420p",
            "-b:v", &settings.bitrate.to_string(),
        ]);

        // A pipe can't be seeked back into, so MP4 has to be fragmented
        if format.muxer == "mp4" {
            cmd.args(["-movflags", "frag_keyframe+empty_moov+default_base_moof"]);
        }

        cmd.args(["-f", &format.muxer, "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        debug!("Starting ffmpeg encoder for {}", format.label);
        let mut child = cmd.spawn().map_err(|e| EncodingError::StartFailed {
            reason: format!("failed to spawn ffmpeg: {}", e),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| EncodingError::StartFailed {
            reason: "ffmpeg stdin was not captured".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| EncodingError::StartFailed {
            reason: "ffmpeg stdout was not captured".to_string(),
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(pump_output(stdout, tx));

        Ok(FfmpegEncoder {
            child,
            stdin: Some(stdin),
            chunks: rx,
            reader,
            frame_len: settings.width as usize * settings.height as usize * 3,
        })
    }
}

/// One running ffmpeg encode process
pub struct FfmpegEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    chunks: mpsc::UnboundedReceiver<Vec<u8>>,
    reader: JoinHandle<std::io::Result<()>>,
    frame_len: usize,
}

impl FrameEncoder for FfmpegEncoder {
    async fn write_frame(&mut self, frame: &Frame) -> Result<(), EncodingError> {
        let bytes = frame.as_rgb_bytes();
        if bytes.len() != self.frame_len {
            return Err(EncodingError::WriteFailed {
                reason: format!("frame is {} bytes, expected {}", bytes.len(), self.frame_len),
            });
        }

        let stdin = self.stdin.as_mut().ok_or_else(|| EncodingError::WriteFailed {
            reason: "encoder input already closed".to_string(),
        })?;
        stdin
            .write_all(bytes)
            .await
            .map_err(|e| EncodingError::WriteFailed { reason: e.to_string() })
    }

    fn poll_chunk(&mut self) -> Option<Vec<u8>> {
        self.chunks.try_recv().ok()
    }

    async fn finish(mut self) -> Result<Vec<Vec<u8>>, EncodingError> {
        // Closing stdin is ffmpeg's end-of-input signal
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.shutdown().await {
                warn!("Closing encoder input failed: {}", e);
            }
        }

        let status = self
            .child
            .wait()
            .await
            .map_err(|e| EncodingError::FinalizeFailed { reason: e.to_string() })?;

        match self.reader.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(EncodingError::FinalizeFailed { reason: e.to_string() }),
            Err(e) => return Err(EncodingError::FinalizeFailed { reason: e.to_string() }),
        }

        if !status.success() {
            return Err(EncodingError::FinalizeFailed {
                reason: format!("ffmpeg exited with {}", status),
            });
        }

        let mut remaining = Vec::new();
        while let Ok(chunk) = self.chunks.try_recv() {
            remaining.push(chunk);
        }
        Ok(remaining)
    }
}

/// Forward everything ffmpeg writes to stdout until it closes the pipe
async fn pump_output(mut stdout: ChildStdout, tx: mpsc::UnboundedSender<Vec<u8>>) -> std::io::Result<()> {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = stdout.read(&mut buf).await?;
        if n == 0 || tx.send(buf[..n].to_vec()).is_err() {
            return Ok(());
        }
    }
}

fn capability_list(ffmpeg: &Path, flag: &str) -> Result<HashSet<String>, EncodingError> {
    let output = std::process::Command::new(ffmpeg)
        .args(["-hide_banner", flag])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| EncodingError::StartFailed {
            reason: format!("ffmpeg is not available: {}", e),
        })?;

    if !output.status.success() {
        return Err(EncodingError::StartFailed {
            reason: format!("ffmpeg {} failed", flag),
        });
    }

    Ok(parse_capability_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Names from `ffmpeg -encoders` / `ffmpeg -muxers` listings.
///
/// Both print a legend, a dashed separator, then one entry per line with the
/// flags column first and the (possibly comma-joined) name second.
fn parse_capability_list(listing: &str) -> HashSet<String> {
    listing
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("--"))
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .flat_map(|names| names.split(','))
        .map(str::to_string)
        .collect()
}
