use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    error::EncodingError,
    media::Frame,
    session::SessionLog,
    video::encoder::{ContainerFormat, EncodeSettings, EncoderBackend, FrameEncoder},
};

/// The finished recording
#[derive(Debug, Clone)]
pub struct Artifact {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frame_count: u64,
}

impl Artifact {
    /// Playable duration in seconds
    pub fn duration(&self) -> f64 {
        self.frame_count as f64 / self.fps.max(1) as f64
    }

    pub fn size_mb(&self) -> f64 {
        self.data.len() as f64 / (1024.0 * 1024.0)
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        tokio::fs::write(path, &self.data).await
    }
}

/// Captures the output surface into an encoder at a fixed frame rate.
///
/// Frames are written against the wall clock since [`RecordingSink::start`]:
/// if the render loop skips frame periods, the last captured picture is
/// repeated to fill them, so the recording's timeline tracks real time.
pub struct RecordingSink<E> {
    encoder: E,
    format: ContainerFormat,
    settings: EncodeSettings,
    file_stem: String,
    chunks: Vec<Vec<u8>>,
    record_start: Instant,
    total_frames: u64,
    frames_written: u64,
    last: Option<Frame>,
}

impl<E: FrameEncoder> RecordingSink<E> {
    /// Negotiate a format and start recording.
    ///
    /// Each preference is tried in order; a rejection moves on to the next.
    /// Only a failure of the backend's own fallback format is an error.
    pub async fn start<B>(
        backend: &B,
        preferences: &[ContainerFormat],
        settings: EncodeSettings,
        target: Duration,
        file_stem: &str,
        log: &mut SessionLog,
    ) -> Result<Self, EncodingError>
    where
        B: EncoderBackend<Encoder = E>,
    {
        let mut negotiated = None;

        for format in preferences {
            if !backend.supports(format) {
                debug!("{} not supported", format.mime_type);
                continue;
            }
            match backend.open(format, &settings).await {
                Ok(encoder) => {
                    negotiated = Some((encoder, format.clone()));
                    break;
                }
                Err(e) => warn!("Encoder rejected {}: {}", format.mime_type, e),
            }
        }

        let (encoder, format) = match negotiated {
            Some(found) => found,
            None => {
                log.event("No preferred format available, using the encoder default");
                let fallback = ContainerFormat::fallback();
                (backend.open(&fallback, &settings).await?, fallback)
            }
        };

        let total_frames = (target.as_secs_f64() * settings.fps as f64).round() as u64;
        log.event(format!("Recording with {} ({})", format.label, format.mime_type));
        log.stats.recorder_mime = Some(format.mime_type.clone());

        Ok(Self {
            encoder,
            format,
            settings,
            file_stem: file_stem.to_string(),
            chunks: Vec::new(),
            record_start: Instant::now(),
            total_frames,
            frames_written: 0,
            last: None,
        })
    }

    pub fn record_start(&self) -> Instant {
        self.record_start
    }

    pub fn format(&self) -> &ContainerFormat {
        &self.format
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Record `frame` as the picture on the surface at `now`
    pub async fn capture(&mut self, frame: &Frame, now: Instant) -> Result<(), EncodingError> {
        let elapsed = now.saturating_duration_since(self.record_start).as_secs_f64();
        let period = (elapsed * self.settings.fps as f64).floor() as u64;

        // Periods that passed without a capture keep showing the previous picture
        let held_until = period.min(self.total_frames);
        while self.frames_written < held_until {
            let held = self.last.as_ref().unwrap_or(frame);
            self.encoder.write_frame(held).await?;
            self.frames_written += 1;
        }

        if self.frames_written < self.total_frames && self.frames_written <= period {
            self.encoder.write_frame(frame).await?;
            self.frames_written += 1;
        }

        self.last = Some(frame.clone());
        self.drain();
        Ok(())
    }

    fn drain(&mut self) {
        while let Some(chunk) = self.encoder.poll_chunk() {
            self.on_chunk(chunk);
        }
    }

    /// Accumulate one encoded chunk
    pub fn on_chunk(&mut self, chunk: Vec<u8>) {
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    /// Pad to the full target length, finalize, and assemble the artifact
    pub async fn stop(mut self, log: &mut SessionLog) -> Result<Artifact, EncodingError> {
        let pad = self
            .last
            .take()
            .unwrap_or_else(|| Frame::new_black(self.settings.width, self.settings.height));
        while self.frames_written < self.total_frames {
            self.encoder.write_frame(&pad).await?;
            self.frames_written += 1;
        }
        self.drain();

        let RecordingSink { encoder, format, settings, file_stem, mut chunks, frames_written, .. } = self;
        for chunk in encoder.finish().await? {
            if !chunk.is_empty() {
                chunks.push(chunk);
            }
        }

        log.stats.chunks_recorded = chunks.len();
        let data = chunks.concat();
        if data.is_empty() {
            return Err(EncodingError::EmptyArtifact);
        }

        let artifact = Artifact {
            data,
            mime_type: format.mime_type,
            file_name: format!("{}.{}", file_stem, format.extension),
            width: settings.width,
            height: settings.height,
            fps: settings.fps,
            frame_count: frames_written,
        };

        info!(
            "   Artifact: {} ({:.2} MB, {} frames, {:.2}s)",
            artifact.mime_type,
            artifact.size_mb(),
            artifact.frame_count,
            artifact.duration()
        );
        log.event(format!("Recording finalized as {}", artifact.file_name));
        Ok(artifact)
    }
}
