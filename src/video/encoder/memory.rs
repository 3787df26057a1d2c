//! In-process encoder for tests and dry runs.
//!
//! The "container" is a tiny self-describing format: a 16-byte header
//! (`SHFL`, then width, height and fps as little-endian u32) followed by one
//! 4-byte record per frame holding the frame's mean RGB colour. It is enough
//! to check frame counts, durations and which picture ended up where, without
//! shipping pixel data around.

use std::collections::{HashSet, VecDeque};

use crate::error::EncodingError;
use crate::media::Frame;
use crate::video::encoder::{ContainerFormat, EncodeSettings, EncoderBackend, FrameEncoder};

const MAGIC: &[u8; 4] = b"SHFL";
const HEADER_LEN: usize = 16;
const RECORD_LEN: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct MemoryEncoderBackend {
    rejected: HashSet<String>,
    broken: bool,
}

impl MemoryEncoderBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `mime_type` as unsupported during negotiation
    pub fn rejecting(mut self, mime_type: &str) -> Self {
        self.rejected.insert(mime_type.to_string());
        self
    }

    /// Reject every preferred format, leaving only the fallback
    pub fn rejecting_all(mut self, formats: &[ContainerFormat]) -> Self {
        self.rejected.extend(formats.iter().map(|f| f.mime_type.clone()));
        self
    }

    /// Fail to open any encoder at all, fallback included
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }
}

impl EncoderBackend for MemoryEncoderBackend {
    type Encoder = MemoryEncoder;

    fn supports(&self, format: &ContainerFormat) -> bool {
        !self.rejected.contains(&format.mime_type)
    }

    async fn open(&self, format: &ContainerFormat, settings: &EncodeSettings) -> Result<MemoryEncoder, EncodingError> {
        if self.broken {
            return Err(EncodingError::StartFailed {
                reason: format!("no encoder available for {}", format.label),
            });
        }
        if self.rejected.contains(&format.mime_type) {
            return Err(EncodingError::UnsupportedFormat {
                format: format.mime_type.clone(),
            });
        }

        Ok(MemoryEncoder::new(*settings))
    }
}

pub struct MemoryEncoder {
    settings: EncodeSettings,
    pending: Vec<u8>,
    pending_frames: u32,
    chunks: VecDeque<Vec<u8>>,
}

impl MemoryEncoder {
    fn new(settings: EncodeSettings) -> Self {
        let mut pending = Vec::with_capacity(HEADER_LEN);
        pending.extend_from_slice(MAGIC);
        pending.extend_from_slice(&settings.width.to_le_bytes());
        pending.extend_from_slice(&settings.height.to_le_bytes());
        pending.extend_from_slice(&settings.fps.to_le_bytes());

        Self {
            settings,
            pending,
            pending_frames: 0,
            chunks: VecDeque::new(),
        }
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            self.chunks.push_back(std::mem::take(&mut self.pending));
        }
        self.pending_frames = 0;
    }
}

impl FrameEncoder for MemoryEncoder {
    async fn write_frame(&mut self, frame: &Frame) -> Result<(), EncodingError> {
        if frame.dimensions() != (self.settings.width, self.settings.height) {
            return Err(EncodingError::WriteFailed {
                reason: format!(
                    "frame is {:?}, recording is {}x{}",
                    frame.dimensions(),
                    self.settings.width,
                    self.settings.height
                ),
            });
        }

        let [r, g, b] = mean_color(frame);
        self.pending.extend_from_slice(&[r, g, b, 0]);
        self.pending_frames += 1;

        // One chunk per second of video
        if self.pending_frames >= self.settings.fps.max(1) {
            self.flush();
        }
        Ok(())
    }

    fn poll_chunk(&mut self) -> Option<Vec<u8>> {
        self.chunks.pop_front()
    }

    async fn finish(mut self) -> Result<Vec<Vec<u8>>, EncodingError> {
        self.flush();
        Ok(self.chunks.into_iter().collect())
    }
}

fn mean_color(frame: &Frame) -> [u8; 3] {
    let mut sums = [0u64; 3];
    for pixel in frame.as_image().pixels() {
        for (sum, value) in sums.iter_mut().zip(pixel.0) {
            *sum += value as u64;
        }
    }
    let count = (frame.width() as u64 * frame.height() as u64).max(1);
    sums.map(|s| (s / count) as u8)
}

/// What can be read back out of a memory-encoded artifact
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryArtifactInfo {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Mean colour of each recorded frame, in order
    pub frames: Vec<[u8; 3]>,
}

impl MemoryArtifactInfo {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_LEN || &data[..4] != MAGIC {
            return None;
        }

        let read_u32 = |at: usize| u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        let body = &data[HEADER_LEN..];
        if body.len() % RECORD_LEN != 0 {
            return None;
        }

        Some(Self {
            width: read_u32(4),
            height: read_u32(8),
            fps: read_u32(12),
            frames: body.chunks_exact(RECORD_LEN).map(|r| [r[0], r[1], r[2]]).collect(),
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn duration(&self) -> f64 {
        self.frames.len() as f64 / self.fps.max(1) as f64
    }
}
