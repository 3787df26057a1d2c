//! Encode collaborator: container format descriptions, the encoder traits,
//! and the two backends (system ffmpeg, in-memory).

pub mod ffmpeg;
pub mod memory;

use serde::{Deserialize, Serialize};

use crate::{error::EncodingError, media::Frame};

pub use ffmpeg::{FfmpegEncoder, FfmpegEncoderBackend};
pub use memory::{MemoryArtifactInfo, MemoryEncoder, MemoryEncoderBackend};

/// One candidate output container/codec pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerFormat {
    /// Short human-readable name for logs
    pub label: String,

    /// MIME type reported for the finished artifact
    pub mime_type: String,

    /// ffmpeg muxer name (`-f`)
    pub muxer: String,

    /// ffmpeg encoder name (`-c:v`); `None` leaves the muxer's default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,

    /// File extension for the artifact
    pub extension: String,
}

impl ContainerFormat {
    pub fn new(label: &str, mime_type: &str, muxer: &str, video_codec: Option<&str>, extension: &str) -> Self {
        Self {
            label: label.to_string(),
            mime_type: mime_type.to_string(),
            muxer: muxer.to_string(),
            video_codec: video_codec.map(str::to_string),
            extension: extension.to_string(),
        }
    }

    /// Preferred formats, most compatible first
    pub fn default_preferences() -> Vec<Self> {
        vec![
            Self::new("mp4/h264", "video/mp4; codecs=\"avc1.42E01E\"", "mp4", Some("libx264"), "mp4"),
            Self::new("webm/vp8", "video/webm; codecs=\"vp8\"", "webm", Some("libvpx"), "webm"),
            Self::new("webm", "video/webm", "webm", Some("libvpx-vp9"), "webm"),
            Self::new("mp4", "video/mp4", "mp4", Some("mpeg4"), "mp4"),
        ]
    }

    /// What the sink falls back to once every preference is rejected
    pub fn fallback() -> Self {
        Self::new("default", "video/x-matroska", "matroska", None, "mkv")
    }
}

/// Fixed parameters of one recording
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate: u64,
}

/// Factory for encoders; the "is this type supported" half of negotiation
/// lives here.
#[allow(async_fn_in_trait)]
pub trait EncoderBackend {
    type Encoder: FrameEncoder;

    fn supports(&self, format: &ContainerFormat) -> bool;

    async fn open(&self, format: &ContainerFormat, settings: &EncodeSettings) -> Result<Self::Encoder, EncodingError>;
}

/// A running encoder fed one frame per output period
#[allow(async_fn_in_trait)]
pub trait FrameEncoder {
    async fn write_frame(&mut self, frame: &Frame) -> Result<(), EncodingError>;

    /// Next finished chunk of container bytes, if one is ready
    fn poll_chunk(&mut self) -> Option<Vec<u8>>;

    /// Flush and close, returning every chunk not yet polled
    async fn finish(self) -> Result<Vec<Vec<u8>>, EncodingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preferences_order() {
        let prefs = ContainerFormat::default_preferences();
        let mimes: Vec<&str> = prefs.iter().map(|f| f.mime_type.as_str()).collect();
        assert_eq!(
            mimes,
            vec![
                "video/mp4; codecs=\"avc1.42E01E\"",
                "video/webm; codecs=\"vp8\"",
                "video/webm",
                "video/mp4",
            ]
        );
        assert!(!prefs.contains(&ContainerFormat::fallback()));
    }

    #[test]
    fn test_format_deserializes_without_codec() {
        let format: ContainerFormat = toml::from_str(
            "label = \"mkv\"\nmime_type = \"video/x-matroska\"\nmuxer = \"matroska\"\nextension = \"mkv\"\n",
        )
        .unwrap();
        assert_eq!(format.video_codec, None);
    }
}
