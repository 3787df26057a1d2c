//! # Media Module
//!
//! Source discovery, the decode collaborator traits and their backends, and
//! duration probing.

pub mod backend;
pub mod ffmpeg;
pub mod prober;
pub mod synthetic;
pub mod types;

pub use backend::{FrameStream, MediaBackend};
pub use ffmpeg::FfmpegMedia;
pub use prober::DurationProber;
pub use synthetic::{SyntheticMedia, SyntheticSource};
pub use types::{collect_sources, Frame, MediaInfo, SourceFile};
