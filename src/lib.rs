//! # Clip Shuffler
//!
//! Assemble a video of a fixed length from randomly picked, randomly trimmed
//! excerpts of your source clips, with optional pan-and-zoom and mirroring
//! per clip.
//!
//! The library plans a random sequence of clips, keeps a ring of four
//! decoders seeked ahead of playback, composites each clip onto an output
//! surface in real time, and records the surface until a wall-clock deadline.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clip_shuffler::{
//!     composition::CompositionEngine,
//!     config::{Config, EffectSettings, PercentRange, RenderRequest},
//!     media::{collect_sources, FfmpegMedia},
//!     session::SessionLog,
//!     video::encoder::FfmpegEncoderBackend,
//! };
//! use rand::{rngs::SmallRng, SeedableRng};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let media = FfmpegMedia::new()?;
//! let encoder = FfmpegEncoderBackend::new()?;
//!
//! let request = RenderRequest {
//!     sources: collect_sources(&["clips/"])?,
//!     target_duration: 30.0,
//!     clip_length: PercentRange::new(10.0, 30.0),
//!     effects: EffectSettings::default(),
//!     width: 1280,
//!     height: 720,
//! };
//!
//! let engine = CompositionEngine::new(Config::default(), &media, &encoder);
//! let mut log = SessionLog::new();
//! let artifact = engine
//!     .compose(&request, &mut SmallRng::from_entropy(), &mut log)
//!     .await?;
//! artifact.save(&artifact.file_name).await?;
//! println!("{}", log.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`media`] - Source discovery, decode backends and duration probing
//! - [`composition`] - Clip planning, effect planning and the pipeline driver
//! - [`video`] - Stream pool, output surface, render loop and recording
//! - [`session`] - Per-run event log and statistics
//! - [`config`] - Pipeline policy and per-run requests

pub mod composition;
pub mod config;
pub mod error;
pub mod media;
pub mod session;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    composition::CompositionEngine,
    config::{Config, RenderRequest},
    error::{Result, ShufflerError},
    session::SessionLog,
    video::Artifact,
};
