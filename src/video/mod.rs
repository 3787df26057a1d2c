//! # Video Module
//!
//! The real-time half of the pipeline: the stream pool that keeps decoders
//! seeked ahead of playback, the output surface, the per-clip render loop,
//! and the recording sink with its encoder backends.

pub mod compositor;
pub mod encoder;
pub mod pool;
pub mod recorder;
pub mod surface;

pub use compositor::{ClipOutcome, RenderSession, RenderTiming};
pub use encoder::{ContainerFormat, EncodeSettings, EncoderBackend, FrameEncoder};
pub use pool::{SlotLoader, StreamPool, StreamSlot, POOL_SIZE};
pub use recorder::{Artifact, RecordingSink};
pub use surface::Surface;
