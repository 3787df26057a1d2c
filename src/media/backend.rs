//! Decode collaborator interfaces.
//!
//! A backend turns a [`SourceFile`] into metadata ([`MediaInfo`]) and into a
//! seekable, time-addressable [`FrameStream`]. Streams own whatever decoder
//! resources they hold and release them on drop.

use crate::error::MediaError;
use crate::media::types::{Frame, MediaInfo, SourceFile};

#[allow(async_fn_in_trait)]
pub trait MediaBackend {
    type Stream: FrameStream;

    /// Read duration and intrinsic dimensions.
    async fn probe(&self, source: &SourceFile) -> Result<MediaInfo, MediaError>;

    /// Open a decoder positioned at `start` seconds, emitting frames at `fps`.
    async fn open(
        &self,
        source: &SourceFile,
        info: &MediaInfo,
        start: f64,
        fps: u32,
    ) -> Result<Self::Stream, MediaError>;
}

#[allow(async_fn_in_trait)]
pub trait FrameStream {
    /// Decode the next frame. `Ok(None)` means the source has ended.
    async fn next_frame(&mut self) -> Result<Option<Frame>, MediaError>;
}
