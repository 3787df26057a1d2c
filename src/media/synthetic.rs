//! In-process decode backend that renders placeholder frames.
//!
//! Used by the test suite and the `dry_run` binary so the whole pipeline can
//! run without ffmpeg. Sources are registered by name with a duration and
//! frame size; faults (slow or failing probes, failing opens, decode errors)
//! can be injected per source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::MediaError;
use crate::media::backend::{FrameStream, MediaBackend};
use crate::media::types::{Frame, MediaInfo, SourceFile};

/// Description of one virtual source video
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub probe_delay: Option<Duration>,
    pub open_delay: Option<Duration>,
    pub fail_probe: bool,
    pub fail_open: bool,
    /// Fail decoding after this many frames have been produced
    pub fail_decode_after: Option<u64>,
}

impl SyntheticSource {
    pub fn new(duration: f64, width: u32, height: u32) -> Self {
        Self {
            duration,
            width,
            height,
            probe_delay: None,
            open_delay: None,
            fail_probe: false,
            fail_open: false,
            fail_decode_after: None,
        }
    }

    pub fn failing_probe(mut self) -> Self {
        self.fail_probe = true;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = Some(delay);
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub fn failing_decode_after(mut self, frames: u64) -> Self {
        self.fail_decode_after = Some(frames);
        self
    }
}

#[derive(Debug, Default)]
pub struct SyntheticMedia {
    sources: HashMap<String, SyntheticSource>,
    live_streams: Arc<AtomicUsize>,
    probes: AtomicUsize,
}

impl SyntheticMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source<S: Into<String>>(mut self, name: S, source: SyntheticSource) -> Self {
        self.sources.insert(name.into(), source);
        self
    }

    /// A [`SourceFile`] handle for a registered (or deliberately unknown) name
    pub fn source_file(&self, name: &str) -> SourceFile {
        SourceFile::new(name, name)
    }

    /// Streams opened and not yet dropped
    pub fn live_streams(&self) -> usize {
        self.live_streams.load(Ordering::SeqCst)
    }

    /// Total probe calls received
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    fn lookup(&self, source: &SourceFile) -> Result<&SyntheticSource, MediaError> {
        self.sources.get(source.name()).ok_or_else(|| MediaError::OpenFailed {
            name: source.name().to_string(),
            reason: "no such synthetic source".to_string(),
        })
    }
}

impl MediaBackend for SyntheticMedia {
    type Stream = SyntheticStream;

    async fn probe(&self, source: &SourceFile) -> Result<MediaInfo, MediaError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let spec = self.lookup(source)?;

        if let Some(delay) = spec.probe_delay {
            tokio::time::sleep(delay).await;
        }

        if spec.fail_probe {
            return Err(MediaError::OpenFailed {
                name: source.name().to_string(),
                reason: "corrupt header".to_string(),
            });
        }

        Ok(MediaInfo {
            duration: spec.duration,
            width: spec.width,
            height: spec.height,
            fps: Some(30.0),
        })
    }

    async fn open(
        &self,
        source: &SourceFile,
        _info: &MediaInfo,
        start: f64,
        fps: u32,
    ) -> Result<SyntheticStream, MediaError> {
        let spec = self.lookup(source)?.clone();

        if let Some(delay) = spec.open_delay {
            tokio::time::sleep(delay).await;
        }

        if spec.fail_open {
            return Err(MediaError::OpenFailed {
                name: source.name().to_string(),
                reason: "decoder refused the stream".to_string(),
            });
        }

        Ok(SyntheticStream::new(
            source.name().to_string(),
            spec,
            start,
            fps,
            Arc::clone(&self.live_streams),
        ))
    }
}

/// Placeholder decoder: a hue that drifts with the timestamp, over a moving
/// diagonal stripe pattern, so consecutive frames differ visibly.
pub struct SyntheticStream {
    name: String,
    spec: SyntheticSource,
    start: f64,
    fps: u32,
    produced: u64,
    seed_hue: f32,
    live: Arc<AtomicUsize>,
}

impl SyntheticStream {
    fn new(name: String, spec: SyntheticSource, start: f64, fps: u32, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        let seed_hue = name.bytes().map(u32::from).sum::<u32>() as f32 % 360.0;
        Self { name, spec, start, fps, produced: 0, seed_hue, live }
    }

    fn placeholder_frame(&self, timestamp: f64) -> Frame {
        let hue = (self.seed_hue + (timestamp * 60.0) as f32) % 360.0;
        let color = hsv_to_rgb(hue, 0.6, 0.8);

        let mut frame = Frame::new_filled(self.spec.width, self.spec.height, color);
        let shift = (timestamp * 30.0) as u32;
        let image = frame.as_image_mut();
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            if (x + y + shift) % 20 < 2 {
                pixel.0 = [255, 255, 255];
            }
        }
        frame
    }
}

impl FrameStream for SyntheticStream {
    async fn next_frame(&mut self) -> Result<Option<Frame>, MediaError> {
        if let Some(limit) = self.spec.fail_decode_after {
            if self.produced >= limit {
                return Err(MediaError::DecodeFailed {
                    name: self.name.clone(),
                    reason: "corrupt packet".to_string(),
                });
            }
        }

        let timestamp = self.start + self.produced as f64 / self.fps.max(1) as f64;
        if timestamp >= self.spec.duration {
            return Ok(None);
        }

        self.produced += 1;
        Ok(Some(self.placeholder_frame(timestamp)))
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    [
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    ]
}
