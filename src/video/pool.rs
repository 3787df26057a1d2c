use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::{
    composition::{ClipDescriptor, ClipPlan},
    error::{MediaError, PlaybackError, PreloadError},
    media::{Frame, FrameStream, MediaBackend},
};

/// Number of decode slots kept in the ring
pub const POOL_SIZE: usize = 4;

/// One reusable decode handle.
///
/// A bound slot holds an open stream already seeked to the clip start, with
/// its first frame decoded. Playback position is wall-clock time since
/// [`StreamSlot::begin_playback`], mapped onto decoder frames at `fps`.
pub struct StreamSlot<S> {
    index: usize,
    fps: u32,
    clip: Option<ClipDescriptor>,
    stream: Option<S>,
    current: Option<Frame>,
    frames_decoded: u64,
    started: Option<Instant>,
    exhausted: bool,
}

impl<S: FrameStream> StreamSlot<S> {
    fn new(index: usize, fps: u32) -> Self {
        Self {
            index,
            fps: fps.max(1),
            clip: None,
            stream: None,
            current: None,
            frames_decoded: 0,
            started: None,
            exhausted: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn clip(&self) -> Option<&ClipDescriptor> {
        self.clip.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.clip.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.started.is_some()
    }

    fn bind(&mut self, clip: ClipDescriptor, stream: S, first: Frame) {
        self.clip = Some(clip);
        self.stream = Some(stream);
        self.current = Some(first);
        self.frames_decoded = 1;
        self.started = None;
        self.exhausted = false;
    }

    /// Drop the stream (releasing the decoder) and forget the clip
    pub fn release(&mut self) {
        self.clip = None;
        self.stream = None;
        self.current = None;
        self.frames_decoded = 0;
        self.started = None;
        self.exhausted = false;
    }

    pub fn begin_playback(&mut self, now: Instant) -> Result<(), PlaybackError> {
        if self.clip.is_none() || self.current.is_none() {
            return Err(PlaybackError::NotReady { slot: self.index });
        }
        self.started = Some(now);
        Ok(())
    }

    /// Time since playback began
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.started
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default()
    }

    /// Position in the source file, in seconds
    pub fn position(&self, now: Instant) -> f64 {
        let start = self.clip.as_ref().map(ClipDescriptor::start).unwrap_or_default();
        start + self.elapsed(now).as_secs_f64()
    }

    /// Clip has played its full length, or the source ran out first
    pub fn is_finished(&self, now: Instant) -> bool {
        match &self.clip {
            Some(clip) => self.exhausted || self.elapsed(now).as_secs_f64() >= clip.length(),
            None => true,
        }
    }

    /// Decode forward to the frame due at `now` and return it.
    ///
    /// Frames the render loop was too slow to show are decoded and dropped.
    /// At end of stream the last decoded frame is held.
    pub async fn frame_at(&mut self, now: Instant) -> Result<&Frame, PlaybackError> {
        let name = match &self.clip {
            Some(clip) => clip.source().name().to_string(),
            None => return Err(PlaybackError::NotReady { slot: self.index }),
        };

        let due = (self.elapsed(now).as_secs_f64() * self.fps as f64).floor() as u64;

        if let Some(stream) = self.stream.as_mut() {
            while !self.exhausted && self.frames_decoded <= due {
                match stream.next_frame().await {
                    Ok(Some(frame)) => {
                        self.current = Some(frame);
                        self.frames_decoded += 1;
                    }
                    Ok(None) => {
                        debug!("{} reached end of stream", name);
                        self.exhausted = true;
                    }
                    Err(e) => {
                        return Err(PlaybackError::DecodeFailed {
                            name,
                            reason: e.to_string(),
                        })
                    }
                }
            }
        }

        self.current.as_ref().ok_or(PlaybackError::DecodeFailed {
            name,
            reason: "no frame decoded".to_string(),
        })
    }

    /// Most recently decoded frame
    pub fn last_frame(&self) -> Option<&Frame> {
        self.current.as_ref()
    }
}

/// Fixed ring of decode slots.
///
/// The pool owns every slot; the render loop only ever borrows the one it is
/// drawing from, while a [`SlotLoader`] borrows a different one to preload.
pub struct StreamPool<'a, M: MediaBackend> {
    backend: &'a M,
    slots: Vec<StreamSlot<M::Stream>>,
    preload_timeout: Duration,
}

impl<'a, M: MediaBackend> StreamPool<'a, M> {
    pub fn new(backend: &'a M, preload_timeout: Duration, fps: u32) -> Self {
        Self {
            backend,
            slots: (0..POOL_SIZE).map(|i| StreamSlot::new(i, fps)).collect(),
            preload_timeout,
        }
    }

    pub fn slot(&self, index: usize) -> &StreamSlot<M::Stream> {
        &self.slots[index % POOL_SIZE]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut StreamSlot<M::Stream> {
        &mut self.slots[index % POOL_SIZE]
    }

    /// Bind `clip` to slot `index`, seeking to its start
    pub async fn preload(&mut self, index: usize, clip: ClipDescriptor) -> Result<(), PreloadError> {
        self.loader(index).load(clip).await
    }

    pub fn loader(&mut self, index: usize) -> SlotLoader<'_, M> {
        SlotLoader {
            backend: self.backend,
            slot: &mut self.slots[index % POOL_SIZE],
            timeout: self.preload_timeout,
        }
    }

    /// Borrow the playing slot together with a loader for another slot.
    ///
    /// No loader is handed out when `loading` is `None` or names the playing
    /// slot itself, so a slot is never rebound while it is drawn from.
    pub fn split(
        &mut self,
        playing: usize,
        loading: Option<usize>,
    ) -> (&mut StreamSlot<M::Stream>, Option<SlotLoader<'_, M>>) {
        let playing = playing % POOL_SIZE;
        let loading = loading.map(|i| i % POOL_SIZE).filter(|&i| i != playing);

        let backend = self.backend;
        let timeout = self.preload_timeout;

        match loading {
            None => (&mut self.slots[playing], None),
            Some(loading) => {
                let (low, high) = self.slots.split_at_mut(playing.max(loading));
                let (play_slot, load_slot) = if playing < loading {
                    (&mut low[playing], &mut high[0])
                } else {
                    (&mut high[0], &mut low[loading])
                };
                (
                    play_slot,
                    Some(SlotLoader {
                        backend,
                        slot: load_slot,
                        timeout,
                    }),
                )
            }
        }
    }

    pub fn release(&mut self, index: usize) {
        self.slots[index % POOL_SIZE].release();
    }

    pub fn release_all(&mut self) {
        for slot in &mut self.slots {
            slot.release();
        }
    }

    pub fn bound_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_bound()).count()
    }
}

/// Exclusive handle for preloading one slot
pub struct SlotLoader<'p, M: MediaBackend> {
    backend: &'p M,
    slot: &'p mut StreamSlot<M::Stream>,
    timeout: Duration,
}

impl<'p, M: MediaBackend> SlotLoader<'p, M> {
    /// Open the clip's source, seek, and wait for the first frame.
    ///
    /// On any failure the slot is left empty and the half-open stream dropped.
    pub async fn load(self, clip: ClipDescriptor) -> Result<(), PreloadError> {
        self.slot.release();

        let name = clip.source().name().to_string();
        let duration = clip.media().duration;
        if !(clip.start() >= 0.0 && clip.start() < duration) {
            return Err(PreloadError::InvalidStart {
                name,
                start: clip.start(),
                duration,
            });
        }

        let fps = self.slot.fps;
        let opened = tokio::time::timeout(self.timeout, async {
            let mut stream = self.backend.open(clip.source(), clip.media(), clip.start(), fps).await?;
            let first = stream.next_frame().await?;
            Ok::<_, MediaError>((stream, first))
        })
        .await;

        match opened {
            Err(_) => Err(PreloadError::Timeout {
                name,
                seconds: self.timeout.as_secs_f64(),
            }),
            Ok(Err(e)) => Err(PreloadError::Failed {
                name,
                reason: e.to_string(),
            }),
            Ok(Ok((_, None))) => Err(PreloadError::Failed {
                name,
                reason: format!("no frames at {:.2}s", clip.start()),
            }),
            Ok(Ok((stream, Some(first)))) => {
                debug!("Slot {} bound to {} at {:.2}s", self.slot.index, name, clip.start());
                self.slot.bind(clip, stream, first);
                Ok(())
            }
        }
    }

    /// Take clips off the front of `plan` until one loads.
    ///
    /// Clips that fail to preload are skipped, shortening the plan; their
    /// errors are returned for the caller to log. The slot stays empty only
    /// once the plan runs out.
    pub async fn fill(self, plan: &mut ClipPlan) -> Vec<PreloadError> {
        let SlotLoader { backend, slot, timeout } = self;
        let mut failures = Vec::new();

        while let Some(clip) = plan.next_clip() {
            let loader = SlotLoader { backend, slot: &mut *slot, timeout };
            match loader.load(clip).await {
                Ok(()) => break,
                Err(e) => failures.push(e),
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaInfo, SyntheticMedia, SyntheticSource};

    fn media() -> SyntheticMedia {
        SyntheticMedia::new()
            .with_source("a.mp4", SyntheticSource::new(10.0, 32, 24))
            .with_source("slow.mp4", SyntheticSource::new(10.0, 32, 24).with_open_delay(Duration::from_secs(60)))
            .with_source("bad.mp4", SyntheticSource::new(10.0, 32, 24).failing_open())
    }

    fn clip(media: &SyntheticMedia, name: &str, start: f64, length: f64) -> ClipDescriptor {
        ClipDescriptor::new(media.source_file(name), start, length, MediaInfo::new(10.0, 32, 24))
    }

    #[tokio::test]
    async fn test_preload_binds_slot() {
        let media = media();
        let mut pool = StreamPool::new(&media, Duration::from_secs(20), 10);

        pool.preload(2, clip(&media, "a.mp4", 1.0, 2.0)).await.unwrap();
        assert!(pool.slot(2).is_bound());
        assert!(pool.slot(2).last_frame().is_some());
        assert!(!pool.slot(2).is_playing());
        assert_eq!(media.live_streams(), 1);
    }

    #[tokio::test]
    async fn test_invalid_start_is_rejected() {
        let media = media();
        let mut pool = StreamPool::new(&media, Duration::from_secs(20), 10);

        let err = pool.preload(0, clip(&media, "a.mp4", 10.0, 1.0)).await.unwrap_err();
        assert!(matches!(err, PreloadError::InvalidStart { .. }));
        assert!(!pool.slot(0).is_bound());
    }

    #[tokio::test(start_paused = true)]
    async fn test_preload_timeout_leaves_slot_empty() {
        let media = media();
        let mut pool = StreamPool::new(&media, Duration::from_secs(20), 10);

        let err = pool.preload(1, clip(&media, "slow.mp4", 0.0, 1.0)).await.unwrap_err();
        assert!(matches!(err, PreloadError::Timeout { .. }));
        assert!(!pool.slot(1).is_bound());
        assert_eq!(media.live_streams(), 0);
    }

    #[tokio::test]
    async fn test_fill_skips_failing_clips() {
        let media = media();
        let mut pool = StreamPool::new(&media, Duration::from_secs(20), 10);
        let mut plan = ClipPlan::from_clips(vec![
            clip(&media, "bad.mp4", 0.0, 1.0),
            clip(&media, "a.mp4", 2.0, 1.0),
            clip(&media, "a.mp4", 4.0, 1.0),
        ]);

        let failures = pool.loader(3).fill(&mut plan).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(pool.slot(3).clip().unwrap().start(), 2.0);
        assert_eq!(plan.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_follows_the_clock() {
        let media = media();
        let mut pool = StreamPool::new(&media, Duration::from_secs(20), 10);
        pool.preload(0, clip(&media, "a.mp4", 0.0, 1.0)).await.unwrap();

        let slot = pool.slot_mut(0);
        let start = Instant::now();
        slot.begin_playback(start).unwrap();
        slot.frame_at(start).await.unwrap();
        assert_eq!(slot.frames_decoded, 1);

        let later = start + Duration::from_millis(550);
        slot.frame_at(later).await.unwrap();
        assert_eq!(slot.frames_decoded, 6);
        assert!(!slot.is_finished(later));
        assert!((slot.position(later) - 0.55).abs() < 1e-9);

        assert!(slot.is_finished(start + Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_unbound_slot_is_not_ready() {
        let media = media();
        let mut pool = StreamPool::new(&media, Duration::from_secs(20), 10);
        let err = pool.slot_mut(0).begin_playback(Instant::now()).unwrap_err();
        assert!(matches!(err, PlaybackError::NotReady { slot: 0 }));
    }

    #[tokio::test]
    async fn test_split_never_loads_the_playing_slot() {
        let media = media();
        let mut pool = StreamPool::new(&media, Duration::from_secs(20), 10);
        pool.preload(1, clip(&media, "a.mp4", 0.0, 1.0)).await.unwrap();

        let (playing, loader) = pool.split(1, Some(1));
        assert_eq!(playing.index(), 1);
        assert!(loader.is_none());

        let (playing, loader) = pool.split(1, Some(0));
        assert_eq!(playing.index(), 1);
        let mut plan = ClipPlan::from_clips(vec![clip(&media, "a.mp4", 3.0, 1.0)]);
        assert!(loader.unwrap().fill(&mut plan).await.is_empty());
        assert_eq!(pool.bound_count(), 2);
    }

    #[tokio::test]
    async fn test_release_all_drops_streams() {
        let media = media();
        let mut pool = StreamPool::new(&media, Duration::from_secs(20), 10);
        for i in 0..POOL_SIZE {
            pool.preload(i, clip(&media, "a.mp4", i as f64, 1.0)).await.unwrap();
        }
        assert_eq!(media.live_streams(), POOL_SIZE);

        pool.release_all();
        assert_eq!(media.live_streams(), 0);
        assert_eq!(pool.bound_count(), 0);
    }
}
