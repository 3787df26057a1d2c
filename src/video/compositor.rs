use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::{
    composition::EffectPlan,
    error::{PlaybackError, Result},
    media::{Frame, FrameStream},
    session::SessionLog,
    video::{
        encoder::FrameEncoder,
        pool::StreamSlot,
        recorder::{Artifact, RecordingSink},
        surface::Surface,
    },
};

/// How a clip's render loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipOutcome {
    /// The clip played its full length (or its source ran dry)
    Finished,
    /// The run's deadline passed mid-clip
    DeadlineReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClipState {
    AwaitingFirstFrame,
    Drawing,
}

/// Timing knobs for the render loop
#[derive(Debug, Clone, Copy)]
pub struct RenderTiming {
    pub frame_interval: Duration,
    pub overlap: Duration,
    pub playback_timeout: Duration,
}

impl RenderTiming {
    /// Whether a clip `elapsed` into playback still shows the previous clip underneath
    pub fn in_overlap(&self, elapsed: Duration) -> bool {
        elapsed < self.overlap
    }
}

/// State for one run: the output surface, the recording, and the deadline.
///
/// The session owns the surface outright; stream slots are only borrowed for
/// the length of the clip being drawn.
pub struct RenderSession<E> {
    surface: Surface,
    sink: RecordingSink<E>,
    record_start: Instant,
    deadline: Instant,
    timing: RenderTiming,
    /// Last picture of the previous clip, already fitted to the surface
    previous: Option<Frame>,
    frames_drawn: u64,
    overlap_frames: u64,
}

impl<E: FrameEncoder> RenderSession<E> {
    pub fn new(surface: Surface, sink: RecordingSink<E>, target: Duration, timing: RenderTiming) -> Self {
        let record_start = sink.record_start();
        Self {
            surface,
            sink,
            record_start,
            deadline: record_start + target,
            timing,
            previous: None,
            frames_drawn: 0,
            overlap_frames: 0,
        }
    }

    pub fn record_start(&self) -> Instant {
        self.record_start
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn deadline_passed(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Frames that had the previous clip drawn underneath
    pub fn overlap_frames(&self) -> u64 {
        self.overlap_frames
    }

    /// Keep the finished clip's last picture for the next clip's overlap window.
    ///
    /// The picture is scaled to the surface once here, not on every overlap frame.
    pub fn set_previous(&mut self, frame: Option<Frame>) {
        let Some(frame) = frame else { return };
        match self.surface.stretched(&frame) {
            Ok(fitted) => self.previous = Some(fitted),
            Err(e) => debug!("Previous frame dropped: {}", e),
        }
    }

    /// Render the clip bound to `slot` until it finishes or the deadline passes.
    ///
    /// Playback and draw failures abandon the clip; the caller decides whether
    /// to carry on. Encoder failures are fatal for the run.
    pub async fn play_clip<S: FrameStream>(
        &mut self,
        slot: &mut StreamSlot<S>,
        effects: &EffectPlan,
        log: &mut SessionLog,
    ) -> Result<ClipOutcome> {
        let (name, length) = match slot.clip() {
            Some(clip) => (clip.source().name().to_string(), clip.length()),
            None => return Err(PlaybackError::NotReady { slot: slot.index() }.into()),
        };

        let mut ticker = time::interval(self.timing.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut state = ClipState::AwaitingFirstFrame;
        let mut logged_second = 0;

        loop {
            ticker.tick().await;
            let now = Instant::now();

            // The deadline wins over everything else in the frame
            if now >= self.deadline {
                debug!("Deadline reached during {}", name);
                return Ok(ClipOutcome::DeadlineReached);
            }

            if state == ClipState::AwaitingFirstFrame {
                slot.begin_playback(now)?;
            }
            let elapsed = slot.elapsed(now);

            let wait_until = (now + self.timing.playback_timeout).min(self.deadline);
            let frame = match time::timeout_at(wait_until, slot.frame_at(now)).await {
                Ok(frame) => frame?,
                Err(_) if Instant::now() >= self.deadline => return Ok(ClipOutcome::DeadlineReached),
                Err(_) => {
                    return Err(PlaybackError::Stalled {
                        name,
                        seconds: self.timing.playback_timeout.as_secs_f64(),
                    }
                    .into())
                }
            };

            self.surface.clear();
            if let Some(previous) = &self.previous {
                if self.timing.in_overlap(elapsed) {
                    self.surface.draw_stretched(previous)?;
                    self.overlap_frames += 1;
                }
            }
            self.surface.draw_region(frame, &effects.source_window(), effects.flip)?;

            self.sink.capture(self.surface.frame(), now).await?;
            self.frames_drawn += 1;

            if state == ClipState::AwaitingFirstFrame {
                log.event(format!("Playing {} ({:.2}s)", name, length));
                state = ClipState::Drawing;
            }

            if elapsed.as_secs() > logged_second {
                logged_second = elapsed.as_secs();
                log.event(format!("Playing {}: {:.1} / {:.1}s", name, elapsed.as_secs_f64(), length));
            }

            if slot.is_finished(now) {
                return Ok(ClipOutcome::Finished);
            }
        }
    }

    /// Stop recording and hand back the artifact
    pub async fn finish(self, log: &mut SessionLog) -> Result<Artifact> {
        let actual = Instant::now().saturating_duration_since(self.record_start);
        log.stats.actual_duration = actual.as_secs_f64();
        log.stats.frames_drawn = self.frames_drawn;
        log.stats.overlap_frames = self.overlap_frames;

        Ok(self.sink.stop(log).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{base_crop, ClipDescriptor};
    use crate::error::ShufflerError;
    use crate::media::{MediaInfo, SyntheticMedia, SyntheticSource};
    use crate::video::encoder::{ContainerFormat, EncodeSettings, MemoryEncoder, MemoryEncoderBackend};
    use crate::video::pool::StreamPool;

    const FPS: u32 = 10;

    async fn session(target: Duration, log: &mut SessionLog) -> RenderSession<MemoryEncoder> {
        let backend = MemoryEncoderBackend::new();
        let settings = EncodeSettings { width: 16, height: 12, fps: FPS, bitrate: 1_000_000 };
        let sink = RecordingSink::start(&backend, &ContainerFormat::default_preferences(), settings, target, "out", log)
            .await
            .unwrap();

        let timing = RenderTiming {
            frame_interval: Duration::from_millis(100),
            overlap: Duration::from_secs(1),
            playback_timeout: Duration::from_secs(10),
        };
        RenderSession::new(Surface::new(16, 12), sink, target, timing)
    }

    fn clip(media: &SyntheticMedia, name: &str, length: f64) -> ClipDescriptor {
        let source = media.source_file(name);
        ClipDescriptor::new(source, 0.0, length, MediaInfo::new(10.0, 32, 24))
    }

    fn plain_effects() -> EffectPlan {
        EffectPlan::plain(base_crop(32, 24, 16, 12))
    }

    #[tokio::test(start_paused = true)]
    async fn test_clip_plays_its_length() {
        let media = SyntheticMedia::new().with_source("a.mp4", SyntheticSource::new(10.0, 32, 24));
        let mut pool = StreamPool::new(&media, Duration::from_secs(20), FPS);
        pool.preload(0, clip(&media, "a.mp4", 1.0)).await.unwrap();

        let mut log = SessionLog::new();
        let mut session = session(Duration::from_secs(5), &mut log).await;
        let started = Instant::now();

        let outcome = session.play_clip(pool.slot_mut(0), &plain_effects(), &mut log).await.unwrap();
        assert_eq!(outcome, ClipOutcome::Finished);
        let took = started.elapsed();
        assert!(took >= Duration::from_secs(1) && took < Duration::from_millis(1100));
        assert_eq!(session.frames_drawn(), 11);
    }

    #[test]
    fn test_overlap_window_is_half_open() {
        let timing = RenderTiming {
            frame_interval: Duration::from_millis(100),
            overlap: Duration::from_secs(1),
            playback_timeout: Duration::from_secs(10),
        };
        assert!(timing.in_overlap(Duration::ZERO));
        assert!(timing.in_overlap(Duration::from_millis(999)));
        assert!(!timing.in_overlap(Duration::from_secs(1)));
        assert!(!timing.in_overlap(Duration::from_secs(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_previous_clip_backs_only_the_overlap_window() {
        let media = SyntheticMedia::new()
            .with_source("a.mp4", SyntheticSource::new(10.0, 32, 24))
            .with_source("b.mp4", SyntheticSource::new(10.0, 32, 24));
        let mut pool = StreamPool::new(&media, Duration::from_secs(20), FPS);
        pool.preload(0, clip(&media, "a.mp4", 2.0)).await.unwrap();
        pool.preload(1, clip(&media, "b.mp4", 2.0)).await.unwrap();

        let mut log = SessionLog::new();
        let mut session = session(Duration::from_secs(10), &mut log).await;

        // Nothing precedes the first clip
        session.play_clip(pool.slot_mut(0), &plain_effects(), &mut log).await.unwrap();
        assert_eq!(session.overlap_frames(), 0);

        session.set_previous(pool.slot(0).last_frame().cloned());
        pool.release(0);

        // One second of overlap at 10 fps
        let drawn_before = session.frames_drawn();
        session.play_clip(pool.slot_mut(1), &plain_effects(), &mut log).await.unwrap();
        assert_eq!(session.overlap_frames(), 10);
        assert!(session.frames_drawn() - drawn_before > 10);

        let artifact = session.finish(&mut log).await.unwrap();
        assert_eq!(log.stats.overlap_frames, 10);
        assert_eq!(artifact.frame_count, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_previous_frame_is_ignored() {
        let media = SyntheticMedia::new().with_source("a.mp4", SyntheticSource::new(10.0, 32, 24));
        let mut pool = StreamPool::new(&media, Duration::from_secs(20), FPS);
        pool.preload(0, clip(&media, "a.mp4", 1.0)).await.unwrap();

        let mut log = SessionLog::new();
        let mut session = session(Duration::from_secs(5), &mut log).await;
        session.set_previous(Some(Frame::new_black(0, 0)));

        let outcome = session.play_clip(pool.slot_mut(0), &plain_effects(), &mut log).await.unwrap();
        assert_eq!(outcome, ClipOutcome::Finished);
        assert_eq!(session.overlap_frames(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cuts_clip_short() {
        let media = SyntheticMedia::new().with_source("a.mp4", SyntheticSource::new(10.0, 32, 24));
        let mut pool = StreamPool::new(&media, Duration::from_secs(20), FPS);
        pool.preload(0, clip(&media, "a.mp4", 8.0)).await.unwrap();

        let mut log = SessionLog::new();
        let mut session = session(Duration::from_secs(2), &mut log).await;

        let outcome = session.play_clip(pool.slot_mut(0), &plain_effects(), &mut log).await.unwrap();
        assert_eq!(outcome, ClipOutcome::DeadlineReached);
        assert!(Instant::now() <= session.deadline() + Duration::from_millis(100));

        let artifact = session.finish(&mut log).await.unwrap();
        assert_eq!(artifact.frame_count, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbound_slot_is_a_clip_fault() {
        let media = SyntheticMedia::new();
        let mut pool = StreamPool::new(&media, Duration::from_secs(20), FPS);

        let mut log = SessionLog::new();
        let mut session = session(Duration::from_secs(2), &mut log).await;

        let err = session.play_clip(pool.slot_mut(0), &plain_effects(), &mut log).await.unwrap_err();
        assert!(matches!(err, ShufflerError::Playback(PlaybackError::NotReady { .. })));
        assert!(err.is_clip_fault());
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_failure_mid_clip_is_a_clip_fault() {
        let media = SyntheticMedia::new()
            .with_source("flaky.mp4", SyntheticSource::new(10.0, 32, 24).failing_decode_after(4));
        let mut pool = StreamPool::new(&media, Duration::from_secs(20), FPS);
        pool.preload(0, clip(&media, "flaky.mp4", 3.0)).await.unwrap();

        let mut log = SessionLog::new();
        let mut session = session(Duration::from_secs(5), &mut log).await;

        let err = session.play_clip(pool.slot_mut(0), &plain_effects(), &mut log).await.unwrap_err();
        assert!(matches!(err, ShufflerError::Playback(PlaybackError::DecodeFailed { .. })));
        assert!(err.is_clip_fault());
        assert_eq!(session.frames_drawn(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_crop_is_a_draw_fault() {
        let media = SyntheticMedia::new().with_source("a.mp4", SyntheticSource::new(10.0, 32, 24));
        let mut pool = StreamPool::new(&media, Duration::from_secs(20), FPS);
        pool.preload(0, clip(&media, "a.mp4", 1.0)).await.unwrap();

        let mut log = SessionLog::new();
        let mut session = session(Duration::from_secs(5), &mut log).await;

        // Planned for a bigger frame than the decoder delivers
        let effects = EffectPlan::plain(base_crop(640, 480, 16, 12));
        let err = session.play_clip(pool.slot_mut(0), &effects, &mut log).await.unwrap_err();
        assert!(matches!(err, ShufflerError::Draw(_)));
    }
}
