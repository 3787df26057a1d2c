use std::collections::VecDeque;

use rand::Rng;
use tracing::debug;

use crate::{
    config::PercentRange,
    media::{DurationProber, MediaBackend, MediaInfo, SourceFile},
    session::SessionLog,
};

/// One scheduled excerpt of a source video.
///
/// Invariant: `0 <= start` and `start + length <= media.duration`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipDescriptor {
    source: SourceFile,
    start: f64,
    length: f64,
    media: MediaInfo,
}

impl ClipDescriptor {
    pub fn new(source: SourceFile, start: f64, length: f64, media: MediaInfo) -> Self {
        Self { source, start, length, media }
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    /// Seek offset into the source, in seconds
    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn end(&self) -> f64 {
        self.start + self.length
    }

    pub fn media(&self) -> &MediaInfo {
        &self.media
    }
}

/// Ordered clip queue, consumed front to back
#[derive(Debug, Clone, Default)]
pub struct ClipPlan {
    clips: VecDeque<ClipDescriptor>,
    total: f64,
}

impl ClipPlan {
    pub fn from_clips(clips: Vec<ClipDescriptor>) -> Self {
        let mut plan = Self::default();
        for clip in clips {
            plan.push(clip);
        }
        plan
    }

    fn push(&mut self, clip: ClipDescriptor) {
        self.total += clip.length();
        self.clips.push_back(clip);
    }

    pub fn next_clip(&mut self) -> Option<ClipDescriptor> {
        self.clips.pop_front()
    }

    /// Sum of the planned clip lengths, including clips already taken
    pub fn total_duration(&self) -> f64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClipDescriptor> {
        self.clips.iter()
    }
}

/// Random clip scheduler.
///
/// Keeps drawing clips until the planned lengths reach the target. The last
/// clip may overshoot; the render deadline cuts it short later.
pub struct ClipPlanner {
    clip_length: PercentRange,
    max_failures: usize,
}

impl ClipPlanner {
    pub fn new(clip_length: PercentRange, max_failures: usize) -> Self {
        Self {
            clip_length,
            max_failures: max_failures.max(1),
        }
    }

    /// Build a plan covering `target` seconds.
    ///
    /// Unreadable sources are skipped and the pick resampled. After
    /// `max_failures` consecutive misses the plan is returned as it stands,
    /// possibly empty; the caller decides whether that is fatal.
    pub async fn plan<M: MediaBackend, R: Rng + ?Sized>(
        &self,
        sources: &[SourceFile],
        target: f64,
        prober: &mut DurationProber<'_, M>,
        rng: &mut R,
        log: &mut SessionLog,
    ) -> ClipPlan {
        let mut plan = ClipPlan::default();
        if sources.is_empty() {
            return plan;
        }

        let min = (self.clip_length.min / 100.0).clamp(0.0, 1.0);
        let max = (self.clip_length.max / 100.0).clamp(min, 1.0);

        // Sources still worth drawing from; a source whose probe fails is dropped
        let mut candidates: Vec<usize> = (0..sources.len()).collect();
        let mut last_picked: Option<usize> = None;
        let mut failures = 0;

        while plan.total_duration() < target {
            if candidates.is_empty() {
                log.error("No readable sources left to plan from");
                break;
            }
            if failures >= self.max_failures {
                log.error(format!(
                    "Planning stopped after {} consecutive unusable picks",
                    failures
                ));
                break;
            }

            let slot = pick_index(&candidates, last_picked, rng);
            let index = candidates[slot];
            let source = &sources[index];

            let info = match prober.probe_info(source).await {
                Ok(info) => info,
                Err(e) => {
                    log.error(format!("Skipping {}: {}", source.name(), e));
                    candidates.remove(slot);
                    failures += 1;
                    continue;
                }
            };

            let length = rng.gen_range(min..=max) * info.duration;
            if length <= 0.0 {
                debug!("Zero-length clip drawn from {}, resampling", source.name());
                failures += 1;
                continue;
            }
            let start = rng.gen_range(0.0..=(info.duration - length).max(0.0));

            log.event(format!(
                "Clip {}: {} from {:.2}s for {:.2}s",
                plan.len() + 1,
                source.name(),
                start,
                length
            ));

            plan.push(ClipDescriptor::new(source.clone(), start, length, info));
            last_picked = Some(index);
            failures = 0;
        }

        log.stats.files_processed = plan.len();
        log.stats.planned_duration = plan.total_duration();
        plan
    }
}

/// Uniform pick over the candidates that steps past the previous source
/// when there is a choice. Returns a position in `candidates`.
fn pick_index<R: Rng + ?Sized>(candidates: &[usize], last: Option<usize>, rng: &mut R) -> usize {
    let count = candidates.len();
    let slot = rng.gen_range(0..count);
    match last {
        Some(last) if count > 1 && candidates[slot] == last => (slot + 1) % count,
        _ => slot,
    }
}
