use rand::Rng;
use tokio::time;
use tracing::{debug, info};

use crate::{
    composition::{ClipPlan, ClipPlanner, EffectPlanner},
    config::{Config, RenderRequest},
    error::{Result, ShufflerError},
    media::{DurationProber, MediaBackend},
    session::SessionLog,
    video::{
        Artifact, ClipOutcome, EncodeSettings, EncoderBackend, RecordingSink, RenderSession, RenderTiming,
        StreamPool, Surface, POOL_SIZE,
    },
};

/// Orchestrates one clip-shuffling run
///
/// The engine follows a clear pipeline:
/// 1. Clip Planning - Probe sources and draw random clips covering the target
/// 2. Pool Priming - Seek the first clips into the stream slots
/// 3. Recording - Negotiate an encoder format and start the sink
/// 4. Rendering - Play clips in order, preloading behind playback, until the deadline
/// 5. Finalizing - Pad to the full length and assemble the artifact
pub struct CompositionEngine<'a, M, B> {
    config: Config,
    media: &'a M,
    encoder: &'a B,
}

impl<'a, M: MediaBackend, B: EncoderBackend> CompositionEngine<'a, M, B> {
    pub fn new(config: Config, media: &'a M, encoder: &'a B) -> Self {
        Self { config, media, encoder }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the whole pipeline for `request`.
    ///
    /// Every stream slot is released before this returns, on success and on
    /// every fatal error alike.
    pub async fn compose<R: Rng + ?Sized>(
        &self,
        request: &RenderRequest,
        rng: &mut R,
        log: &mut SessionLog,
    ) -> Result<Artifact> {
        request.validate()?;
        self.config.validate()?;

        info!("🎬 Starting clip shuffle");
        info!("   Sources: {}", request.sources.len());
        info!("   Target: {:.1}s at {}x{}", request.target_duration, request.width, request.height);
        info!(
            "   Clip length: {:.0}%-{:.0}% of each source",
            request.clip_length.min, request.clip_length.max
        );

        // Pipeline Step 1: Clip Planning
        let mut plan = self.plan_clips(request, rng, log).await?;

        // Pipeline Step 2: Pool Priming
        let mut pool = StreamPool::new(self.media, self.config.timing.preload_timeout(), self.config.output.fps);
        if let Err(e) = self.prime_pool(&mut pool, &mut plan, log).await {
            pool.release_all();
            return Err(e);
        }

        // Pipeline Step 3: Recording
        let sink = match self.start_recording(request, log).await {
            Ok(sink) => sink,
            Err(e) => {
                pool.release_all();
                return Err(e);
            }
        };

        let timing = RenderTiming {
            frame_interval: self.config.output.frame_interval(),
            overlap: self.config.timing.overlap(),
            playback_timeout: self.config.timing.playback_timeout(),
        };
        let mut session = RenderSession::new(Surface::new(request.width, request.height), sink, request.target(), timing);

        // Pipeline Step 4: Rendering
        let rendered = self.render(&mut session, &mut pool, &mut plan, request, rng, log).await;
        pool.release_all();
        rendered?;

        // Pipeline Step 5: Finalizing
        info!("📦 Step 5: Finalizing recording...");
        let artifact = session.finish(log).await?;

        info!("🎉 Shuffle complete: {} ({:.2}s)", artifact.file_name, artifact.duration());
        Ok(artifact)
    }

    // ==========================================
    // PIPELINE STEP 1: CLIP PLANNING
    // ==========================================

    async fn plan_clips<R: Rng + ?Sized>(
        &self,
        request: &RenderRequest,
        rng: &mut R,
        log: &mut SessionLog,
    ) -> Result<ClipPlan> {
        info!("🎲 Step 1: Planning clips...");

        let mut prober = DurationProber::new(self.media, self.config.timing.probe_timeout());
        let planner = ClipPlanner::new(request.clip_length, self.config.timing.max_planner_failures);
        let plan = planner
            .plan(&request.sources, request.target_duration, &mut prober, rng, log)
            .await;

        if plan.is_empty() {
            return Err(ShufflerError::nothing_to_process("no clip could be planned from the sources"));
        }

        info!("   ✅ Plan ready:");
        info!("      Clips: {}", plan.len());
        info!("      Planned: {:.2}s for a {:.2}s target", plan.total_duration(), request.target_duration);
        Ok(plan)
    }

    // ==========================================
    // PIPELINE STEP 2: POOL PRIMING
    // ==========================================

    /// Load the first clip (fatal on failure), then fill the remaining slots
    async fn prime_pool(&self, pool: &mut StreamPool<'a, M>, plan: &mut ClipPlan, log: &mut SessionLog) -> Result<()> {
        info!("📼 Step 2: Priming {} stream slots...", POOL_SIZE);

        let first = plan
            .next_clip()
            .ok_or_else(|| ShufflerError::nothing_to_process("clip plan is empty"))?;

        if let Err(e) = pool.preload(0, first).await {
            log.error(format!("First clip failed to preload: {}", e));
            return Err(e.into());
        }

        for index in 1..POOL_SIZE {
            for e in pool.loader(index).fill(plan).await {
                log.error(format!("Preload skipped: {}", e));
            }
        }

        info!("   ✅ {} of {} slots ready", pool.bound_count(), POOL_SIZE);
        Ok(())
    }

    // ==========================================
    // PIPELINE STEP 3: RECORDING
    // ==========================================

    async fn start_recording(&self, request: &RenderRequest, log: &mut SessionLog) -> Result<RecordingSink<B::Encoder>> {
        info!("🔴 Step 3: Starting recorder...");

        let settings = EncodeSettings {
            width: request.width,
            height: request.height,
            fps: self.config.output.fps,
            bitrate: self.config.output.bitrate,
        };

        RecordingSink::start(
            self.encoder,
            &self.config.encoder.preferred_formats,
            settings,
            request.target(),
            &self.config.output.file_stem,
            log,
        )
        .await
        .map_err(|e| {
            log.error(format!("Recorder failed to start: {}", e));
            e.into()
        })
    }

    // ==========================================
    // PIPELINE STEP 4: RENDERING
    // ==========================================

    /// Play slot after slot until the deadline, refilling each vacated slot
    /// from the plan while the next clip plays.
    async fn render<R: Rng + ?Sized>(
        &self,
        session: &mut RenderSession<B::Encoder>,
        pool: &mut StreamPool<'a, M>,
        plan: &mut ClipPlan,
        request: &RenderRequest,
        rng: &mut R,
        log: &mut SessionLog,
    ) -> Result<()> {
        info!("🎞️  Step 4: Rendering...");

        let effects = EffectPlanner::new(request.effects);
        let deadline = session.deadline();
        let mut current = 0;
        let mut vacated: Option<usize> = None;
        let mut clips_played = 0;

        while !session.deadline_passed() {
            let Some(clip) = pool.slot(current).clip() else {
                log.event("Clip plan exhausted before the deadline");
                break;
            };

            let effect_plan = effects.plan(rng, clip.media().dimensions(), request.output_size());
            debug!(
                "Slot {}: {} zoom={:?} flip={}",
                current,
                clip.source().name(),
                effect_plan.zoom.map(|z| z.factor),
                effect_plan.flip
            );

            let (slot, loader) = pool.split(current, vacated);
            let queue = &mut *plan;
            let play = session.play_clip(slot, &effect_plan, log);
            let preload = async move {
                match loader {
                    Some(loader) => time::timeout_at(deadline, loader.fill(queue)).await.unwrap_or_default(),
                    None => Vec::new(),
                }
            };
            let (outcome, skipped) = tokio::join!(play, preload);

            for e in skipped {
                log.error(format!("Preload skipped: {}", e));
            }

            session.set_previous(pool.slot(current).last_frame().cloned());
            pool.release(current);

            match outcome {
                Ok(ClipOutcome::Finished) => clips_played += 1,
                Ok(ClipOutcome::DeadlineReached) => {
                    clips_played += 1;
                    break;
                }
                Err(e) if e.is_clip_fault() => log.error(format!("Clip abandoned: {}", e)),
                Err(e) => {
                    log.error(format!("Rendering aborted: {}", e));
                    return Err(e);
                }
            }

            vacated = Some(current);
            current = (current + 1) % POOL_SIZE;
        }

        // The recording always spans the full target, holding the last picture
        if !session.deadline_passed() {
            log.event("Holding the last frame until the deadline");
            time::sleep_until(deadline).await;
        }

        info!("   ✅ Rendering complete:");
        info!("      Clips played: {}", clips_played);
        info!("      Frames drawn: {}", session.frames_drawn());
        Ok(())
    }
}
