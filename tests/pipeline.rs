//! End-to-end runs of the pipeline on synthetic media and the in-memory
//! encoder. All tests run on tokio's paused clock, so the real-time render
//! loop completes instantly and its timing is exact.

use std::time::Duration;

use rand::{rngs::SmallRng, SeedableRng};
use tokio::time::Instant;

use clip_shuffler::{
    config::{Config, EffectSettings, PercentRange, RenderRequest},
    error::{EncodingError, PreloadError, ShufflerError, ValidationError},
    media::{SyntheticMedia, SyntheticSource},
    video::encoder::{ContainerFormat, MemoryArtifactInfo, MemoryEncoderBackend},
    Artifact, CompositionEngine, SessionLog,
};

fn request(media: &SyntheticMedia, names: &[&str], target: f64, clip: (f64, f64)) -> RenderRequest {
    RenderRequest {
        sources: names.iter().map(|name| media.source_file(name)).collect(),
        target_duration: target,
        clip_length: PercentRange::new(clip.0, clip.1),
        effects: EffectSettings::default(),
        width: 32,
        height: 24,
    }
}

async fn run(
    media: &SyntheticMedia,
    encoder: &MemoryEncoderBackend,
    config: Config,
    request: &RenderRequest,
    seed: u64,
    log: &mut SessionLog,
) -> Result<Artifact, ShufflerError> {
    let engine = CompositionEngine::new(config, media, encoder);
    let mut rng = SmallRng::seed_from_u64(seed);
    engine.compose(request, &mut rng, log).await
}

#[tokio::test(start_paused = true)]
async fn test_two_sources_five_seconds() {
    let media = SyntheticMedia::new()
        .with_source("ten.mp4", SyntheticSource::new(10.0, 64, 36))
        .with_source("twenty.mp4", SyntheticSource::new(20.0, 48, 64));
    let encoder = MemoryEncoderBackend::new();
    let req = request(&media, &["ten.mp4", "twenty.mp4"], 5.0, (50.0, 80.0));

    for seed in 0..5 {
        let mut log = SessionLog::new();
        let artifact = run(&media, &encoder, Config::default(), &req, seed, &mut log).await.unwrap();

        assert!((1..=2).contains(&log.stats.files_processed));
        assert!(log.stats.planned_duration >= 5.0);

        let info = MemoryArtifactInfo::parse(&artifact.data).unwrap();
        assert_eq!((info.width, info.height), (32, 24));
        assert_eq!(info.frame_count(), 150);
        assert!((artifact.duration() - 5.0).abs() <= 1.0);
        assert_eq!(artifact.file_name, "final_video.mp4");
        assert_eq!(media.live_streams(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_degenerate_clip_range() {
    let media = SyntheticMedia::new().with_source("only.mp4", SyntheticSource::new(10.0, 32, 24));
    let encoder = MemoryEncoderBackend::new();
    let req = request(&media, &["only.mp4"], 3.0, (10.0, 10.0));

    let mut log = SessionLog::new();
    let artifact = run(&media, &encoder, Config::default(), &req, 1, &mut log).await.unwrap();

    assert_eq!(log.stats.files_processed, 3);
    assert!((log.stats.planned_duration - 3.0).abs() < 1e-9);
    assert_eq!(artifact.frame_count, 90);

    // Clips two and three each start over the last picture of the one before
    assert!(log.stats.overlap_frames >= 50, "overlap {}", log.stats.overlap_frames);
    assert!(log.stats.overlap_frames <= 62, "overlap {}", log.stats.overlap_frames);
}

#[tokio::test(start_paused = true)]
async fn test_run_never_overshoots_deadline() {
    let media = SyntheticMedia::new()
        .with_source("a.mp4", SyntheticSource::new(30.0, 64, 36))
        .with_source("b.mp4", SyntheticSource::new(45.0, 64, 36));
    let encoder = MemoryEncoderBackend::new();
    let req = request(&media, &["a.mp4", "b.mp4"], 4.0, (20.0, 60.0));

    let started = Instant::now();
    let mut log = SessionLog::new();
    run(&media, &encoder, Config::default(), &req, 3, &mut log).await.unwrap();

    let frame_interval = Config::default().output.frame_interval();
    assert!(started.elapsed() <= Duration::from_secs(4) + frame_interval);
    assert!((log.stats.actual_duration - 4.0).abs() < 0.05);
}

#[tokio::test(start_paused = true)]
async fn test_effects_do_not_break_the_run() {
    let media = SyntheticMedia::new()
        .with_source("wide.mp4", SyntheticSource::new(12.0, 96, 36))
        .with_source("tall.mp4", SyntheticSource::new(12.0, 36, 96));
    let encoder = MemoryEncoderBackend::new();
    let mut req = request(&media, &["wide.mp4", "tall.mp4"], 3.0, (10.0, 20.0));
    req.effects = EffectSettings {
        zoom_probability: 100.0,
        zoom: PercentRange::new(120.0, 200.0),
        flip_probability: 100.0,
    };

    let mut log = SessionLog::new();
    let artifact = run(&media, &encoder, Config::default(), &req, 5, &mut log).await.unwrap();
    assert_eq!(artifact.frame_count, 90);
    assert!(log.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_plan_is_padded_to_target() {
    // Every clip breaks after a handful of frames, so the plan runs out long
    // before the deadline
    let media = SyntheticMedia::new()
        .with_source("flaky.mp4", SyntheticSource::new(10.0, 32, 24).failing_decode_after(5));
    let encoder = MemoryEncoderBackend::new();
    let req = request(&media, &["flaky.mp4"], 6.0, (20.0, 20.0));

    let started = Instant::now();
    let mut log = SessionLog::new();
    let artifact = run(&media, &encoder, Config::default(), &req, 2, &mut log).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(6));
    assert_eq!(artifact.frame_count, 180);
    assert_eq!(MemoryArtifactInfo::parse(&artifact.data).unwrap().frame_count(), 180);
    assert_eq!(log.errors().len(), 3);
    assert!(log.events().iter().any(|e| e.message.contains("exhausted")));
}

#[tokio::test(start_paused = true)]
async fn test_preloads_hide_behind_playback() {
    let delay = Duration::from_millis(500);
    let media = SyntheticMedia::new()
        .with_source("a.mp4", SyntheticSource::new(10.0, 32, 24).with_open_delay(delay))
        .with_source("b.mp4", SyntheticSource::new(10.0, 32, 24).with_open_delay(delay));
    let encoder = MemoryEncoderBackend::new();
    let req = request(&media, &["a.mp4", "b.mp4"], 8.0, (10.0, 15.0));

    let mut log = SessionLog::new();
    run(&media, &encoder, Config::default(), &req, 9, &mut log).await.unwrap();

    // 8s at 30 fps; serial seeks would cost 15 frames per clip change
    assert!(log.stats.frames_drawn >= 230, "drew {}", log.stats.frames_drawn);
    assert!(log.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_preloads_are_skipped() {
    let media = SyntheticMedia::new()
        .with_source("fast.mp4", SyntheticSource::new(10.0, 32, 24))
        .with_source("stuck.mp4", SyntheticSource::new(10.0, 32, 24).with_open_delay(Duration::from_secs(600)));
    let encoder = MemoryEncoderBackend::new();
    let req = request(&media, &["fast.mp4", "stuck.mp4"], 4.0, (10.0, 10.0));

    let mut config = Config::default();
    config.timing.preload_timeout = 0.5;

    for seed in 0..6 {
        let mut log = SessionLog::new();
        match run(&media, &encoder, config.clone(), &req, seed, &mut log).await {
            Ok(artifact) => {
                assert_eq!(artifact.frame_count, 120);
                assert!(log.errors().iter().any(|e| e.message.contains("Preload skipped")));
            }
            // The shuffle put the stuck file first, which is fatal
            Err(ShufflerError::Preload(PreloadError::Timeout { name, .. })) => assert_eq!(name, "stuck.mp4"),
            Err(other) => panic!("unexpected error: {}", other),
        }
        assert_eq!(media.live_streams(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_preload_failure_is_fatal() {
    let media = SyntheticMedia::new().with_source("locked.mp4", SyntheticSource::new(10.0, 32, 24).failing_open());
    let encoder = MemoryEncoderBackend::new();
    let req = request(&media, &["locked.mp4"], 3.0, (10.0, 30.0));

    let mut log = SessionLog::new();
    let err = run(&media, &encoder, Config::default(), &req, 4, &mut log).await.unwrap_err();

    assert!(matches!(err, ShufflerError::Preload(PreloadError::Failed { .. })));
    assert_eq!(media.live_streams(), 0);
    assert!(log.stats.recorder_mime.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_sources_mean_nothing_to_process() {
    let media = SyntheticMedia::new()
        .with_source("a.mp4", SyntheticSource::new(10.0, 32, 24).failing_probe())
        .with_source("b.mp4", SyntheticSource::new(10.0, 32, 24).with_probe_delay(Duration::from_secs(60)));
    let encoder = MemoryEncoderBackend::new();
    let req = request(&media, &["a.mp4", "b.mp4"], 3.0, (10.0, 30.0));

    let mut log = SessionLog::new();
    let err = run(&media, &encoder, Config::default(), &req, 0, &mut log).await.unwrap_err();

    assert!(matches!(err, ShufflerError::NothingToProcess { .. }));
    assert_eq!(err.user_message(), "No clips to process.");
    assert!(log.errors().len() >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_encoder_falls_back_to_default_format() {
    let media = SyntheticMedia::new().with_source("a.mp4", SyntheticSource::new(10.0, 32, 24));
    let encoder = MemoryEncoderBackend::new().rejecting_all(&ContainerFormat::default_preferences());
    let req = request(&media, &["a.mp4"], 2.0, (20.0, 40.0));

    let mut log = SessionLog::new();
    let artifact = run(&media, &encoder, Config::default(), &req, 8, &mut log).await.unwrap();

    assert_eq!(artifact.mime_type, ContainerFormat::fallback().mime_type);
    assert_eq!(artifact.file_name, "final_video.mkv");
    assert_eq!(log.stats.recorder_mime.as_deref(), Some("video/x-matroska"));
    // A single clip has nothing underneath it
    assert_eq!(log.stats.files_processed, 1);
    assert_eq!(log.stats.overlap_frames, 0);
}

#[tokio::test(start_paused = true)]
async fn test_encoder_start_failure_releases_streams() {
    let media = SyntheticMedia::new().with_source("a.mp4", SyntheticSource::new(10.0, 32, 24));
    let encoder = MemoryEncoderBackend::new().broken();
    let req = request(&media, &["a.mp4"], 2.0, (20.0, 40.0));

    let mut log = SessionLog::new();
    let err = run(&media, &encoder, Config::default(), &req, 8, &mut log).await.unwrap_err();

    assert!(matches!(err, ShufflerError::Encoding(EncodingError::StartFailed { .. })));
    assert_eq!(media.live_streams(), 0);
}

#[tokio::test]
async fn test_invalid_request_is_rejected_up_front() {
    let media = SyntheticMedia::new();
    let encoder = MemoryEncoderBackend::new();
    let req = request(&media, &[], 3.0, (10.0, 30.0));

    let mut log = SessionLog::new();
    let err = run(&media, &encoder, Config::default(), &req, 0, &mut log).await.unwrap_err();
    assert!(matches!(err, ShufflerError::Validation(ValidationError::NoSources)));
    assert_eq!(media.probe_count(), 0);
}
