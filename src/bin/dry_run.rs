// Runs the full pipeline on synthetic sources and an in-memory encoder, so
// planning, preloading, rendering and recording can be watched without ffmpeg.

use anyhow::Result;
use clap::Parser;
use rand::{rngs::SmallRng, SeedableRng};

use clip_shuffler::{
    composition::CompositionEngine,
    config::{Config, EffectSettings, PercentRange, RenderRequest},
    media::{SyntheticMedia, SyntheticSource},
    session::SessionLog,
    video::encoder::{MemoryArtifactInfo, MemoryEncoderBackend},
};

#[derive(Parser)]
#[command(name = "dry_run", about = "Clip-Shuffler pipeline smoke run on synthetic media")]
struct Args {
    /// Length of the final video in seconds
    #[arg(short, long, default_value_t = 5.0)]
    length: f64,

    /// Seed for the shuffle
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Reject every preferred container so the encoder default is used
    #[arg(long)]
    force_fallback: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    println!("🎬 Clip-Shuffler dry run");

    let media = SyntheticMedia::new()
        .with_source("beach.mp4", SyntheticSource::new(10.0, 640, 360))
        .with_source("city.mp4", SyntheticSource::new(20.0, 480, 640))
        .with_source("forest.mp4", SyntheticSource::new(6.0, 320, 240))
        .with_source("corrupt.mp4", SyntheticSource::new(8.0, 320, 240).failing_probe());

    let mut config = Config::default();
    config.output.fps = 15;

    let encoder = if args.force_fallback {
        MemoryEncoderBackend::new().rejecting_all(&config.encoder.preferred_formats)
    } else {
        MemoryEncoderBackend::new()
    };

    let request = RenderRequest {
        sources: ["beach.mp4", "city.mp4", "forest.mp4", "corrupt.mp4"]
            .iter()
            .map(|name| media.source_file(name))
            .collect(),
        target_duration: args.length,
        clip_length: PercentRange::new(10.0, 25.0),
        effects: EffectSettings {
            zoom_probability: 50.0,
            zoom: PercentRange::new(110.0, 160.0),
            flip_probability: 30.0,
        },
        width: 320,
        height: 240,
    };

    let mut log = SessionLog::new();
    let engine = CompositionEngine::new(config, &media, &encoder);
    let result = engine
        .compose(&request, &mut SmallRng::seed_from_u64(args.seed), &mut log)
        .await;

    match &result {
        Ok(artifact) => {
            println!("\n✅ {} ({}, {:.2}s)", artifact.file_name, artifact.mime_type, artifact.duration());
            if let Some(info) = MemoryArtifactInfo::parse(&artifact.data) {
                println!("   {} frames at {}x{} @ {} fps", info.frame_count(), info.width, info.height, info.fps);
            }
        }
        Err(e) => println!("\n❌ {}", e.user_message()),
    }
    println!("   Decoders still open: {}", media.live_streams());

    println!("\n{}", log.summary());
    result.map(|_| ()).map_err(Into::into)
}
