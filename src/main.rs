use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::{rngs::SmallRng, SeedableRng};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use clip_shuffler::{
    composition::CompositionEngine,
    config::{Config, EffectSettings, PercentRange, RenderRequest},
    error::ShufflerError,
    media::{collect_sources, FfmpegMedia},
    session::SessionLog,
    video::encoder::FfmpegEncoderBackend,
};

#[derive(Parser)]
#[command(
    name = "clip-shuffler",
    version,
    about = "Shuffle random excerpts of your videos into one clip of a fixed length",
    long_about = "Clip-Shuffler picks random excerpts from the given videos, optionally zooms into or mirrors each one, and records them back to back until the requested length is reached."
)]
struct Cli {
    /// Source videos, or directories to scan for them
    #[arg(short, long = "input", required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Length of the final video in seconds
    #[arg(short, long, default_value_t = 30.0)]
    length: f64,

    /// Shortest clip, as a percentage of its source's duration
    #[arg(long, default_value_t = 10.0)]
    min_clip: f64,

    /// Longest clip, as a percentage of its source's duration
    #[arg(long, default_value_t = 30.0)]
    max_clip: f64,

    /// Chance (0-100) that a clip is zoomed
    #[arg(long, default_value_t = 0.0)]
    zoom_probability: f64,

    /// Smallest zoom in percent (100 = no zoom)
    #[arg(long, default_value_t = 100.0)]
    min_zoom: f64,

    /// Largest zoom in percent
    #[arg(long, default_value_t = 150.0)]
    max_zoom: f64,

    /// Chance (0-100) that a clip is mirrored
    #[arg(long, default_value_t = 0.0)]
    flip_probability: f64,

    /// Output width in pixels (must be even)
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Output height in pixels (must be even)
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Output file (defaults to final_video.<ext> for the negotiated format)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for a reproducible shuffle
    #[arg(long)]
    seed: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    info!("Starting Clip-Shuffler v{}", env!("CARGO_PKG_VERSION"));

    // The summary is printed for every run, however early it fails
    let mut log = SessionLog::new();
    let outcome = run(&cli, &mut log).await;
    if let Err(e) = &outcome {
        record_failure(&mut log, e);
    }

    println!("{}", log.summary());
    outcome
}

async fn run(cli: &Cli, log: &mut SessionLog) -> Result<()> {
    // Load configuration
    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    // Environment report
    let media = FfmpegMedia::new().map_err(ShufflerError::from)?;
    match media.version_line() {
        Some(version) => info!("Decoder: {}", version),
        None => warn!("Could not read the ffmpeg version"),
    }
    let encoder = FfmpegEncoderBackend::new().map_err(ShufflerError::from)?;

    let sources = collect_sources(cli.inputs.as_slice())?;
    info!("Found {} source videos", sources.len());

    let request = RenderRequest {
        sources,
        target_duration: cli.length,
        clip_length: PercentRange::new(cli.min_clip, cli.max_clip),
        effects: EffectSettings {
            zoom_probability: cli.zoom_probability,
            zoom: PercentRange::new(cli.min_zoom, cli.max_zoom),
            flip_probability: cli.flip_probability,
        },
        width: cli.width,
        height: cli.height,
    };

    let mut rng = match cli.seed {
        Some(seed) => {
            info!("Using seed {}", seed);
            SmallRng::seed_from_u64(seed)
        }
        None => SmallRng::from_entropy(),
    };

    let engine = CompositionEngine::new(config, &media, &encoder);
    let artifact = engine.compose(&request, &mut rng, log).await?;

    let path = cli.output.clone().unwrap_or_else(|| PathBuf::from(&artifact.file_name));
    artifact
        .save(&path)
        .await
        .with_context(|| format!("Could not write {:?}", path))?;
    log.event(format!("Saved {} ({:.2} MB) to {:?}", artifact.mime_type, artifact.size_mb(), path));
    Ok(())
}

/// Add a failed run's reason to the log, in user-facing wording where there is one
fn record_failure(log: &mut SessionLog, err: &anyhow::Error) {
    let message = match err.downcast_ref::<ShufflerError>() {
        Some(e) => e.user_message(),
        None => format!("{:#}", err),
    };
    log.error(message);
}
