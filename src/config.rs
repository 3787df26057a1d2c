use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result, ValidationError},
    media::SourceFile,
    video::encoder::ContainerFormat,
};

/// Pipeline policy for the clip shuffler.
///
/// Everything a single run is *asked* for lives in [`RenderRequest`]; this
/// struct holds how the pipeline goes about it: frame rate, encoder format
/// preferences, and the timeout and retry budget.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output stream settings
    pub output: OutputConfig,

    /// Encoder format negotiation
    pub encoder: EncoderConfig,

    /// Timeouts and retry budgets
    pub timing: TimingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            value: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.output.validate()?;
        self.timing.validate()?;
        Ok(())
    }
}

/// Output stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Frames per second of both the render loop and the recording
    pub fps: u32,

    /// Target video bitrate in bits per second
    pub bitrate: u64,

    /// Artifact file name without extension
    pub file_stem: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            bitrate: 8_000_000,
            file_stem: "final_video".to_string(),
        }
    }
}

impl OutputConfig {
    fn validate(&self) -> Result<()> {
        if self.fps == 0 || self.fps > 240 {
            return Err(config_value("output.fps", self.fps));
        }

        if self.bitrate == 0 {
            return Err(config_value("output.bitrate", self.bitrate));
        }

        if self.file_stem.trim().is_empty() {
            return Err(config_value("output.file_stem", &self.file_stem));
        }

        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

/// Encoder negotiation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Formats to try in order before the encoder's own default
    pub preferred_formats: Vec<ContainerFormat>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            preferred_formats: ContainerFormat::default_preferences(),
        }
    }
}

/// Timeouts, overlap and retry budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Bounded wait for duration metadata (seconds)
    pub probe_timeout: f64,

    /// Bounded wait for a slot to bind and seek (seconds)
    pub preload_timeout: f64,

    /// Bounded wait for the first frame once playback starts (seconds)
    pub playback_timeout: f64,

    /// Crossfade window at the start of each clip (seconds)
    pub overlap: f64,

    /// Consecutive failed probes after which planning gives up
    pub max_planner_failures: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            probe_timeout: 10.0,
            preload_timeout: 20.0,
            playback_timeout: 10.0,
            overlap: 1.0,
            max_planner_failures: 32,
        }
    }
}

impl TimingConfig {
    fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("timing.probe_timeout", self.probe_timeout),
            ("timing.preload_timeout", self.preload_timeout),
            ("timing.playback_timeout", self.playback_timeout),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(config_value(key, value));
            }
        }

        if !self.overlap.is_finite() || self.overlap < 0.0 {
            return Err(config_value("timing.overlap", self.overlap));
        }

        if self.max_planner_failures == 0 {
            return Err(config_value("timing.max_planner_failures", self.max_planner_failures));
        }

        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.probe_timeout)
    }

    pub fn preload_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.preload_timeout)
    }

    pub fn playback_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.playback_timeout)
    }

    pub fn overlap(&self) -> Duration {
        Duration::from_secs_f64(self.overlap)
    }
}

fn config_value<V: ToString>(key: &str, value: V) -> crate::error::ShufflerError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
    .into()
}

/// Inclusive percentage range, e.g. clip length as a share of the source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentRange {
    pub min: f64,
    pub max: f64,
}

impl PercentRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn is_ordered(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

/// Zoom and flip odds for the effect planner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectSettings {
    /// Chance (0-100) that a clip gets a zoom window
    pub zoom_probability: f64,

    /// Zoom factor range in percent; 100 means no magnification
    pub zoom: PercentRange,

    /// Chance (0-100) that a clip is mirrored horizontally
    pub flip_probability: f64,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            zoom_probability: 0.0,
            zoom: PercentRange::new(100.0, 100.0),
            flip_probability: 0.0,
        }
    }
}

/// Everything the caller asks of one run
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub sources: Vec<SourceFile>,

    /// Length of the output video in seconds
    pub target_duration: f64,

    /// Clip length as a percentage of each source's own duration
    pub clip_length: PercentRange,

    pub effects: EffectSettings,

    pub width: u32,
    pub height: u32,
}

impl RenderRequest {
    pub fn output_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn target(&self) -> Duration {
        Duration::from_secs_f64(self.target_duration)
    }

    /// Check the caller's input before any work starts
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.sources.is_empty() {
            return Err(ValidationError::NoSources);
        }

        if !self.target_duration.is_finite() || self.target_duration <= 0.0 {
            return Err(invalid("final_length", self.target_duration));
        }

        let clip = self.clip_length;
        if !clip.is_ordered() || clip.min < 0.0 || clip.max > 100.0 || clip.max <= 0.0 {
            return Err(invalid("clip_length", format!("{}%-{}%", clip.min, clip.max)));
        }

        for (key, pct) in [
            ("zoom_probability", self.effects.zoom_probability),
            ("flip_probability", self.effects.flip_probability),
        ] {
            if !(0.0..=100.0).contains(&pct) {
                return Err(invalid(key, pct));
            }
        }

        let zoom = self.effects.zoom;
        if !zoom.is_ordered() || zoom.min < 100.0 {
            return Err(invalid("zoom", format!("{}%-{}%", zoom.min, zoom.max)));
        }

        // 4:2:0 chroma subsampling needs whole chroma rows and columns
        if self.width == 0 || self.height == 0 || self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(invalid("size", format!("{}x{}", self.width, self.height)));
        }

        Ok(())
    }
}

fn invalid<V: ToString>(key: &str, value: V) -> ValidationError {
    ValidationError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
