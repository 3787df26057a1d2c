use thiserror::Error;

/// Main error type for the clip-shuffler library
#[derive(Error, Debug)]
pub enum ShufflerError {
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Preload error: {0}")]
    Preload(#[from] PreloadError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Draw error: {0}")]
    Draw(#[from] DrawError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Media backend error: {0}")]
    Media(#[from] MediaError),

    #[error("Nothing to process: {reason}")]
    NothingToProcess { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures raised by a decode collaborator, before the caller knows
/// whether it was probing, preloading or playing.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Failed to open {name}: {reason}")]
    OpenFailed { name: String, reason: String },

    #[error("Failed to decode {name}: {reason}")]
    DecodeFailed { name: String, reason: String },

    #[error("Media tool unavailable: {tool}")]
    ToolMissing { tool: String },
}

/// Duration probing errors
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Timed out after {seconds:.1}s waiting for the duration of {name}")]
    Timeout { name: String, seconds: f64 },

    #[error("Could not read {name}: {reason}")]
    Unreadable { name: String, reason: String },
}

/// Stream slot preload (bind + seek) errors
#[derive(Error, Debug)]
pub enum PreloadError {
    #[error("Timed out after {seconds:.1}s preloading {name}")]
    Timeout { name: String, seconds: f64 },

    #[error("Invalid start offset {start:.2}s for {name} of length {duration:.2}s")]
    InvalidStart { name: String, start: f64, duration: f64 },

    #[error("Failed to preload {name}: {reason}")]
    Failed { name: String, reason: String },
}

/// Playback errors for the clip currently being rendered
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Slot {slot} has no preloaded clip to play")]
    NotReady { slot: usize },

    #[error("Timed out after {seconds:.1}s waiting for playback of {name} to start")]
    Stalled { name: String, seconds: f64 },

    #[error("Decoding {name} failed during playback: {reason}")]
    DecodeFailed { name: String, reason: String },
}

/// Compositing errors
#[derive(Error, Debug)]
pub enum DrawError {
    #[error("Source frame is empty ({width}x{height})")]
    EmptySource { width: u32, height: u32 },

    #[error("Source region {x:.0},{y:.0} {width:.0}x{height:.0} lies outside the {frame_width}x{frame_height} frame")]
    RegionOutOfBounds {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        frame_width: u32,
        frame_height: u32,
    },
}

/// Recording sink / encoder errors
#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("Container format not supported: {format}")]
    UnsupportedFormat { format: String },

    #[error("Failed to start encoder: {reason}")]
    StartFailed { reason: String },

    #[error("Failed to write frame to encoder: {reason}")]
    WriteFailed { reason: String },

    #[error("Failed to finalize recording: {reason}")]
    FinalizeFailed { reason: String },

    #[error("Recording produced an empty artifact")]
    EmptyArtifact,
}

/// Caller input errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("No source videos were supplied")]
    NoSources,

    #[error("Invalid value: {key} = {value}")]
    InvalidValue { key: String, value: String },
}

/// Configuration-file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using ShufflerError
pub type Result<T> = std::result::Result<T, ShufflerError>;

impl ShufflerError {
    pub fn nothing_to_process<S: Into<String>>(reason: S) -> Self {
        Self::NothingToProcess { reason: reason.into() }
    }

    /// Per-clip faults: the clip is abandoned and the run carries on.
    pub fn is_clip_fault(&self) -> bool {
        matches!(self, Self::Playback(_) | Self::Draw(_))
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Probe(ProbeError::Timeout { name, .. }) => {
                format!("'{}' took too long to report its duration. Is it a valid video?", name)
            }
            Self::Probe(ProbeError::Unreadable { name, .. }) => {
                format!("Could not read '{}'. Please check the file exists and is a supported video.", name)
            }
            Self::Preload(e) => format!("Could not prepare the first clip: {}", e),
            Self::Playback(e) => format!("A clip could not be played: {}", e),
            Self::Draw(e) => format!("A frame could not be drawn: {}", e),
            Self::Encoding(EncodingError::EmptyArtifact) => {
                "Recording finished but produced no video data.".to_string()
            }
            Self::Encoding(e) => format!("Video recording failed: {}", e),
            Self::Validation(ValidationError::NoSources) => {
                "Please select at least one video file.".to_string()
            }
            Self::Validation(e) => format!("Please enter valid values: {}", e),
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            Self::Media(MediaError::ToolMissing { tool }) => {
                format!("'{}' was not found. Please install FFmpeg.", tool)
            }
            Self::NothingToProcess { .. } => "No clips to process.".to_string(),
            _ => self.to_string(),
        }
    }
}
