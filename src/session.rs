//! Session-scoped event and error log.
//!
//! One [`SessionLog`] is created per run and threaded through the planner,
//! the engine and the render loop. Every entry is stored with its wall-clock
//! time and mirrored to `tracing`, so the CLI can print a compact summary at
//! the end of the run whether it succeeded or aborted.

use std::fmt;

use chrono::{DateTime, Local};
use tracing::{error, info};

/// One timestamped line in the session log
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// Counters filled in as the run progresses
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Clips that reached the planner output
    pub files_processed: usize,

    /// Sum of planned clip lengths in seconds
    pub planned_duration: f64,

    /// Seconds from record start to stop
    pub actual_duration: f64,

    /// Frames composited onto the output surface
    pub frames_drawn: u64,

    /// Frames drawn over the previous clip's last picture
    pub overlap_frames: u64,

    /// Encoded chunks received from the encoder
    pub chunks_recorded: usize,

    /// MIME type the recording sink settled on
    pub recorder_mime: Option<String>,
}

#[derive(Debug, Default)]
pub struct SessionLog {
    events: Vec<LogEntry>,
    errors: Vec<LogEntry>,
    pub stats: RunStats,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pipeline event
    pub fn event<S: Into<String>>(&mut self, message: S) {
        let message = message.into();
        info!("{}", message);
        self.events.push(LogEntry { at: Local::now(), message });
    }

    /// Record a failure; recovered or not, it shows up in the summary
    pub fn error<S: Into<String>>(&mut self, message: S) {
        let message = message.into();
        error!("{}", message);
        self.errors.push(LogEntry { at: Local::now(), message });
    }

    pub fn events(&self) -> &[LogEntry] {
        &self.events
    }

    pub fn errors(&self) -> &[LogEntry] {
        &self.errors
    }

    pub fn summary(&self) -> SessionSummary<'_> {
        SessionSummary { log: self }
    }
}

/// The DEBUG SUMMARY block printed at the end of a run
pub struct SessionSummary<'a> {
    log: &'a SessionLog,
}

impl fmt::Display for SessionSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let log = self.log;
        let stats = &log.stats;

        writeln!(f, "=== DEBUG SUMMARY ===")?;
        writeln!(f, "Events logged: {}", log.events.len())?;
        writeln!(f, "Errors: {}", log.errors.len())?;
        writeln!(f, "Files processed: {}", stats.files_processed)?;
        writeln!(f, "Planned duration: {:.2}s", stats.planned_duration)?;
        writeln!(f, "Actual duration: {:.2}s", stats.actual_duration)?;
        writeln!(f, "Frames drawn: {}", stats.frames_drawn)?;
        writeln!(f, "Overlap frames: {}", stats.overlap_frames)?;
        writeln!(f, "Chunks recorded: {}", stats.chunks_recorded)?;
        writeln!(
            f,
            "Recorder MIME type: {}",
            stats.recorder_mime.as_deref().unwrap_or("none")
        )?;

        if !log.errors.is_empty() {
            writeln!(f, "Error log:")?;
            for entry in &log.errors {
                writeln!(f, "  {}", entry)?;
            }
        }

        write!(f, "=====================")
    }
}
