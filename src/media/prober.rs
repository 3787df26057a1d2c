use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::error::{MediaError, ProbeError};
use crate::media::backend::MediaBackend;
use crate::media::types::{MediaInfo, SourceFile};

/// Duration prober with a bounded wait and a per-source metadata cache.
///
/// The backend's probe handle lives only inside the timed future, so it is
/// released both when metadata arrives and when the wait is abandoned.
pub struct DurationProber<'a, M> {
    backend: &'a M,
    timeout: Duration,
    cache: HashMap<SourceFile, MediaInfo>,
}

impl<'a, M: MediaBackend> DurationProber<'a, M> {
    pub fn new(backend: &'a M, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            cache: HashMap::new(),
        }
    }

    /// Total playable duration in seconds
    pub async fn probe(&mut self, source: &SourceFile) -> Result<f64, ProbeError> {
        self.probe_info(source).await.map(|info| info.duration)
    }

    /// Full metadata; only successful probes are cached
    pub async fn probe_info(&mut self, source: &SourceFile) -> Result<MediaInfo, ProbeError> {
        if let Some(info) = self.cache.get(source) {
            return Ok(*info);
        }

        let info = match tokio::time::timeout(self.timeout, self.backend.probe(source)).await {
            Err(_) => {
                return Err(ProbeError::Timeout {
                    name: source.name().to_string(),
                    seconds: self.timeout.as_secs_f64(),
                })
            }
            Ok(Err(e)) => {
                let reason = match e {
                    MediaError::OpenFailed { reason, .. } | MediaError::DecodeFailed { reason, .. } => reason,
                    other => other.to_string(),
                };
                return Err(ProbeError::Unreadable {
                    name: source.name().to_string(),
                    reason,
                });
            }
            Ok(Ok(info)) => info,
        };

        if !info.duration.is_finite() || info.duration <= 0.0 {
            return Err(ProbeError::Unreadable {
                name: source.name().to_string(),
                reason: format!("unusable duration {}", info.duration),
            });
        }

        debug!("Probed {}: {:.2}s", source.name(), info.duration);
        self.cache.insert(source.clone(), info);
        Ok(info)
    }
}
