//! Progress push contract.
//!
//! Not part of the correctness contract: if a push is lost or nobody is
//! listening, clients fall back to polling the job store. Sinks are
//! therefore infallible; failures are logged and swallowed inside the
//! implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::job::JobStatus;

/// One status push for subscribers of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Job the update belongs to (also selects the channel).
    pub job_id: String,
    /// Lifecycle status at the time of the write.
    pub status: JobStatus,
    /// Progress percent at the time of the write.
    pub progress_percent: u8,
    /// Human-readable step label, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressUpdate {
    /// Build an update for a job.
    #[must_use]
    pub fn new(job_id: impl Into<String>, status: JobStatus, progress_percent: u8) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            progress_percent,
            message: None,
        }
    }

    /// Attach a step label.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Best-effort, fire-and-forget push of job-state transitions to any
/// interested live subscriber.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Push one update. Must not fail and must not block the pipeline
    /// beyond the publish attempt itself.
    async fn publish(&self, update: ProgressUpdate);
}

/// Sink that drops every update; used when no realtime channel is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgressSink;

#[async_trait]
impl ProgressSink for NullProgressSink {
    async fn publish(&self, _update: ProgressUpdate) {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_update_serialization() {
        let update = ProgressUpdate::new("job-1", JobStatus::Running, 30)
            .with_message("Generating illustration");
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"status\":\"RUNNING\""));
        assert!(json.contains("\"progress_percent\":30"));

        let bare = ProgressUpdate::new("job-1", JobStatus::Queued, 0);
        let json = serde_json::to_string(&bare).unwrap();
        assert!(!json.contains("message"));
    }
}
