//! Content-generation task message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taleforge_core::JobType;

/// Task message instructing a worker to execute a job's pipeline.
///
/// Carries the job id plus minimal context only; all real state lives in
/// the Job row, so a lost, duplicated or redelivered message is harmless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateContentJob {
    /// The job to execute.
    pub job_id: String,

    /// Task kind, also the routing key.
    pub task_type: JobType,

    /// When the task was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl GenerateContentJob {
    /// Create a new task message for a job.
    #[must_use]
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            task_type: JobType::FullContentGeneration,
            enqueued_at: Utc::now(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_contract() {
        let task = GenerateContentJob::new("01jabc");
        let json = serde_json::to_string(&task).unwrap();

        assert!(json.contains("\"job_id\":\"01jabc\""));
        assert!(json.contains("\"task_type\":\"full_content_generation\""));
        assert!(json.contains("enqueued_at"));

        let parsed: GenerateContentJob = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.job_id, "01jabc");
        assert_eq!(parsed.task_type, JobType::FullContentGeneration);
    }
}
