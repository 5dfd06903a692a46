//! Job model and lifecycle transition rules.
//!
//! The Job row is the single source of truth for status. The queue message
//! that triggered a job is disposable: it may be lost, redelivered or
//! duplicated without corrupting Job state, because every status write goes
//! through [`plan_transition`], which makes terminal states sticky and
//! timestamp stamping idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress is capped below 100 while a job is still running; only the
/// SUCCEEDED transition sets 100.
pub const MAX_RUNNING_PROGRESS: u8 = 99;

/// Enumerated task kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Full pipeline: text, then image, then speech.
    FullContentGeneration,
}

impl JobType {
    /// Stable string form, also used as the queue routing key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FullContentGeneration => "full_content_generation",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether this status is terminal. No transition leaves a terminal
    /// state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Whether the job is still awaiting or doing work.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Allowed lifecycle edges. Same-state edges are allowed for the
    /// non-terminal states so that progress and queue-ref updates can reuse
    /// the status write path.
    #[must_use]
    pub const fn can_transition(self, to: Self) -> bool {
        match self {
            Self::Queued => matches!(to, Self::Queued | Self::Running | Self::Cancelled),
            Self::Running => matches!(
                to,
                Self::Running | Self::Succeeded | Self::Failed | Self::Cancelled
            ),
            Self::Succeeded | Self::Failed | Self::Cancelled => false,
        }
    }

    /// Stable string form for persistence and the progress channel.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One durable unit of requested work with an observable lifecycle
/// independent of the queue message that triggered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Opaque unique identifier, generated at creation, immutable.
    pub id: String,
    /// Identifier of the requesting principal.
    pub owner_id: String,
    /// Task kind.
    pub job_type: JobType,
    /// Generation spec, immutable after creation.
    pub input: serde_json::Value,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// 0-100, monotonically non-decreasing while RUNNING.
    pub progress_percent: u8,
    /// Aggregated result; partial artifacts accumulate here between steps.
    pub result: Option<serde_json::Value>,
    /// Set only on transition to FAILED.
    pub error_message: Option<String>,
    /// Opaque reference to the underlying queue task.
    pub queue_task_ref: Option<String>,
    /// Set exactly once, at creation.
    pub created_at: DateTime<Utc>,
    /// Set exactly once, on the first RUNNING transition.
    pub started_at: Option<DateTime<Utc>>,
    /// Set exactly once, on the terminal transition.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Requested change to a job's status row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    /// Target status.
    pub status: Option<JobStatus>,
    /// New progress percent, if any.
    pub progress: Option<u8>,
    /// Result payload to merge in, if any.
    pub result: Option<serde_json::Value>,
    /// Error message, if any.
    pub error_message: Option<String>,
    /// Queue task reference, if any.
    pub queue_task_ref: Option<String>,
}

impl StatusUpdate {
    /// Transition to RUNNING.
    #[must_use]
    pub const fn running() -> Self {
        Self {
            status: Some(JobStatus::Running),
            progress: None,
            result: None,
            error_message: None,
            queue_task_ref: None,
        }
    }

    /// Transition to SUCCEEDED with the aggregated result.
    #[must_use]
    pub const fn succeeded(result: serde_json::Value) -> Self {
        Self {
            status: Some(JobStatus::Succeeded),
            progress: None,
            result: Some(result),
            error_message: None,
            queue_task_ref: None,
        }
    }

    /// Transition to FAILED with a human-readable error message.
    #[must_use]
    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            progress: None,
            result: None,
            error_message: Some(error_message.into()),
            queue_task_ref: None,
        }
    }

    /// Transition to CANCELLED (cooperative; the worker observes this
    /// between pipeline steps).
    #[must_use]
    pub const fn cancelled() -> Self {
        Self {
            status: Some(JobStatus::Cancelled),
            progress: None,
            result: None,
            error_message: None,
            queue_task_ref: None,
        }
    }

    /// Progress-only update (stays in the current status).
    #[must_use]
    pub const fn progress(percent: u8) -> Self {
        Self {
            status: None,
            progress: Some(percent),
            result: None,
            error_message: None,
            queue_task_ref: None,
        }
    }

    /// Set the progress percent.
    #[must_use]
    pub const fn with_progress(mut self, percent: u8) -> Self {
        self.progress = Some(percent);
        self
    }

    /// Set a (partial) result payload.
    #[must_use]
    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Set the queue task reference.
    #[must_use]
    pub fn with_queue_ref(mut self, task_ref: impl Into<String>) -> Self {
        self.queue_task_ref = Some(task_ref.into());
        self
    }
}

/// Field changes computed for an accepted transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress_percent: Option<u8>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub queue_task_ref: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobPatch {
    /// Whether the patch changes anything at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.progress_percent.is_none()
            && self.result.is_none()
            && self.error_message.is_none()
            && self.queue_task_ref.is_none()
            && self.started_at.is_none()
            && self.completed_at.is_none()
    }

    /// Apply the patch to an owned job snapshot.
    pub fn apply_to(self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(progress) = self.progress_percent {
            job.progress_percent = progress;
        }
        if let Some(result) = self.result {
            job.result = Some(result);
        }
        if let Some(error) = self.error_message {
            job.error_message = Some(error);
        }
        if let Some(task_ref) = self.queue_task_ref {
            job.queue_task_ref = Some(task_ref);
        }
        if let Some(started) = self.started_at {
            job.started_at = Some(started);
        }
        if let Some(completed) = self.completed_at {
            job.completed_at = Some(completed);
        }
    }
}

/// Outcome of planning a status write.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionPlan {
    /// The write is a no-op: terminal reapply, out-of-terminal attempt, or
    /// a disallowed edge. The row is returned unchanged.
    Ignore {
        /// Why the write was ignored, for the warn log.
        reason: &'static str,
    },
    /// The write is accepted; apply these field changes.
    Apply(JobPatch),
}

/// Plan a status write against the current row.
///
/// This is the one place the state machine lives; the persistent repository
/// and the in-memory store both delegate here so at-least-once redelivery
/// behaves identically everywhere:
///
/// - re-applying a terminal status is idempotent (no error, no change);
/// - transitions out of a terminal state are silently ignored;
/// - the first RUNNING stamps `started_at`, a terminal status stamps
///   `completed_at`, each exactly once;
/// - SUCCEEDED forces `progress_percent = 100`; while RUNNING, progress is
///   clamped to [`MAX_RUNNING_PROGRESS`] and never decreases.
#[must_use]
pub fn plan_transition(job: &Job, update: &StatusUpdate, now: DateTime<Utc>) -> TransitionPlan {
    let target = update.status.unwrap_or(job.status);

    if job.status.is_terminal() {
        let reason = if target == job.status {
            "terminal status re-applied"
        } else {
            "transition out of terminal state"
        };
        return TransitionPlan::Ignore { reason };
    }

    if !job.status.can_transition(target) {
        return TransitionPlan::Ignore {
            reason: "disallowed transition",
        };
    }

    let mut patch = JobPatch {
        status: (target != job.status).then_some(target),
        result: update.result.clone(),
        error_message: update.error_message.clone(),
        queue_task_ref: update.queue_task_ref.clone(),
        ..JobPatch::default()
    };

    if target == JobStatus::Running && job.started_at.is_none() {
        patch.started_at = Some(now);
    }

    if target.is_terminal() && job.completed_at.is_none() {
        patch.completed_at = Some(now);
    }

    if target == JobStatus::Succeeded {
        patch.progress_percent = Some(100);
    } else if let Some(requested) = update.progress {
        let clamped = requested.min(MAX_RUNNING_PROGRESS);
        if clamped > job.progress_percent {
            patch.progress_percent = Some(clamped);
        }
    }

    TransitionPlan::Apply(patch)
}
