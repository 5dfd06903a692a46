//! Job service: the operations the API layer consumes.
//!
//! Creation never blocks on pipeline execution: the service persists the
//! row, hands a task to the dispatcher and returns. Everything after that
//! is the worker's business.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use taleforge_common::{AppError, AppResult};
use tracing::{info, warn};
use validator::Validate;

use crate::job::{Job, JobStatus, JobType, StatusUpdate};
use crate::providers::GenerationInput;
use crate::store::JobStore;

/// Hands a created job to the task queue. Returns an opaque reference to
/// the queue message for cancellation/inspection.
#[async_trait]
pub trait TaskDispatch: Send + Sync {
    /// Enqueue a task referencing the job id.
    async fn dispatch(&self, job: &Job) -> AppResult<String>;
}

/// Create-job request payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
    /// Requesting principal.
    pub owner_id: String,
    /// Task kind.
    pub job_type: JobType,
    /// Generation spec (validated against [`GenerationInput`]).
    pub input: serde_json::Value,
}

/// Job orchestration service.
#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn JobStore>,
    dispatcher: Arc<dyn TaskDispatch>,
}

impl JobService {
    /// Create a new job service.
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>, dispatcher: Arc<dyn TaskDispatch>) -> Self {
        Self { store, dispatcher }
    }

    /// Validate the input, persist a QUEUED job and enqueue its task.
    ///
    /// Returns as soon as the task is enqueued; the caller gets the job id
    /// immediately and polls or subscribes for progress.
    pub async fn create_job(&self, request: CreateJobRequest) -> AppResult<Job> {
        if request.owner_id.is_empty() {
            return Err(AppError::Validation("owner_id must not be empty".into()));
        }

        let input: GenerationInput = serde_json::from_value(request.input.clone())
            .map_err(|e| AppError::Validation(format!("Malformed generation input: {e}")))?;
        input.validate()?;

        let job = self
            .store
            .create_job(&request.owner_id, request.job_type, request.input)
            .await?;

        let task_ref = self.dispatcher.dispatch(&job).await?;

        let job = self
            .store
            .update_status(
                &job.id,
                StatusUpdate {
                    status: Some(JobStatus::Queued),
                    ..StatusUpdate::default()
                }
                .with_queue_ref(task_ref),
            )
            .await?;

        info!(job_id = %job.id, owner_id = %job.owner_id, job_type = %job.job_type, "Job created and enqueued");
        Ok(job)
    }

    /// Read-only snapshot of a job.
    pub async fn get_job(&self, id: &str) -> AppResult<Job> {
        self.store.get_job(id).await
    }

    /// Active (QUEUED or RUNNING) jobs for an owner.
    pub async fn list_active_jobs(&self, owner_id: &str) -> AppResult<Vec<Job>> {
        self.store.list_active_jobs(owner_id).await
    }

    /// Cooperative cancellation: marks the row. The worker observes the
    /// mark between pipeline steps and aborts; an in-flight external call
    /// is not interrupted. Cancelling an already-terminal job is a no-op.
    pub async fn cancel_job(&self, id: &str) -> AppResult<Job> {
        let job = self.store.get_job(id).await?;
        if job.status.is_terminal() {
            warn!(job_id = %id, status = %job.status, "Cancel requested for terminal job");
            return Ok(job);
        }

        let job = self.store.update_status(id, StatusUpdate::cancelled()).await?;
        info!(job_id = %id, "Job cancelled");
        Ok(job)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::InMemoryJobStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeDispatcher {
        dispatched: AtomicUsize,
    }

    impl FakeDispatcher {
        fn new() -> Self {
            Self {
                dispatched: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TaskDispatch for FakeDispatcher {
        async fn dispatch(&self, job: &Job) -> AppResult<String> {
            self.dispatched.fetch_add(1, Ordering::SeqCst);
            Ok(format!("task-for-{}", job.id))
        }
    }

    fn service() -> (JobService, Arc<FakeDispatcher>) {
        let dispatcher = Arc::new(FakeDispatcher::new());
        let service = JobService::new(
            Arc::new(InMemoryJobStore::new()),
            dispatcher.clone(),
        );
        (service, dispatcher)
    }

    #[tokio::test]
    async fn test_create_job_enqueues_and_stores_ref() {
        let (service, dispatcher) = service();
        let job = service
            .create_job(CreateJobRequest {
                owner_id: "owner-1".into(),
                job_type: JobType::FullContentGeneration,
                input: serde_json::json!({"theme": "test"}),
            })
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress_percent, 0);
        assert_eq!(
            job.queue_task_ref.as_deref(),
            Some(format!("task-for-{}", job.id).as_str())
        );
        assert_eq!(dispatcher.dispatched.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_create_job_rejects_invalid_input() {
        let (service, dispatcher) = service();
        let err = service
            .create_job(CreateJobRequest {
                owner_id: "owner-1".into(),
                job_type: JobType::FullContentGeneration,
                input: serde_json::json!({"theme": ""}),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        // Nothing was enqueued for the rejected request.
        assert_eq!(dispatcher.dispatched.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_on_terminal_jobs() {
        let (service, _) = service();
        let job = service
            .create_job(CreateJobRequest {
                owner_id: "owner-1".into(),
                job_type: JobType::FullContentGeneration,
                input: serde_json::json!({"theme": "test"}),
            })
            .await
            .unwrap();

        let cancelled = service.cancel_job(&job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        let completed_at = cancelled.completed_at;

        let again = service.cancel_job(&job.id).await.unwrap();
        assert_eq!(again.status, JobStatus::Cancelled);
        assert_eq!(again.completed_at, completed_at);
    }

    #[tokio::test]
    async fn test_get_unknown_job() {
        let (service, _) = service();
        let err = service.get_job("missing").await.unwrap_err();
        assert!(matches!(err, AppError::JobNotFound(_)));
    }
}
