//! In-memory job store for tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use taleforge_common::{AppError, AppResult, IdGenerator};
use tracing::warn;

use crate::job::{Job, JobStatus, JobType, StatusUpdate, TransitionPlan, plan_transition};
use crate::store::JobStore;

/// Map-backed [`JobStore`] with the same transition semantics as the
/// persistent repository.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
    id_gen: IdGenerator,
}

impl InMemoryJobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs held, regardless of status.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Whether the store holds no jobs.
    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_job(
        &self,
        owner_id: &str,
        job_type: JobType,
        input: serde_json::Value,
    ) -> AppResult<Job> {
        let job = Job {
            id: self.id_gen.generate(),
            owner_id: owner_id.to_string(),
            job_type,
            input,
            status: JobStatus::Queued,
            progress_percent: 0,
            result: None,
            error_message: None,
            queue_task_ref: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: &str) -> AppResult<Job> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::JobNotFound(id.to_string()))
    }

    async fn list_active_jobs(&self, owner_id: &str) -> AppResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut active: Vec<Job> = jobs
            .values()
            .filter(|j| j.owner_id == owner_id && j.status.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(active)
    }

    async fn update_status(&self, id: &str, update: StatusUpdate) -> AppResult<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| AppError::JobNotFound(id.to_string()))?;

        match plan_transition(job, &update, Utc::now()) {
            TransitionPlan::Apply(patch) => patch.apply_to(job),
            TransitionPlan::Ignore { reason } => {
                warn!(job_id = %id, status = %job.status, reason, "Ignored status write");
            }
        }

        Ok(job.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryJobStore::new();
        let job = store
            .create_job(
                "owner-1",
                JobType::FullContentGeneration,
                serde_json::json!({"theme": "test"}),
            )
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress_percent, 0);
        assert!(job.started_at.is_none());

        let fetched = store.get_job(&job.id).await.unwrap();
        assert_eq!(fetched, job);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let store = InMemoryJobStore::new();
        let err = store.get_job("missing").await.unwrap_err();
        assert!(matches!(err, AppError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_active_scoped_to_owner() {
        let store = InMemoryJobStore::new();
        let input = serde_json::json!({"theme": "t"});

        let a = store
            .create_job("owner-a", JobType::FullContentGeneration, input.clone())
            .await
            .unwrap();
        store
            .create_job("owner-b", JobType::FullContentGeneration, input.clone())
            .await
            .unwrap();
        let done = store
            .create_job("owner-a", JobType::FullContentGeneration, input)
            .await
            .unwrap();

        store
            .update_status(&done.id, StatusUpdate::running())
            .await
            .unwrap();
        store
            .update_status(&done.id, StatusUpdate::succeeded(serde_json::json!({})))
            .await
            .unwrap();

        let active = store.list_active_jobs("owner-a").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a.id);
    }

    #[tokio::test]
    async fn test_duplicate_terminal_update_is_noop() {
        let store = InMemoryJobStore::new();
        let job = store
            .create_job(
                "owner-1",
                JobType::FullContentGeneration,
                serde_json::json!({"theme": "test"}),
            )
            .await
            .unwrap();

        store.update_status(&job.id, StatusUpdate::running()).await.unwrap();
        let result = serde_json::json!({"story_text": "once upon a time"});
        let first = store
            .update_status(&job.id, StatusUpdate::succeeded(result.clone()))
            .await
            .unwrap();
        let second = store
            .update_status(&job.id, StatusUpdate::succeeded(result))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second.progress_percent, 100);
    }
}
