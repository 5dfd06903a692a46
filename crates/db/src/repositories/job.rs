//! Job repository.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use taleforge_common::{AppError, AppResult, IdGenerator};
use taleforge_core::job::{Job as DomainJob, JobType, StatusUpdate, TransitionPlan, plan_transition};
use taleforge_core::store::JobStore;
use tracing::warn;

use crate::entities::{Job, job};

/// Job repository for database operations.
///
/// All status writes are planned by `plan_transition` and applied only when
/// the transition is accepted, so redelivered queue messages cannot corrupt
/// the row. The apply is a conditional single-row update keyed on the status
/// the plan saw, which serializes the worker's writes against cancels coming
/// from the API process without multi-row transactions.
#[derive(Clone)]
pub struct JobRepository {
    db: Arc<DatabaseConnection>,
    id_gen: IdGenerator,
}

impl JobRepository {
    /// Create a new job repository.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            id_gen: IdGenerator::new(),
        }
    }

    /// Find a job row by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<job::Model>> {
        Job::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a job row by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<job::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::JobNotFound(id.to_string()))
    }

    /// Jobs still QUEUED that were created before `cutoff`. These likely
    /// lost their task message and are candidates for re-enqueueing.
    pub async fn find_stale_queued(
        &self,
        cutoff: chrono::DateTime<Utc>,
    ) -> AppResult<Vec<DomainJob>> {
        let rows = Job::find()
            .filter(job::Column::Status.eq(job::JobStatus::Queued))
            .filter(job::Column::CreatedAt.lt(cutoff))
            .order_by_asc(job::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl JobStore for JobRepository {
    async fn create_job(
        &self,
        owner_id: &str,
        job_type: JobType,
        input: serde_json::Value,
    ) -> AppResult<DomainJob> {
        let model = job::ActiveModel {
            id: Set(self.id_gen.generate()),
            owner_id: Set(owner_id.to_string()),
            job_type: Set(job_type.into()),
            status: Set(job::JobStatus::Queued),
            input: Set(input),
            progress_percent: Set(0),
            result: Set(None),
            error_message: Set(None),
            queue_task_ref: Set(None),
            created_at: Set(Utc::now().into()),
            started_at: Set(None),
            completed_at: Set(None),
        };

        let inserted = model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(inserted.into())
    }

    async fn get_job(&self, id: &str) -> AppResult<DomainJob> {
        Ok(self.get_by_id(id).await?.into())
    }

    async fn list_active_jobs(&self, owner_id: &str) -> AppResult<Vec<DomainJob>> {
        let rows = Job::find()
            .filter(job::Column::OwnerId.eq(owner_id))
            .filter(
                job::Column::Status
                    .is_in([job::JobStatus::Queued, job::JobStatus::Running]),
            )
            .order_by_asc(job::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_status(&self, id: &str, update: StatusUpdate) -> AppResult<DomainJob> {
        // Plan against a snapshot, then write only if the row still carries
        // the status the plan was computed from. A write from another
        // process (a cancel landing between our read and our write) leaves
        // the conditional update matching zero rows; re-read and plan
        // again, so a terminal row is never overwritten.
        loop {
            let current = self.get_by_id(id).await?;
            let snapshot: DomainJob = current.clone().into();

            let patch = match plan_transition(&snapshot, &update, Utc::now()) {
                TransitionPlan::Apply(patch) => patch,
                TransitionPlan::Ignore { reason } => {
                    warn!(job_id = %id, status = %snapshot.status, reason, "Ignored status write");
                    return Ok(snapshot);
                }
            };

            if patch.is_empty() {
                return Ok(snapshot);
            }

            let mut active = <job::ActiveModel as std::default::Default>::default();
            if let Some(status) = patch.status {
                active.status = Set(status.into());
            }
            if let Some(progress) = patch.progress_percent {
                active.progress_percent = Set(i32::from(progress));
            }
            if let Some(result) = patch.result {
                active.result = Set(Some(result));
            }
            if let Some(error) = patch.error_message {
                active.error_message = Set(Some(error));
            }
            if let Some(task_ref) = patch.queue_task_ref {
                active.queue_task_ref = Set(Some(task_ref));
            }
            if let Some(started) = patch.started_at {
                active.started_at = Set(Some(started.into()));
            }
            if let Some(completed) = patch.completed_at {
                active.completed_at = Set(Some(completed.into()));
            }

            let applied = Job::update_many()
                .set(active)
                .filter(job::Column::Id.eq(id))
                .filter(job::Column::Status.eq(current.status))
                .exec(self.db.as_ref())
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

            if applied.rows_affected == 0 {
                warn!(job_id = %id, "Row changed under a status write, replanning");
                continue;
            }

            return self.get_job(id).await;
        }
    }
}
