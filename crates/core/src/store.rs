//! Job store contract.

use async_trait::async_trait;
use taleforge_common::AppResult;

use crate::job::{Job, JobType, StatusUpdate};

/// Durable record of job state, backing both the dispatcher and API queries.
///
/// The trait abstracts the storage backend (`PostgreSQL` in production, an
/// in-memory map in tests) so the worker pipeline and the job service can be
/// exercised without external services. Implementations must route every
/// status write through [`crate::job::plan_transition`] so redelivered and
/// duplicated queue messages stay harmless.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Allocate an id and persist a new job with status QUEUED and
    /// `created_at = now`.
    async fn create_job(
        &self,
        owner_id: &str,
        job_type: JobType,
        input: serde_json::Value,
    ) -> AppResult<Job>;

    /// Read-only snapshot of a job. Fails with `JobNotFound` if unknown.
    async fn get_job(&self, id: &str) -> AppResult<Job>;

    /// Jobs with status QUEUED or RUNNING, owner-scoped.
    async fn list_active_jobs(&self, owner_id: &str) -> AppResult<Vec<Job>>;

    /// Idempotent status write. Fails with `JobNotFound` if unknown;
    /// ignored transitions return the row unchanged.
    async fn update_status(&self, id: &str, update: StatusUpdate) -> AppResult<Job>;
}
