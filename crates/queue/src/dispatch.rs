//! Redis-backed task dispatch.
//!
//! Implements the core crate's [`TaskDispatch`] seam by pushing task
//! messages onto the apalis Redis queue. The returned task id is stored on
//! the Job row as `queue_task_ref` for cross-referencing queue and store.

use async_trait::async_trait;
use taleforge_common::{AppError, AppResult};
use taleforge_core::{Job, service::TaskDispatch};
use tracing::debug;

use crate::jobs::GenerateContentJob;
use crate::topology::route_task;

/// Dispatcher that enqueues content-generation tasks on Redis.
#[derive(Clone)]
pub struct RedisTaskDispatcher {
    storage: apalis_redis::RedisStorage<GenerateContentJob>,
}

impl RedisTaskDispatcher {
    /// Wrap an apalis Redis storage backend.
    #[must_use]
    pub const fn new(storage: apalis_redis::RedisStorage<GenerateContentJob>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl TaskDispatch for RedisTaskDispatcher {
    async fn dispatch(&self, job: &Job) -> AppResult<String> {
        use apalis::prelude::*;

        let task = GenerateContentJob {
            job_id: job.id.clone(),
            task_type: job.job_type,
            enqueued_at: chrono::Utc::now(),
        };

        let parts = self
            .storage
            .clone()
            .push(task)
            .await
            .map_err(|e| AppError::Queue(format!("failed to enqueue task: {e}")))?;

        let task_ref = parts.task_id.to_string();
        debug!(
            job_id = %job.id,
            task_id = %task_ref,
            queue = route_task(job.job_type),
            "task enqueued"
        );

        Ok(task_ref)
    }
}
