//! Job entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use taleforge_core::job::{JobStatus as DomainStatus, JobType as DomainType};

/// Status of a job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum JobStatus {
    /// Job is queued for processing.
    #[sea_orm(string_value = "queued")]
    Queued,
    /// Job is currently being processed.
    #[sea_orm(string_value = "running")]
    Running,
    /// Job completed successfully.
    #[sea_orm(string_value = "succeeded")]
    Succeeded,
    /// Job failed.
    #[sea_orm(string_value = "failed")]
    Failed,
    /// Job was cancelled cooperatively.
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl From<DomainStatus> for JobStatus {
    fn from(status: DomainStatus) -> Self {
        match status {
            DomainStatus::Queued => Self::Queued,
            DomainStatus::Running => Self::Running,
            DomainStatus::Succeeded => Self::Succeeded,
            DomainStatus::Failed => Self::Failed,
            DomainStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl From<JobStatus> for DomainStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Queued => Self::Queued,
            JobStatus::Running => Self::Running,
            JobStatus::Succeeded => Self::Succeeded,
            JobStatus::Failed => Self::Failed,
            JobStatus::Cancelled => Self::Cancelled,
        }
    }
}

/// Task kind of a job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum JobType {
    /// Full pipeline: text, image, speech.
    #[sea_orm(string_value = "full_content_generation")]
    FullContentGeneration,
}

impl From<DomainType> for JobType {
    fn from(kind: DomainType) -> Self {
        match kind {
            DomainType::FullContentGeneration => Self::FullContentGeneration,
        }
    }
}

impl From<JobType> for DomainType {
    fn from(kind: JobType) -> Self {
        match kind {
            JobType::FullContentGeneration => Self::FullContentGeneration,
        }
    }
}

/// A job row. The single source of truth for job status; never deleted by
/// the orchestration layer.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "job")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Requesting principal.
    #[sea_orm(indexed)]
    pub owner_id: String,

    /// Task kind.
    pub job_type: JobType,

    /// Current status.
    pub status: JobStatus,

    /// Generation spec, immutable after creation.
    #[sea_orm(column_type = "JsonBinary")]
    pub input: Json,

    /// Progress (0-100).
    #[sea_orm(default_value = 0)]
    pub progress_percent: i32,

    /// Aggregated result; set/accumulated by the worker.
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub result: Option<Json>,

    /// Error message if failed.
    #[sea_orm(nullable)]
    pub error_message: Option<String>,

    /// Opaque reference to the underlying queue task.
    #[sea_orm(nullable)]
    pub queue_task_ref: Option<String>,

    /// When this job was created.
    pub created_at: DateTimeWithTimeZone,

    /// When processing first started.
    #[sea_orm(nullable)]
    pub started_at: Option<DateTimeWithTimeZone>,

    /// When this job reached a terminal status.
    #[sea_orm(nullable)]
    pub completed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for taleforge_core::Job {
    fn from(m: Model) -> Self {
        Self {
            id: m.id,
            owner_id: m.owner_id,
            job_type: m.job_type.into(),
            input: m.input,
            status: m.status.into(),
            progress_percent: m.progress_percent.clamp(0, 100) as u8,
            result: m.result,
            error_message: m.error_message,
            queue_task_ref: m.queue_task_ref,
            created_at: m.created_at.into(),
            started_at: m.started_at.map(Into::into),
            completed_at: m.completed_at.map(Into::into),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            DomainStatus::Queued,
            DomainStatus::Running,
            DomainStatus::Succeeded,
            DomainStatus::Failed,
            DomainStatus::Cancelled,
        ] {
            let entity: JobStatus = status.into();
            let back: DomainStatus = entity.into();
            assert_eq!(back, status);
        }
    }
}
