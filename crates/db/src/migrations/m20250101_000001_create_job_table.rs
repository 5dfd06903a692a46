//! Create job table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Job::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Job::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Job::OwnerId).string_len(64).not_null())
                    .col(ColumnDef::new(Job::JobType).string_len(32).not_null())
                    .col(ColumnDef::new(Job::Status).string_len(16).not_null())
                    .col(ColumnDef::new(Job::Input).json_binary().not_null())
                    .col(
                        ColumnDef::new(Job::ProgressPercent)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Job::Result).json_binary())
                    .col(ColumnDef::new(Job::ErrorMessage).text())
                    .col(ColumnDef::new(Job::QueueTaskRef).string_len(64))
                    .col(
                        ColumnDef::new(Job::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Job::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Job::CompletedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Index: owner_id (for listing an owner's jobs)
        manager
            .create_index(
                Index::create()
                    .name("idx_job_owner_id")
                    .table(Job::Table)
                    .col(Job::OwnerId)
                    .to_owned(),
            )
            .await?;

        // Index: (owner_id, status) (for the active-jobs query)
        manager
            .create_index(
                Index::create()
                    .name("idx_job_owner_status")
                    .table(Job::Table)
                    .col(Job::OwnerId)
                    .col(Job::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Job::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Job {
    Table,
    Id,
    OwnerId,
    JobType,
    Status,
    Input,
    ProgressPercent,
    Result,
    ErrorMessage,
    QueueTaskRef,
    CreatedAt,
    StartedAt,
    CompletedAt,
}
