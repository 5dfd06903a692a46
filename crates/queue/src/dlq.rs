//! Dead letter queue.
//!
//! Poison tasks (malformed input, orphaned messages, exhausted retries of
//! a permanent failure) are acknowledged off their source queue and parked
//! here as JSON entries in a Redis list. Nothing consumes the list
//! automatically; entries wait for operator inspection and manual replay.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fred::clients::Client;
use fred::interfaces::{ClientLike, ListInterface};
use fred::types::config::Config as RedisConfig;
use serde::{Deserialize, Serialize};
use taleforge_common::{AppError, AppResult};
use tracing::{info, warn};

use crate::jobs::GenerateContentJob;

/// A parked task with the context needed to diagnose and replay it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// The original task message.
    pub task: GenerateContentJob,
    /// Source queue the task was consumed from.
    pub source_queue: String,
    /// Why the task was dead-lettered.
    pub reason: String,
    /// Delivery attempts made before parking.
    pub attempts: u32,
    /// When the task was parked.
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    /// Create an entry for a task being parked now.
    #[must_use]
    pub fn new(
        task: GenerateContentJob,
        source_queue: impl Into<String>,
        reason: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            task,
            source_queue: source_queue.into(),
            reason: reason.into(),
            attempts,
            failed_at: Utc::now(),
        }
    }
}

/// Sink for parking poison tasks. The worker depends on this seam rather
/// than on Redis directly.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Park an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted.
    async fn park(&self, entry: DeadLetterEntry) -> AppResult<()>;
}

/// Redis-backed dead letter queue.
#[derive(Clone)]
pub struct DeadLetterQueue {
    client: Client,
    key: String,
}

impl DeadLetterQueue {
    /// Redis list key under the given prefix.
    #[must_use]
    pub fn key_for(prefix: &str) -> String {
        format!("{prefix}:queue:{}", crate::topology::queues::DEAD_LETTER)
    }

    /// Connect to Redis and bind to the prefixed dead letter list.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Redis`] if the connection cannot be established.
    pub async fn connect(redis_url: &str, prefix: &str) -> AppResult<Self> {
        let config =
            RedisConfig::from_url(redis_url).map_err(|e| AppError::Redis(e.to_string()))?;
        let client = Client::new(config, None, None, None);
        client
            .init()
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;

        Ok(Self {
            client,
            key: Self::key_for(prefix),
        })
    }

    /// Park a task.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Redis`] if the entry cannot be appended, and
    /// [`AppError::Internal`] if it cannot be serialized.
    pub async fn push(&self, entry: &DeadLetterEntry) -> AppResult<()> {
        let payload =
            serde_json::to_string(entry).map_err(|e| AppError::Internal(e.to_string()))?;
        let _: i64 = self
            .client
            .rpush(&self.key, payload)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;

        warn!(
            job_id = %entry.task.job_id,
            reason = %entry.reason,
            attempts = entry.attempts,
            "task moved to dead letter queue"
        );
        Ok(())
    }

    /// Number of parked tasks.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Redis`] on connection failure.
    pub async fn depth(&self) -> AppResult<u64> {
        let len: u64 = self
            .client
            .llen(&self.key)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;
        Ok(len)
    }

    /// Read up to `limit` parked entries, oldest first, without removing
    /// them. Entries that no longer parse are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Redis`] on connection failure.
    pub async fn peek(&self, limit: i64) -> AppResult<Vec<DeadLetterEntry>> {
        let raw: Vec<String> = self
            .client
            .lrange(&self.key, 0, limit - 1)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;

        let mut entries = Vec::with_capacity(raw.len());
        for payload in raw {
            match serde_json::from_str(&payload) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(error = %e, "skipping unparseable dead letter entry"),
            }
        }
        Ok(entries)
    }

    /// Pop the oldest parked entry for manual replay.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Redis`] on connection failure, and
    /// [`AppError::Internal`] if the popped entry cannot be parsed.
    pub async fn pop(&self) -> AppResult<Option<DeadLetterEntry>> {
        let raw: Option<String> = self
            .client
            .lpop(&self.key, None)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;

        match raw {
            Some(payload) => {
                let entry: DeadLetterEntry = serde_json::from_str(&payload)
                    .map_err(|e| AppError::Internal(e.to_string()))?;
                info!(job_id = %entry.task.job_id, "dead letter entry popped for replay");
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl DeadLetterSink for DeadLetterQueue {
    async fn park(&self, entry: DeadLetterEntry) -> AppResult<()> {
        self.push(&entry).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_prefix_scoped() {
        assert_eq!(
            DeadLetterQueue::key_for("taleforge"),
            "taleforge:queue:dead_letter"
        );
    }

    #[test]
    fn test_entry_round_trips_through_json() {
        let entry = DeadLetterEntry::new(
            GenerateContentJob::new("01jabc"),
            "content_generation",
            "unprocessable input: missing theme",
            1,
        );

        let json = serde_json::to_string(&entry).unwrap();
        let parsed: DeadLetterEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.task.job_id, "01jabc");
        assert_eq!(parsed.source_queue, "content_generation");
        assert_eq!(parsed.attempts, 1);
        assert!(parsed.reason.contains("missing theme"));
    }
}
