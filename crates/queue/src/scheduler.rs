//! Periodic maintenance tasks.
//!
//! Two background loops: one reports dead letter queue depth so a growing
//! backlog of poison tasks is visible, and one audits for jobs stuck in
//! QUEUED longer than the requeue threshold (a sign their task message was
//! lost) and re-enqueues them.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;

/// Maintenance loop configuration.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Interval for dead letter depth reporting.
    pub dlq_report_interval: Duration,
    /// Interval for the stale-queued audit.
    pub stale_audit_interval: Duration,
    /// How long a job may sit in QUEUED before it is considered stale.
    pub stale_after: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            dlq_report_interval: Duration::from_secs(300),
            stale_audit_interval: Duration::from_secs(300),
            stale_after: Duration::from_secs(900),
        }
    }
}

/// Executor for maintenance operations.
#[async_trait::async_trait]
pub trait MaintenanceExecutor: Send + Sync {
    /// Current dead letter queue depth.
    async fn dead_letter_depth(&self) -> Result<u64, Box<dyn std::error::Error + Send + Sync>>;

    /// Find jobs stuck in QUEUED longer than `stale_after` and re-enqueue
    /// their task messages. Returns the number requeued.
    async fn requeue_stale_jobs(
        &self,
        stale_after: Duration,
    ) -> Result<u64, Box<dyn std::error::Error + Send + Sync>>;
}

/// Spawn the maintenance loops.
pub fn run_maintenance<E: MaintenanceExecutor + 'static>(config: MaintenanceConfig, executor: Arc<E>) {
    let executor_dlq = Arc::clone(&executor);
    let executor_stale = executor;

    let dlq_interval = config.dlq_report_interval;
    let stale_interval = config.stale_audit_interval;
    let stale_after = config.stale_after;

    tokio::spawn(async move {
        let mut interval = interval(dlq_interval);
        loop {
            interval.tick().await;
            match executor_dlq.dead_letter_depth().await {
                Ok(depth) => {
                    if depth > 0 {
                        tracing::warn!(depth, "dead letter queue has parked tasks");
                    } else {
                        tracing::debug!("dead letter queue empty");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to read dead letter queue depth");
                }
            }
        }
    });

    tokio::spawn(async move {
        let mut interval = interval(stale_interval);
        loop {
            interval.tick().await;
            match executor_stale.requeue_stale_jobs(stale_after).await {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!(count, "requeued stale jobs");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "stale job audit failed");
                }
            }
        }
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct CountingExecutor {
        depth_calls: AtomicU32,
        requeue_calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl MaintenanceExecutor for CountingExecutor {
        async fn dead_letter_depth(
            &self,
        ) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
            self.depth_calls.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }

        async fn requeue_stale_jobs(
            &self,
            _stale_after: Duration,
        ) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
            self.requeue_calls.fetch_add(1, Ordering::SeqCst);
            Ok(2)
        }
    }

    #[test]
    fn test_config_default() {
        let config = MaintenanceConfig::default();
        assert_eq!(config.dlq_report_interval, Duration::from_secs(300));
        assert_eq!(config.stale_after, Duration::from_secs(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loops_tick_on_schedule() {
        let executor = Arc::new(CountingExecutor {
            depth_calls: AtomicU32::new(0),
            requeue_calls: AtomicU32::new(0),
        });

        run_maintenance(
            MaintenanceConfig {
                dlq_report_interval: Duration::from_secs(10),
                stale_audit_interval: Duration::from_secs(10),
                stale_after: Duration::from_secs(60),
            },
            Arc::clone(&executor),
        );

        // First tick fires immediately, then every interval.
        tokio::time::sleep(Duration::from_secs(25)).await;

        assert!(executor.depth_calls.load(Ordering::SeqCst) >= 2);
        assert!(executor.requeue_calls.load(Ordering::SeqCst) >= 2);
    }
}
