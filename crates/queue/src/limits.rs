//! Per-task execution time limits.
//!
//! Every task runs under a soft and a hard limit. Crossing the soft limit
//! only logs a warning so slow-but-progressing tasks surface in
//! observability before they are killed. Crossing the hard limit abandons
//! the task; the caller decides whether the job is failed or retried.

use std::time::Duration;

use tracing::warn;

/// Soft and hard execution limits for one task.
#[derive(Debug, Clone, Copy)]
pub struct TaskLimits {
    /// Crossing this limit logs a warning but lets the task continue.
    pub soft: Duration,
    /// Crossing this limit abandons the task.
    pub hard: Duration,
}

impl Default for TaskLimits {
    fn default() -> Self {
        Self {
            soft: Duration::from_secs(540),
            hard: Duration::from_secs(600),
        }
    }
}

impl TaskLimits {
    /// Create limits from configured second values. The hard limit is
    /// never allowed below the soft limit.
    #[must_use]
    pub fn from_secs(soft_secs: u64, hard_secs: u64) -> Self {
        let soft = Duration::from_secs(soft_secs);
        let hard = Duration::from_secs(hard_secs.max(soft_secs));
        Self { soft, hard }
    }
}

/// Outcome of running a task under [`TaskLimits`].
#[derive(Debug)]
pub enum TimeLimitOutcome<T> {
    /// The task finished within the hard limit.
    Completed(T),
    /// The task was abandoned at the hard limit.
    TimedOut,
}

/// Run `task` under the given limits.
pub async fn run_with_limits<F, T>(label: &str, limits: TaskLimits, task: F) -> TimeLimitOutcome<T>
where
    F: Future<Output = T>,
{
    let mut task = std::pin::pin!(task);

    match tokio::time::timeout(limits.soft, task.as_mut()).await {
        Ok(value) => TimeLimitOutcome::Completed(value),
        Err(_elapsed) => {
            warn!(
                label,
                soft_secs = limits.soft.as_secs(),
                "task exceeded soft time limit, still running"
            );

            let remaining = limits.hard.saturating_sub(limits.soft);
            match tokio::time::timeout(remaining, task.as_mut()).await {
                Ok(value) => TimeLimitOutcome::Completed(value),
                Err(_elapsed) => {
                    warn!(
                        label,
                        hard_secs = limits.hard.as_secs(),
                        "task exceeded hard time limit, abandoning"
                    );
                    TimeLimitOutcome::TimedOut
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fast_task_completes() {
        let limits = TaskLimits::from_secs(5, 10);
        let outcome = run_with_limits("test", limits, async { 7 }).await;
        assert!(matches!(outcome, TimeLimitOutcome::Completed(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_task_completes_between_soft_and_hard() {
        let limits = TaskLimits::from_secs(5, 10);
        let outcome = run_with_limits("test", limits, async {
            tokio::time::sleep(Duration::from_secs(7)).await;
            "done"
        })
        .await;
        assert!(matches!(outcome, TimeLimitOutcome::Completed("done")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_abandoned_at_hard_limit() {
        let limits = TaskLimits::from_secs(5, 10);
        let outcome = run_with_limits("test", limits, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            "never"
        })
        .await;
        assert!(matches!(outcome, TimeLimitOutcome::TimedOut));
    }

    #[test]
    fn test_hard_limit_never_below_soft() {
        let limits = TaskLimits::from_secs(30, 10);
        assert_eq!(limits.hard, Duration::from_secs(30));
    }
}
