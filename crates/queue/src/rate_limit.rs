//! Per-task-type rate limiting.
//!
//! Fixed-window limiter keyed by task type. Workers call
//! [`TaskRateLimiter::acquire`] before touching external providers, which
//! delays the task instead of rejecting it so throughput is smoothed
//! rather than dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

/// Rate limiter configuration for one task type.
#[derive(Debug, Clone)]
pub struct TaskRateLimitConfig {
    /// Maximum task executions per window.
    pub max_tasks: u32,
    /// Window duration.
    pub window: Duration,
}

impl Default for TaskRateLimitConfig {
    fn default() -> Self {
        Self {
            max_tasks: 10,
            window: Duration::from_secs(60),
        }
    }
}

/// Window state for a single task type.
#[derive(Debug, Clone)]
struct WindowState {
    count: u32,
    window_start: Instant,
}

impl WindowState {
    fn new() -> Self {
        Self {
            count: 0,
            window_start: Instant::now(),
        }
    }
}

/// Rate limit check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Execution is allowed; the slot has been consumed.
    Allowed,
    /// Window is full.
    Limited {
        /// Time until the window resets.
        retry_after: Duration,
    },
}

/// Per-task-type rate limiter.
#[derive(Clone)]
pub struct TaskRateLimiter {
    config: TaskRateLimitConfig,
    states: Arc<RwLock<HashMap<String, WindowState>>>,
}

impl TaskRateLimiter {
    /// Create a new rate limiter with the given configuration.
    #[must_use]
    pub fn new(config: TaskRateLimitConfig) -> Self {
        Self {
            config,
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Check whether a task of the given type may run now, consuming a
    /// window slot if so.
    pub async fn check(&self, task_type: &str) -> RateLimitResult {
        let mut states = self.states.write().await;
        let now = Instant::now();

        let state = states
            .entry(task_type.to_string())
            .or_insert_with(WindowState::new);

        if now.duration_since(state.window_start) >= self.config.window {
            state.count = 0;
            state.window_start = now;
        }

        if state.count >= self.config.max_tasks {
            let retry_after = self
                .config
                .window
                .saturating_sub(now.duration_since(state.window_start));
            return RateLimitResult::Limited { retry_after };
        }

        state.count += 1;
        RateLimitResult::Allowed
    }

    /// Wait until a slot is available, then consume it.
    pub async fn acquire(&self, task_type: &str) {
        loop {
            match self.check(task_type).await {
                RateLimitResult::Allowed => return,
                RateLimitResult::Limited { retry_after } => {
                    debug!(
                        task_type,
                        wait_ms = retry_after.as_millis(),
                        "rate limit reached, delaying task"
                    );
                    tokio::time::sleep(retry_after).await;
                }
            }
        }
    }

    /// Remaining slots in the current window, for maintenance logging.
    pub async fn remaining(&self, task_type: &str) -> u32 {
        let states = self.states.read().await;
        states.get(task_type).map_or(self.config.max_tasks, |s| {
            if s.window_start.elapsed() >= self.config.window {
                self.config.max_tasks
            } else {
                self.config.max_tasks.saturating_sub(s.count)
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const GENERATION: &str = "full_content_generation";

    #[tokio::test]
    async fn test_allows_up_to_limit() {
        let limiter = TaskRateLimiter::new(TaskRateLimitConfig {
            max_tasks: 5,
            window: Duration::from_secs(60),
        });

        for _ in 0..5 {
            assert_eq!(limiter.check(GENERATION).await, RateLimitResult::Allowed);
        }
    }

    #[tokio::test]
    async fn test_limits_when_window_full() {
        let limiter = TaskRateLimiter::new(TaskRateLimitConfig {
            max_tasks: 2,
            window: Duration::from_secs(60),
        });

        limiter.check(GENERATION).await;
        limiter.check(GENERATION).await;

        match limiter.check(GENERATION).await {
            RateLimitResult::Limited { retry_after } => {
                assert!(retry_after <= Duration::from_secs(60));
            }
            RateLimitResult::Allowed => panic!("expected Limited"),
        }
    }

    #[tokio::test]
    async fn test_task_types_are_independent() {
        let limiter = TaskRateLimiter::new(TaskRateLimitConfig {
            max_tasks: 1,
            window: Duration::from_secs(60),
        });

        assert_eq!(limiter.check(GENERATION).await, RateLimitResult::Allowed);
        assert_eq!(limiter.check("other_task").await, RateLimitResult::Allowed);
        assert!(matches!(
            limiter.check(GENERATION).await,
            RateLimitResult::Limited { .. }
        ));
    }

    #[tokio::test]
    async fn test_window_reset() {
        let limiter = TaskRateLimiter::new(TaskRateLimitConfig {
            max_tasks: 1,
            window: Duration::from_millis(20),
        });

        limiter.check(GENERATION).await;
        assert!(matches!(
            limiter.check(GENERATION).await,
            RateLimitResult::Limited { .. }
        ));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(limiter.check(GENERATION).await, RateLimitResult::Allowed);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_slot() {
        let limiter = TaskRateLimiter::new(TaskRateLimitConfig {
            max_tasks: 1,
            window: Duration::from_millis(20),
        });

        limiter.acquire(GENERATION).await;
        let start = Instant::now();
        limiter.acquire(GENERATION).await;

        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_remaining() {
        let limiter = TaskRateLimiter::new(TaskRateLimitConfig {
            max_tasks: 10,
            window: Duration::from_secs(60),
        });

        limiter.check(GENERATION).await;
        limiter.check(GENERATION).await;
        limiter.check(GENERATION).await;

        assert_eq!(limiter.remaining(GENERATION).await, 7);
        assert_eq!(limiter.remaining("other_task").await, 10);
    }
}
