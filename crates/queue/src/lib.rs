//! Background job queue for taleforge.
//!
//! This crate provides asynchronous job processing using Redis:
//!
//! - **Topology**: named queues, static routing, the task wire contract
//! - **Jobs**: content-generation task messages
//! - **Workers**: the pipeline worker executed by Apalis
//! - **Resilience**: retry with exponential backoff, per-provider circuit
//!   breakers, per-task-type rate limiting
//! - **Dead letter queue**: holding list for poison tasks
//! - **Limits**: soft/hard per-task execution limits
//! - **Pub/Sub**: best-effort progress broadcasting
//! - **Scheduler**: periodic maintenance (DLQ depth, stale-queued audit)

pub mod breaker;
pub mod dispatch;
pub mod dlq;
pub mod jobs;
pub mod limits;
pub mod pubsub;
pub mod rate_limit;
pub mod retry;
pub mod scheduler;
pub mod topology;
pub mod workers;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker, ProviderBreakers};
pub use dispatch::RedisTaskDispatcher;
pub use dlq::{DeadLetterEntry, DeadLetterQueue, DeadLetterSink};
pub use jobs::GenerateContentJob;
pub use limits::{TaskLimits, TimeLimitOutcome, run_with_limits};
pub use pubsub::ProgressPublisher;
pub use rate_limit::{RateLimitResult, TaskRateLimiter, TaskRateLimitConfig};
pub use retry::RetryPolicy;
pub use scheduler::{MaintenanceConfig, MaintenanceExecutor, run_maintenance};
pub use topology::{queues, route_task};
pub use workers::{GenerateContext, StepPolicy, generate_worker, run_generation};
