//! Queue topology and routing.
//!
//! Tasks of a given type always land on the same named queue, decoupling
//! producers from worker deployment. The queue message itself is
//! disposable; the Job row is the source of truth.

use taleforge_core::JobType;

/// Queue names.
pub mod queues {
    /// Catch-all queue for low-volume task types.
    pub const DEFAULT: &str = "default";
    /// Dedicated queue for the high-volume content-generation pipeline.
    pub const CONTENT_GENERATION: &str = "content_generation";
    /// Holding queue for poison tasks. Never consumed by normal workers.
    pub const DEAD_LETTER: &str = "dead_letter";
}

/// Static routing: task type to queue name. The task type string doubles
/// as the routing key.
#[must_use]
pub const fn route_task(job_type: JobType) -> &'static str {
    match job_type {
        JobType::FullContentGeneration => queues::CONTENT_GENERATION,
    }
}

/// Redis key for an apalis queue namespace, scoped by the configured
/// prefix.
#[must_use]
pub fn queue_namespace(prefix: &str, queue: &str) -> String {
    format!("{prefix}:queue:{queue}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_tasks_route_to_dedicated_queue() {
        assert_eq!(
            route_task(JobType::FullContentGeneration),
            queues::CONTENT_GENERATION
        );
    }

    #[test]
    fn test_namespace_is_prefix_scoped() {
        assert_eq!(
            queue_namespace("taleforge", queues::CONTENT_GENERATION),
            "taleforge:queue:content_generation"
        );
    }
}
