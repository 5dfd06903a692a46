//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Redis configuration.
    pub redis: RedisConfig,
    /// Worker configuration.
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Key prefix for all Redis keys.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

/// Worker process configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent pipeline slots per worker process. Each slot
    /// reserves exactly one task at a time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Restart the worker monitor after this many processed tasks
    /// (leak mitigation).
    #[serde(default = "default_max_tasks_per_worker")]
    pub max_tasks_per_worker: u64,
    /// Soft per-task time limit in seconds. Logs a warning and allows
    /// cleanup; the task keeps running.
    #[serde(default = "default_soft_time_limit")]
    pub soft_time_limit_secs: u64,
    /// Hard per-task time limit in seconds. Aborts the attempt so the task
    /// is redelivered.
    #[serde(default = "default_hard_time_limit")]
    pub hard_time_limit_secs: u64,
    /// Ceiling on content-generation tasks per minute, independent of
    /// queue depth.
    #[serde(default = "default_generation_rate")]
    pub generation_tasks_per_minute: u32,
    /// Retry attempts for a failed provider call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Queue deliveries of one task before it is dead-lettered. Distinct
    /// from `max_retries`, which budgets provider calls within one delivery.
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,
    /// Consecutive failures before a provider breaker trips open.
    #[serde(default = "default_failure_threshold")]
    pub breaker_failure_threshold: u32,
    /// Seconds an open breaker waits before probing for recovery.
    #[serde(default = "default_recovery_timeout")]
    pub breaker_recovery_timeout_secs: u64,
    /// Whether a failed image step fails the whole job.
    #[serde(default)]
    pub image_step_critical: bool,
    /// Whether a failed audio step fails the whole job.
    #[serde(default)]
    pub audio_step_critical: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_tasks_per_worker: default_max_tasks_per_worker(),
            soft_time_limit_secs: default_soft_time_limit(),
            hard_time_limit_secs: default_hard_time_limit(),
            generation_tasks_per_minute: default_generation_rate(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_delivery_attempts: default_max_delivery_attempts(),
            breaker_failure_threshold: default_failure_threshold(),
            breaker_recovery_timeout_secs: default_recovery_timeout(),
            image_step_critical: false,
            audio_step_critical: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

fn default_redis_prefix() -> String {
    "taleforge".to_string()
}

const fn default_concurrency() -> usize {
    4
}

const fn default_max_tasks_per_worker() -> u64 {
    100
}

const fn default_soft_time_limit() -> u64 {
    540
}

const fn default_hard_time_limit() -> u64 {
    600
}

const fn default_generation_rate() -> u32 {
    10
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_retry_base_delay_ms() -> u64 {
    1000
}

const fn default_max_delivery_attempts() -> u32 {
    3
}

const fn default_failure_threshold() -> u32 {
    3
}

const fn default_recovery_timeout() -> u64 {
    120
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `TALEFORGE_ENV`)
    /// 3. Environment variables with `TALEFORGE_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("TALEFORGE_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("TALEFORGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("TALEFORGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
