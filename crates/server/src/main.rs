//! Taleforge server entry point.
//!
//! Wires the job store, task queue, resilience layers and HTTP surface
//! together, then runs the API and the content-generation workers in one
//! process.

mod providers;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use apalis::prelude::*;
use taleforge_common::Config;
use taleforge_core::{JobService, JobStatus, JobStore, StatusUpdate};
use taleforge_db::JobRepository;
use taleforge_queue::{
    BreakerConfig, DeadLetterQueue, GenerateContentJob, GenerateContext, MaintenanceConfig,
    MaintenanceExecutor, ProgressPublisher, ProviderBreakers, RedisTaskDispatcher, RetryPolicy,
    StepPolicy, TaskLimits, TaskRateLimitConfig, TaskRateLimiter, generate_worker,
    run_maintenance,
};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::providers::{DevImageGenerator, DevSpeechSynthesizer, DevTextGenerator};
use crate::routes::{AppState, router};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Periodic maintenance against the live store and queue.
struct Maintenance {
    dlq: DeadLetterQueue,
    repo: JobRepository,
    dispatcher: RedisTaskDispatcher,
}

#[async_trait::async_trait]
impl MaintenanceExecutor for Maintenance {
    async fn dead_letter_depth(&self) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.dlq.depth().await?)
    }

    async fn requeue_stale_jobs(
        &self,
        stale_after: Duration,
    ) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        use taleforge_core::TaskDispatch;

        let cutoff = chrono::Utc::now() - chrono::Duration::from_std(stale_after)?;
        let stale = self.repo.find_stale_queued(cutoff).await?;

        let mut requeued = 0u64;
        for job in stale {
            let task_ref = self.dispatcher.dispatch(&job).await?;
            self.repo
                .update_status(
                    &job.id,
                    StatusUpdate {
                        status: Some(JobStatus::Queued),
                        ..StatusUpdate::default()
                    }
                    .with_queue_ref(task_ref),
                )
                .await?;
            requeued += 1;
        }
        Ok(requeued)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taleforge=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting taleforge server...");

    let config = Config::load()?;

    let db = taleforge_db::init(&config).await?;
    info!("Connected to database");

    info!("Running database migrations...");
    taleforge_db::migrate(&db).await?;
    info!("Migrations completed");

    // Job queue broker.
    info!("Connecting to Redis...");
    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    let storage = apalis_redis::RedisStorage::<GenerateContentJob>::new(redis_conn);
    info!("Connected to Redis job queue");

    // Progress pub/sub and dead letter list (fred clients).
    let progress = ProgressPublisher::new(&config.redis.url)
        .await
        .map_err(|e| anyhow::anyhow!("progress pub/sub init failed: {e}"))?;
    progress.start();
    let dlq = DeadLetterQueue::connect(&config.redis.url, &config.redis.prefix).await?;

    // Store, dispatcher, service.
    let repo = JobRepository::new(Arc::new(db));
    let store: Arc<dyn JobStore> = Arc::new(repo.clone());
    let dispatcher = RedisTaskDispatcher::new(storage.clone());
    let jobs = Arc::new(JobService::new(store.clone(), Arc::new(dispatcher.clone())));

    // Worker context from configuration.
    let worker_cfg = config.worker.clone();
    let ctx = GenerateContext {
        store,
        text: Arc::new(DevTextGenerator),
        image: Arc::new(DevImageGenerator),
        speech: Arc::new(DevSpeechSynthesizer),
        breakers: ProviderBreakers::new(&BreakerConfig {
            failure_threshold: worker_cfg.breaker_failure_threshold,
            recovery_timeout: Duration::from_secs(worker_cfg.breaker_recovery_timeout_secs),
        }),
        retry: RetryPolicy::new(
            worker_cfg.max_retries,
            Duration::from_millis(worker_cfg.retry_base_delay_ms),
        ),
        rate_limiter: TaskRateLimiter::new(TaskRateLimitConfig {
            max_tasks: worker_cfg.generation_tasks_per_minute,
            window: Duration::from_secs(60),
        }),
        progress: Arc::new(progress),
        dead_letters: Some(Arc::new(dlq.clone())),
        limits: TaskLimits::from_secs(
            worker_cfg.soft_time_limit_secs,
            worker_cfg.hard_time_limit_secs,
        ),
        image_step: StepPolicy::from_critical(worker_cfg.image_step_critical),
        audio_step: StepPolicy::from_critical(worker_cfg.audio_step_critical),
        max_delivery_attempts: worker_cfg.max_delivery_attempts,
        processed: Arc::new(AtomicU64::new(0)),
    };

    // Content-generation workers: one registration per concurrency slot so
    // each slot reserves exactly one task at a time. The monitor is
    // recycled after max_tasks_per_worker; late ack means any in-flight
    // task at recycle time is redelivered and resumes from its checkpoint.
    {
        let storage = storage.clone();
        let ctx_template = ctx;
        tokio::spawn(async move {
            loop {
                let processed = Arc::new(AtomicU64::new(0));
                let mut slot_ctx = ctx_template.clone();
                slot_ctx.processed = Arc::clone(&processed);

                let mut monitor = Monitor::new();
                for slot in 0..worker_cfg.concurrency {
                    monitor = monitor.register(
                        WorkerBuilder::new(format!("content-generation-{slot}"))
                            .data(slot_ctx.clone())
                            .backend(storage.clone())
                            .build_fn(generate_worker),
                    );
                }

                let recycle = {
                    let processed = Arc::clone(&processed);
                    let max = worker_cfg.max_tasks_per_worker;
                    async move {
                        let mut tick = tokio::time::interval(Duration::from_secs(1));
                        loop {
                            tick.tick().await;
                            if processed.load(Ordering::Relaxed) >= max {
                                break;
                            }
                        }
                    }
                };

                tokio::select! {
                    result = monitor.run() => {
                        if let Err(e) = result {
                            tracing::error!(error = %e, "worker monitor failed, restarting");
                        }
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                    () = recycle => {
                        info!(
                            max_tasks = worker_cfg.max_tasks_per_worker,
                            "recycling worker monitor"
                        );
                    }
                }
            }
        });
        info!(
            concurrency = config.worker.concurrency,
            "Content-generation workers started"
        );
    }

    run_maintenance(
        MaintenanceConfig::default(),
        Arc::new(Maintenance {
            dlq,
            repo,
            dispatcher,
        }),
    );

    let app = router(AppState { jobs });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
