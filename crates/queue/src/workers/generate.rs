//! Content-generation worker.
//!
//! Executes the text, image, speech pipeline for one job. The worker is
//! built around at-least-once delivery: every branch either finishes with
//! the job in a terminal state and the message acknowledged, or returns an
//! error so the message is redelivered. Partial artifacts are persisted
//! after each step, so a redelivered task resumes where the previous
//! attempt stopped instead of regenerating from scratch.
//!
//! Acknowledgement rules:
//!
//! - terminal job, cancelled job, unprocessable input, exhausted provider
//!   retries: job row updated, message acked;
//! - store unavailable or hard time limit hit: error returned, message
//!   redelivered;
//! - delivery attempts exhausted: task parked in the dead letter queue,
//!   job failed, message acked.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use apalis::prelude::{Attempt, Data, Error};
use taleforge_common::{AppError, AppResult};
use taleforge_core::{
    GenerationInput, GenerationResult, ImageGenerator, Job, JobStatus, JobStore, ProgressSink,
    ProgressUpdate, SpeechSynthesizer, StatusUpdate, TextGenerator,
};
use tracing::{error, info, warn};
use validator::Validate;

use crate::breaker::ProviderBreakers;
use crate::dlq::{DeadLetterEntry, DeadLetterSink};
use crate::jobs::GenerateContentJob;
use crate::limits::{TaskLimits, TimeLimitOutcome, run_with_limits};
use crate::rate_limit::TaskRateLimiter;
use crate::retry::RetryPolicy;
use crate::topology::route_task;

/// Failure handling for a pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    /// Step failure fails the whole job.
    Critical,
    /// Step failure is logged and the artifact omitted.
    Optional,
}

impl StepPolicy {
    /// Map a configuration flag to a policy.
    #[must_use]
    pub const fn from_critical(critical: bool) -> Self {
        if critical { Self::Critical } else { Self::Optional }
    }
}

/// Context for the content-generation worker.
#[derive(Clone)]
pub struct GenerateContext {
    /// Durable job state.
    pub store: Arc<dyn JobStore>,
    /// Text generation provider.
    pub text: Arc<dyn TextGenerator>,
    /// Image generation provider.
    pub image: Arc<dyn ImageGenerator>,
    /// Speech synthesis provider.
    pub speech: Arc<dyn SpeechSynthesizer>,
    /// Per-provider circuit breakers.
    pub breakers: ProviderBreakers,
    /// Retry policy for provider calls.
    pub retry: RetryPolicy,
    /// Per-task-type rate limiter.
    pub rate_limiter: TaskRateLimiter,
    /// Best-effort progress push.
    pub progress: Arc<dyn ProgressSink>,
    /// Where poison tasks are parked. `None` drops them with a warning.
    pub dead_letters: Option<Arc<dyn DeadLetterSink>>,
    /// Soft/hard execution limits.
    pub limits: TaskLimits,
    /// Failure handling for the image step.
    pub image_step: StepPolicy,
    /// Failure handling for the audio step.
    pub audio_step: StepPolicy,
    /// Delivery attempts before a task is dead-lettered.
    pub max_delivery_attempts: u32,
    /// Tasks processed by this worker, for recycling decisions.
    pub processed: Arc<AtomicU64>,
}

impl GenerateContext {
    /// Create a context with default resilience settings. Providers and
    /// store are the only required pieces.
    #[must_use]
    pub fn new(
        store: Arc<dyn JobStore>,
        text: Arc<dyn TextGenerator>,
        image: Arc<dyn ImageGenerator>,
        speech: Arc<dyn SpeechSynthesizer>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            store,
            text,
            image,
            speech,
            breakers: ProviderBreakers::new(&crate::breaker::BreakerConfig::default()),
            retry: RetryPolicy::default(),
            rate_limiter: TaskRateLimiter::new(crate::rate_limit::TaskRateLimitConfig::default()),
            progress,
            dead_letters: None,
            limits: TaskLimits::default(),
            image_step: StepPolicy::Optional,
            audio_step: StepPolicy::Optional,
            max_delivery_attempts: 3,
            processed: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Worker function for content-generation tasks.
///
/// # Errors
///
/// Returns an error only when the job store is unreachable, so the message
/// is redelivered; everything else resolves to a terminal job state and an
/// acknowledgement.
pub async fn generate_worker(
    task: GenerateContentJob,
    ctx: Data<GenerateContext>,
    attempt: Attempt,
) -> Result<(), Error> {
    let count = ctx.processed.fetch_add(1, Ordering::Relaxed) + 1;
    info!(
        job_id = %task.job_id,
        attempt = attempt.current(),
        worker_task_count = count,
        "picked up generation task"
    );

    #[allow(clippy::cast_possible_truncation)]
    let attempt_number = attempt.current() as u32;

    match run_generation(&task, &ctx, attempt_number).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!(job_id = %task.job_id, error = %e, "task failed, leaving for redelivery");
            let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(e);
            Err(Error::Failed(boxed.into()))
        }
    }
}

/// Execute one delivery of a generation task. Public so the pipeline can
/// be driven directly in tests without an apalis monitor.
///
/// # Errors
///
/// Returns an error when job state cannot be read or written; the caller
/// should leave the message unacknowledged.
pub async fn run_generation(
    task: &GenerateContentJob,
    ctx: &GenerateContext,
    attempt: u32,
) -> AppResult<()> {
    let job = match ctx.store.get_job(&task.job_id).await {
        Ok(job) => job,
        Err(AppError::JobNotFound(_) | AppError::NotFound(_)) => {
            warn!(job_id = %task.job_id, "orphaned task, no job row exists");
            park(ctx, task, "orphaned task: job row not found", attempt).await;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    if job.status.is_terminal() {
        info!(
            job_id = %job.id,
            status = job.status.as_str(),
            "job already terminal, acknowledging duplicate delivery"
        );
        return Ok(());
    }

    if attempt > ctx.max_delivery_attempts {
        let reason = format!("delivery attempts exhausted ({attempt})");
        fail_job(ctx, &job.id, &reason).await?;
        park(ctx, task, &reason, attempt).await;
        return Ok(());
    }

    // Validate before spending a rate-limit slot or touching providers.
    let input = match parse_input(&job) {
        Ok(input) => input,
        Err(reason) => {
            warn!(job_id = %job.id, reason = %reason, "unprocessable job input");
            fail_job(ctx, &job.id, &reason).await?;
            park(ctx, task, &reason, attempt).await;
            return Ok(());
        }
    };

    ctx.rate_limiter.acquire(task.task_type.as_str()).await;

    let job = ctx
        .store
        .update_status(&job.id, StatusUpdate::running())
        .await?;
    // cancel_job may have landed between the terminal check and this write.
    if job.status != JobStatus::Running {
        info!(job_id = %job.id, "job no longer runnable, acknowledging");
        return Ok(());
    }
    // Publish-only signal; durable progress advances at step checkpoints.
    publish(ctx, &job.id, JobStatus::Running, 10, "Generating story text").await;

    let partial = GenerationResult::from_job_result(job.result.as_ref());
    let outcome = run_with_limits(
        &job.id,
        ctx.limits,
        run_pipeline(ctx, &job.id, &input, partial),
    )
    .await;

    match outcome {
        TimeLimitOutcome::Completed(Ok(PipelineOutcome::Finished(result))) => {
            ctx.store
                .update_status(&job.id, StatusUpdate::succeeded(result.to_value()))
                .await?;
            publish(ctx, &job.id, JobStatus::Succeeded, 100, "Generation complete").await;
            info!(job_id = %job.id, "generation succeeded");
            Ok(())
        }
        TimeLimitOutcome::Completed(Ok(PipelineOutcome::Cancelled)) => {
            info!(job_id = %job.id, "generation stopped by cancellation");
            Ok(())
        }
        TimeLimitOutcome::Completed(Err(e)) => {
            // Store errors propagate for redelivery; provider failures are
            // terminal for the job once the retry budget is spent.
            if store_side(&e) {
                return Err(e);
            }
            let reason = e.to_string();
            fail_job(ctx, &job.id, &reason).await?;
            if matches!(e, AppError::Unprocessable(_)) {
                park(ctx, task, &reason, attempt).await;
            }
            Ok(())
        }
        TimeLimitOutcome::TimedOut => {
            // Partial artifacts are already persisted; redelivery resumes
            // from the last checkpoint. The dead letter path catches tasks
            // that time out on every attempt.
            Err(AppError::Timeout(format!(
                "hard time limit exceeded after {}s",
                ctx.limits.hard.as_secs()
            )))
        }
    }
}

/// What the pipeline produced when it ended on its own terms.
enum PipelineOutcome {
    Finished(GenerationResult),
    Cancelled,
}

async fn run_pipeline(
    ctx: &GenerateContext,
    job_id: &str,
    input: &GenerationInput,
    mut acc: GenerationResult,
) -> AppResult<PipelineOutcome> {
    // Text step. Critical: no story, no job.
    if acc.story_text.is_none() {
        let text = ctx
            .retry
            .run("text_generation", || {
                ctx.breakers.text.call(|| ctx.text.generate_text(input))
            })
            .await?;
        acc.story_text = Some(text);
        checkpoint(ctx, job_id, &acc, 30, "Story text generated").await?;
    } else {
        info!(job_id, "story text already present, skipping text step");
    }

    if cancelled(ctx, job_id).await? {
        return Ok(PipelineOutcome::Cancelled);
    }

    // Image step.
    if acc.image_url.is_none() {
        let story = acc.story_text.as_deref().unwrap_or_default();
        let result = ctx
            .retry
            .run("image_generation", || {
                ctx.breakers
                    .image
                    .call(|| ctx.image.generate_image(story, input))
            })
            .await;
        match result {
            Ok(url) => acc.image_url = Some(url),
            Err(e) if ctx.image_step == StepPolicy::Optional => {
                warn!(job_id, error = %e, "image step failed, continuing without illustration");
            }
            Err(e) => return Err(e),
        }
    }
    checkpoint(ctx, job_id, &acc, 60, "Illustration step complete").await?;

    if cancelled(ctx, job_id).await? {
        return Ok(PipelineOutcome::Cancelled);
    }

    // Audio step.
    if acc.audio_url.is_none() {
        let story = acc.story_text.as_deref().unwrap_or_default();
        let result = ctx
            .retry
            .run("speech_synthesis", || {
                ctx.breakers
                    .speech
                    .call(|| ctx.speech.synthesize(story, input))
            })
            .await;
        match result {
            Ok(url) => acc.audio_url = Some(url),
            Err(e) if ctx.audio_step == StepPolicy::Optional => {
                warn!(job_id, error = %e, "audio step failed, continuing without narration");
            }
            Err(e) => return Err(e),
        }
    }
    checkpoint(ctx, job_id, &acc, 90, "Narration step complete").await?;

    if cancelled(ctx, job_id).await? {
        return Ok(PipelineOutcome::Cancelled);
    }

    Ok(PipelineOutcome::Finished(acc))
}

/// Persist partial artifacts and push the step's progress.
async fn checkpoint(
    ctx: &GenerateContext,
    job_id: &str,
    acc: &GenerationResult,
    percent: u8,
    message: &str,
) -> AppResult<()> {
    let job = ctx
        .store
        .update_status(
            job_id,
            StatusUpdate::progress(percent).with_result(acc.to_value()),
        )
        .await?;
    publish(ctx, job_id, job.status, job.progress_percent, message).await;
    Ok(())
}

/// Cooperative cancellation check between pipeline steps.
async fn cancelled(ctx: &GenerateContext, job_id: &str) -> AppResult<bool> {
    let job = ctx.store.get_job(job_id).await?;
    if job.status == JobStatus::Cancelled {
        info!(job_id, "cancellation observed, stopping pipeline");
        return Ok(true);
    }
    Ok(false)
}

fn parse_input(job: &Job) -> Result<GenerationInput, String> {
    let input: GenerationInput = serde_json::from_value(job.input.clone())
        .map_err(|e| format!("unprocessable input: {e}"))?;
    input
        .validate()
        .map_err(|e| format!("unprocessable input: {e}"))?;
    Ok(input)
}

async fn fail_job(ctx: &GenerateContext, job_id: &str, reason: &str) -> AppResult<()> {
    let job = ctx
        .store
        .update_status(job_id, StatusUpdate::failed(reason))
        .await?;
    publish(ctx, job_id, job.status, job.progress_percent, reason).await;
    Ok(())
}

async fn publish(ctx: &GenerateContext, job_id: &str, status: JobStatus, percent: u8, message: &str) {
    ctx.progress
        .publish(ProgressUpdate::new(job_id, status, percent).with_message(message))
        .await;
}

async fn park(ctx: &GenerateContext, task: &GenerateContentJob, reason: &str, attempts: u32) {
    let Some(sink) = &ctx.dead_letters else {
        warn!(
            job_id = %task.job_id,
            reason,
            "no dead letter sink configured, dropping poison task"
        );
        return;
    };

    let entry = DeadLetterEntry::new(
        task.clone(),
        route_task(task.task_type),
        reason,
        attempts,
    );
    if let Err(e) = sink.park(entry).await {
        error!(job_id = %task.job_id, error = %e, "failed to park task in dead letter queue");
    }
}

/// Whether a pipeline error came from the job store rather than a provider.
const fn store_side(error: &AppError) -> bool {
    matches!(error, AppError::Database(_) | AppError::JobNotFound(_))
}
