//! Redis Pub/Sub progress broadcasting.
//!
//! Workers publish progress snapshots on a per-job channel so API
//! instances can stream them to clients. Publishing is strictly
//! best-effort: a Redis hiccup is logged and swallowed, never failing the
//! job. The Job row remains the durable source of truth for status.

use async_trait::async_trait;
use fred::clients::{Client, SubscriberClient};
use fred::error::Error as RedisError;
use fred::interfaces::{ClientLike, EventInterface, PubsubInterface};
use fred::types::config::Config as RedisConfig;
use taleforge_core::{ProgressSink, ProgressUpdate};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Pub/Sub channel names.
pub mod channels {
    /// Per-job progress channels (suffix with job ID).
    pub const JOB_PREFIX: &str = "taleforge:job:";
}

/// Channel for a job's progress updates.
#[must_use]
pub fn job_channel(job_id: &str) -> String {
    format!("{}{job_id}", channels::JOB_PREFIX)
}

/// Redis-backed progress publisher with local fan-out.
#[derive(Clone)]
pub struct ProgressPublisher {
    publisher: Client,
    subscriber: SubscriberClient,
    /// Local broadcast channel for updates received from Redis.
    local_tx: broadcast::Sender<ProgressUpdate>,
}

impl ProgressPublisher {
    /// Connect publisher and subscriber clients.
    ///
    /// # Errors
    ///
    /// Returns a Redis error if either connection cannot be established.
    pub async fn new(redis_url: &str) -> Result<Self, RedisError> {
        let config = RedisConfig::from_url(redis_url)?;

        let publisher = Client::new(config.clone(), None, None, None);
        publisher.init().await?;

        let subscriber = SubscriberClient::new(config, None, None, None);
        subscriber.init().await?;

        let (local_tx, _) = broadcast::channel(1000);

        info!("progress pub/sub initialized");

        Ok(Self {
            publisher,
            subscriber,
            local_tx,
        })
    }

    /// Start forwarding Redis messages to the local broadcast channel.
    pub fn start(&self) {
        let local_tx = self.local_tx.clone();
        let mut message_stream = self.subscriber.message_rx();

        tokio::spawn(async move {
            while let Ok(message) = message_stream.recv().await {
                if let Some(payload) = message.value.as_string() {
                    match serde_json::from_str::<ProgressUpdate>(&payload) {
                        Ok(update) => {
                            debug!(job_id = %update.job_id, "received progress update");
                            // No receivers just means nobody is watching.
                            let _ = local_tx.send(update);
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to parse progress message");
                        }
                    }
                }
            }
            info!("progress message stream ended");
        });
    }

    /// Subscribe to a job's progress channel.
    ///
    /// # Errors
    ///
    /// Returns a Redis error if the subscription fails.
    pub async fn subscribe_job(&self, job_id: &str) -> Result<(), RedisError> {
        self.subscriber.subscribe(job_channel(job_id)).await?;
        debug!(job_id, "subscribed to job progress channel");
        Ok(())
    }

    /// Unsubscribe from a job's progress channel.
    ///
    /// # Errors
    ///
    /// Returns a Redis error if the unsubscription fails.
    pub async fn unsubscribe_job(&self, job_id: &str) -> Result<(), RedisError> {
        self.subscriber.unsubscribe(job_channel(job_id)).await?;
        debug!(job_id, "unsubscribed from job progress channel");
        Ok(())
    }

    /// Get a receiver for locally fanned-out updates.
    #[must_use]
    pub fn subscribe_local(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.local_tx.subscribe()
    }

    /// Shut down both Redis clients.
    ///
    /// # Errors
    ///
    /// Returns a Redis error if either client fails to quit cleanly.
    pub async fn shutdown(&self) -> Result<(), RedisError> {
        self.subscriber.quit().await?;
        self.publisher.quit().await?;
        info!("progress pub/sub shutdown");
        Ok(())
    }
}

#[async_trait]
impl ProgressSink for ProgressPublisher {
    async fn publish(&self, update: ProgressUpdate) {
        let payload = match serde_json::to_string(&update) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(job_id = %update.job_id, error = %e, "failed to serialize progress update");
                return;
            }
        };

        let channel = job_channel(&update.job_id);
        let result: Result<(), RedisError> = self.publisher.publish(&channel, payload).await;
        if let Err(e) = result {
            warn!(
                job_id = %update.job_id,
                error = %e,
                "failed to publish progress update, continuing"
            );
        }
    }
}
