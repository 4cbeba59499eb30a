//! Merchant webhook delivery worker.
//!
//! ```text
//! run()
//!   ├─ promoter (spawned): every poll interval, move due retries back
//!   │                      onto the ready queue
//!   └─ loop: dequeue ─► spawn(process(task))
//!                          ├─ POST body to callback_url
//!                          ├─ 2xx        → done
//!                          └─ otherwise  → RetryPolicy
//!                                           ├─ Retry  → queue.schedule(delay)
//!                                           └─ GiveUp → queue.dead_letter
//! ```
//!
//! A delivery in flight when shutdown is requested finishes on its own task;
//! the loop only stops taking new work.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::WebhookConfig;
use crate::domain::WebhookTask;
use crate::queue::WebhookQueue;
use crate::services::retry_policy::{RetryDecision, RetryPolicy};

/// Back-off after a queue read error before trying again.
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Delivery failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Delivery failed: merchant responded with status {0}")]
    Status(u16),
}

/// What happened to a single dequeued task.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Delivered,
    Rescheduled { retry_count: u32, delay: Duration },
    GaveUp { retry_count: u32 },
    /// Task had no usable callback URL.
    Dropped,
}

pub struct WebhookDispatcher {
    queue: Arc<dyn WebhookQueue>,
    client: reqwest::Client,
    policy: RetryPolicy,
    poll_interval: Duration,
}

impl WebhookDispatcher {
    pub fn new(
        queue: Arc<dyn WebhookQueue>,
        client: reqwest::Client,
        policy: RetryPolicy,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            client,
            policy,
            poll_interval,
        }
    }

    pub fn from_config(queue: Arc<dyn WebhookQueue>, config: &WebhookConfig) -> Self {
        Self::new(
            queue,
            http_client(config.timeout()),
            RetryPolicy::from_config(config),
            config.retry_poll_interval(),
        )
    }

    /// Consumes the queue until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            max_retries = self.policy.max_retries(),
            "Webhook dispatcher started"
        );

        let promoter = tokio::spawn(self.clone().promote_loop(shutdown.clone()));

        loop {
            match self.queue.dequeue(&shutdown).await {
                Ok(Some(task)) => {
                    let this = self.clone();
                    tokio::spawn(async move {
                        this.process(task).await;
                    });
                }
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Failed to read webhook queue");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(QUEUE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        if let Err(e) = promoter.await {
            error!(error = %e, "Retry promoter task failed");
        }
        info!("Webhook dispatcher stopped");
    }

    async fn promote_loop(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            if let Err(e) = self.queue.promote_due().await {
                warn!(error = %e, "Failed to promote scheduled webhook retries");
            }
        }
    }

    /// Delivers one task and applies the retry policy on failure.
    pub async fn process(&self, task: WebhookTask) -> DeliveryOutcome {
        if task.callback_url.trim().is_empty() {
            warn!(order_id = %task.order_id, "Dropping webhook task without callback URL");
            return DeliveryOutcome::Dropped;
        }

        match self.deliver(&task).await {
            Ok(status) => {
                info!(
                    order_id = %task.order_id,
                    status,
                    retry_count = task.retry_count,
                    "Merchant webhook delivered"
                );
                DeliveryOutcome::Delivered
            }
            Err(e) => {
                warn!(
                    order_id = %task.order_id,
                    url = %task.callback_url,
                    retry_count = task.retry_count,
                    error = %e,
                    "Merchant webhook delivery failed"
                );
                self.handle_failure(task).await
            }
        }
    }

    pub async fn deliver(&self, task: &WebhookTask) -> Result<u16, DeliveryError> {
        let response = self
            .client
            .post(&task.callback_url)
            .json(&task.body())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(DeliveryError::Status(status.as_u16()))
        }
    }

    async fn handle_failure(&self, task: WebhookTask) -> DeliveryOutcome {
        match self.policy.on_failure(task) {
            RetryDecision::Retry { task, delay } => {
                debug!(
                    order_id = %task.order_id,
                    retry_count = task.retry_count,
                    delay_secs = delay.as_secs_f64(),
                    "Scheduling webhook retry"
                );
                if let Err(e) = self.queue.schedule(&task, delay).await {
                    error!(error = %e, order_id = %task.order_id, "Failed to schedule webhook retry, task lost");
                }
                DeliveryOutcome::Rescheduled {
                    retry_count: task.retry_count,
                    delay,
                }
            }
            RetryDecision::GiveUp(task) => {
                error!(
                    order_id = %task.order_id,
                    transaction_id = %task.transaction_id,
                    url = %task.callback_url,
                    retry_count = task.retry_count,
                    "Giving up on merchant webhook"
                );
                if let Err(e) = self.queue.dead_letter(&task).await {
                    error!(error = %e, order_id = %task.order_id, "Failed to dead-letter webhook task");
                }
                DeliveryOutcome::GaveUp {
                    retry_count: task.retry_count,
                }
            }
        }
    }
}

/// Redirects are not followed: anything but a 2xx from the callback URL
/// itself is a failed delivery.
pub fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap_or_default()
}
