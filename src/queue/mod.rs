//! Work queue for merchant webhook deliveries.
//!
//! FIFO, at-least-once. `dequeue` removes the task immediately; there is no
//! acknowledgement phase, so a worker crash between dequeue and delivery loses
//! that task. Retries are not slept by workers: a failed task is handed back
//! with [`WebhookQueue::schedule`] and becomes visible again once its delay has
//! elapsed and [`WebhookQueue::promote_due`] has run.

pub mod in_memory;
pub mod redis_queue;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::WebhookTask;

pub use in_memory::InMemoryWebhookQueue;
pub use redis_queue::RedisWebhookQueue;

/// Dead letters kept per queue. Older entries are dropped first.
pub const DEAD_LETTER_CAP: usize = 10_000;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait WebhookQueue: Send + Sync {
    /// Appends a task to the tail of the queue.
    async fn enqueue(&self, task: &WebhookTask) -> Result<(), QueueError>;

    /// Pops the head of the queue, waiting until a task is available.
    /// Returns `Ok(None)` once `shutdown` is cancelled.
    async fn dequeue(&self, shutdown: &CancellationToken)
        -> Result<Option<WebhookTask>, QueueError>;

    /// Re-inserts a task after `delay`.
    async fn schedule(&self, task: &WebhookTask, delay: Duration) -> Result<(), QueueError>;

    /// Moves every scheduled task whose delay has elapsed onto the queue.
    /// Returns how many were moved.
    async fn promote_due(&self) -> Result<usize, QueueError>;

    /// Parks a task that exhausted its retries. At most
    /// [`DEAD_LETTER_CAP`] are kept.
    async fn dead_letter(&self, task: &WebhookTask) -> Result<(), QueueError>;

    /// Oldest first.
    async fn dead_letters(&self, limit: usize) -> Result<Vec<WebhookTask>, QueueError>;

    /// Moves every dead letter back onto the queue with a fresh retry budget.
    async fn requeue_dead_letters(&self) -> Result<usize, QueueError>;
}
