//! In-process webhook queue for tests and single-process runs.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{QueueError, WebhookQueue, DEAD_LETTER_CAP};
use crate::domain::WebhookTask;

/// Stand-in due time for delays too large to represent.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct ScheduledTask {
    visible_after: Instant,
    delay: Duration,
    task: WebhookTask,
}

#[derive(Debug, Default)]
struct State {
    ready: VecDeque<WebhookTask>,
    scheduled: Vec<ScheduledTask>,
    dead: Vec<WebhookTask>,
    enqueued_total: usize,
}

#[derive(Debug, Default)]
pub struct InMemoryWebhookQueue {
    state: Mutex<State>,
    notify: Notify,
}

impl InMemoryWebhookQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks currently waiting to be dequeued, head first.
    pub async fn pending(&self) -> Vec<WebhookTask> {
        self.state.lock().await.ready.iter().cloned().collect()
    }

    /// Scheduled retries with the delay each was scheduled with.
    pub async fn scheduled(&self) -> Vec<(WebhookTask, Duration)> {
        self.state
            .lock()
            .await
            .scheduled
            .iter()
            .map(|s| (s.task.clone(), s.delay))
            .collect()
    }

    /// Every `enqueue` call so far, including promoted retries.
    pub async fn enqueued_total(&self) -> usize {
        self.state.lock().await.enqueued_total
    }
}

#[async_trait]
impl WebhookQueue for InMemoryWebhookQueue {
    async fn enqueue(&self, task: &WebhookTask) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().await;
            state.ready.push_back(task.clone());
            state.enqueued_total += 1;
        }
        debug!(order_id = %task.order_id, "Webhook task enqueued");
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<Option<WebhookTask>, QueueError> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(None);
            }
            if let Some(task) = self.state.lock().await.ready.pop_front() {
                return Ok(Some(task));
            }

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(None),
                _ = self.notify.notified() => {}
            }
        }
    }

    async fn schedule(&self, task: &WebhookTask, delay: Duration) -> Result<(), QueueError> {
        let now = Instant::now();
        self.state.lock().await.scheduled.push(ScheduledTask {
            visible_after: now.checked_add(delay).unwrap_or(now + FAR_FUTURE),
            delay,
            task: task.clone(),
        });
        Ok(())
    }

    async fn promote_due(&self) -> Result<usize, QueueError> {
        let now = Instant::now();
        let moved = {
            let mut state = self.state.lock().await;
            let (due, waiting): (Vec<_>, Vec<_>) = state
                .scheduled
                .drain(..)
                .partition(|s| s.visible_after <= now);
            state.scheduled = waiting;

            let moved = due.len();
            for scheduled in due {
                state.ready.push_back(scheduled.task);
                state.enqueued_total += 1;
            }
            moved
        };

        for _ in 0..moved {
            self.notify.notify_one();
        }
        Ok(moved)
    }

    async fn dead_letter(&self, task: &WebhookTask) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.dead.push(task.clone());
        if state.dead.len() > DEAD_LETTER_CAP {
            let overflow = state.dead.len() - DEAD_LETTER_CAP;
            state.dead.drain(..overflow);
        }
        Ok(())
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<WebhookTask>, QueueError> {
        Ok(self
            .state
            .lock()
            .await
            .dead
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn requeue_dead_letters(&self) -> Result<usize, QueueError> {
        let dead = std::mem::take(&mut self.state.lock().await.dead);
        let moved = dead.len();
        for mut task in dead {
            task.retry_count = 0;
            self.enqueue(&task).await?;
        }
        Ok(moved)
    }
}
