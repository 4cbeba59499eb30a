//! Redis-backed webhook queue.
//!
//! Layout, for a base key `K`:
//! - `K`          list, RPUSH to enqueue, BLPOP to dequeue
//! - `K:delayed`  sorted set of scheduled retries scored by visible-after
//!                epoch milliseconds
//! - `K:dead`     list of tasks that exhausted their retries, trimmed to the
//!                newest `DEAD_LETTER_CAP`
//!
//! Scheduled retries live in Redis rather than in a sleeping task, so they
//! survive a worker restart.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::{Connection, MultiplexedConnection};
use redis::{AsyncCommands, Client, Script};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{QueueError, WebhookQueue, DEAD_LETTER_CAP};
use crate::domain::WebhookTask;

/// Server-side BLPOP timeout. Bounds how long shutdown can go unnoticed.
const BLOCK_SECS: u64 = 1;
const PROMOTE_BATCH: usize = 100;

/// Moves up to ARGV[2] members of KEYS[1] scored <= ARGV[1] onto list KEYS[2].
const PROMOTE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
for _, item in ipairs(due) do
    redis.call('ZREM', KEYS[1], item)
    redis.call('RPUSH', KEYS[2], item)
end
return #due
"#;

pub struct RedisWebhookQueue {
    client: Client,
    conn: MultiplexedConnection,
    /// Dedicated connection for BLPOP so blocking never stalls enqueues.
    blocking: Mutex<Option<Connection>>,
    key: String,
    delayed_key: String,
    dead_key: String,
    promote: Script,
}

impl RedisWebhookQueue {
    pub async fn connect(redis_url: &str, key: &str) -> Result<Self, QueueError> {
        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;

        info!(queue = %key, "Connected webhook queue to Redis");

        Ok(Self {
            client,
            conn,
            blocking: Mutex::new(None),
            key: key.to_string(),
            delayed_key: format!("{key}:delayed"),
            dead_key: format!("{key}:dead"),
            promote: Script::new(PROMOTE_SCRIPT),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn decode(raw: &str) -> Option<WebhookTask> {
        match serde_json::from_str::<WebhookTask>(raw) {
            Ok(task) => Some(task),
            Err(e) => {
                error!(error = %e, payload = %raw, "Dropping undecodable webhook task");
                None
            }
        }
    }
}

#[async_trait]
impl WebhookQueue for RedisWebhookQueue {
    async fn enqueue(&self, task: &WebhookTask) -> Result<(), QueueError> {
        let payload = serde_json::to_string(task)?;
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(&self.key, payload).await?;

        debug!(order_id = %task.order_id, retry_count = task.retry_count, "Webhook task enqueued");
        Ok(())
    }

    async fn dequeue(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<Option<WebhookTask>, QueueError> {
        let mut guard = self.blocking.lock().await;

        loop {
            if shutdown.is_cancelled() {
                return Ok(None);
            }

            if guard.is_none() {
                #[allow(deprecated)]
                let conn = self.client.get_async_connection().await?;
                *guard = Some(conn);
            }
            let Some(conn) = guard.as_mut() else {
                continue;
            };

            let mut blpop = redis::cmd("BLPOP");
            blpop.arg(&self.key).arg(BLOCK_SECS);

            let outcome = tokio::select! {
                _ = shutdown.cancelled() => None,
                result = blpop.query_async::<_, Option<(String, String)>>(conn) => Some(result),
            };

            let popped = match outcome {
                // An interrupted BLPOP leaves the connection mid-reply.
                None => {
                    *guard = None;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    *guard = None;
                    return Err(e.into());
                }
                Some(Ok(popped)) => popped,
            };

            if let Some((_, raw)) = popped {
                if let Some(task) = Self::decode(&raw) {
                    return Ok(Some(task));
                }
            }
        }
    }

    async fn schedule(&self, task: &WebhookTask, delay: Duration) -> Result<(), QueueError> {
        let payload = serde_json::to_string(task)?;
        let visible_after = visible_after_ms(Utc::now().timestamp_millis(), delay);
        let mut conn = self.conn.clone();
        let _: () = conn.zadd(&self.delayed_key, payload, visible_after).await?;
        Ok(())
    }

    async fn promote_due(&self) -> Result<usize, QueueError> {
        let now = Utc::now().timestamp_millis();
        let mut conn = self.conn.clone();
        let moved: usize = self
            .promote
            .key(&self.delayed_key)
            .key(&self.key)
            .arg(now)
            .arg(PROMOTE_BATCH)
            .invoke_async(&mut conn)
            .await?;

        if moved > 0 {
            debug!(moved, "Promoted scheduled webhook retries");
        }
        Ok(moved)
    }

    async fn dead_letter(&self, task: &WebhookTask) -> Result<(), QueueError> {
        let payload = serde_json::to_string(task)?;
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .rpush(&self.dead_key, payload)
            .ignore()
            .ltrim(&self.dead_key, -(DEAD_LETTER_CAP as isize), -1)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<WebhookTask>, QueueError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .lrange(&self.dead_key, 0, limit as isize - 1)
            .await?;

        Ok(raw.iter().filter_map(|r| Self::decode(r)).collect())
    }

    async fn requeue_dead_letters(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let mut moved = 0;

        loop {
            let raw: Option<String> = conn.lpop(&self.dead_key, None).await?;
            let Some(raw) = raw else {
                break;
            };
            if let Some(mut task) = Self::decode(&raw) {
                task.retry_count = 0;
                self.enqueue(&task).await?;
                moved += 1;
            }
        }

        info!(moved, "Requeued dead-lettered webhook tasks");
        Ok(moved)
    }
}

/// Score for a retry due after `delay`. Saturates instead of wrapping.
fn visible_after_ms(now_ms: i64, delay: Duration) -> i64 {
    let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_add(delay_ms)
}
