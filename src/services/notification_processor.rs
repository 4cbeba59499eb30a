//! Inbound provider notification processing.
//!
//! Verifies a notification against its provider, applies the mapped status to
//! the stored transaction and, when the status actually changed, enqueues a
//! merchant webhook. Replays, terminal transactions and unknown statuses are
//! acknowledged without touching the store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{Notification, Transaction, TransactionStatus, WebhookTask};
use crate::error::NotificationError;
use crate::gateways::GatewayRegistry;
use crate::ports::{MerchantRepository, RepositoryResult, TransactionRepository};
use crate::queue::WebhookQueue;

/// Result of a notification that passed verification.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// The status changed and was persisted.
    Applied {
        transaction_id: Uuid,
        order_id: String,
        status: TransactionStatus,
        webhook_enqueued: bool,
    },
    /// Acknowledged, nothing written.
    Ignored {
        order_id: String,
        reason: IgnoreReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Transaction already PAID, FAILED or EXPIRED.
    AlreadyFinal(TransactionStatus),
    /// Provider replay of the current status.
    SameStatus(TransactionStatus),
    /// Provider status with no internal equivalent.
    UnknownStatus,
    /// A concurrent notification changed the row first.
    Superseded,
}

impl ProcessOutcome {
    pub fn message(&self) -> String {
        match self {
            ProcessOutcome::Applied { status, .. } => {
                format!("Transaction updated to {}", status)
            }
            ProcessOutcome::Ignored { reason, .. } => match reason {
                IgnoreReason::AlreadyFinal(status) => {
                    format!("Transaction already final ({})", status)
                }
                IgnoreReason::SameStatus(status) => format!("Status unchanged ({})", status),
                IgnoreReason::UnknownStatus => "Status not recognized, ignored".to_string(),
                IgnoreReason::Superseded => "Superseded by a concurrent update".to_string(),
            },
        }
    }
}

pub struct NotificationProcessor {
    gateways: Arc<GatewayRegistry>,
    transactions: Arc<dyn TransactionRepository>,
    merchants: Arc<dyn MerchantRepository>,
    queue: Arc<dyn WebhookQueue>,
    store_timeout: Duration,
}

impl NotificationProcessor {
    pub fn new(
        gateways: Arc<GatewayRegistry>,
        transactions: Arc<dyn TransactionRepository>,
        merchants: Arc<dyn MerchantRepository>,
        queue: Arc<dyn WebhookQueue>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            gateways,
            transactions,
            merchants,
            queue,
            store_timeout,
        }
    }

    pub fn gateways(&self) -> &GatewayRegistry {
        &self.gateways
    }

    pub async fn process(
        &self,
        provider: &str,
        notification: Notification,
    ) -> Result<ProcessOutcome, NotificationError> {
        let gateway = self
            .gateways
            .get(provider)
            .ok_or_else(|| NotificationError::UnsupportedProvider(provider.to_string()))?;

        if !gateway.verify_signature(&notification) {
            warn!(provider, "Rejected notification with invalid signature");
            return Err(NotificationError::InvalidSignature);
        }

        let order_id = gateway
            .order_id(&notification)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| NotificationError::MalformedPayload("order id missing".to_string()))?
            .to_string();

        let mapped = gateway.map_status(&notification);

        let tx = self
            .within_deadline(self.transactions.find_by_order_id(&order_id))
            .await?
            .ok_or_else(|| NotificationError::TransactionNotFound(order_id.clone()))?;

        if tx.status.is_terminal() {
            debug!(%order_id, status = %tx.status, "Notification for final transaction ignored");
            return Ok(ProcessOutcome::Ignored {
                order_id,
                reason: IgnoreReason::AlreadyFinal(tx.status),
            });
        }

        let Some(next) = mapped.into_transaction_status() else {
            warn!(%order_id, provider, "Unrecognized provider status ignored");
            return Ok(ProcessOutcome::Ignored {
                order_id,
                reason: IgnoreReason::UnknownStatus,
            });
        };

        if next == tx.status {
            debug!(%order_id, status = %next, "Duplicate notification ignored");
            return Ok(ProcessOutcome::Ignored {
                order_id,
                reason: IgnoreReason::SameStatus(next),
            });
        }

        let updated = self
            .within_deadline(self.transactions.update_status(
                tx.id,
                tx.status,
                next,
                &notification.payload,
            ))
            .await?;

        let Some(updated) = updated else {
            info!(%order_id, "Transaction changed concurrently, notification superseded");
            return Ok(ProcessOutcome::Ignored {
                order_id,
                reason: IgnoreReason::Superseded,
            });
        };

        info!(
            transaction_id = %updated.id,
            %order_id,
            provider,
            from = %tx.status,
            to = %updated.status,
            "Transaction status updated"
        );

        let webhook_enqueued = self.enqueue_webhook(&updated).await;

        Ok(ProcessOutcome::Applied {
            transaction_id: updated.id,
            order_id,
            status: updated.status,
            webhook_enqueued,
        })
    }

    /// Enqueues the merchant callback for an applied change. Failures here are
    /// logged only: the status change is already committed.
    async fn enqueue_webhook(&self, tx: &Transaction) -> bool {
        let merchant = match self
            .within_deadline(self.merchants.find_by_id(tx.merchant_id))
            .await
        {
            Ok(Some(merchant)) => merchant,
            Ok(None) => {
                warn!(merchant_id = %tx.merchant_id, order_id = %tx.order_id, "Merchant missing, webhook skipped");
                return false;
            }
            Err(e) => {
                error!(error = %e, order_id = %tx.order_id, "Merchant lookup failed, webhook skipped");
                return false;
            }
        };

        let Some(callback_url) = merchant.webhook_target() else {
            debug!(merchant_id = %merchant.id, "Merchant has no callback URL, webhook skipped");
            return false;
        };

        let task = WebhookTask::from_transaction(tx, callback_url);
        match tokio::time::timeout(self.store_timeout, self.queue.enqueue(&task)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(error = %e, order_id = %tx.order_id, "Failed to enqueue merchant webhook");
                false
            }
            Err(_) => {
                error!(order_id = %tx.order_id, "Timed out enqueueing merchant webhook");
                false
            }
        }
    }

    async fn within_deadline<T>(
        &self,
        fut: impl Future<Output = RepositoryResult<T>>,
    ) -> Result<T, NotificationError> {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(NotificationError::StoreUnavailable(e.to_string())),
            Err(_) => Err(NotificationError::StoreUnavailable(
                "deadline exceeded".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryMerchantRepository, InMemoryTransactionRepository};
    use crate::domain::Merchant;
    use crate::gateways::MockGateway;
    use crate::ports::RepositoryError;
    use crate::queue::{InMemoryWebhookQueue, QueueError};
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        processor: NotificationProcessor,
        transactions: Arc<InMemoryTransactionRepository>,
        queue: Arc<InMemoryWebhookQueue>,
    }

    async fn fixture(callback_url: Option<&str>, status: TransactionStatus) -> Fixture {
        let transactions = Arc::new(InMemoryTransactionRepository::new());
        let merchants = Arc::new(InMemoryMerchantRepository::new());
        let queue = Arc::new(InMemoryWebhookQueue::new());

        let merchant = Merchant::new("Toko".to_string(), callback_url.map(str::to_string));
        let mut tx = Transaction::new(
            merchant.id,
            "ORD-1".to_string(),
            "mock".to_string(),
            BigDecimal::from(10000),
            "IDR".to_string(),
            None,
        );
        tx.status = status;
        merchants.put(merchant).await;
        transactions.put(tx).await;

        let processor = NotificationProcessor::new(
            Arc::new(GatewayRegistry::new().with(Arc::new(MockGateway::new()))),
            transactions.clone(),
            merchants,
            queue.clone(),
            Duration::from_secs(1),
        );

        Fixture {
            processor,
            transactions,
            queue,
        }
    }

    fn notification(status: &str) -> Notification {
        Notification::new(json!({"order_id": "ORD-1", "mock_status": status}))
    }

    #[tokio::test]
    async fn test_paid_notification_updates_and_enqueues() {
        let f = fixture(Some("http://merchant.test/cb"), TransactionStatus::Pending).await;

        let outcome = f.processor.process("mock", notification("paid")).await.unwrap();
        assert!(matches!(
            outcome,
            ProcessOutcome::Applied {
                status: TransactionStatus::Paid,
                webhook_enqueued: true,
                ..
            }
        ));

        let stored = f.transactions.find_by_order_id("ORD-1").await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Paid);
        assert_eq!(stored.raw_notification.unwrap()["mock_status"], "paid");

        let pending = f.queue.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].callback_url, "http://merchant.test/cb");
        assert_eq!(pending[0].retry_count, 0);
    }

    #[tokio::test]
    async fn test_replayed_notification_is_idempotent() {
        let f = fixture(Some("http://merchant.test/cb"), TransactionStatus::Pending).await;

        f.processor.process("mock", notification("paid")).await.unwrap();
        let second = f.processor.process("mock", notification("paid")).await.unwrap();

        assert_eq!(
            second,
            ProcessOutcome::Ignored {
                order_id: "ORD-1".to_string(),
                reason: IgnoreReason::AlreadyFinal(TransactionStatus::Paid),
            }
        );
        assert_eq!(f.transactions.status_writes(), 1);
        assert_eq!(f.queue.enqueued_total().await, 1);
    }

    #[tokio::test]
    async fn test_pending_replay_is_ignored() {
        let f = fixture(Some("http://merchant.test/cb"), TransactionStatus::Pending).await;

        let outcome = f.processor.process("mock", notification("pending")).await.unwrap();
        assert!(matches!(
            outcome,
            ProcessOutcome::Ignored {
                reason: IgnoreReason::SameStatus(TransactionStatus::Pending),
                ..
            }
        ));
        assert_eq!(f.transactions.status_writes(), 0);
    }

    #[tokio::test]
    async fn test_terminal_status_is_never_overwritten() {
        let f = fixture(Some("http://merchant.test/cb"), TransactionStatus::Failed).await;

        let outcome = f.processor.process("mock", notification("paid")).await.unwrap();
        assert!(matches!(
            outcome,
            ProcessOutcome::Ignored {
                reason: IgnoreReason::AlreadyFinal(TransactionStatus::Failed),
                ..
            }
        ));

        let stored = f.transactions.find_by_order_id("ORD-1").await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Failed);
        assert!(f.queue.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_status_leaves_transaction_untouched() {
        let f = fixture(Some("http://merchant.test/cb"), TransactionStatus::Pending).await;

        let outcome = f.processor.process("mock", notification("refunded")).await.unwrap();
        assert!(matches!(
            outcome,
            ProcessOutcome::Ignored {
                reason: IgnoreReason::UnknownStatus,
                ..
            }
        ));
        assert_eq!(f.transactions.status_writes(), 0);
    }

    #[tokio::test]
    async fn test_empty_callback_url_skips_webhook() {
        let f = fixture(Some("   "), TransactionStatus::Pending).await;

        let outcome = f.processor.process("mock", notification("expired")).await.unwrap();
        assert!(matches!(
            outcome,
            ProcessOutcome::Applied {
                status: TransactionStatus::Expired,
                webhook_enqueued: false,
                ..
            }
        ));
        assert_eq!(f.queue.enqueued_total().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_provider_rejected() {
        let f = fixture(None, TransactionStatus::Pending).await;

        let err = f.processor.process("paypal", notification("paid")).await.unwrap_err();
        assert!(matches!(err, NotificationError::UnsupportedProvider(p) if p == "paypal"));
    }

    #[tokio::test]
    async fn test_missing_order_id_is_malformed() {
        let f = fixture(None, TransactionStatus::Pending).await;

        let err = f
            .processor
            .process("mock", Notification::new(json!({"mock_status": "paid"})))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let f = fixture(None, TransactionStatus::Pending).await;

        let err = f
            .processor
            .process("mock", Notification::new(json!({"order_id": "ORD-404"})))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::TransactionNotFound(id) if id == "ORD-404"));
    }

    #[test]
    fn test_outcome_messages() {
        let applied = ProcessOutcome::Applied {
            transaction_id: Uuid::new_v4(),
            order_id: "ORD-1".to_string(),
            status: TransactionStatus::Paid,
            webhook_enqueued: true,
        };
        assert_eq!(applied.message(), "Transaction updated to PAID");

        let ignored = ProcessOutcome::Ignored {
            order_id: "ORD-1".to_string(),
            reason: IgnoreReason::UnknownStatus,
        };
        assert_eq!(ignored.message(), "Status not recognized, ignored");
    }

    /// Serves a fixed snapshot on lookup, so every caller sees the row as it
    /// was before any notification landed.
    struct StaleReads {
        inner: Arc<InMemoryTransactionRepository>,
        snapshot: Transaction,
    }

    #[async_trait]
    impl TransactionRepository for StaleReads {
        async fn create(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
            self.inner.create(tx).await
        }

        async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_order_id(&self, _order_id: &str) -> RepositoryResult<Option<Transaction>> {
            Ok(Some(self.snapshot.clone()))
        }

        async fn update_status(
            &self,
            id: Uuid,
            expected: TransactionStatus,
            status: TransactionStatus,
            raw_notification: &Value,
        ) -> RepositoryResult<Option<Transaction>> {
            self.inner
                .update_status(id, expected, status, raw_notification)
                .await
        }
    }

    struct SlowTransactions {
        delay: Duration,
    }

    #[async_trait]
    impl TransactionRepository for SlowTransactions {
        async fn create(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
            Ok(tx.clone())
        }

        async fn find_by_id(&self, _id: Uuid) -> RepositoryResult<Option<Transaction>> {
            tokio::time::sleep(self.delay).await;
            Ok(None)
        }

        async fn find_by_order_id(&self, _order_id: &str) -> RepositoryResult<Option<Transaction>> {
            tokio::time::sleep(self.delay).await;
            Ok(None)
        }

        async fn update_status(
            &self,
            _id: Uuid,
            _expected: TransactionStatus,
            _status: TransactionStatus,
            _raw_notification: &Value,
        ) -> RepositoryResult<Option<Transaction>> {
            tokio::time::sleep(self.delay).await;
            Ok(None)
        }
    }

    struct BrokenMerchants;

    #[async_trait]
    impl MerchantRepository for BrokenMerchants {
        async fn find_by_id(&self, _id: Uuid) -> RepositoryResult<Option<Merchant>> {
            Err(RepositoryError::Database("connection reset".to_string()))
        }
    }

    struct RejectingQueue;

    #[async_trait]
    impl WebhookQueue for RejectingQueue {
        async fn enqueue(&self, _task: &WebhookTask) -> Result<(), QueueError> {
            Err(QueueError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection refused",
            ))))
        }

        async fn dequeue(
            &self,
            _shutdown: &CancellationToken,
        ) -> Result<Option<WebhookTask>, QueueError> {
            Ok(None)
        }

        async fn schedule(&self, _task: &WebhookTask, _delay: Duration) -> Result<(), QueueError> {
            Ok(())
        }

        async fn promote_due(&self) -> Result<usize, QueueError> {
            Ok(0)
        }

        async fn dead_letter(&self, _task: &WebhookTask) -> Result<(), QueueError> {
            Ok(())
        }

        async fn dead_letters(&self, _limit: usize) -> Result<Vec<WebhookTask>, QueueError> {
            Ok(Vec::new())
        }

        async fn requeue_dead_letters(&self) -> Result<usize, QueueError> {
            Ok(0)
        }
    }

    fn mock_processor(
        transactions: Arc<dyn TransactionRepository>,
        merchants: Arc<dyn MerchantRepository>,
        queue: Arc<dyn WebhookQueue>,
        store_timeout: Duration,
    ) -> NotificationProcessor {
        NotificationProcessor::new(
            Arc::new(GatewayRegistry::new().with(Arc::new(MockGateway::new()))),
            transactions,
            merchants,
            queue,
            store_timeout,
        )
    }

    async fn seeded(
        callback_url: &str,
    ) -> (
        Arc<InMemoryTransactionRepository>,
        Arc<InMemoryMerchantRepository>,
        Transaction,
    ) {
        let transactions = Arc::new(InMemoryTransactionRepository::new());
        let merchants = Arc::new(InMemoryMerchantRepository::new());
        let merchant = Merchant::new("Toko".to_string(), Some(callback_url.to_string()));
        let tx = Transaction::new(
            merchant.id,
            "ORD-1".to_string(),
            "mock".to_string(),
            BigDecimal::from(10000),
            "IDR".to_string(),
            None,
        );
        merchants.put(merchant).await;
        transactions.put(tx.clone()).await;
        (transactions, merchants, tx)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicates_apply_once() {
        let (transactions, merchants, _) = seeded("http://merchant.test/cb").await;
        let queue = Arc::new(InMemoryWebhookQueue::new());
        let processor = Arc::new(mock_processor(
            transactions.clone(),
            merchants,
            queue.clone(),
            Duration::from_secs(1),
        ));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let processor = processor.clone();
                tokio::spawn(async move { processor.process("mock", notification("paid")).await })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                ProcessOutcome::Applied { .. } => applied += 1,
                ProcessOutcome::Ignored { reason, .. } => assert!(matches!(
                    reason,
                    IgnoreReason::AlreadyFinal(TransactionStatus::Paid) | IgnoreReason::Superseded
                )),
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(transactions.status_writes(), 1);
        assert_eq!(queue.enqueued_total().await, 1);
    }

    #[tokio::test]
    async fn test_lost_compare_and_set_is_superseded() {
        let (inner, merchants, snapshot) = seeded("http://merchant.test/cb").await;
        let queue = Arc::new(InMemoryWebhookQueue::new());
        let stale = Arc::new(StaleReads {
            inner: inner.clone(),
            snapshot,
        });
        let processor = mock_processor(stale, merchants, queue.clone(), Duration::from_secs(1));

        let first = processor.process("mock", notification("paid")).await.unwrap();
        assert!(matches!(first, ProcessOutcome::Applied { .. }));

        // Reads PENDING again, but the row is already PAID.
        let second = processor.process("mock", notification("failed")).await.unwrap();
        assert_eq!(
            second,
            ProcessOutcome::Ignored {
                order_id: "ORD-1".to_string(),
                reason: IgnoreReason::Superseded,
            }
        );

        let stored = inner.find_by_order_id("ORD-1").await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Paid);
        assert_eq!(inner.status_writes(), 1);
        assert_eq!(queue.enqueued_total().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_hits_deadline() {
        let processor = mock_processor(
            Arc::new(SlowTransactions {
                delay: Duration::from_secs(30),
            }),
            Arc::new(InMemoryMerchantRepository::new()),
            Arc::new(InMemoryWebhookQueue::new()),
            Duration::from_secs(1),
        );

        let err = processor
            .process("mock", notification("paid"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_enqueue_failure_keeps_applied_status() {
        let (transactions, merchants, _) = seeded("http://merchant.test/cb").await;
        let processor = mock_processor(
            transactions.clone(),
            merchants,
            Arc::new(RejectingQueue),
            Duration::from_secs(1),
        );

        let outcome = processor.process("mock", notification("paid")).await.unwrap();
        assert!(matches!(
            outcome,
            ProcessOutcome::Applied {
                status: TransactionStatus::Paid,
                webhook_enqueued: false,
                ..
            }
        ));

        let stored = transactions.find_by_order_id("ORD-1").await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Paid);
    }

    #[tokio::test]
    async fn test_merchant_lookup_failure_keeps_applied_status() {
        let (transactions, _, _) = seeded("http://merchant.test/cb").await;
        let queue = Arc::new(InMemoryWebhookQueue::new());
        let processor = mock_processor(
            transactions.clone(),
            Arc::new(BrokenMerchants),
            queue.clone(),
            Duration::from_secs(1),
        );

        let outcome = processor.process("mock", notification("expired")).await.unwrap();
        assert!(matches!(
            outcome,
            ProcessOutcome::Applied {
                status: TransactionStatus::Expired,
                webhook_enqueued: false,
                ..
            }
        ));

        let stored = transactions.find_by_order_id("ORD-1").await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Expired);
        assert_eq!(queue.enqueued_total().await, 0);
    }
}
