//! In-process store adapters for tests and single-node development runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{Merchant, Transaction, TransactionStatus};
use crate::ports::{
    MerchantRepository, RepositoryError, RepositoryResult, TransactionRepository,
};

#[derive(Debug, Clone, Default)]
pub struct InMemoryTransactionRepository {
    rows: Arc<RwLock<HashMap<Uuid, Transaction>>>,
    status_writes: Arc<AtomicUsize>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of status updates that were actually applied.
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    /// Inserts or replaces a row as-is, bypassing `create` checks.
    pub async fn put(&self, tx: Transaction) {
        self.rows.write().await.insert(tx.id, tx);
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn create(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let mut rows = self.rows.write().await;
        if rows.values().any(|t| t.order_id == tx.order_id) {
            return Err(RepositoryError::Conflict(format!(
                "duplicate order_id: {}",
                tx.order_id
            )));
        }
        rows.insert(tx.id, tx.clone());
        Ok(tx.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_by_order_id(&self, order_id: &str) -> RepositoryResult<Option<Transaction>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|t| t.order_id == order_id)
            .cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: TransactionStatus,
        status: TransactionStatus,
        raw_notification: &Value,
    ) -> RepositoryResult<Option<Transaction>> {
        let mut rows = self.rows.write().await;
        let Some(tx) = rows.get_mut(&id) else {
            return Err(RepositoryError::NotFound(id.to_string()));
        };
        if tx.status != expected {
            return Ok(None);
        }

        tx.status = status;
        tx.raw_notification = Some(raw_notification.clone());
        tx.updated_at = Utc::now();
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(Some(tx.clone()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryMerchantRepository {
    rows: Arc<RwLock<HashMap<Uuid, Merchant>>>,
}

impl InMemoryMerchantRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, merchant: Merchant) {
        self.rows.write().await.insert(merchant.id, merchant);
    }
}

#[async_trait]
impl MerchantRepository for InMemoryMerchantRepository {
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Merchant>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }
}
