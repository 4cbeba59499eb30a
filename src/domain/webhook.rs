//! Merchant webhook delivery task and the body sent to merchants.

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transaction::{Transaction, TransactionStatus};

/// One pending merchant callback.
///
/// This is also the queue wire shape. A task is a self-contained snapshot of
/// the transaction at enqueue time so that retries never re-read the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookTask {
    pub transaction_id: Uuid,
    pub order_id: String,
    pub status: TransactionStatus,
    pub amount: BigDecimal,
    pub provider: String,
    pub callback_url: String,
    #[serde(default)]
    pub retry_count: u32,
}

impl WebhookTask {
    pub fn from_transaction(tx: &Transaction, callback_url: &str) -> Self {
        Self {
            transaction_id: tx.id,
            order_id: tx.order_id.clone(),
            status: tx.status,
            amount: tx.amount.clone(),
            provider: tx.provider.clone(),
            callback_url: callback_url.to_string(),
            retry_count: 0,
        }
    }

    pub fn next_attempt(mut self) -> Self {
        self.retry_count += 1;
        self
    }

    pub fn body(&self) -> MerchantWebhookBody {
        MerchantWebhookBody {
            transaction_id: self.transaction_id,
            order_id: self.order_id.clone(),
            status: self.status,
            amount: self.amount.clone(),
            provider: self.provider.clone(),
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// Body POSTed to the merchant. Only merchant-safe fields; the raw provider
/// payload and the callback URL stay internal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantWebhookBody {
    pub transaction_id: Uuid,
    pub order_id: String,
    pub status: TransactionStatus,
    pub amount: BigDecimal,
    pub provider: String,
    pub timestamp: i64,
}
