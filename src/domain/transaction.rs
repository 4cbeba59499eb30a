//! Transaction domain entity.
//! Framework-agnostic representation of a payment transaction.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a transaction.
///
/// `Pending` is the only non-terminal status. Once a transaction reaches
/// `Paid`, `Failed` or `Expired` no further transition is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Paid,
    Failed,
    Expired,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Paid => "PAID",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown transaction status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for TransactionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(TransactionStatus::Pending),
            "PAID" => Ok(TransactionStatus::Paid),
            "FAILED" => Ok(TransactionStatus::Failed),
            "EXPIRED" => Ok(TransactionStatus::Expired),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// Status produced by a provider's status mapper.
///
/// `Unknown` covers provider vocabulary with no internal meaning; it is
/// never written to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappedStatus {
    Pending,
    Paid,
    Failed,
    Expired,
    Unknown,
}

impl MappedStatus {
    pub fn into_transaction_status(self) -> Option<TransactionStatus> {
        match self {
            MappedStatus::Pending => Some(TransactionStatus::Pending),
            MappedStatus::Paid => Some(TransactionStatus::Paid),
            MappedStatus::Failed => Some(TransactionStatus::Failed),
            MappedStatus::Expired => Some(TransactionStatus::Expired),
            MappedStatus::Unknown => None,
        }
    }
}

/// Domain entity representing a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub order_id: String,
    pub provider: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub payment_method: Option<String>,
    pub external_ref: Option<String>,
    pub payment_url: Option<String>,
    /// Last provider notification, stored verbatim for audit.
    pub raw_notification: Option<serde_json::Value>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        merchant_id: Uuid,
        order_id: String,
        provider: String,
        amount: BigDecimal,
        currency: String,
        payment_method: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            merchant_id,
            order_id,
            provider,
            amount,
            currency,
            payment_method,
            external_ref: None,
            payment_url: None,
            raw_notification: None,
            status: TransactionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}
