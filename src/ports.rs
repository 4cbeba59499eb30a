//! Repository contracts for the stores the pipeline depends on.
//! Adapters live in `crate::adapters`.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Merchant, Transaction, TransactionStatus};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(db.message().to_string())
            }
            other => RepositoryError::Database(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn create(&self, tx: &Transaction) -> RepositoryResult<Transaction>;

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Transaction>>;

    async fn find_by_order_id(&self, order_id: &str) -> RepositoryResult<Option<Transaction>>;

    /// Atomically replaces status and raw notification, but only while the
    /// stored status still equals `expected`. Returns `None` when the row
    /// moved on in between (another notification won the race).
    async fn update_status(
        &self,
        id: Uuid,
        expected: TransactionStatus,
        status: TransactionStatus,
        raw_notification: &Value,
    ) -> RepositoryResult<Option<Transaction>>;
}

#[async_trait]
pub trait MerchantRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Merchant>>;
}
