//! Postgres implementation of TransactionRepository.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionStatus};
use crate::ports::{RepositoryError, RepositoryResult, TransactionRepository};

const COLUMNS: &str = "id, merchant_id, order_id, provider, amount, currency, payment_method, \
    external_ref, payment_url, raw_notification, status, created_at, updated_at";

/// Postgres-backed transaction repository.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn create(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions (
                id, merchant_id, order_id, provider, amount, currency, payment_method,
                external_ref, payment_url, raw_notification, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(tx.id)
        .bind(tx.merchant_id)
        .bind(&tx.order_id)
        .bind(&tx.provider)
        .bind(&tx.amount)
        .bind(&tx.currency)
        .bind(&tx.payment_method)
        .bind(&tx.external_ref)
        .bind(&tx.payment_url)
        .bind(&tx.raw_notification)
        .bind(tx.status.as_str())
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.into_domain()
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn find_by_order_id(&self, order_id: &str) -> RepositoryResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {COLUMNS} FROM transactions WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: TransactionStatus,
        status: TransactionStatus,
        raw_notification: &Value,
    ) -> RepositoryResult<Option<Transaction>> {
        // The status predicate makes this a compare-and-set: two concurrent
        // duplicates cannot both apply.
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE transactions
            SET status = $3, raw_notification = $4, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(expected.as_str())
        .bind(status.as_str())
        .bind(raw_notification)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.map(TransactionRow::into_domain).transpose()
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    merchant_id: Uuid,
    order_id: String,
    provider: String,
    amount: bigdecimal::BigDecimal,
    currency: String,
    payment_method: Option<String>,
    external_ref: Option<String>,
    payment_url: Option<String>,
    raw_notification: Option<Value>,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        let status = self
            .status
            .parse::<TransactionStatus>()
            .map_err(|e| RepositoryError::Corrupt(format!("transaction {}: {}", self.id, e)))?;

        Ok(Transaction {
            id: self.id,
            merchant_id: self.merchant_id,
            order_id: self.order_id,
            provider: self.provider,
            amount: self.amount,
            currency: self.currency,
            payment_method: self.payment_method,
            external_ref: self.external_ref,
            payment_url: self.payment_url,
            raw_notification: self.raw_notification,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
