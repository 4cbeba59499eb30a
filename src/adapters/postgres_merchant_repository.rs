//! Postgres implementation of MerchantRepository.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::Merchant;
use crate::ports::{MerchantRepository, RepositoryError, RepositoryResult};

#[derive(Clone)]
pub struct PostgresMerchantRepository {
    pool: PgPool,
}

impl PostgresMerchantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MerchantRepository for PostgresMerchantRepository {
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Merchant>> {
        let row = sqlx::query_as::<_, MerchantRow>(
            "SELECT id, name, callback_url, created_at, updated_at FROM merchants WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(row.map(MerchantRow::into_domain))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MerchantRow {
    id: Uuid,
    name: String,
    callback_url: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl MerchantRow {
    fn into_domain(self) -> Merchant {
        Merchant {
            id: self.id,
            name: self.name,
            callback_url: self.callback_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
