//! PostgreSQL storage adapter.
//!
//! This module implements the [`DocumentSource`] port defined in
//! `shopbook-core` using PostgreSQL as the authoritative remote store.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool and migrations
//! - [`PgDocumentSource`] - Executes resolved queries against the `documents` table
//!
//! # Usage
//!
//! ```ignore
//! let config = DatabaseConfig::for_browsing(&database_url);
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let remote: Arc<dyn DocumentSource> = Arc::new(PgDocumentSource::new(&db));
//! ```

mod database;
mod helpers;

pub use database::{Database, DatabaseConfig, PurgeStats};
pub use helpers::{SelectStatement, SqlParam, build_select};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{debug, instrument};

use shopbook_core::error::{StorageError, StorageResult};
use shopbook_core::models::{Document, ShopScope};
use shopbook_core::ports::{DocumentSource, FetchRequest};

// =============================================================================
// Document Source
// =============================================================================

/// PostgreSQL implementation of DocumentSource.
pub struct PgDocumentSource {
    pool: PgPool,
}

impl PgDocumentSource {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Insert or replace documents of one collection.
    #[instrument(skip(self, documents), fields(shop = %scope.shop_id, count = documents.len()))]
    pub async fn upsert(
        &self,
        scope: &ShopScope,
        collection: &str,
        documents: &[Document],
    ) -> StorageResult<u64> {
        if documents.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for doc in documents {
            sqlx::query(
                r#"
                INSERT INTO documents (shop_id, collection, id, data, updated_at)
                VALUES ($1, $2, $3, $4, NOW())
                ON CONFLICT (shop_id, collection, id) DO UPDATE SET
                    data = EXCLUDED.data,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(&scope.shop_id)
            .bind(collection)
            .bind(&doc.id)
            .bind(Json(&doc.fields))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        debug!("Documents upserted");
        Ok(documents.len() as u64)
    }
}

#[async_trait]
impl DocumentSource for PgDocumentSource {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn fetch(&self, request: &FetchRequest<'_>) -> StorageResult<Vec<Document>> {
        let statement = build_select(request)?;

        let mut query = sqlx::query_as::<_, DocumentRow>(&statement.sql);
        for param in statement.params {
            query = match param {
                SqlParam::Text(text) => query.bind(text),
                SqlParam::Json(value) => query.bind(Json(value)),
            };
        }

        let rows = query.fetch_all(&self.pool).await.map_err(map_sqlx_error)?;

        rows.into_iter().map(DocumentRow::into_document).collect()
    }
}

/// Split sqlx failures into "could not reach the store" and everything else.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => StorageError::Unavailable(err.to_string()),
        _ => StorageError::QueryError(err.to_string()),
    }
}

// =============================================================================
// Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    data: Json<Value>,
}

impl DocumentRow {
    fn into_document(self) -> StorageResult<Document> {
        Document::from_value(self.id, self.data.0)
            .map_err(|e| StorageError::SerializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_failures_are_unavailable() {
        assert!(map_sqlx_error(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(map_sqlx_error(sqlx::Error::PoolClosed).is_unavailable());
        assert!(!map_sqlx_error(sqlx::Error::RowNotFound).is_unavailable());
    }

    #[test]
    fn test_row_requires_object() {
        let row = DocumentRow {
            id: "c1".into(),
            data: Json(serde_json::json!([1, 2])),
        };
        assert!(matches!(
            row.into_document(),
            Err(StorageError::SerializationError(_))
        ));
    }
}
