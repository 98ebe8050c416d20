//! `search_documents` table.
//!
//! Matching uses `plainto_tsquery('simple', ..)` against the GIN index on
//! `to_tsvector('simple', content)`, so every query word must appear in the
//! document. Results are newest first.
//!
//! Deletes leave a row in `search_tombstones`; upserts for a tombstoned id
//! write nothing. Both statements lock the tombstone key first, so a create
//! racing a delete for the same post serializes behind it.

use crate::{store_error, to_i64};
use async_trait::async_trait;
use chirp_core::ids::{PostId, UserId};
use chirp_core::model::SearchDocument;
use chirp_core::store::{SearchStore, StoreError};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Search index backed by `PostgreSQL` full-text search.
#[derive(Clone, Debug)]
pub struct PgSearchStore {
    pool: PgPool,
}

impl PgSearchStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_document(row: &PgRow) -> Result<SearchDocument, StoreError> {
        let post_id: Uuid = row
            .try_get("post_id")
            .map_err(|e| store_error("search_documents.post_id", e))?;
        let user_id: Uuid = row
            .try_get("user_id")
            .map_err(|e| store_error("search_documents.user_id", e))?;
        Ok(SearchDocument {
            post_id: PostId::from_uuid(post_id),
            user_id: UserId::from_uuid(user_id),
            content: row
                .try_get("content")
                .map_err(|e| store_error("search_documents.content", e))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| store_error("search_documents.created_at", e))?,
        })
    }
}

/// Transaction-scoped advisory lock on a post id.
async fn lock_post(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    post_id: PostId,
) -> Result<(), StoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(post_id.as_uuid())
        .execute(&mut **tx)
        .await
        .map_err(|e| store_error("Failed to lock search document", e))?;
    Ok(())
}

#[async_trait]
impl SearchStore for PgSearchStore {
    async fn upsert(&self, doc: &SearchDocument) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("Failed to begin search upsert", e))?;
        lock_post(&mut tx, doc.post_id).await?;

        let result = sqlx::query(
            r"
            INSERT INTO search_documents (post_id, user_id, content, created_at)
            SELECT $1, $2, $3, $4
            WHERE NOT EXISTS (SELECT 1 FROM search_tombstones WHERE post_id = $1)
            ON CONFLICT (post_id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                content = EXCLUDED.content,
                created_at = EXCLUDED.created_at
            ",
        )
        .bind(doc.post_id.as_uuid())
        .bind(doc.user_id.as_uuid())
        .bind(&doc.content)
        .bind(doc.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| store_error("Failed to upsert search document", e))?;

        tx.commit()
            .await
            .map_err(|e| store_error("Failed to commit search upsert", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, post_id: PostId) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("Failed to begin search delete", e))?;
        lock_post(&mut tx, post_id).await?;

        sqlx::query("INSERT INTO search_tombstones (post_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(post_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("Failed to tombstone search document", e))?;
        let result = sqlx::query("DELETE FROM search_documents WHERE post_id = $1")
            .bind(post_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("Failed to delete search document", e))?;

        tx.commit()
            .await
            .map_err(|e| store_error("Failed to commit search delete", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn search(&self, query: &str, limit: u64) -> Result<Vec<SearchDocument>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT post_id, user_id, content, created_at
            FROM search_documents
            WHERE to_tsvector('simple', content) @@ plainto_tsquery('simple', $1)
            ORDER BY created_at DESC
            LIMIT $2
            ",
        )
        .bind(query)
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to search posts", e))?;

        rows.iter().map(Self::row_to_document).collect()
    }
}
