//! `media` table.

use crate::store_error;
use async_trait::async_trait;
use chirp_core::ids::{MediaId, UserId};
use chirp_core::model::MediaRecord;
use chirp_core::store::{MediaStore, StoreError};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

const COLUMNS: &str =
    "id, blob_id, original_name, mime_type, url, owner_id, created_at, pending_delete";

/// Media record store backed by `PostgreSQL`.
#[derive(Clone, Debug)]
pub struct PgMediaStore {
    pool: PgPool,
}

impl PgMediaStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &PgRow) -> Result<MediaRecord, StoreError> {
        let get = |e| store_error("media row", e);
        let id: Uuid = row.try_get("id").map_err(get)?;
        let owner: Uuid = row.try_get("owner_id").map_err(get)?;
        Ok(MediaRecord {
            id: MediaId::from_uuid(id),
            blob_id: row.try_get("blob_id").map_err(get)?,
            original_name: row.try_get("original_name").map_err(get)?,
            mime_type: row.try_get("mime_type").map_err(get)?,
            url: row.try_get("url").map_err(get)?,
            owner: UserId::from_uuid(owner),
            created_at: row.try_get("created_at").map_err(get)?,
            pending_delete: row.try_get("pending_delete").map_err(get)?,
        })
    }
}

#[async_trait]
impl MediaStore for PgMediaStore {
    async fn insert(&self, record: &MediaRecord) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO media (
                id, blob_id, original_name, mime_type, url, owner_id, created_at, pending_delete
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(record.id.as_uuid())
        .bind(&record.blob_id)
        .bind(&record.original_name)
        .bind(&record.mime_type)
        .bind(&record.url)
        .bind(record.owner.as_uuid())
        .bind(record.created_at)
        .bind(record.pending_delete)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to insert media record", e))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<MediaRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM media ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to list media", e))?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn find_many(&self, ids: &[MediaId]) -> Result<Vec<MediaRecord>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = ids.iter().map(MediaId::as_uuid).collect();
        let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM media WHERE id = ANY($1)"))
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("Failed to load media records", e))?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn delete(&self, id: MediaId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM media WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("Failed to delete media record", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_pending_delete(&self, id: MediaId) -> Result<(), StoreError> {
        sqlx::query("UPDATE media SET pending_delete = TRUE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("Failed to mark media pending delete", e))?;
        Ok(())
    }

    async fn list_pending_delete(&self) -> Result<Vec<MediaRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM media WHERE pending_delete ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to list pending media deletes", e))?;

        rows.iter().map(Self::row_to_record).collect()
    }
}
