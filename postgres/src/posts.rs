//! `posts` table.

use crate::{store_error, to_i64};
use async_trait::async_trait;
use chirp_core::ids::{MediaId, PostId, UserId};
use chirp_core::model::Post;
use chirp_core::store::{PostStore, StoreError};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Post store backed by `PostgreSQL`.
#[derive(Clone, Debug)]
pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_post(row: &PgRow) -> Result<Post, StoreError> {
        let id: Uuid = row.try_get("id").map_err(|e| store_error("posts.id", e))?;
        let owner: Uuid = row
            .try_get("owner_id")
            .map_err(|e| store_error("posts.owner_id", e))?;
        let media_ids: Vec<Uuid> = row
            .try_get("media_ids")
            .map_err(|e| store_error("posts.media_ids", e))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| store_error("posts.created_at", e))?;

        Ok(Post {
            id: PostId::from_uuid(id),
            owner: UserId::from_uuid(owner),
            content: row
                .try_get("content")
                .map_err(|e| store_error("posts.content", e))?,
            media_ids: media_ids.into_iter().map(MediaId::from_uuid).collect(),
            created_at,
        })
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn insert(&self, post: &Post) -> Result<(), StoreError> {
        let media_ids: Vec<Uuid> = post.media_ids.iter().map(MediaId::as_uuid).collect();
        sqlx::query(
            r"
            INSERT INTO posts (id, owner_id, content, media_ids, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(post.id.as_uuid())
        .bind(post.owner.as_uuid())
        .bind(&post.content)
        .bind(&media_ids)
        .bind(post.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to insert post", e))?;
        Ok(())
    }

    async fn find(&self, id: PostId) -> Result<Option<Post>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, owner_id, content, media_ids, created_at
            FROM posts
            WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to load post", e))?;

        row.as_ref().map(Self::row_to_post).transpose()
    }

    async fn list_recent(&self, offset: u64, limit: u64) -> Result<Vec<Post>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, owner_id, content, media_ids, created_at
            FROM posts
            ORDER BY created_at DESC, id DESC
            OFFSET $1
            LIMIT $2
            ",
        )
        .bind(to_i64(offset))
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to list posts", e))?;

        rows.iter().map(Self::row_to_post).collect()
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| store_error("Failed to count posts", e))?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn delete_owned(&self, id: PostId, owner: UserId) -> Result<Option<Post>, StoreError> {
        let row = sqlx::query(
            r"
            DELETE FROM posts
            WHERE id = $1 AND owner_id = $2
            RETURNING id, owner_id, content, media_ids, created_at
            ",
        )
        .bind(id.as_uuid())
        .bind(owner.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to delete post", e))?;

        row.as_ref().map(Self::row_to_post).transpose()
    }
}
