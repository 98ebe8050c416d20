//! `users` and `refresh_tokens` tables.

use crate::store_error;
use async_trait::async_trait;
use chirp_core::ids::UserId;
use chirp_core::model::{RefreshToken, User};
use chirp_core::store::{StoreError, UserStore};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Account store backed by `PostgreSQL`.
#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: &PgRow) -> Result<User, StoreError> {
        let get = |e| store_error("users row", e);
        let id: Uuid = row.try_get("id").map_err(get)?;
        Ok(User {
            id: UserId::from_uuid(id),
            username: row.try_get("username").map_err(get)?,
            email: row.try_get("email").map_err(get)?,
            password_hash: row.try_get("password_hash").map_err(get)?,
            created_at: row.try_get("created_at").map_err(get)?,
        })
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO users (id, username, email, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to create user", e))?;
        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE username = $1
            ",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to load user", e))?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to load user", e))?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn save_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO refresh_tokens (token, user_id, expires_at)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(&token.token)
        .bind(token.user_id.as_uuid())
        .bind(token.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to save refresh token", e))?;
        Ok(())
    }

    async fn take_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        let row = sqlx::query(
            r"
            DELETE FROM refresh_tokens
            WHERE token = $1
            RETURNING token, user_id, expires_at
            ",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to consume refresh token", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let get = |e| store_error("refresh_tokens row", e);
        let user_id: Uuid = row.try_get("user_id").map_err(get)?;
        Ok(Some(RefreshToken {
            token: row.try_get("token").map_err(get)?,
            user_id: UserId::from_uuid(user_id),
            expires_at: row.try_get("expires_at").map_err(get)?,
        }))
    }
}
