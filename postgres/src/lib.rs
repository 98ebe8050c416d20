//! # Chirp Postgres
//!
//! `PostgreSQL` implementations of the store traits in [`chirp_core::store`].
//!
//! Each service owns its tables and talks to them through one pool:
//!
//! | Store | Table(s) | Service |
//! |---|---|---|
//! | [`PgPostStore`] | `posts` | post |
//! | [`PgSearchStore`] | `search_documents` | search |
//! | [`PgMediaStore`] | `media` | media |
//! | [`PgUserStore`] | `users`, `refresh_tokens` | identity |
//!
//! # Example
//!
//! ```no_run
//! use chirp_postgres::{PgPostStore, connect, migrate};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = connect("postgres://localhost/chirp_posts", 10).await?;
//! migrate(&pool).await?;
//! let posts = PgPostStore::new(pool);
//! # Ok(())
//! # }
//! ```

mod media;
mod posts;
mod search;
mod users;

pub use media::PgMediaStore;
pub use posts::PgPostStore;
pub use search::PgSearchStore;
pub use users::PgUserStore;

use chirp_core::store::StoreError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if the first connection fails.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Unavailable(format!("Failed to connect to database: {e}")))?;
    tracing::info!(max_connections, "Connected to PostgreSQL");
    Ok(pool)
}

/// Run the embedded migrations.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Unavailable(format!("Migration failed: {e}")))?;
    Ok(())
}

/// Map a driver error onto the store taxonomy.
///
/// Unique-constraint violations become [`StoreError::Conflict`], row decoding
/// problems become [`StoreError::Corrupt`] and everything else is treated as
/// the database being unreachable.
pub(crate) fn store_error(context: &str, error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(format!("{context}: {}", db.message()))
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::Corrupt(format!("{context}: {error}")),
        _ => {
            metrics::counter!("store.errors", "context" => context.to_string()).increment(1);
            StoreError::Unavailable(format!("{context}: {error}"))
        }
    }
}

/// Convert a page size or offset to the `BIGINT` Postgres expects.
pub(crate) fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
