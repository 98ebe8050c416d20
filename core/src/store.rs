//! Collaborator traits implemented by storage backends.
//!
//! Each service holds its collaborators as `Arc<dyn Trait>` so production
//! code runs against Postgres/Redis/filesystem backends and tests run against
//! the in-memory versions in `chirp-testing`.
//!
//! | Trait | Production | Owner |
//! |---|---|---|
//! | [`PostStore`] | `chirp-postgres` | post service |
//! | [`SearchStore`] | `chirp-postgres` | search service |
//! | [`MediaStore`] | `chirp-postgres` | media service |
//! | [`UserStore`] | `chirp-postgres` | identity service |
//! | [`BlobStore`] | filesystem | media service |
//! | [`KeyValueStore`] | `chirp-redis` | gateway, post service |

use crate::ids::{MediaId, PostId, UserId};
use crate::model::{MediaRecord, Post, RefreshToken, SearchDocument, User};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors from document stores.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or the query failed
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness constraint was violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored row could not be mapped back into a record
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Errors from the shared key-value store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    /// Connection or command failure
    #[error("Key-value store error: {0}")]
    Backend(String),

    /// The store returned a value of an unexpected shape
    #[error("Unexpected key-value response: {0}")]
    UnexpectedResponse(String),
}

/// Errors from the blob store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobError {
    /// The blob store could not be reached or the operation failed
    #[error("Blob store unavailable: {0}")]
    Unavailable(String),

    /// The upload was refused (bad name, unsupported type)
    #[error("Upload rejected: {0}")]
    Rejected(String),
}

/// Result of an atomic increment on a windowed counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Counter value after the increment.
    pub count: u64,
    /// Time until the counter expires and the window resets.
    pub resets_in: Duration,
}

/// Shared key-value store (cache entries and rate-limit counters).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value. Expired entries are never returned.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] on backend failure.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Store a value with an absolute expiry `ttl` from now.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] on backend failure.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;

    /// Remove a key. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] on backend failure.
    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    /// Remove every key matching a glob pattern (see [`crate::glob`]).
    /// Returns the number of keys removed.
    ///
    /// Implementations iterate with a cursor and never block the store
    /// with a full keyspace listing.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] on backend failure.
    async fn delete_matching(&self, pattern: &str) -> Result<u64, KvError>;

    /// Atomically increment a counter, starting a `window`-long expiry when
    /// the counter is created.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] on backend failure.
    async fn increment_with_expiry(&self, key: &str, window: Duration)
    -> Result<WindowCount, KvError>;
}

/// Authoritative post storage.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Persist a new post.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure or duplicate id.
    async fn insert(&self, post: &Post) -> Result<(), StoreError>;

    /// Fetch one post.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure.
    async fn find(&self, id: PostId) -> Result<Option<Post>, StoreError>;

    /// Fetch posts newest first, skipping `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure.
    async fn list_recent(&self, offset: u64, limit: u64) -> Result<Vec<Post>, StoreError>;

    /// Total number of posts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure.
    async fn count(&self) -> Result<u64, StoreError>;

    /// Delete a post only if it is owned by `owner`. Returns the removed
    /// post, or `None` when there was nothing to delete.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure.
    async fn delete_owned(&self, id: PostId, owner: UserId) -> Result<Option<Post>, StoreError>;
}

/// Search index maintained from post events.
#[async_trait]
pub trait SearchStore: Send + Sync {
    /// Insert or replace the document for `doc.post_id`. Returns `false`
    /// without writing when the post has already been deleted, so a
    /// `post.created` delivered after its `post.deleted` cannot bring the
    /// document back.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure.
    async fn upsert(&self, doc: &SearchDocument) -> Result<bool, StoreError>;

    /// Remove the document for a post and tombstone its id. Returns whether
    /// a document existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure.
    async fn delete(&self, post_id: PostId) -> Result<bool, StoreError>;

    /// Full-text search, best matches first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure.
    async fn search(&self, query: &str, limit: u64) -> Result<Vec<SearchDocument>, StoreError>;
}

/// Media metadata storage.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Persist a new record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure.
    async fn insert(&self, record: &MediaRecord) -> Result<(), StoreError>;

    /// All records, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure.
    async fn list(&self) -> Result<Vec<MediaRecord>, StoreError>;

    /// Records with the given ids. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure.
    async fn find_many(&self, ids: &[MediaId]) -> Result<Vec<MediaRecord>, StoreError>;

    /// Remove a record. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure.
    async fn delete(&self, id: MediaId) -> Result<bool, StoreError>;

    /// Flag a record whose blob could not be deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure.
    async fn mark_pending_delete(&self, id: MediaId) -> Result<(), StoreError>;

    /// Records flagged by [`MediaStore::mark_pending_delete`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure.
    async fn list_pending_delete(&self) -> Result<Vec<MediaRecord>, StoreError>;
}

/// Accounts and refresh tokens.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist a new user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the username or email is taken.
    async fn insert(&self, user: &User) -> Result<(), StoreError>;

    /// Look up by username.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Look up by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure.
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Persist a refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure.
    async fn save_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError>;

    /// Remove and return a refresh token (single use).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on failure.
    async fn take_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError>;
}

/// Location of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Identifier used to delete the blob later.
    pub blob_id: String,
    /// Public URL.
    pub url: String,
}

/// Object storage for uploaded media.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a blob.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError`] on failure.
    async fn upload(
        &self,
        original_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredBlob, BlobError>;

    /// Delete a blob. Deleting a missing blob succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError`] on failure.
    async fn delete(&self, blob_id: &str) -> Result<(), BlobError>;
}
