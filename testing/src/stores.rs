//! In-memory document and blob stores.
//!
//! Each store is a cheap `Clone` handle over shared state so a test can keep
//! one handle for assertions and give another to the code under test.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use async_trait::async_trait;
use chirp_core::ids::{MediaId, PostId, UserId};
use chirp_core::model::{MediaRecord, Post, RefreshToken, SearchDocument, User};
use chirp_core::store::{
    BlobError, BlobStore, MediaStore, PostStore, SearchStore, StoreError, StoredBlob, UserStore,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

fn unavailable() -> StoreError {
    StoreError::Unavailable("in-memory store marked unavailable".to_string())
}

// ═══════════════════════════════════════════════════════════════════════════
// Posts
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct PostState {
    posts: HashMap<PostId, Post>,
    unavailable: bool,
}

/// In-memory [`PostStore`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryPostStore {
    state: Arc<RwLock<PostState>>,
}

impl InMemoryPostStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unwrap().unavailable = unavailable;
    }

    /// Whether a post exists.
    #[must_use]
    pub fn contains(&self, id: PostId) -> bool {
        self.state.read().unwrap().posts.contains_key(&id)
    }

    /// Number of stored posts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().unwrap().posts.len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.state.read().unwrap().unavailable {
            Err(unavailable())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PostStore for InMemoryPostStore {
    async fn insert(&self, post: &Post) -> Result<(), StoreError> {
        self.check()?;
        let mut state = self.state.write().unwrap();
        if state.posts.contains_key(&post.id) {
            return Err(StoreError::Conflict(format!("post {} exists", post.id)));
        }
        state.posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn find(&self, id: PostId) -> Result<Option<Post>, StoreError> {
        self.check()?;
        Ok(self.state.read().unwrap().posts.get(&id).cloned())
    }

    async fn list_recent(&self, offset: u64, limit: u64) -> Result<Vec<Post>, StoreError> {
        self.check()?;
        let mut posts: Vec<Post> = self.state.read().unwrap().posts.values().cloned().collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(posts
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.check()?;
        Ok(self.state.read().unwrap().posts.len() as u64)
    }

    async fn delete_owned(&self, id: PostId, owner: UserId) -> Result<Option<Post>, StoreError> {
        self.check()?;
        let mut state = self.state.write().unwrap();
        if state.posts.get(&id).is_some_and(|p| p.owner == owner) {
            Ok(state.posts.remove(&id))
        } else {
            Ok(None)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Search
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct SearchState {
    docs: HashMap<PostId, SearchDocument>,
    deleted: HashSet<PostId>,
    unavailable: bool,
}

/// In-memory [`SearchStore`]. Matches documents containing every query word,
/// case-insensitively.
#[derive(Clone, Debug, Default)]
pub struct InMemorySearchStore {
    state: Arc<RwLock<SearchState>>,
}

impl InMemorySearchStore {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unwrap().unavailable = unavailable;
    }

    /// The indexed document for a post.
    #[must_use]
    pub fn get(&self, post_id: PostId) -> Option<SearchDocument> {
        self.state.read().unwrap().docs.get(&post_id).cloned()
    }

    /// Number of indexed documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().unwrap().docs.len()
    }

    /// Check if the index is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.state.read().unwrap().unavailable {
            Err(unavailable())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SearchStore for InMemorySearchStore {
    async fn upsert(&self, doc: &SearchDocument) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.state.write().unwrap();
        if state.deleted.contains(&doc.post_id) {
            return Ok(false);
        }
        state.docs.insert(doc.post_id, doc.clone());
        Ok(true)
    }

    async fn delete(&self, post_id: PostId) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.state.write().unwrap();
        state.deleted.insert(post_id);
        Ok(state.docs.remove(&post_id).is_some())
    }

    async fn search(&self, query: &str, limit: u64) -> Result<Vec<SearchDocument>, StoreError> {
        self.check()?;
        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchDocument> = self
            .state
            .read()
            .unwrap()
            .docs
            .values()
            .filter(|doc| {
                let content = doc.content.to_lowercase();
                terms.iter().all(|t| content.contains(t.as_str()))
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        hits.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(hits)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Media
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct MediaState {
    records: HashMap<MediaId, MediaRecord>,
    unavailable: bool,
}

/// In-memory [`MediaStore`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryMediaStore {
    state: Arc<RwLock<MediaState>>,
}

impl InMemoryMediaStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unwrap().unavailable = unavailable;
    }

    /// A stored record.
    #[must_use]
    pub fn get(&self, id: MediaId) -> Option<MediaRecord> {
        self.state.read().unwrap().records.get(&id).cloned()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().unwrap().records.len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.state.read().unwrap().unavailable {
            Err(unavailable())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MediaStore for InMemoryMediaStore {
    async fn insert(&self, record: &MediaRecord) -> Result<(), StoreError> {
        self.check()?;
        self.state
            .write()
            .unwrap()
            .records
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<MediaRecord>, StoreError> {
        self.check()?;
        let mut records: Vec<MediaRecord> =
            self.state.read().unwrap().records.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn find_many(&self, ids: &[MediaId]) -> Result<Vec<MediaRecord>, StoreError> {
        self.check()?;
        let state = self.state.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| state.records.get(id).cloned())
            .collect())
    }

    async fn delete(&self, id: MediaId) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.state.write().unwrap().records.remove(&id).is_some())
    }

    async fn mark_pending_delete(&self, id: MediaId) -> Result<(), StoreError> {
        self.check()?;
        if let Some(record) = self.state.write().unwrap().records.get_mut(&id) {
            record.pending_delete = true;
        }
        Ok(())
    }

    async fn list_pending_delete(&self) -> Result<Vec<MediaRecord>, StoreError> {
        self.check()?;
        Ok(self
            .state
            .read()
            .unwrap()
            .records
            .values()
            .filter(|r| r.pending_delete)
            .cloned()
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct UserState {
    users: HashMap<UserId, User>,
    refresh_tokens: HashMap<String, RefreshToken>,
}

/// In-memory [`UserStore`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryUserStore {
    state: Arc<RwLock<UserState>>,
}

impl InMemoryUserStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of refresh tokens currently stored.
    #[must_use]
    pub fn refresh_token_count(&self) -> usize {
        self.state.read().unwrap().refresh_tokens.len()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        if state
            .users
            .values()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(StoreError::Conflict("user already exists".to_string()));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .state
            .read()
            .unwrap()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().unwrap().users.get(&id).cloned())
    }

    async fn save_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError> {
        self.state
            .write()
            .unwrap()
            .refresh_tokens
            .insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn take_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.state.write().unwrap().refresh_tokens.remove(token))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Blobs
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct BlobState {
    blobs: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    fail_all: bool,
}

/// In-memory [`BlobStore`] with delete-failure injection.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBlobStore {
    state: Arc<RwLock<BlobState>>,
}

impl InMemoryBlobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a blob directly, bypassing upload.
    pub fn seed(&self, blob_id: &str, bytes: &[u8]) {
        self.state
            .write()
            .unwrap()
            .blobs
            .insert(blob_id.to_string(), bytes.to_vec());
    }

    /// Make deletes of one blob fail (`true`) or succeed again (`false`).
    pub fn fail_deletes_for(&self, blob_id: &str, failing: bool) {
        let mut state = self.state.write().unwrap();
        if failing {
            state.failing.insert(blob_id.to_string());
        } else {
            state.failing.remove(blob_id);
        }
    }

    /// Make every delete fail (`true`) or succeed again (`false`).
    pub fn fail_all_deletes(&self, failing: bool) {
        self.state.write().unwrap().fail_all = failing;
    }

    /// Whether a blob exists.
    #[must_use]
    pub fn contains(&self, blob_id: &str) -> bool {
        self.state.read().unwrap().blobs.contains_key(blob_id)
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().unwrap().blobs.len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn upload(
        &self,
        original_name: &str,
        _content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredBlob, BlobError> {
        if original_name.is_empty() {
            return Err(BlobError::Rejected("file name is empty".to_string()));
        }
        let blob_id = uuid::Uuid::new_v4().to_string();
        self.state
            .write()
            .unwrap()
            .blobs
            .insert(blob_id.clone(), bytes);
        Ok(StoredBlob {
            url: format!("memory://blobs/{blob_id}"),
            blob_id,
        })
    }

    async fn delete(&self, blob_id: &str) -> Result<(), BlobError> {
        let mut state = self.state.write().unwrap();
        if state.fail_all || state.failing.contains(blob_id) {
            return Err(BlobError::Unavailable(format!("injected failure deleting {blob_id}")));
        }
        state.blobs.remove(blob_id);
        Ok(())
    }
}
