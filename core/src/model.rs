//! Records owned by the individual services.
//!
//! The post store is authoritative for [`Post`]. [`SearchDocument`] and
//! [`MediaRecord`] are derived copies kept in step by event consumers and
//! never written back to the post store.

use crate::ids::{MediaId, PostId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A post as stored by the post service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Post identifier. Immutable.
    pub id: PostId,
    /// Author. Immutable.
    pub owner: UserId,
    /// Text body.
    pub content: String,
    /// Attached media, in upload order. Unchecked foreign references.
    pub media_ids: Vec<MediaId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// One page of the post listing, newest first.
///
/// This is exactly the value cached under `posts:<page>:<limit>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    /// Posts on this page.
    pub posts: Vec<Post>,
    /// 1-based page number that was requested.
    pub current_page: u64,
    /// Total number of pages at the requested page size.
    pub total_pages: u64,
    /// Total number of posts.
    pub total_posts: u64,
}

impl PostPage {
    /// Assemble a page, deriving `total_pages` from the total and the limit.
    #[must_use]
    pub const fn new(posts: Vec<Post>, current_page: u64, limit: u64, total_posts: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total_posts.div_ceil(limit) };
        Self {
            posts,
            current_page,
            total_pages,
            total_posts,
        }
    }
}

/// A post as indexed by the search service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    /// Source post. Unique within the index.
    pub post_id: PostId,
    /// Author.
    pub user_id: UserId,
    /// Indexed text.
    pub content: String,
    /// Creation time of the source post.
    pub created_at: DateTime<Utc>,
}

/// An uploaded media object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    /// Media identifier handed to clients.
    pub id: MediaId,
    /// Identifier of the object in the blob store.
    pub blob_id: String,
    /// File name as uploaded.
    pub original_name: String,
    /// MIME type as uploaded.
    pub mime_type: String,
    /// Public URL of the blob.
    pub url: String,
    /// Uploader.
    pub owner: UserId,
    /// Upload time.
    pub created_at: DateTime<Utc>,
    /// Set when the blob could not be deleted and a reconciliation pass must
    /// retry it.
    #[serde(default)]
    pub pending_delete: bool,
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Account identifier, carried as `userId` in access tokens.
    pub id: UserId,
    /// Unique login name.
    pub username: String,
    /// Unique email address.
    pub email: String,
    /// PHC-formatted password hash.
    pub password_hash: String,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

/// An opaque refresh token issued at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    /// Token value.
    pub token: String,
    /// Owner.
    pub user_id: UserId,
    /// Expiry.
    pub expires_at: DateTime<Utc>,
}

impl RefreshToken {
    /// Whether the token has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_count_rounds_up() {
        let page = PostPage::new(Vec::new(), 1, 10, 21);
        assert_eq!(page.total_pages, 3);
        let empty = PostPage::new(Vec::new(), 1, 10, 0);
        assert_eq!(empty.total_pages, 0);
    }
}
