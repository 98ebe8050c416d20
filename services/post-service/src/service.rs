//! Post operations.
//!
//! Every mutation follows the same order:
//!
//! 1. write the post store
//! 2. invalidate the cache (failure is logged, the mutation proceeds)
//! 3. publish the lifecycle event (failure is returned as `BusUnavailable`)
//!
//! Reads go through the read-through cache.

use chirp_cache::{CacheManager, list_key, post_key};
use chirp_core::Clock;
use chirp_core::error::PlatformError;
use chirp_core::event::{PostCreated, PostDeleted, PostEvent};
use chirp_core::event_bus::EventBus;
use chirp_core::ids::{MediaId, PostId, UserId};
use chirp_core::model::{Post, PostPage};
use chirp_core::store::PostStore;
use std::sync::Arc;
use tracing::{error, info};

/// Longest accepted post body, in characters.
pub const MAX_CONTENT_CHARS: usize = 5000;

/// Largest page size a listing may ask for.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Page size used when none (or an unusable one) is given.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Post operations over the store, cache and bus.
#[derive(Clone)]
pub struct PostService {
    store: Arc<dyn PostStore>,
    cache: CacheManager,
    event_bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PostService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostService")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl PostService {
    /// Create the service.
    #[must_use]
    pub fn new(
        store: Arc<dyn PostStore>,
        cache: CacheManager,
        event_bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            cache,
            event_bus,
            clock,
        }
    }

    /// Create a post owned by `owner`.
    ///
    /// # Errors
    ///
    /// - [`PlatformError::ValidationFailed`] for empty or oversized content
    /// - [`PlatformError::UpstreamUnavailable`] if the store write fails
    /// - [`PlatformError::BusUnavailable`] if the event cannot be published;
    ///   the post is stored regardless
    pub async fn create(
        &self,
        owner: UserId,
        content: &str,
        media_ids: Vec<MediaId>,
    ) -> Result<Post, PlatformError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(PlatformError::validation("content", "\"content\" is required"));
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(PlatformError::validation(
                "content",
                format!("\"content\" must be at most {MAX_CONTENT_CHARS} characters"),
            ));
        }

        let post = Post {
            id: PostId::new(),
            owner,
            content: content.to_string(),
            media_ids,
            created_at: self.clock.now(),
        };
        self.store.insert(&post).await?;
        self.invalidate(post.id).await;

        let event = PostEvent::Created(PostCreated {
            post_id: post.id,
            user_id: post.owner,
            content: post.content.clone(),
            created_at: post.created_at,
        });
        self.publish(&event).await?;

        metrics::counter!("posts.created").increment(1);
        info!(post_id = %post.id, user_id = %owner, "Post created");
        Ok(post)
    }

    /// One page of posts, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::UpstreamUnavailable`] if the store fails.
    pub async fn list(&self, page: u64, limit: u64) -> Result<PostPage, PlatformError> {
        let offset = page.saturating_sub(1).saturating_mul(limit);
        let store = Arc::clone(&self.store);
        let found = self
            .cache
            .read_through(
                &list_key(page, limit),
                self.cache.config().list_ttl,
                || async move {
                    let posts = store.list_recent(offset, limit).await?;
                    let total = store.count().await?;
                    Ok::<_, PlatformError>(Some(PostPage::new(posts, page, limit, total)))
                },
            )
            .await?;
        Ok(found.unwrap_or_else(|| PostPage::new(Vec::new(), page, limit, 0)))
    }

    /// One post.
    ///
    /// # Errors
    ///
    /// - [`PlatformError::NotFound`] if there is no such post
    /// - [`PlatformError::UpstreamUnavailable`] if the store fails
    pub async fn get(&self, id: PostId) -> Result<Post, PlatformError> {
        let store = Arc::clone(&self.store);
        self.cache
            .read_through(&post_key(id), self.cache.config().entity_ttl, || async move {
                store.find(id).await.map_err(PlatformError::from)
            })
            .await?
            .ok_or_else(|| PlatformError::NotFound("Post".to_string()))
    }

    /// Delete a post owned by `owner`.
    ///
    /// Deleting someone else's post, or one that is already gone, is
    /// reported as not found and publishes nothing.
    ///
    /// # Errors
    ///
    /// - [`PlatformError::NotFound`] if `owner` has no such post
    /// - [`PlatformError::UpstreamUnavailable`] if the store fails
    /// - [`PlatformError::BusUnavailable`] if the event cannot be published
    pub async fn delete(&self, id: PostId, owner: UserId) -> Result<Post, PlatformError> {
        let Some(post) = self.store.delete_owned(id, owner).await? else {
            info!(post_id = %id, user_id = %owner, "No post to delete");
            return Err(PlatformError::NotFound("Post".to_string()));
        };
        self.invalidate(id).await;

        let event = PostEvent::Deleted(PostDeleted {
            post_id: post.id,
            user_id: owner,
            media_ids: post.media_ids.clone(),
        });
        self.publish(&event).await?;

        metrics::counter!("posts.deleted").increment(1);
        info!(post_id = %id, user_id = %owner, media = post.media_ids.len(), "Post deleted");
        Ok(post)
    }

    async fn invalidate(&self, id: PostId) {
        if let Err(e) = self.cache.invalidate_post(id).await {
            error!(post_id = %id, error = %e, "Cache invalidation failed; entries expire with their TTL");
        }
    }

    async fn publish(&self, event: &PostEvent) -> Result<(), PlatformError> {
        self.event_bus.publish_event(event).await.map_err(|e| {
            error!(
                routing_key = event.routing_key(),
                post_id = %event.post_id(),
                error = %e,
                "Failed to publish post event"
            );
            PlatformError::from(e)
        })
    }
}

/// Clamp raw `page` / `limit` query values.
///
/// Missing, zero or unparseable values fall back to page 1 and
/// [`DEFAULT_PAGE_SIZE`]; the limit is capped at [`MAX_PAGE_SIZE`].
#[must_use]
pub fn normalize_paging(page: Option<&str>, limit: Option<&str>) -> (u64, u64) {
    let parse = |raw: Option<&str>| {
        raw.and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|n| *n > 0)
    };
    let page = parse(page).unwrap_or(1);
    let limit = parse(limit).unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    (page, limit)
}
