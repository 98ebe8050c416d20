//! Search index projection.

use async_trait::async_trait;
use chirp_core::event::PostEvent;
use chirp_core::model::SearchDocument;
use chirp_core::store::SearchStore;
use chirp_runtime::{EventHandler, HandlerError};
use std::sync::Arc;
use tracing::info;

/// Keeps the search index in step with the post store.
///
/// - `post.created` upserts a document keyed by post id
/// - `post.deleted` removes it and tombstones the id; a missing document is
///   a no-op
/// - a `post.created` arriving after its `post.deleted` is dropped
#[derive(Clone)]
pub struct SearchProjection {
    store: Arc<dyn SearchStore>,
}

impl std::fmt::Debug for SearchProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchProjection").finish_non_exhaustive()
    }
}

impl SearchProjection {
    /// Create a projection writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SearchStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for SearchProjection {
    fn name(&self) -> &str {
        "search-projection"
    }

    async fn handle(&self, event: &PostEvent) -> Result<(), HandlerError> {
        match event {
            PostEvent::Created(created) => {
                let doc = SearchDocument {
                    post_id: created.post_id,
                    user_id: created.user_id,
                    content: created.content.clone(),
                    created_at: created.created_at,
                };
                if self.store.upsert(&doc).await? {
                    info!(post_id = %created.post_id, "Search document indexed");
                } else {
                    info!(post_id = %created.post_id, "Skipped create for deleted post");
                }
            }
            PostEvent::Deleted(deleted) => {
                let existed = self.store.delete(deleted.post_id).await?;
                info!(post_id = %deleted.post_id, existed, "Search document removed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chirp_core::event::{PostCreated, PostDeleted};
    use chirp_core::ids::{PostId, UserId};
    use chirp_core::store::StoreError;
    use chirp_testing::InMemorySearchStore;
    use chrono::Utc;

    fn created(post_id: PostId) -> PostEvent {
        PostEvent::Created(PostCreated {
            post_id,
            user_id: UserId::new(),
            content: "Hello search".to_string(),
            created_at: Utc::now(),
        })
    }

    fn deleted(post_id: PostId) -> PostEvent {
        PostEvent::Deleted(PostDeleted {
            post_id,
            user_id: UserId::new(),
            media_ids: vec![],
        })
    }

    #[tokio::test]
    async fn created_twice_yields_one_document() {
        let store = InMemorySearchStore::new();
        let projection = SearchProjection::new(Arc::new(store.clone()));
        let id = PostId::new();

        projection.handle(&created(id)).await.unwrap();
        projection.handle(&created(id)).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(id).unwrap().content, "Hello search");
    }

    #[tokio::test]
    async fn delete_removes_and_tolerates_missing() {
        let store = InMemorySearchStore::new();
        let projection = SearchProjection::new(Arc::new(store.clone()));
        let id = PostId::new();

        projection.handle(&created(id)).await.unwrap();
        projection.handle(&deleted(id)).await.unwrap();
        projection.handle(&deleted(id)).await.unwrap();

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn deleted_post_is_not_resurrected_by_late_create() {
        let store = InMemorySearchStore::new();
        let projection = SearchProjection::new(Arc::new(store.clone()));
        let id = PostId::new();

        projection.handle(&deleted(id)).await.unwrap();
        projection.handle(&created(id)).await.unwrap();

        assert!(store.get(id).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn store_outage_is_retryable() {
        let store = InMemorySearchStore::new();
        store.set_unavailable(true);
        let projection = SearchProjection::new(Arc::new(store));

        let err = projection.handle(&created(PostId::new())).await.unwrap_err();
        assert!(matches!(err, HandlerError::Transient(_)));
        assert_eq!(
            HandlerError::from(StoreError::Unavailable("x".into())).outcome(),
            err.outcome()
        );
    }
}
