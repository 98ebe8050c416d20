//! Media cleanup projection.
//!
//! On `post.deleted` every media record the post referenced, and that the
//! deleting user owns, is removed together with its blob. The blob goes
//! first: a record is only deleted once its blob is gone, so a failure never
//! leaves an orphaned blob without a record pointing at it.

use async_trait::async_trait;
use chirp_core::event::{PostDeleted, PostEvent};
use chirp_core::ids::UserId;
use chirp_core::model::MediaRecord;
use chirp_core::store::{BlobStore, MediaStore, StoreError};
use chirp_runtime::{EventHandler, HandlerError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Records that were marked `pending_delete`.
    pub examined: u64,
    /// Records whose blob and record were both removed.
    pub removed: u64,
    /// Records still waiting because the blob delete failed again.
    pub still_pending: u64,
}

/// Deletes media that belonged to deleted posts.
#[derive(Clone)]
pub struct MediaProjection {
    media: Arc<dyn MediaStore>,
    blobs: Arc<dyn BlobStore>,
}

impl std::fmt::Debug for MediaProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaProjection").finish_non_exhaustive()
    }
}

impl MediaProjection {
    /// Create a projection over the media record store and the blob store.
    #[must_use]
    pub fn new(media: Arc<dyn MediaStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { media, blobs }
    }

    /// Delete the blob, then the record. On blob failure the record is
    /// marked `pending_delete` and `false` is returned.
    async fn remove(&self, record: &MediaRecord) -> Result<bool, StoreError> {
        if let Err(e) = self.blobs.delete(&record.blob_id).await {
            warn!(
                media_id = %record.id,
                blob_id = %record.blob_id,
                error = %e,
                "Blob delete failed, marking record pending"
            );
            if !record.pending_delete {
                self.media.mark_pending_delete(record.id).await?;
            }
            metrics::counter!("media.blob_delete_failures").increment(1);
            return Ok(false);
        }

        self.media.delete(record.id).await?;
        Ok(true)
    }

    async fn post_deleted(&self, event: &PostDeleted) -> Result<(), HandlerError> {
        if event.media_ids.is_empty() {
            debug!(post_id = %event.post_id, "Deleted post had no media");
            return Ok(());
        }

        let records = self.media.find_many(&event.media_ids).await?;
        let mut failed = 0_usize;

        for record in &records {
            if record.owner != event.user_id {
                warn!(
                    media_id = %record.id,
                    post_id = %event.post_id,
                    "Media not owned by the post author, leaving it in place"
                );
                continue;
            }
            if self.remove(record).await? {
                info!(media_id = %record.id, post_id = %event.post_id, "Deleted media");
            } else {
                failed += 1;
            }
        }

        info!(
            post_id = %event.post_id,
            referenced = event.media_ids.len(),
            found = records.len(),
            failed,
            "Processed media cleanup"
        );

        if failed > 0 {
            return Err(HandlerError::Transient(format!(
                "{failed} blob delete(s) failed for post {}",
                event.post_id
            )));
        }
        Ok(())
    }

    /// Retry blob deletion for `owner`'s records marked `pending_delete`.
    /// Other users' records are neither examined nor touched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the media store fails. Blob failures are
    /// counted in the report instead.
    pub async fn reconcile_pending(&self, owner: UserId) -> Result<ReconcileReport, StoreError> {
        let pending: Vec<MediaRecord> = self
            .media
            .list_pending_delete()
            .await?
            .into_iter()
            .filter(|record| record.owner == owner)
            .collect();
        let mut report = ReconcileReport {
            examined: pending.len() as u64,
            ..ReconcileReport::default()
        };

        for record in &pending {
            if self.remove(record).await? {
                report.removed += 1;
            } else {
                report.still_pending += 1;
            }
        }

        if report.still_pending > 0 {
            error!(
                %owner,
                examined = report.examined,
                still_pending = report.still_pending,
                "Reconciliation left media pending"
            );
        } else {
            info!(
                %owner,
                examined = report.examined,
                removed = report.removed,
                "Reconciliation complete"
            );
        }
        Ok(report)
    }
}

#[async_trait]
impl EventHandler for MediaProjection {
    fn name(&self) -> &str {
        "media-projection"
    }

    async fn handle(&self, event: &PostEvent) -> Result<(), HandlerError> {
        match event {
            PostEvent::Deleted(deleted) => self.post_deleted(deleted).await,
            PostEvent::Created(_) => Ok(()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chirp_core::ids::{MediaId, PostId, UserId};
    use chirp_testing::{InMemoryBlobStore, InMemoryMediaStore};
    use chrono::Utc;

    struct Fixture {
        media: InMemoryMediaStore,
        blobs: InMemoryBlobStore,
        projection: MediaProjection,
    }

    fn fixture() -> Fixture {
        let media = InMemoryMediaStore::new();
        let blobs = InMemoryBlobStore::new();
        let projection = MediaProjection::new(Arc::new(media.clone()), Arc::new(blobs.clone()));
        Fixture {
            media,
            blobs,
            projection,
        }
    }

    async fn seed(f: &Fixture, owner: UserId, blob_id: &str) -> MediaId {
        let id = MediaId::new();
        f.blobs.seed(blob_id, b"bytes");
        f.media
            .insert(&MediaRecord {
                id,
                blob_id: blob_id.to_string(),
                original_name: format!("{blob_id}.png"),
                mime_type: "image/png".to_string(),
                url: format!("memory://blobs/{blob_id}"),
                owner,
                created_at: Utc::now(),
                pending_delete: false,
            })
            .await
            .unwrap();
        id
    }

    fn deleted(user_id: UserId, media_ids: Vec<MediaId>) -> PostEvent {
        PostEvent::Deleted(PostDeleted {
            post_id: PostId::new(),
            user_id,
            media_ids,
        })
    }

    #[tokio::test]
    async fn removes_every_referenced_blob_and_record() {
        let f = fixture();
        let owner = UserId::new();
        let m1 = seed(&f, owner, "b1").await;
        let m2 = seed(&f, owner, "b2").await;

        f.projection.handle(&deleted(owner, vec![m1, m2])).await.unwrap();

        assert!(f.media.is_empty());
        assert!(f.blobs.is_empty());
    }

    #[tokio::test]
    async fn replay_and_unknown_ids_are_no_ops() {
        let f = fixture();
        let owner = UserId::new();
        let m1 = seed(&f, owner, "b1").await;
        let event = deleted(owner, vec![m1, MediaId::new()]);

        f.projection.handle(&event).await.unwrap();
        f.projection.handle(&event).await.unwrap();

        assert!(f.media.is_empty());
    }

    #[tokio::test]
    async fn media_owned_by_someone_else_is_kept() {
        let f = fixture();
        let owner = UserId::new();
        let stranger = UserId::new();
        let theirs = seed(&f, stranger, "theirs").await;

        f.projection.handle(&deleted(owner, vec![theirs])).await.unwrap();

        assert!(f.media.get(theirs).is_some());
        assert!(f.blobs.contains("theirs"));
    }

    #[tokio::test]
    async fn blob_failure_marks_pending_and_retries() {
        let f = fixture();
        let owner = UserId::new();
        let ok = seed(&f, owner, "ok").await;
        let stuck = seed(&f, owner, "stuck").await;
        f.blobs.fail_deletes_for("stuck", true);

        let err = f
            .projection
            .handle(&deleted(owner, vec![ok, stuck]))
            .await
            .unwrap_err();

        assert!(matches!(err, HandlerError::Transient(_)));
        assert!(f.media.get(ok).is_none());
        let record = f.media.get(stuck).unwrap();
        assert!(record.pending_delete);
        assert!(f.blobs.contains("stuck"));
    }

    #[tokio::test]
    async fn reconcile_clears_pending_once_the_blob_store_recovers() {
        let f = fixture();
        let owner = UserId::new();
        let stuck = seed(&f, owner, "stuck").await;
        f.blobs.fail_all_deletes(true);
        let _ = f.projection.handle(&deleted(owner, vec![stuck])).await;

        let report = f.projection.reconcile_pending(owner).await.unwrap();
        assert_eq!(
            report,
            ReconcileReport {
                examined: 1,
                removed: 0,
                still_pending: 1
            }
        );

        f.blobs.fail_all_deletes(false);
        let report = f.projection.reconcile_pending(owner).await.unwrap();
        assert_eq!(report.removed, 1);
        assert!(f.media.is_empty());
        assert!(f.blobs.is_empty());
    }

    #[tokio::test]
    async fn reconcile_only_touches_the_callers_records() {
        let f = fixture();
        let owner = UserId::new();
        let other = UserId::new();
        let mine = seed(&f, owner, "mine").await;
        let theirs = seed(&f, other, "theirs").await;
        f.blobs.fail_all_deletes(true);
        let _ = f.projection.handle(&deleted(owner, vec![mine])).await;
        let _ = f.projection.handle(&deleted(other, vec![theirs])).await;
        f.blobs.fail_all_deletes(false);

        let report = f.projection.reconcile_pending(owner).await.unwrap();

        assert_eq!(
            report,
            ReconcileReport {
                examined: 1,
                removed: 1,
                still_pending: 0
            }
        );
        assert!(f.media.get(mine).is_none());
        assert!(f.media.get(theirs).unwrap().pending_delete);
        assert!(f.blobs.contains("theirs"));
    }

    #[tokio::test]
    async fn created_events_are_ignored() {
        let f = fixture();
        let event = PostEvent::Created(chirp_core::event::PostCreated {
            post_id: PostId::new(),
            user_id: UserId::new(),
            content: "hi".to_string(),
            created_at: Utc::now(),
        });
        f.projection.handle(&event).await.unwrap();
    }
}
