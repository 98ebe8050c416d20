//! Media service tests: uploads, listing, cleanup on `post.deleted` and
//! reconciliation, all against in-memory collaborators.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use chirp_core::event::{PostDeleted, PostEvent};
use chirp_core::event_bus::{AckOutcome, EventBus};
use chirp_core::ids::{MediaId, PostId, UserId};
use chirp_media_service::{AppState, build_router, spawn_consumers};
use chirp_runtime::{EventHandler, RetryPolicy, Shutdown};
use chirp_testing::{InMemoryBlobStore, InMemoryEventBus, InMemoryMediaStore, test_clock};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const BOUNDARY: &str = "chirp-test-boundary";
const WAIT: Duration = Duration::from_secs(2);

struct Harness {
    state: AppState,
    app: Router,
    media: InMemoryMediaStore,
    blobs: InMemoryBlobStore,
}

fn harness() -> Harness {
    let media = InMemoryMediaStore::new();
    let blobs = InMemoryBlobStore::new();
    let state = AppState::new(
        Arc::new(media.clone()),
        Arc::new(blobs.clone()),
        Arc::new(test_clock()),
    );
    Harness {
        app: build_router(state.clone()),
        state,
        media,
        blobs,
    }
}

fn multipart(field: &str, file_name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload(user: UserId, body: Vec<u8>) -> Request<Body> {
    Request::post("/api/media/upload")
        .header("x-user-id", user.to_string())
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).expect("JSON body"))
}

async fn upload_one(h: &Harness, user: UserId) -> MediaId {
    let (status, body) = send(&h.app, upload(user, multipart("file", "cat.png", b"png"))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["mediaId"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn upload_records_owner_and_blob() {
    let h = harness();
    let user = UserId::new();

    let id = upload_one(&h, user).await;

    let record = h.media.get(id).unwrap();
    assert_eq!(record.owner, user);
    assert_eq!(record.original_name, "cat.png");
    assert_eq!(record.mime_type, "image/png");
    assert!(h.blobs.contains(&record.blob_id));

    let request = Request::get("/api/media/get")
        .header("x-user-id", user.to_string())
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn upload_requires_the_file_field() {
    let h = harness();
    let (status, body) = send(&h.app, upload(UserId::new(), multipart("avatar", "a.png", b"x"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "file");
    assert!(h.blobs.is_empty());
}

#[tokio::test]
async fn oversized_uploads_are_rejected() {
    let h = harness();
    let big = vec![0_u8; 5 * 1024 * 1024 + 1];
    let (status, body) = send(&h.app, upload(UserId::new(), multipart("file", "big.png", &big))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "file");
    assert!(h.media.is_empty());
}

#[tokio::test]
async fn post_deleted_removes_blobs_and_records() {
    let h = harness();
    let user = UserId::new();
    let m1 = upload_one(&h, user).await;
    let m2 = upload_one(&h, user).await;

    let bus = InMemoryEventBus::new();
    let event_bus: Arc<dyn EventBus> = Arc::new(bus.clone());
    let shutdown = Shutdown::new();
    let handles = spawn_consumers(&h.state, &event_bus, &shutdown, &RetryPolicy::no_retries()).unwrap();
    assert!(bus.wait_for_subscribers(1, WAIT).await);

    bus.publish_event(&PostEvent::Deleted(PostDeleted {
        post_id: PostId::new(),
        user_id: user,
        media_ids: vec![m1, m2],
    }))
    .await
    .unwrap();
    assert!(bus.wait_for_outcomes(1, WAIT).await);

    assert_eq!(bus.outcomes()[0].1, AckOutcome::Applied);
    assert!(h.media.is_empty());
    assert!(h.blobs.is_empty());

    shutdown.trigger();
    Shutdown::drain(handles, WAIT).await;
}

#[tokio::test]
async fn reconcile_clears_pending_records() {
    let h = harness();
    let user = UserId::new();
    let id = upload_one(&h, user).await;
    let blob_id = h.media.get(id).unwrap().blob_id;

    h.blobs.fail_deletes_for(&blob_id, true);
    let outcome = h
        .state
        .projection
        .handle(&PostEvent::Deleted(PostDeleted {
            post_id: PostId::new(),
            user_id: user,
            media_ids: vec![id],
        }))
        .await;
    assert!(outcome.is_err());
    assert!(h.media.get(id).unwrap().pending_delete);

    h.blobs.fail_deletes_for(&blob_id, false);
    let request = Request::post("/api/media/reconcile")
        .header("x-user-id", user.to_string())
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["examined"], 1);
    assert_eq!(body["removed"], 1);
    assert_eq!(body["stillPending"], 0);
    assert!(h.media.get(id).is_none());
}

#[tokio::test]
async fn reconcile_leaves_other_users_records_alone() {
    let h = harness();
    let owner = UserId::new();
    let id = upload_one(&h, owner).await;
    let blob_id = h.media.get(id).unwrap().blob_id;

    h.blobs.fail_deletes_for(&blob_id, true);
    let outcome = h
        .state
        .projection
        .handle(&PostEvent::Deleted(PostDeleted {
            post_id: PostId::new(),
            user_id: owner,
            media_ids: vec![id],
        }))
        .await;
    assert!(outcome.is_err());
    h.blobs.fail_deletes_for(&blob_id, false);

    let request = Request::post("/api/media/reconcile")
        .header("x-user-id", UserId::new().to_string())
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["examined"], 0);
    assert_eq!(body["removed"], 0);
    assert!(h.media.get(id).unwrap().pending_delete);
    assert!(h.blobs.contains(&blob_id));
}
