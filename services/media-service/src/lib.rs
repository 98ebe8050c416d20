//! # Chirp media service
//!
//! Accepts uploads into a [`BlobStore`] and records them in a
//! [`MediaStore`]. A consumer on `post.deleted` removes the media of deleted
//! posts through [`MediaProjection`]; records whose blob could not be
//! deleted stay `pending_delete` until their owner calls
//! `POST /api/media/reconcile`.

pub mod api;
pub mod blob;
pub mod config;

pub use blob::FsBlobStore;
pub use config::Config;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use chirp_core::Clock;
use chirp_core::event::POST_DELETED;
use chirp_core::event_bus::EventBus;
use chirp_core::store::{BlobStore, MediaStore};
use chirp_projections::MediaProjection;
use chirp_runtime::{ConsumerSetupError, EventHandler, RetryPolicy, Shutdown, spawn_per_key};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Multipart framing allowance on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Media records
    pub media: Arc<dyn MediaStore>,
    /// Blob storage
    pub blobs: Arc<dyn BlobStore>,
    /// Cleanup logic shared with the `post.deleted` consumer
    pub projection: Arc<MediaProjection>,
    /// Time source for record timestamps
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Assemble state over the two stores.
    #[must_use]
    pub fn new(media: Arc<dyn MediaStore>, blobs: Arc<dyn BlobStore>, clock: Arc<dyn Clock>) -> Self {
        let projection = Arc::new(MediaProjection::new(Arc::clone(&media), Arc::clone(&blobs)));
        Self {
            media,
            blobs,
            projection,
            clock,
        }
    }
}

/// Build the `/api/media` router.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/upload",
            post(api::upload_media)
                .layer(DefaultBodyLimit::max(api::MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD)),
        )
        .route("/get", get(api::list_media))
        .route("/reconcile", post(api::reconcile_media));

    Router::new()
        .nest("/api/media", api_routes)
        .with_state(state)
}

/// Start the `post.deleted` consumer.
///
/// # Errors
///
/// Returns [`ConsumerSetupError`] if the consumer cannot be configured.
pub fn spawn_consumers(
    state: &AppState,
    event_bus: &Arc<dyn EventBus>,
    shutdown: &Shutdown,
    retry_policy: &RetryPolicy,
) -> Result<Vec<(String, JoinHandle<()>)>, ConsumerSetupError> {
    let handler: Arc<dyn EventHandler> = state.projection.clone();
    spawn_per_key("media-cleanup", &[POST_DELETED], event_bus, &handler, shutdown, retry_policy)
}
