//! # Chirp search service
//!
//! Serves full-text search over posts. The index is a derived copy: two
//! consumers (one per routing key) apply `post.created` and `post.deleted`
//! to it through [`SearchProjection`].

pub mod api;
pub mod config;

pub use config::Config;

use axum::{Router, routing::get};
use chirp_core::event::{POST_CREATED, POST_DELETED};
use chirp_core::event_bus::EventBus;
use chirp_core::store::SearchStore;
use chirp_projections::SearchProjection;
use chirp_runtime::{ConsumerSetupError, EventHandler, RetryPolicy, Shutdown, spawn_per_key};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Routing keys the index follows.
pub const ROUTING_KEYS: [&str; 2] = [POST_CREATED, POST_DELETED];

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Search index
    pub store: Arc<dyn SearchStore>,
    /// Maximum results per query
    pub result_limit: u64,
}

/// Build the `/api/search` router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/search/posts", get(api::search_posts))
        .with_state(state)
}

/// Start the index consumers.
///
/// # Errors
///
/// Returns [`ConsumerSetupError`] if a consumer cannot be configured.
pub fn spawn_consumers(
    store: Arc<dyn SearchStore>,
    event_bus: &Arc<dyn EventBus>,
    shutdown: &Shutdown,
    retry_policy: &RetryPolicy,
) -> Result<Vec<(String, JoinHandle<()>)>, ConsumerSetupError> {
    let handler: Arc<dyn EventHandler> = Arc::new(SearchProjection::new(store));
    spawn_per_key("search-index", &ROUTING_KEYS, event_bus, &handler, shutdown, retry_policy)
}
