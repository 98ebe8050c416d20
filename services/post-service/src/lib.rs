//! # Chirp post service
//!
//! Authoritative store for posts. Writes invalidate the read-through cache
//! and then publish `post.created` / `post.deleted` on the event bus, which
//! the search and media services consume.

pub mod api;
pub mod config;
pub mod service;

pub use config::Config;
pub use service::PostService;

use axum::{
    Router,
    routing::{get, post},
};

/// Application state shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Post operations
    pub posts: PostService,
}

/// Build the `/api/posts` router.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/create-post", post(api::create_post))
        .route("/all-posts", get(api::list_posts))
        .route("/:id", get(api::get_post).delete(api::delete_post));

    Router::new()
        .nest("/api/posts", api_routes)
        .with_state(state)
}
