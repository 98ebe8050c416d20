//! # Chirp identity service
//!
//! Owns user accounts. Issues the HS256 access tokens the gateway verifies
//! and the opaque refresh tokens that renew them.

pub mod api;
pub mod config;
pub mod service;

pub use config::Config;
pub use service::{IdentityService, TokenPair};

use axum::{Router, routing::post};

/// Application state shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Account and token operations
    pub identity: IdentityService,
}

/// Build the `/api/auth` router.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/register", post(api::register))
        .route("/login", post(api::login))
        .route("/refresh-token", post(api::refresh_token))
        .route("/logout", post(api::logout));

    Router::new()
        .nest("/api/auth", api_routes)
        .with_state(state)
}
