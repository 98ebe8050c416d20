//! Shared axum plumbing for Chirp services.
//!
//! Each service binary builds its own `Router` and wraps it with what this
//! crate provides:
//!
//! - [`AppError`]: one JSON error shape for every failure
//! - extractors for the correlation ID, client IP and gateway-vouched user
//! - the correlation ID layer
//! - CORS and response hardening headers
//! - tracing and Prometheus bootstrap, `/health` and `/metrics`
//! - environment config helpers and [`serve`]
//!
//! # Example
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/api/posts", get(list_posts))
//!     .merge(chirp_web::handlers::health_router("post-service", metrics))
//!     .layer(chirp_web::correlation_id_layer());
//!
//! chirp_web::serve(app, &config.server, shutdown_signal()).await?;
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod security;
pub mod telemetry;

pub use config::{ConfigError, ServerConfig};
pub use error::{AppError, INTERNAL_MESSAGE};
pub use extractors::{
    AuthenticatedUser, ClientIp, CorrelationId, JsonBody, ProxyTrust, USER_ID_HEADER,
};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use security::{SECURITY_HEADERS, cors_layer, with_security_layers};
pub use telemetry::{TelemetryError, init_tracing, install_metrics};

use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Bind `config` and serve `app` until `shutdown` resolves.
///
/// Adds request tracing, the correlation ID layer, CORS and the
/// [`SECURITY_HEADERS`], and records the peer address for [`ClientIp`].
///
/// # Errors
///
/// Returns an I/O error if the address cannot be bound or the server fails.
pub async fn serve<F>(app: Router, config: &ServerConfig, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = with_security_layers(app)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer());

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    tracing::info!(address = %config.bind_address(), "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
