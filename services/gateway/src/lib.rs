//! # Chirp gateway
//!
//! Single ingress for clients. Every request under `/v1` goes through:
//!
//! ```text
//! Received → route lookup → token check (protected routes)
//!          → global throttle → sensitive throttle (configured paths)
//!          → proxy to backend (/v1 → /api) → relay response
//! ```
//!
//! Any failed gate answers directly; the backend never sees the request.

pub mod config;
pub mod gate;
pub mod proxy;
pub mod routes;

pub use config::Config;
pub use gate::{Gatekeeper, Rejection};
pub use proxy::{Proxy, ProxyError};
pub use routes::{Backend, Route, RouteTable};

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chirp_web::{AppError, ClientIp};
use std::sync::Arc;
use tracing::{info, warn};

/// Application state shared across all requests.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Prefix routing
    pub routes: Arc<RouteTable>,
    /// Token and throttle checks
    pub gate: Gatekeeper,
    /// Outbound client
    pub proxy: Proxy,
}

/// Build the gateway router. Every path falls through to [`dispatch`].
pub fn build_router(state: AppState) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

/// Run one request through the gates and proxy it.
pub async fn dispatch(
    State(state): State<AppState>,
    ClientIp(client): ClientIp,
    request: Request<Body>,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(route) = state.routes.resolve(&path) else {
        warn!(%path, "No route for path");
        metrics::counter!("gateway.rejections", "reason" => "not_found").increment(1);
        let message = format!("Cannot {} {path}", request.method());
        return AppError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message).into_response();
    };

    let user = if route.requires_auth {
        match state.gate.authenticate(request.headers()) {
            Ok(claims) => Some(claims.user_id),
            Err(rejection) => return rejection.into_response(),
        }
    } else {
        None
    };

    let decision = match state.gate.admit(&client.to_string(), &path).await {
        Ok(decision) => decision,
        Err(rejection) => return rejection.into_response(),
    };

    let mut response = match state.proxy.forward(route, request, user).await {
        Ok(response) => response,
        Err(e) => return e.into_response(),
    };
    response
        .headers_mut()
        .extend(gate::rate_limit_headers(&decision));

    info!(
        backend = route.backend.as_str(),
        %path,
        status = response.status().as_u16(),
        user_id = ?user,
        "Request proxied"
    );
    response
}
