//! Health and metrics endpoints.
//!
//! Every service mounts [`router`]: `GET /health` for liveness and, when a
//! Prometheus handle is installed, `GET /metrics`.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

/// Liveness body.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthBody {
    /// Always `"ok"` when the process answers
    pub status: &'static str,
    /// Service name
    pub service: &'static str,
}

#[derive(Clone)]
struct HealthState {
    service: &'static str,
    metrics: Option<PrometheusHandle>,
}

/// Build the health router for `service`.
pub fn router<S>(service: &'static str, metrics: Option<PrometheusHandle>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .with_state(HealthState { service, metrics })
}

/// Liveness check; does not touch dependencies.
async fn health_check(State(state): State<HealthState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        service: state.service,
    })
}

async fn render_metrics(State(state): State<HealthState>) -> impl IntoResponse {
    match state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_simple_health_check() {
        let app: Router = router("post-service", None);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "post-service");
    }

    #[tokio::test]
    async fn metrics_are_absent_without_a_recorder() {
        let app: Router = router("gateway", None);
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
