//! End-to-end gateway tests against a loopback fake backend.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::IntoResponse;
use chirp_auth::{FixedWindowRateLimiter, TokenService};
use chirp_core::ids::UserId;
use chirp_gateway::config::{BackendUrls, ProxyConfig, RateLimitConfig};
use chirp_gateway::{AppState, Gatekeeper, Proxy, RouteTable, build_router};
use chirp_testing::{InMemoryKeyValueStore, ManualClock, manual_clock};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tower::ServiceExt;

const SECRET: &[u8] = b"gateway-test-secret-long-enough!!";

/// Echoes what it received so tests can see what the gateway forwarded.
async fn echo(hits: Arc<AtomicUsize>, request: Request<Body>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    let (parts, body) = request.into_parts();
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let mut echoed = json!({
        "method": parts.method.as_str(),
        "uri": parts.uri.to_string(),
        "userId": header("x-user-id"),
        "contentType": header("content-type"),
        "correlationId": header("x-correlation-id"),
    });
    let bytes = to_bytes(body, usize::MAX).await.unwrap();
    echoed["body"] = Value::String(String::from_utf8_lossy(&bytes).into_owned());
    (StatusCode::CREATED, [("x-backend", "fake")], axum::Json(echoed))
}

#[test]
fn echo_backend_can_be_served() {
    fn assert_send<T: Send>(_: &T) {}
    let request = Request::get("/").body(Body::empty()).unwrap();
    assert_send(&echo(Arc::new(AtomicUsize::new(0)), request));
}

async fn fake_backend() -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().fallback(move |request: Request<Body>| echo(counter.clone(), request));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (url, hits)
}

async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    url
}

struct Harness {
    app: Router,
    hits: Arc<AtomicUsize>,
    clock: ManualClock,
}

async fn harness_with(limits: RateLimitConfig, search_url: Option<String>) -> Harness {
    let (url, hits) = fake_backend().await;
    let clock = manual_clock();
    let kv = InMemoryKeyValueStore::new(clock.clone());
    let urls = BackendUrls {
        identity: url.clone(),
        post: url.clone(),
        media: url.clone(),
        search: search_url.unwrap_or(url),
    };
    let state = AppState {
        routes: Arc::new(RouteTable::chirp(&urls)),
        gate: Gatekeeper::new(
            TokenService::new(SECRET),
            Arc::new(FixedWindowRateLimiter::new(Arc::new(kv))),
            &limits,
        ),
        proxy: Proxy::new(ProxyConfig {
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap(),
    };
    Harness {
        app: build_router(state),
        hits,
        clock,
    }
}

async fn harness() -> Harness {
    harness_with(RateLimitConfig::default(), None).await
}

fn token(user: UserId) -> String {
    TokenService::new(SECRET)
        .issue(user, "alice", chrono::Utc::now())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.expect("request handled");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("JSON body")
    };
    (status, headers, body)
}

#[tokio::test]
async fn authenticated_requests_are_rewritten_and_carry_the_verified_user() {
    let h = harness().await;
    let user = UserId::new();

    let request = Request::post("/v1/posts/create-post?draft=false")
        .header("authorization", format!("Bearer {}", token(user)))
        .header("x-user-id", UserId::new().to_string())
        .header("x-correlation-id", "2b1f3c1e-8a1d-4a8e-9d0f-6f7d2f3b9c11")
        .header("content-type", "text/plain")
        .body(Body::from(r#"{"content":"hello"}"#))
        .unwrap();
    let (status, headers, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["uri"], "/api/posts/create-post?draft=false");
    assert_eq!(body["userId"], user.to_string());
    assert_eq!(body["contentType"], "application/json");
    assert_eq!(body["correlationId"], "2b1f3c1e-8a1d-4a8e-9d0f-6f7d2f3b9c11");
    assert_eq!(body["body"], r#"{"content":"hello"}"#);
    assert_eq!(headers["x-backend"], "fake");
    assert_eq!(headers["ratelimit-limit"], "100");
    assert_eq!(headers["ratelimit-remaining"], "99");
    assert_eq!(headers["ratelimit-reset"], "900");
}

#[tokio::test]
async fn protected_routes_reject_missing_and_invalid_tokens() {
    let h = harness().await;

    let missing = Request::get("/v1/search/posts?query=rust").body(Body::empty()).unwrap();
    let (status, _, body) = send(&h.app, missing).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");

    let forged = TokenService::new(b"some-other-secret-entirely-different")
        .issue(UserId::new(), "mallory", chrono::Utc::now())
        .unwrap();
    let invalid = Request::get("/v1/media/get")
        .header("authorization", format!("Bearer {forged}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&h.app, invalid).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_CREDENTIAL");

    assert_eq!(h.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn auth_routes_are_public_and_never_carry_a_client_user_id() {
    let h = harness().await;

    let request = Request::post("/v1/auth/login")
        .header("x-user-id", UserId::new().to_string())
        .body(Body::from(r#"{"username":"alice","password":"hunter22"}"#))
        .unwrap();
    let (status, _, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["uri"], "/api/auth/login");
    assert_eq!(body["userId"], Value::Null);
}

#[tokio::test]
async fn unknown_prefixes_are_404_without_a_backend_call() {
    let h = harness().await;

    let request = Request::get("/v1/comments/1").body(Body::empty()).unwrap();
    let (status, _, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(h.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn global_budget_is_enforced_and_reopens_after_the_window() {
    let limits = RateLimitConfig {
        global_limit: 3,
        ..RateLimitConfig::default()
    };
    let h = harness_with(limits, None).await;
    let login = || Request::post("/v1/auth/login").body(Body::empty()).unwrap();

    for _ in 0..3 {
        let (status, _, _) = send(&h.app, login()).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, headers, body) = send(&h.app, login()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMITED");
    assert_eq!(headers["retry-after"], "900");
    assert_eq!(headers["ratelimit-remaining"], "0");
    assert_eq!(h.hits.load(Ordering::SeqCst), 3);

    h.clock.advance(Duration::from_secs(15 * 60));

    let (status, headers, _) = send(&h.app, login()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(headers["ratelimit-remaining"], "2");
}

#[tokio::test]
async fn registration_has_its_own_tighter_budget() {
    let limits = RateLimitConfig {
        sensitive_limit: 2,
        ..RateLimitConfig::default()
    };
    let h = harness_with(limits, None).await;
    let register = || Request::post("/v1/auth/register").body(Body::empty()).unwrap();

    for _ in 0..2 {
        assert_eq!(send(&h.app, register()).await.0, StatusCode::CREATED);
    }
    let (status, headers, _) = send(&h.app, register()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers["ratelimit-limit"], "2");
    assert_eq!(headers["retry-after"], "3600");

    let login = Request::post("/v1/auth/login").body(Body::empty()).unwrap();
    assert_eq!(send(&h.app, login).await.0, StatusCode::CREATED);
}

#[tokio::test]
async fn unreachable_backends_answer_500_with_the_reason() {
    let h = harness_with(RateLimitConfig::default(), Some(unreachable_url().await)).await;

    let request = Request::get("/v1/search/posts?query=rust")
        .header("authorization", format!("Bearer {}", token(UserId::new())))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal server error occurred");
    assert!(!body["error"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn multipart_uploads_stream_through_with_their_boundary() {
    let h = harness().await;
    let content_type = "multipart/form-data; boundary=chirp";
    let payload = "--chirp\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.png\"\r\n\r\nPNG\r\n--chirp--\r\n";

    let request = Request::post("/v1/media/upload")
        .header("authorization", format!("Bearer {}", token(UserId::new())))
        .header("content-type", content_type)
        .body(Body::from(payload))
        .unwrap();
    let (status, _, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["uri"], "/api/media/upload");
    assert_eq!(body["contentType"], content_type);
    assert_eq!(body["body"], payload);
}
