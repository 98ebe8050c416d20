//! Forwarding requests to a backend and relaying the answer.
//!
//! Bodies stream in both directions. Hop-by-hop headers are dropped, any
//! client-supplied `x-user-id` is replaced by the verified one, and the
//! correlation id travels with the request.

use crate::config::ProxyConfig;
use crate::routes::{Route, rewrite_path};
use axum::Json;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, header};
use axum::response::IntoResponse;
use chirp_core::ids::UserId;
use chirp_web::{INTERNAL_MESSAGE, USER_ID_HEADER};
use futures::TryStreamExt;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

// RFC 9110 section 7.6.1, plus `host`, which reqwest derives from the URL.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Failure to get an answer from a backend.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The outbound client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Connecting, sending or awaiting the response failed
    #[error("{0}")]
    Upstream(#[source] reqwest::Error),
}

/// Body returned when a backend cannot be reached.
#[derive(Debug, Serialize)]
pub struct ProxyFailure {
    /// Always the generic internal error message
    pub message: &'static str,
    /// What went wrong
    pub error: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ProxyFailure {
                message: INTERNAL_MESSAGE,
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Streaming reverse proxy over a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct Proxy {
    client: reqwest::Client,
}

impl Proxy {
    /// Build a proxy with the given timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Client`] if the TLS backend fails to initialise.
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(ProxyError::Client)?;
        Ok(Self { client })
    }

    /// Send `request` to `route`'s backend and relay its response.
    ///
    /// `user` is injected as `x-user-id`; any incoming value is removed
    /// first either way.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Upstream`] when the backend cannot be reached or
    /// times out. No retry is attempted.
    pub async fn forward(
        &self,
        route: &Route,
        request: Request<Body>,
        user: Option<UserId>,
    ) -> Result<Response<Body>, ProxyError> {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);
        let url = format!("{}{}", route.base_url, rewrite_path(&path_and_query));

        let headers = outbound_headers(&parts.headers, route, user);
        debug!(backend = route.backend.as_str(), method = %parts.method, %url, "Proxying request");

        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()))
            .send()
            .await
            .map_err(|e| {
                error!(backend = route.backend.as_str(), %url, error = %e, "Backend request failed");
                metrics::counter!("gateway.proxy_errors", "backend" => route.backend.as_str())
                    .increment(1);
                ProxyError::Upstream(e)
            })?;

        let status = upstream.status();
        metrics::counter!(
            "gateway.proxied",
            "backend" => route.backend.as_str(),
            "status" => status.as_u16().to_string()
        )
        .increment(1);

        let mut response = Response::new(Body::empty());
        *response.status_mut() = status;
        *response.headers_mut() = without_hop_by_hop(upstream.headers());
        *response.body_mut() = Body::from_stream(upstream.bytes_stream().map_err(axum::Error::new));
        Ok(response)
    }
}

fn without_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in &HOP_BY_HOP {
        out.remove(name);
    }
    out
}

fn outbound_headers(incoming: &HeaderMap, route: &Route, user: Option<UserId>) -> HeaderMap {
    let mut headers = without_hop_by_hop(incoming);
    headers.remove(header::HOST);
    headers.remove(USER_ID_HEADER);

    if let Some(user) = user {
        if let Ok(value) = HeaderValue::from_str(&user.to_string()) {
            headers.insert(USER_ID_HEADER, value);
        }
    }

    let multipart = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));
    if !(route.streams_multipart && multipart) {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    headers
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::routes::Backend;

    fn route(streams_multipart: bool) -> Route {
        Route {
            prefix: "/v1/media",
            backend: Backend::Media,
            base_url: "http://media".into(),
            requires_auth: true,
            streams_multipart,
        }
    }

    fn incoming(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("spoofed"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::HOST, HeaderValue::from_static("gateway"));
        headers.insert("x-correlation-id", HeaderValue::from_static("abc"));
        headers
    }

    #[test]
    fn spoofed_user_ids_are_replaced() {
        let user = UserId::new();
        let headers = outbound_headers(&incoming("application/json"), &route(false), Some(user));
        assert_eq!(headers[USER_ID_HEADER], user.to_string().as_str());
        assert_eq!(headers.get_all(USER_ID_HEADER).iter().count(), 1);
    }

    #[test]
    fn spoofed_user_ids_are_stripped_on_public_routes() {
        let headers = outbound_headers(&incoming("application/json"), &route(false), None);
        assert!(headers.get(USER_ID_HEADER).is_none());
    }

    #[test]
    fn hop_by_hop_headers_are_dropped_and_correlation_kept() {
        let headers = outbound_headers(&incoming("application/json"), &route(false), None);
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get(header::HOST).is_none());
        assert_eq!(headers["x-correlation-id"], "abc");
    }

    #[test]
    fn content_type_is_forced_except_media_multipart() {
        let multipart = "multipart/form-data; boundary=xyz";
        assert_eq!(
            outbound_headers(&incoming(multipart), &route(true), None)[header::CONTENT_TYPE],
            multipart
        );
        assert_eq!(
            outbound_headers(&incoming(multipart), &route(false), None)[header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(
            outbound_headers(&incoming("text/plain"), &route(true), None)[header::CONTENT_TYPE],
            "application/json"
        );
    }
}
