//! Custom Axum extractors.
//!
//! - `CorrelationId`: the request's correlation ID
//! - `ClientIp`: the caller's address, honouring proxy headers only when trusted
//! - `AuthenticatedUser`: the user the gateway vouched for via `x-user-id`
//! - `JsonBody`: `Json` whose rejections use the platform error body
//!
//! # Examples
//!
//! ```ignore
//! async fn create_post(
//!     AuthenticatedUser(user_id): AuthenticatedUser,
//!     correlation_id: CorrelationId,
//!     Json(body): Json<CreatePost>,
//! ) -> Result<Json<Post>, AppError> {
//!     tracing::info!(correlation_id = %correlation_id.0, %user_id, "Creating post");
//!     ...
//! }
//! ```

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{
    Json, async_trait,
    extract::{FromRequest, FromRequestParts, Request, connect_info::ConnectInfo},
    http::{HeaderMap, request::Parts},
};
use serde::de::DeserializeOwned;
use chirp_core::ids::UserId;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use uuid::Uuid;

/// Header carrying the authenticated user ID from the gateway to services.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Correlation ID for request tracing.
///
/// Prefers the ID stored by the correlation middleware, then the
/// `X-Correlation-ID` header, and otherwise generates a UUID v4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = parts
            .extensions
            .get::<Uuid>()
            .copied()
            .or_else(|| {
                parts
                    .headers
                    .get(CORRELATION_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| Uuid::parse_str(s).ok())
            })
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

/// Whether forwarding headers from a reverse proxy may be believed.
///
/// Insert as a request extension (usually via `Extension` layer). Without
/// it, `X-Forwarded-For` and `X-Real-IP` are ignored, since any client
/// can set them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyTrust {
    /// Use the socket peer address only.
    #[default]
    Direct,
    /// Trust `X-Forwarded-For` / `X-Real-IP` set by a fronting proxy.
    Forwarded,
}

/// Client IP address.
///
/// # Priority
///
/// 1. `X-Forwarded-For` (first IP), only under [`ProxyTrust::Forwarded`]
/// 2. `X-Real-IP`, only under [`ProxyTrust::Forwarded`]
/// 3. Connection IP from `ConnectInfo`
/// 4. `127.0.0.1` when no connection info is attached (in-process tests)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let trust = parts.extensions.get::<ProxyTrust>().copied().unwrap_or_default();
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Ok(Self(extract_client_ip(&parts.headers, trust, peer)))
    }
}

fn extract_client_ip(headers: &HeaderMap, trust: ProxyTrust, peer: Option<IpAddr>) -> IpAddr {
    if trust == ProxyTrust::Forwarded {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip;
        }

        let real = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<IpAddr>().ok());
        if let Some(ip) = real {
            return ip;
        }
    }

    peer.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// The user the gateway authenticated.
///
/// Services sit behind the gateway, which strips any client-supplied
/// `x-user-id` and injects the verified one. A missing or malformed header
/// is rejected with 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<UserId>().ok())
            .map(Self)
            .ok_or_else(AppError::unauthenticated)
    }
}

/// JSON request body.
///
/// Same as [`Json`], except a missing content type or a body that does not
/// deserialize is answered with a 400 `VALIDATION_FAILED` naming `body`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| Self(value))
            .map_err(|rejection| AppError::validation("body", rejection.body_text()))
    }
}
