//! Error types for web handlers.
//!
//! [`AppError`] bridges [`PlatformError`] and the lower-level error enums to
//! HTTP responses. Every error body has the same shape:
//!
//! ```json
//! { "success": false, "code": "VALIDATION_FAILED", "message": "...", "field": "content" }
//! ```
//!
//! Server-side failures are logged with their cause and answered with a
//! generic message; the cause never reaches the client.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chirp_auth::AuthError;
use chirp_core::error::PlatformError;
use chirp_core::event_bus::EventBusError;
use chirp_core::store::{BlobError, KvError, StoreError};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Message returned for every 5xx response.
pub const INTERNAL_MESSAGE: &str = "Internal server error occurred";

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(Path(id): Path<PostId>) -> Result<Json<Post>, AppError> {
///     let post = store.find(id).await?.ok_or_else(|| AppError::not_found("Post", id))?;
///     Ok(Json(post))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: &'static str,
    /// Offending input field, for validation errors
    field: Option<String>,
    /// Seconds until a rate-limited client may retry
    retry_after: Option<Duration>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            field: None,
            retry_after: None,
            source: None,
        }
    }

    /// Attach an internal cause for logging.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// 400 naming the offending field.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message);
        err.field = Some(field.into());
        err
    }

    /// 401 for a request that carries no identity.
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHENTICATED",
            "Authentication required! Please login to continue",
        )
    }

    /// 401 for a rejected credential.
    #[must_use]
    pub fn invalid_credential(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "INVALID_CREDENTIAL", message)
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{resource} with id {id} not found"),
        )
    }

    /// 429 with a `Retry-After` hint.
    #[must_use]
    pub fn rate_limited(retry_after: Duration) -> Self {
        let mut err = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Too many requests",
        );
        err.retry_after = Some(retry_after);
        err
    }

    /// 500 with a generic message; `source` is only logged.
    #[must_use]
    pub fn internal(code: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, INTERNAL_MESSAGE).with_source(source)
    }

    /// HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// Offending field, if any.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = self.code,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(status = %self.status, code = self.code, "Internal server error");
            }
        }

        let retry_after = self.retry_after;
        let body = ErrorResponse {
            success: false,
            code: self.code,
            message: self.message,
            field: self.field,
        };

        let mut response = (self.status, Json(body)).into_response();
        if let Some(retry_after) = retry_after {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after.as_secs().max(1)),
            );
        }
        response
    }
}

impl From<PlatformError> for AppError {
    fn from(err: PlatformError) -> Self {
        let code = err.code();
        match err {
            PlatformError::Unauthenticated => Self::unauthenticated(),
            PlatformError::InvalidCredential(reason) => {
                Self::invalid_credential("Invalid or expired token").with_source(anyhow::anyhow!(reason))
            }
            PlatformError::RateLimited { retry_after } => Self::rate_limited(retry_after),
            PlatformError::NotFound(what) => {
                Self::new(StatusCode::NOT_FOUND, code, format!("{what} not found"))
            }
            PlatformError::ValidationFailed { field, message } => Self::validation(field, message),
            PlatformError::UpstreamUnavailable(reason)
            | PlatformError::BusUnavailable(reason)
            | PlatformError::Internal(reason) => Self::internal(code, anyhow::anyhow!(reason)),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        PlatformError::from(err).into()
    }
}

impl From<KvError> for AppError {
    fn from(err: KvError) -> Self {
        PlatformError::from(err).into()
    }
}

impl From<BlobError> for AppError {
    fn from(err: BlobError) -> Self {
        PlatformError::from(err).into()
    }
}

impl From<EventBusError> for AppError {
    fn from(err: EventBusError) -> Self {
        PlatformError::from(err).into()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        PlatformError::from(err).into()
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("INTERNAL_ERROR", err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body(err: AppError) -> (StatusCode, serde_json::Value, Option<String>) {
        let response = err.into_response();
        let status = response.status();
        let retry = response
            .headers()
            .get(header::RETRY_AFTER)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap(), retry)
    }

    #[test]
    fn test_error_display() {
        let err = AppError::validation("content", "must not be empty");
        assert_eq!(err.to_string(), "[VALIDATION_FAILED] must not be empty");
    }

    #[test]
    fn taxonomy_maps_to_statuses() {
        let cases = [
            (PlatformError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (PlatformError::InvalidCredential("x".into()), StatusCode::UNAUTHORIZED),
            (
                PlatformError::RateLimited {
                    retry_after: Duration::from_secs(1),
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (PlatformError::NotFound("Post".into()), StatusCode::NOT_FOUND),
            (PlatformError::validation("f", "m"), StatusCode::BAD_REQUEST),
            (
                PlatformError::UpstreamUnavailable("db".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                PlatformError::BusUnavailable("bus".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (PlatformError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            let code = err.code();
            let app = AppError::from(err);
            assert_eq!(app.status(), status);
            assert_eq!(app.code(), code);
        }
    }

    #[tokio::test]
    async fn validation_body_names_the_field() {
        let (status, json, _) = body(AppError::validation("content", "required")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert_eq!(json["field"], "content");
        assert_eq!(json["code"], "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn server_errors_hide_their_cause() {
        let err = AppError::from(StoreError::Unavailable("connection refused to 10.0.0.5".into()));
        let (status, json, _) = body(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["message"], INTERNAL_MESSAGE);
        assert_eq!(json["code"], "UPSTREAM_UNAVAILABLE");
        assert!(json.get("field").is_none());
    }

    #[tokio::test]
    async fn rate_limited_sets_retry_after() {
        let (status, _, retry) = body(AppError::rate_limited(Duration::from_secs(90))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(retry.as_deref(), Some("90"));
    }
}
