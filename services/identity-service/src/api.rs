//! Identity API endpoints.
//!
//! - POST /api/auth/register - Create an account and sign in
//! - POST /api/auth/login - Sign in with username and password
//! - POST /api/auth/refresh-token - Rotate a refresh token
//! - POST /api/auth/logout - Revoke a refresh token
//!
//! None of these require the gateway-injected `x-user-id`.

use crate::AppState;
use crate::service::{Registration, TokenPair};
use axum::{Json, extract::State, http::StatusCode};
use chirp_core::error::PlatformError;
use chirp_web::{AppError, JsonBody, WebResult};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to register.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// Desired handle
    pub username: String,
    /// Contact address
    pub email: String,
    /// Clear-text password
    pub password: String,
}

/// Request to log in.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Registered handle
    pub username: String,
    /// Clear-text password
    pub password: String,
}

/// Request carrying a refresh token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    /// Token from a previous register, login or refresh
    #[serde(default)]
    pub refresh_token: String,
}

/// Response carrying a fresh token pair.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// Always `true`
    pub success: bool,
    /// Human-readable outcome
    pub message: &'static str,
    /// The issued tokens
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Response without a payload.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Always `true`
    pub success: bool,
    /// Human-readable outcome
    pub message: &'static str,
}

// Credential failures keep their own message; the shared mapping speaks
// about tokens only.
fn reject(err: PlatformError) -> AppError {
    match err {
        PlatformError::InvalidCredential(message) => AppError::invalid_credential(message),
        other => other.into(),
    }
}

fn require_refresh_token(token: &str) -> Result<&str, AppError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::validation("refreshToken", "Refresh token missing"));
    }
    Ok(token)
}

// ============================================================================
// Handlers
// ============================================================================

/// Create an account.
///
/// # Errors
///
/// - 400 for invalid input or an existing user
/// - 500 if the store fails
pub async fn register(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RegisterRequest>,
) -> WebResult<(StatusCode, Json<TokenResponse>)> {
    let tokens = state
        .identity
        .register(Registration {
            username: &request.username,
            email: &request.email,
            password: &request.password,
        })
        .await
        .map_err(reject)?;

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            success: true,
            message: "User registered successfully!",
            tokens,
        }),
    ))
}

/// Sign in.
///
/// # Errors
///
/// - 400 for a missing field
/// - 401 for wrong credentials
pub async fn login(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> WebResult<Json<TokenResponse>> {
    if request.username.trim().is_empty() {
        return Err(AppError::validation("username", "\"username\" is required"));
    }
    if request.password.is_empty() {
        return Err(AppError::validation("password", "\"password\" is required"));
    }

    let tokens = state
        .identity
        .login(&request.username, &request.password)
        .await
        .map_err(reject)?;

    Ok(Json(TokenResponse {
        success: true,
        message: "Logged in successfully",
        tokens,
    }))
}

/// Exchange a refresh token for a new pair.
///
/// # Errors
///
/// - 400 if the token is missing
/// - 401 if it is unknown, used or expired
pub async fn refresh_token(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RefreshTokenRequest>,
) -> WebResult<Json<TokenResponse>> {
    let token = require_refresh_token(&request.refresh_token)?;
    let tokens = state.identity.refresh(token).await.map_err(reject)?;

    Ok(Json(TokenResponse {
        success: true,
        message: "Token refreshed",
        tokens,
    }))
}

/// Revoke a refresh token.
///
/// # Errors
///
/// - 400 if the token is missing
/// - 500 if the store fails
pub async fn logout(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RefreshTokenRequest>,
) -> WebResult<Json<MessageResponse>> {
    let token = require_refresh_token(&request.refresh_token)?;
    state.identity.logout(token).await.map_err(reject)?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Logged out successfully!",
    }))
}
