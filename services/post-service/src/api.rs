//! Post API endpoints.
//!
//! - POST /api/posts/create-post - Create a post
//! - GET /api/posts/all-posts?page&limit - List posts, newest first
//! - GET /api/posts/:id - Get one post
//! - DELETE /api/posts/:id - Delete one of your posts
//!
//! Every route requires the gateway-injected `x-user-id`.

use crate::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chirp_core::ids::{MediaId, PostId};
use chirp_core::model::{Post, PostPage};
use chirp_web::{AppError, AuthenticatedUser, JsonBody, WebResult};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to create a post.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    /// Post body
    pub content: String,
    /// Previously uploaded media to attach
    #[serde(default)]
    pub media_ids: Vec<MediaId>,
}

/// Response after creating a post.
#[derive(Debug, Serialize)]
pub struct CreatePostResponse {
    /// Always `true`
    pub success: bool,
    /// Human-readable outcome
    pub message: &'static str,
    /// The stored post
    pub post: Post,
}

/// Response after deleting a post.
#[derive(Debug, Serialize)]
pub struct DeletePostResponse {
    /// Always `true`
    pub success: bool,
    /// Human-readable outcome
    pub message: &'static str,
}

/// Raw paging parameters; unusable values fall back to defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ListPostsQuery {
    /// 1-based page
    pub page: Option<String>,
    /// Page size
    pub limit: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a post owned by the caller.
pub async fn create_post(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    JsonBody(request): JsonBody<CreatePostRequest>,
) -> WebResult<(StatusCode, Json<CreatePostResponse>)> {
    let post = state
        .posts
        .create(user_id, &request.content, request.media_ids)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatePostResponse {
            success: true,
            message: "Post created successfully!",
            post,
        }),
    ))
}

/// List posts, newest first.
pub async fn list_posts(
    State(state): State<AppState>,
    AuthenticatedUser(_): AuthenticatedUser,
    Query(query): Query<ListPostsQuery>,
) -> WebResult<Json<PostPage>> {
    let (page, limit) = crate::service::normalize_paging(query.page.as_deref(), query.limit.as_deref());
    Ok(Json(state.posts.list(page, limit).await?))
}

/// Get one post.
pub async fn get_post(
    State(state): State<AppState>,
    AuthenticatedUser(_): AuthenticatedUser,
    Path(id): Path<String>,
) -> WebResult<Json<Post>> {
    let id = parse_post_id(&id)?;
    Ok(Json(state.posts.get(id).await?))
}

/// Delete one of the caller's posts.
pub async fn delete_post(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<String>,
) -> WebResult<Json<DeletePostResponse>> {
    let id = parse_post_id(&id)?;
    state.posts.delete(id, user_id).await?;
    Ok(Json(DeletePostResponse {
        success: true,
        message: "Post deleted successfully.",
    }))
}

fn parse_post_id(raw: &str) -> Result<PostId, AppError> {
    raw.parse()
        .map_err(|_| AppError::validation("id", "\"id\" must be a valid post id"))
}
