//! Search API endpoint.
//!
//! - GET /api/search/posts?query= - Posts matching every query word, newest first

use crate::AppState;
use axum::{
    Json,
    extract::{Query, State},
};
use chirp_core::model::SearchDocument;
use chirp_web::{AppError, AuthenticatedUser, WebResult};
use serde::Deserialize;

/// Search parameters.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    /// Free text
    pub query: Option<String>,
}

/// Search indexed posts.
pub async fn search_posts(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Query(params): Query<SearchQuery>,
) -> WebResult<Json<Vec<SearchDocument>>> {
    let query = params.query.as_deref().map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(AppError::validation("query", "\"query\" is required"));
    }

    let results = state.store.search(query, state.result_limit).await?;
    tracing::debug!(%user_id, query, hits = results.len(), "Search served");
    Ok(Json(results))
}
