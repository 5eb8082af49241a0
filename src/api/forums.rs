//! Forum API endpoints
//!
//! - GET /api/forums - Forums with thread counts
//! - GET /api/forums/{forumSlug}/threads - Threads of a forum, newest first
//! - POST /api/forums/{forumSlug}/threads - Start a thread (signed in)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{ApiJson, ApiQuery, ListQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::ThreadListResponse;
use crate::models::ForumWithCount;

/// Request body for a new thread
#[derive(Debug, Default, Deserialize)]
pub struct CreateThreadRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/forums", get(list_forums))
        .route("/forums/{forum_slug}/threads", get(list_threads))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/forums/{forum_slug}/threads", post(create_thread))
}

/// GET /api/forums
async fn list_forums(State(state): State<AppState>) -> Result<Json<Vec<ForumWithCount>>, ApiError> {
    Ok(Json(state.forum_service.list_forums().await?))
}

/// GET /api/forums/{forumSlug}/threads
async fn list_threads(
    State(state): State<AppState>,
    Path(forum_slug): Path<String>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<ThreadListResponse>, ApiError> {
    let result = state
        .forum_service
        .list_threads(&forum_slug, &query.params())
        .await?;
    Ok(Json(result.into()))
}

/// POST /api/forums/{forumSlug}/threads
async fn create_thread(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(forum_slug): Path<String>,
    ApiJson(body): ApiJson<CreateThreadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let thread = state
        .forum_service
        .create_thread(&user, &forum_slug, body.title, body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(thread)))
}
