//! Thread API endpoints
//!
//! - GET /api/threads/{id} - Thread with nested comments (counts a view)
//! - PUT /api/threads/{id} - Edit (author or MODERATOR+)
//! - DELETE /api/threads/{id} - Delete (author or MODERATOR+)
//! - POST /api/threads/{id}/comments - Comment on the thread
//! - GET /api/threads/{id}/likes - Likes on the thread
//! - PATCH /api/admin/threads/{id} - Lock/unlock, open/close (THREAD_MODERATE)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{parse_id, ApiJson, ApiQuery, SuccessResponse};
use crate::api::likes::LikesQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::models::{Permission, Thread, ThreadDetail};
use crate::services::authorization::require_permission;
use crate::services::{LikeSummary, ThreadModeration};

#[derive(Debug, Default, Deserialize)]
pub struct UpdateThreadRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerateThreadRequest {
    #[serde(alias = "is_locked")]
    pub is_locked: Option<bool>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub content: Option<String>,
    #[serde(alias = "parent_id")]
    pub parent_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadLikesResponse {
    pub thread_id: i64,
    #[serde(flatten)]
    pub summary: LikeSummary,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/threads/{id}", get(get_thread))
        .route("/threads/{id}/likes", get(thread_likes))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/threads/{id}", put(update_thread).delete(delete_thread))
        .route("/threads/{id}/comments", post(create_comment))
}

pub fn admin_router() -> Router<AppState> {
    Router::new().route("/threads/{id}", patch(moderate_thread))
}

/// GET /api/threads/{id}
async fn get_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ThreadDetail>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.forum_service.get_thread_detail(id).await?))
}

/// PUT /api/threads/{id}
async fn update_thread(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateThreadRequest>,
) -> Result<Json<Thread>, ApiError> {
    let id = parse_id(&id)?;
    let thread = state
        .forum_service
        .update_thread(&user, id, body.title, body.content)
        .await?;
    Ok(Json(thread))
}

/// DELETE /api/threads/{id}
async fn delete_thread(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let id = parse_id(&id)?;
    state.forum_service.delete_thread(&user, id).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// POST /api/threads/{id}/comments
async fn create_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let thread_id = parse_id(&id)?;
    let comment = state
        .comment_service
        .create(&user, thread_id, body.content, body.parent_id)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// GET /api/threads/{id}/likes
async fn thread_likes(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<LikesQuery>,
) -> Result<Json<ThreadLikesResponse>, ApiError> {
    let thread_id = parse_id(&id)?;
    let viewer_id = query.user_id.or(viewer.map(|u| u.id));
    let summary = state.like_service.thread_likes(thread_id, viewer_id).await?;
    Ok(Json(ThreadLikesResponse { thread_id, summary }))
}

/// PATCH /api/admin/threads/{id}
async fn moderate_thread(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ModerateThreadRequest>,
) -> Result<Json<Thread>, ApiError> {
    require_permission(&user, Permission::ThreadModerate)?;
    let id = parse_id(&id)?;
    let moderation = ThreadModeration {
        is_locked: body.is_locked,
        status: body.status,
    };
    Ok(Json(state.forum_service.moderate_thread(&user, id, moderation).await?))
}
