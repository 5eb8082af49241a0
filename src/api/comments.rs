//! Comment API endpoints
//!
//! - POST /api/comments/{id}/replies - Reply to a comment
//! - PUT /api/comments/{id} - Edit (author or MODERATOR+)
//! - DELETE /api/comments/{id} - Delete with its replies (author or MODERATOR+)
//!
//! Top-level comments are created under `/api/threads/{id}/comments`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{parse_id, ApiJson, SuccessResponse};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::Comment;

#[derive(Debug, Default, Deserialize)]
pub struct CommentContentRequest {
    pub content: Option<String>,
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/comments/{id}/replies", post(create_reply))
        .route("/comments/{id}", put(update_comment).delete(delete_comment))
}

/// POST /api/comments/{id}/replies
async fn create_reply(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CommentContentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let parent_id = parse_id(&id)?;
    let reply = state
        .comment_service
        .reply(&user, parent_id, body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(reply)))
}

/// PUT /api/comments/{id}
async fn update_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CommentContentRequest>,
) -> Result<Json<Comment>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.comment_service.update(&user, id, body.content).await?))
}

/// DELETE /api/comments/{id}
async fn delete_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let id = parse_id(&id)?;
    state.comment_service.delete(&user, id).await?;
    Ok(Json(SuccessResponse::ok()))
}
