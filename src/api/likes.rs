//! Like API endpoints
//!
//! - POST /api/likes - Toggle a like on a thread or comment
//! - GET /api/likes?threadId=|commentId=[&userId=] - Likes with "liked by" text

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{ApiJson, ApiQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::models::LikeWithUser;
use crate::services::like::like_target;
use crate::services::{LikeSummary, LikeToggle};

/// Body of a toggle; the liker is always the session user
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleLikeRequest {
    pub thread_id: Option<i64>,
    pub comment_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikesQuery {
    pub thread_id: Option<i64>,
    pub comment_id: Option<i64>,
    /// Whose like `hasLiked` reports; defaults to the session user
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ToggleLikeResponse {
    Liked {
        like: LikeWithUser,
        message: &'static str,
    },
    Unliked {
        message: &'static str,
    },
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/likes", get(list_likes))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/likes", post(toggle_like))
}

/// POST /api/likes
async fn toggle_like(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<ToggleLikeRequest>,
) -> Result<Response, ApiError> {
    let target = like_target(body.thread_id, body.comment_id)?;

    let response = match state.like_service.toggle(&user, target).await? {
        LikeToggle::Liked(like) => (
            StatusCode::CREATED,
            Json(ToggleLikeResponse::Liked {
                like,
                message: "Liked successfully",
            }),
        )
            .into_response(),
        LikeToggle::Unliked => Json(ToggleLikeResponse::Unliked {
            message: "Like removed successfully",
        })
        .into_response(),
    };
    Ok(response)
}

/// GET /api/likes
async fn list_likes(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    ApiQuery(query): ApiQuery<LikesQuery>,
) -> Result<Json<LikeSummary>, ApiError> {
    let target = like_target(query.thread_id, query.comment_id)?;
    let viewer_id = query.user_id.or(viewer.map(|u| u.id));
    Ok(Json(state.like_service.likes_for(target, viewer_id).await?))
}
