//! Newsletter API endpoints
//!
//! - POST /api/newsletter/subscribe - Sign up an email address
//! - GET /api/newsletter/subscribe - Subscriber count (MODERATOR+)

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::ApiJson;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::UserRole;
use crate::services::authorization::require_role;

#[derive(Debug, Default, Deserialize)]
pub struct SubscribeRequest {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/newsletter/subscribe", post(subscribe))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/newsletter/subscribe", get(count))
}

/// POST /api/newsletter/subscribe
async fn subscribe(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SubscribeRequest>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    state
        .newsletter_service
        .subscribe(body.email.as_deref())
        .await?;
    Ok(Json(SubscribeResponse {
        success: true,
        message: "Successfully subscribed to newsletter",
    }))
}

/// GET /api/newsletter/subscribe
async fn count(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<CountResponse>, ApiError> {
    require_role(&user, UserRole::Moderator)?;
    let count = state.newsletter_service.count().await?;
    Ok(Json(CountResponse { count }))
}
