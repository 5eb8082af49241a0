//! Admin API endpoints
//!
//! Everything here sits behind `require_auth` + `require_moderator`:
//! - GET /api/admin/stats - Dashboard counts, recent activity, health
//! - GET /api/admin/system - Host resources and request statistics
//! - GET /api/admin/users - Paginated, searchable user list
//! - POST /api/admin/users/{id}/ban - Ban (USER_BAN)
//! - POST /api/admin/users/{id}/unban - Lift a ban (USER_BAN)
//! - PUT /api/admin/users/{id}/role - Change role (USER_MANAGE_ROLES)

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::common::{parse_id, ApiJson, ApiQuery, ListQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::UserListResponse;
use crate::models::{Permission, User};
use crate::services::authorization::require_permission;
use crate::services::{DashboardStats, SystemInfo};

#[derive(Debug, Default, Deserialize)]
pub struct BanRequest {
    pub reason: Option<String>,
    /// End of a temporary ban; absent for a permanent one
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

/// Host resources plus request counters
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemResponse {
    #[serde(flatten)]
    pub system: SystemInfo,
    pub total_requests: u64,
    pub avg_response_time_ms: f64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/system", get(get_system))
        .route("/users", get(list_users))
        .route("/users/{id}/ban", post(ban_user))
        .route("/users/{id}/unban", post(unban_user))
        .route("/users/{id}/role", put(change_role))
}

/// GET /api/admin/stats
async fn get_stats(State(state): State<AppState>) -> Result<Json<DashboardStats>, ApiError> {
    Ok(Json(state.dashboard_service.stats().await?))
}

/// GET /api/admin/system
async fn get_system(State(state): State<AppState>) -> Result<Json<SystemResponse>, ApiError> {
    let dashboard = state.dashboard_service.clone();
    // sysinfo refreshes synchronously
    let system = tokio::task::spawn_blocking(move || dashboard.system_info())
        .await
        .map_err(|e| ApiError::internal(e.into()))?;

    Ok(Json(SystemResponse {
        system,
        total_requests: state.request_stats.total_requests(),
        avg_response_time_ms: state.request_stats.avg_response_time_us() / 1000.0,
    }))
}

/// GET /api/admin/users
async fn list_users(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<UserListResponse>, ApiError> {
    let search = query.search();
    let result = state
        .moderation_service
        .list_users(&query.params(), search.as_deref())
        .await?;
    Ok(Json(result.into()))
}

/// POST /api/admin/users/{id}/ban
async fn ban_user(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<BanRequest>,
) -> Result<Json<User>, ApiError> {
    require_permission(&user, Permission::UserBan)?;
    let id = parse_id(&id)?;
    let banned = state
        .moderation_service
        .ban(&user, id, body.reason, body.until)
        .await?;
    Ok(Json(banned))
}

/// POST /api/admin/users/{id}/unban
async fn unban_user(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    require_permission(&user, Permission::UserBan)?;
    let id = parse_id(&id)?;
    Ok(Json(state.moderation_service.unban(&user, id).await?))
}

/// PUT /api/admin/users/{id}/role
async fn change_role(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<RoleRequest>,
) -> Result<Json<User>, ApiError> {
    require_permission(&user, Permission::UserManageRoles)?;
    let id = parse_id(&id)?;
    Ok(Json(
        state
            .moderation_service
            .change_role(&user, id, &body.role)
            .await?,
    ))
}
