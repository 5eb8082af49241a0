//! Category API endpoints
//!
//! - GET /api/categories - All categories with blog counts
//! - GET/POST /api/admin/categories - Paginated list, create
//! - GET/PUT/DELETE /api/admin/categories/{id}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{parse_id, ApiJson, ApiQuery, ListQuery, SuccessResponse};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::CategoryListResponse;
use crate::models::{Category, CategoryWithCount, UpdateCategoryInput};
use crate::services::NewCategory;

/// Request body for creating or updating a category
#[derive(Debug, Default, Deserialize)]
pub struct CategoryRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/categories", get(list_all))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/{id}",
            get(get_category).put(update_category).delete(delete_category),
        )
}

/// GET /api/categories
async fn list_all(State(state): State<AppState>) -> Result<Json<Vec<CategoryWithCount>>, ApiError> {
    Ok(Json(state.category_service.list_all().await?))
}

/// GET /api/admin/categories
async fn list_categories(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<CategoryListResponse>, ApiError> {
    let search = query.search();
    let result = state
        .category_service
        .list(&query.params(), search.as_deref())
        .await?;
    Ok(Json(result.into()))
}

/// POST /api/admin/categories
async fn create_category(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<CategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = NewCategory {
        name: body.name,
        slug: body.slug,
        description: body.description,
        icon: body.icon,
    };
    let category = state.category_service.create(user.id, input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// GET /api/admin/categories/{id}
async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Category>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.category_service.get(id).await?))
}

/// PUT /api/admin/categories/{id}
async fn update_category(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CategoryRequest>,
) -> Result<Json<Category>, ApiError> {
    let id = parse_id(&id)?;
    let input = UpdateCategoryInput {
        name: body.name,
        slug: body.slug,
        description: body.description,
        icon: body.icon,
    };
    Ok(Json(state.category_service.update(user.id, id, input).await?))
}

/// DELETE /api/admin/categories/{id}
async fn delete_category(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let id = parse_id(&id)?;
    state.category_service.delete(user.id, id).await?;
    Ok(Json(SuccessResponse::ok()))
}
