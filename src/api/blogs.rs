//! Blog API endpoints
//!
//! Public:
//! - GET /api/blogs - Published blogs, paginated and searchable
//! - GET /api/blogs/{slug} - One published blog (counts a view)
//!
//! Admin (MODERATOR+):
//! - GET /api/admin/blogs - All blogs, filtered by status and search
//! - POST /api/admin/blogs - Create a blog
//! - GET /api/admin/blogs/{id} - Blog by id
//! - PATCH /api/admin/blogs/{id} - Partial update (author or ADMIN)
//! - DELETE /api/admin/blogs/{id} - Delete (author or ADMIN)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{double_option, parse_id, ApiJson, ApiQuery, ListQuery, SuccessResponse};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::BlogListResponse;
use crate::models::{BlogDetail, Permission};
use crate::services::authorization::require_permission;
use crate::services::{BlogPatch, NewBlog};

/// Request body for creating a blog
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBlogRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(alias = "category_id")]
    pub category_id: Option<i64>,
    #[serde(alias = "featured_image_id")]
    pub featured_image_id: Option<i64>,
}

/// Request body for a partial update; `null` clears category and image
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBlogRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub status: Option<String>,
    pub tags: Option<Vec<String>>,
    #[serde(default, alias = "category_id", deserialize_with = "double_option")]
    pub category_id: Option<Option<i64>>,
    #[serde(default, alias = "featured_image_id", deserialize_with = "double_option")]
    pub featured_image_id: Option<Option<i64>>,
}

#[derive(Debug, Serialize)]
pub struct BlogCreatedResponse {
    pub message: &'static str,
    pub blog: BlogDetail,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/blogs", get(list_published))
        .route("/blogs/{slug}", get(get_published))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/blogs", get(list_blogs).post(create_blog))
        .route(
            "/blogs/{id}",
            get(get_blog).patch(update_blog).delete(delete_blog),
        )
}

/// GET /api/blogs
async fn list_published(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<BlogListResponse>, ApiError> {
    let result = state
        .blog_service
        .list_published(&query.params(), query.search())
        .await?;
    Ok(Json(result.into()))
}

/// GET /api/blogs/{slug}
async fn get_published(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<BlogDetail>, ApiError> {
    Ok(Json(state.blog_service.view_published(&slug).await?))
}

/// GET /api/admin/blogs
async fn list_blogs(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<BlogListResponse>, ApiError> {
    let result = state
        .blog_service
        .list(&query.params(), query.status.as_deref(), query.search())
        .await?;
    Ok(Json(result.into()))
}

/// POST /api/admin/blogs
async fn create_blog(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<CreateBlogRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_permission(&user, Permission::BlogCreate)?;

    let input = NewBlog {
        title: body.title,
        content: body.content,
        excerpt: body.excerpt,
        status: body.status,
        tags: body.tags,
        category_id: body.category_id,
        featured_image_id: body.featured_image_id,
    };
    let blog = state.blog_service.create(&user, input).await?;

    Ok((
        StatusCode::CREATED,
        Json(BlogCreatedResponse {
            message: "Blog created successfully!",
            blog,
        }),
    ))
}

/// GET /api/admin/blogs/{id}
async fn get_blog(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BlogDetail>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.blog_service.get(id).await?))
}

/// PATCH /api/admin/blogs/{id}
async fn update_blog(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateBlogRequest>,
) -> Result<Json<BlogDetail>, ApiError> {
    let id = parse_id(&id)?;
    let patch = BlogPatch {
        title: body.title,
        content: body.content,
        excerpt: body.excerpt,
        status: body.status,
        category_id: body.category_id,
        featured_image_id: body.featured_image_id,
        tags: body.tags,
    };
    Ok(Json(state.blog_service.update(&user, id, patch).await?))
}

/// DELETE /api/admin/blogs/{id}
async fn delete_blog(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let id = parse_id(&id)?;
    state.blog_service.delete(&user, id).await?;
    Ok(Json(SuccessResponse::ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_null_vs_missing() {
        let body: UpdateBlogRequest =
            serde_json::from_str(r#"{"categoryId": null, "title": "New"}"#).unwrap();
        assert_eq!(body.category_id, Some(None));
        assert_eq!(body.featured_image_id, None);
        assert!(body.tags.is_none());

        let body: UpdateBlogRequest =
            serde_json::from_str(r#"{"featured_image_id": 3, "tags": []}"#).unwrap();
        assert_eq!(body.featured_image_id, Some(Some(3)));
        assert_eq!(body.tags, Some(vec![]));
    }

    #[test]
    fn test_create_request_accepts_both_casings() {
        let body: CreateBlogRequest =
            serde_json::from_str(r#"{"title": "T", "category_id": 2, "featuredImageId": 5}"#).unwrap();
        assert_eq!(body.category_id, Some(2));
        assert_eq!(body.featured_image_id, Some(5));
        assert!(body.tags.is_empty());
    }
}
