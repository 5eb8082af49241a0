//! Upload API endpoints
//!
//! - POST /api/admin/upload-image - Store a blog image (MODERATOR+)
//!
//! The multipart field is `image`. Any other method on the path is 405.

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};

/// Multipart framing allowance on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub url: String,
    pub id: i64,
}

/// POST route; lives behind the admin middleware
pub fn admin_router(max_file_size: u64) -> Router<AppState> {
    let limit = usize::try_from(max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);
    Router::new().route(
        "/upload-image",
        post(upload_image).layer(DefaultBodyLimit::max(limit)),
    )
}

/// GET answered with 405 without requiring a session
pub fn public_router() -> Router<AppState> {
    Router::new().route("/upload-image", get(method_not_allowed))
}

/// POST /api/admin/upload-image
async fn upload_image(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::validation_error(e.body_text()))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some("image") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation_error(format!("Invalid upload: {}", e)))?;

        let image = state
            .image_service
            .store(&user, &file_name, &content_type, &data)
            .await?;

        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                message: "Image uploaded successfully",
                url: image.url,
                id: image.id,
            }),
        ));
    }

    Err(ApiError::validation_error("No image file provided."))
}

async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}
