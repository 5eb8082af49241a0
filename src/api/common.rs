//! Common API utilities and shared types
//!
//! This module contains shared utilities used across multiple API endpoints.

use axum::extract::{FromRequest, FromRequestParts};
use serde::{Deserialize, Deserializer, Serialize};

use crate::api::middleware::ApiError;
use crate::models::ListParams;

// ============================================================================
// Extractors
// ============================================================================

/// JSON body whose rejections use the API error envelope
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string whose rejections use the API error envelope
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

// ============================================================================
// Query Types
// ============================================================================

/// `?page=&limit=&search=&status=` as accepted by list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub status: Option<String>,
}

impl ListQuery {
    pub fn params(&self) -> ListParams {
        ListParams::from_query(self.page, self.limit)
    }

    /// Trimmed search term, `None` when blank
    pub fn search(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    }
}

// ============================================================================
// Path and Body Helpers
// ============================================================================

/// Parse a numeric path id, "Invalid ID" otherwise
pub fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ApiError::validation_error("Invalid ID"))
}

/// Tell an explicit `null` apart from a missing field.
///
/// Use with `#[serde(default, deserialize_with = "double_option")]`:
/// missing is `None`, `null` is `Some(None)`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ============================================================================
// Small Responses
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
