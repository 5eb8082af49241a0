//! Image model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An uploaded image file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: i64,
    /// Public URL under `/uploads`
    pub url: String,
    pub blog_id: Option<i64>,
    pub uploaded_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}
