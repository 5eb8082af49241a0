//! Tag model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A blog tag. Tags are created on demand when a blog names them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}
