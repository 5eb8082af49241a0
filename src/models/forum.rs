//! Forum model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discussion board that groups threads. Forums are seeded by migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forum {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Forum listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumWithCount {
    #[serde(flatten)]
    pub forum: Forum,
    pub thread_count: i64,
}
