//! Like model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserSummary;

/// A user's like on exactly one thread or comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: i64,
    pub user_id: i64,
    pub thread_id: Option<i64>,
    pub comment_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeWithUser {
    #[serde(flatten)]
    pub like: Like,
    pub user: UserSummary,
}

/// What a like points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeTarget {
    Thread(i64),
    Comment(i64),
}

impl LikeTarget {
    pub fn thread_id(&self) -> Option<i64> {
        match self {
            LikeTarget::Thread(id) => Some(*id),
            LikeTarget::Comment(_) => None,
        }
    }

    pub fn comment_id(&self) -> Option<i64> {
        match self {
            LikeTarget::Comment(id) => Some(*id),
            LikeTarget::Thread(_) => None,
        }
    }
}
